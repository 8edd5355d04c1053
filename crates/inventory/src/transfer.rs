use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{
    Aggregate, AggregateId, AggregateRoot, CompanyId, DomainError, ExpectedVersion, Owned,
    ProductId, Quantity, TenantId, UserId, WarehouseId,
};
use stockflow_events::Event;

use crate::numbering::DocumentNumber;
use crate::status::{TransferAction, TransferStatus};
use crate::stock::{MovementReason, StockDirection, StockKey, StockMovement};

/// Stock transfer identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub AggregateId);

impl TransferId {
    pub fn new() -> Self {
        Self(AggregateId::new())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Validated transfer line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    /// 1-based position in the document.
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub batch_ref: Option<String>,
    pub notes: Option<String>,
}

/// Line as submitted by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    #[serde(default)]
    pub batch_ref: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransferLine {
    pub fn new(product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            batch_ref: None,
            notes: None,
        }
    }
}

/// Header fields plus the full item list, as submitted on create or edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDraft {
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub transfer_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<TransferLine>,
}

/// Input of `create_transfer`; identical in shape to an edit.
pub type NewTransfer = TransferDraft;

impl TransferDraft {
    /// Structural validation (no lookups): distinct warehouses, at least one
    /// line, positive quantities. Lines are numbered from 1 in input order.
    pub fn validate(&self) -> Result<Vec<TransferItem>, DomainError> {
        if self.source_warehouse_id == self.destination_warehouse_id {
            return Err(DomainError::validation(
                "destination_warehouse_id: must differ from source warehouse",
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("items: at least one line is required"));
        }

        self.items
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let line_no = idx as u32 + 1;
                let quantity = Quantity::positive(line.quantity).map_err(|e| match e {
                    DomainError::Validation(msg) => {
                        DomainError::validation(format!("items[{line_no}].quantity: {msg}"))
                    }
                    other => other,
                })?;
                Ok(TransferItem {
                    line_no,
                    product_id: line.product_id,
                    quantity,
                    batch_ref: non_blank(line.batch_ref.as_deref()),
                    notes: non_blank(line.notes.as_deref()),
                })
            })
            .collect()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Aggregate root: StockTransfer (header + lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    id: TransferId,
    tenant_id: TenantId,
    company_id: CompanyId,
    number: Option<DocumentNumber>,
    source_warehouse_id: WarehouseId,
    destination_warehouse_id: WarehouseId,
    transfer_date: NaiveDate,
    status: TransferStatus,
    notes: Option<String>,
    items: Vec<TransferItem>,

    created_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    shipped_by: Option<UserId>,
    shipped_at: Option<DateTime<Utc>>,
    received_by: Option<UserId>,
    received_at: Option<DateTime<Utc>>,
    cancelled_by: Option<UserId>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,

    version: u64,
    created: bool,
}

impl StockTransfer {
    /// Not-yet-created instance owned by (`tenant_id`, `company_id`).
    pub fn empty(id: TransferId, tenant_id: TenantId, company_id: CompanyId) -> Self {
        Self {
            id,
            tenant_id,
            company_id,
            number: None,
            source_warehouse_id: WarehouseId::from_uuid(Uuid::nil()),
            destination_warehouse_id: WarehouseId::from_uuid(Uuid::nil()),
            transfer_date: NaiveDate::default(),
            status: TransferStatus::Draft,
            notes: None,
            items: Vec::new(),
            created_by: None,
            created_at: None,
            shipped_by: None,
            shipped_at: None,
            received_by: None,
            received_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    /// (tenant, company) owning this transfer.
    pub fn owner(&self) -> (TenantId, CompanyId) {
        (self.tenant_id, self.company_id)
    }

    pub fn number(&self) -> Option<DocumentNumber> {
        self.number
    }

    pub fn source_warehouse_id(&self) -> WarehouseId {
        self.source_warehouse_id
    }

    pub fn destination_warehouse_id(&self) -> WarehouseId {
        self.destination_warehouse_id
    }

    pub fn transfer_date(&self) -> NaiveDate {
        self.transfer_date
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn shipped_by(&self) -> Option<UserId> {
        self.shipped_by
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn received_by(&self) -> Option<UserId> {
        self.received_by
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn cancelled_by(&self) -> Option<UserId> {
        self.cancelled_by
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for StockTransfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Owned for StockTransfer {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn company_id(&self) -> Option<CompanyId> {
        Some(self.company_id)
    }
}

/// Command: CreateTransfer. The number is allocated before the command is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTransfer {
    pub number: DocumentNumber,
    pub draft: TransferDraft,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateTransfer (replace header and lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTransfer {
    pub draft: TransferDraft,
    pub expected_version: ExpectedVersion,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipTransfer / ReceiveTransfer / DeleteTransfer carry only the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferActor {
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelTransfer {
    pub reason: String,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Update(UpdateTransfer),
    Ship(TransferActor),
    Receive(TransferActor),
    Cancel(CancelTransfer),
    Delete(TransferActor),
}

impl TransferCommand {
    /// Lifecycle action this command performs (`None` for creation).
    pub fn action(&self) -> Option<TransferAction> {
        match self {
            TransferCommand::Create(_) => None,
            TransferCommand::Update(_) => Some(TransferAction::Edit),
            TransferCommand::Ship(_) => Some(TransferAction::Ship),
            TransferCommand::Receive(_) => Some(TransferAction::Receive),
            TransferCommand::Cancel(_) => Some(TransferAction::Cancel),
            TransferCommand::Delete(_) => Some(TransferAction::Delete),
        }
    }
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub transfer_id: TransferId,
    pub number: DocumentNumber,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub transfer_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<TransferItem>,
    pub created_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUpdated {
    pub transfer_id: TransferId,
    pub source_warehouse_id: WarehouseId,
    pub destination_warehouse_id: WarehouseId,
    pub transfer_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<TransferItem>,
    pub updated_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferShipped. Carries the lines so the ledger effect can be derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferShipped {
    pub transfer_id: TransferId,
    pub source_warehouse_id: WarehouseId,
    pub items: Vec<TransferItem>,
    pub shipped_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub transfer_id: TransferId,
    pub destination_warehouse_id: WarehouseId,
    pub items: Vec<TransferItem>,
    pub received_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled. `previous_status` decides whether stock returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub transfer_id: TransferId,
    pub previous_status: TransferStatus,
    pub source_warehouse_id: WarehouseId,
    pub items: Vec<TransferItem>,
    pub reason: String,
    pub cancelled_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDeleted {
    pub transfer_id: TransferId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    TransferCreated(TransferCreated),
    TransferUpdated(TransferUpdated),
    TransferShipped(TransferShipped),
    TransferReceived(TransferReceived),
    TransferCancelled(TransferCancelled),
    TransferDeleted(TransferDeleted),
}

impl TransferEvent {
    /// Ledger mutations implied by this event, in line order.
    ///
    /// Ship takes stock out of the source, receive puts it into the
    /// destination, and cancelling a shipped transfer puts it back into the
    /// source. Every other event leaves the ledger alone.
    pub fn stock_movements(&self) -> Vec<StockMovement> {
        let (warehouse_id, items, direction, reason) = match self {
            TransferEvent::TransferShipped(e) => (
                e.source_warehouse_id,
                &e.items,
                StockDirection::Decrement,
                MovementReason::TransferShipped,
            ),
            TransferEvent::TransferReceived(e) => (
                e.destination_warehouse_id,
                &e.items,
                StockDirection::Increment,
                MovementReason::TransferReceived,
            ),
            TransferEvent::TransferCancelled(e) if e.previous_status == TransferStatus::Shipped => (
                e.source_warehouse_id,
                &e.items,
                StockDirection::Increment,
                MovementReason::TransferCancelled,
            ),
            _ => return Vec::new(),
        };

        items
            .iter()
            .map(|item| StockMovement {
                key: StockKey::new(warehouse_id, item.product_id),
                direction,
                quantity: item.quantity,
                line_no: Some(item.line_no),
                reason,
            })
            .collect()
    }
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferCreated(_) => "inventory.transfer.created",
            TransferEvent::TransferUpdated(_) => "inventory.transfer.updated",
            TransferEvent::TransferShipped(_) => "inventory.transfer.shipped",
            TransferEvent::TransferReceived(_) => "inventory.transfer.received",
            TransferEvent::TransferCancelled(_) => "inventory.transfer.cancelled",
            TransferEvent::TransferDeleted(_) => "inventory.transfer.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::TransferCreated(e) => e.occurred_at,
            TransferEvent::TransferUpdated(e) => e.occurred_at,
            TransferEvent::TransferShipped(e) => e.occurred_at,
            TransferEvent::TransferReceived(e) => e.occurred_at,
            TransferEvent::TransferCancelled(e) => e.occurred_at,
            TransferEvent::TransferDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockTransfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::TransferCreated(e) => {
                self.number = Some(e.number);
                self.source_warehouse_id = e.source_warehouse_id;
                self.destination_warehouse_id = e.destination_warehouse_id;
                self.transfer_date = e.transfer_date;
                self.notes = e.notes.clone();
                self.items = e.items.clone();
                self.status = TransferStatus::Draft;
                self.created_by = e.created_by;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            TransferEvent::TransferUpdated(e) => {
                self.source_warehouse_id = e.source_warehouse_id;
                self.destination_warehouse_id = e.destination_warehouse_id;
                self.transfer_date = e.transfer_date;
                self.notes = e.notes.clone();
                self.items = e.items.clone();
            }
            TransferEvent::TransferShipped(e) => {
                self.status = TransferStatus::Shipped;
                self.shipped_by = e.shipped_by;
                self.shipped_at = Some(e.occurred_at);
            }
            TransferEvent::TransferReceived(e) => {
                self.status = TransferStatus::Received;
                self.received_by = e.received_by;
                self.received_at = Some(e.occurred_at);
            }
            TransferEvent::TransferCancelled(e) => {
                self.status = TransferStatus::Cancelled;
                self.cancelled_by = e.cancelled_by;
                self.cancelled_at = Some(e.occurred_at);
                self.cancel_reason = Some(e.reason.clone());
            }
            TransferEvent::TransferDeleted(_) => {}
        }

        // +1 per applied event; also the optimistic edit check.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let Some(action) = command.action() {
            if !self.created {
                return Err(DomainError::not_found(format!("transfer {}", self.id)));
            }
            // Cheap input checks first so a bad cancel reason is reported as such.
            if let TransferCommand::Cancel(cmd) = command {
                if cmd.reason.trim().is_empty() {
                    return Err(DomainError::validation(
                        "reason: cancellation reason is required",
                    ));
                }
            }
            self.status.ensure(action)?;
        }

        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Update(cmd) => self.handle_update(cmd),
            TransferCommand::Ship(cmd) => Ok(vec![TransferEvent::TransferShipped(TransferShipped {
                transfer_id: self.id,
                source_warehouse_id: self.source_warehouse_id,
                items: self.items.clone(),
                shipped_by: cmd.user_id,
                occurred_at: cmd.occurred_at,
            })]),
            TransferCommand::Receive(cmd) => {
                Ok(vec![TransferEvent::TransferReceived(TransferReceived {
                    transfer_id: self.id,
                    destination_warehouse_id: self.destination_warehouse_id,
                    items: self.items.clone(),
                    received_by: cmd.user_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransferCommand::Cancel(cmd) => {
                Ok(vec![TransferEvent::TransferCancelled(TransferCancelled {
                    transfer_id: self.id,
                    previous_status: self.status,
                    source_warehouse_id: self.source_warehouse_id,
                    items: self.items.clone(),
                    reason: cmd.reason.trim().to_string(),
                    cancelled_by: cmd.user_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransferCommand::Delete(cmd) => Ok(vec![TransferEvent::TransferDeleted(TransferDeleted {
                transfer_id: self.id,
                deleted_by: cmd.user_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}

impl StockTransfer {
    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "transfer {} already exists",
                self.id
            )));
        }
        let items = cmd.draft.validate()?;

        Ok(vec![TransferEvent::TransferCreated(TransferCreated {
            transfer_id: self.id,
            number: cmd.number,
            source_warehouse_id: cmd.draft.source_warehouse_id,
            destination_warehouse_id: cmd.draft.destination_warehouse_id,
            transfer_date: cmd.draft.transfer_date,
            notes: non_blank(cmd.draft.notes.as_deref()),
            items,
            created_by: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        cmd.expected_version.check(self.version)?;
        let items = cmd.draft.validate()?;

        Ok(vec![TransferEvent::TransferUpdated(TransferUpdated {
            transfer_id: self.id,
            source_warehouse_id: cmd.draft.source_warehouse_id,
            destination_warehouse_id: cmd.draft.destination_warehouse_id,
            transfer_date: cmd.draft.transfer_date,
            notes: non_blank(cmd.draft.notes.as_deref()),
            items,
            updated_by: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
