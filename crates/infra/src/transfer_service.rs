//! Stock transfer lifecycle orchestration.
//!
//! ```text
//! AuthContext ─▶ TenantScopeGuard ─▶ TransactionCoordinator
//!                                      │ lock transfer header (FOR UPDATE)
//!                                      │ StockTransfer::handle  (pure decision)
//!                                      │ lookups: warehouses/products in scope
//!                                      │ DocumentNumberAllocator (create only)
//!                                      │ WarehouseStockLedger::apply (ship/receive/cancel)
//!                                      │ persist header + lines
//!                                      ▼ commit / rollback
//!                                    EventBus (after commit, best effort)
//! ```
//!
//! Lock order inside a unit is always: transfer header, then sequence
//! counter (create only), then stock rows in ascending (warehouse, product)
//! order. Two concurrent `ship` calls on one transfer therefore serialise on
//! the header and the loser sees `SHIPPED`.

use serde_json::Value as JsonValue;
use tracing::instrument;

use stockflow_auth::{AuthContext, TenantScopeGuard};
use stockflow_core::{Aggregate, AggregateRoot, Clock, CompanyId, ExpectedVersion, TenantId};
use stockflow_events::{Event, EventBus, EventEnvelope, EventSource};
use stockflow_inventory::{
    CancelTransfer, CreateTransfer, DocumentType, NewTransfer, StockTransfer, TransferActor,
    TransferCommand, TransferDraft, TransferEvent, TransferId, TransferStatus, UpdateTransfer,
};

use crate::coordinator::TransactionCoordinator;
use crate::error::ServiceError;
use crate::ledger::{MovementOrigin, WarehouseStockLedger};
use crate::numbering::DocumentNumberAllocator;
use crate::scoped::ScopedTransaction;
use crate::store::{LockMode, PersistenceStore};

/// Aggregate type stamped on published envelopes.
pub const TRANSFER_AGGREGATE_TYPE: &str = "inventory.stock_transfer";

#[derive(Debug)]
pub struct TransferService<S, B, C> {
    coordinator: TransactionCoordinator<S>,
    guard: TenantScopeGuard,
    ledger: WarehouseStockLedger,
    allocator: DocumentNumberAllocator,
    bus: B,
    clock: C,
}

impl<S, B, C> TransferService<S, B, C> {
    pub fn new(store: S, bus: B, clock: C, guard: TenantScopeGuard) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            guard,
            ledger: WarehouseStockLedger::new(),
            allocator: DocumentNumberAllocator::new(),
            bus,
            clock,
        }
    }
}

impl<S, B, C> TransferService<S, B, C>
where
    S: PersistenceStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    C: Clock,
{
    /// Create a DRAFT transfer with a freshly allocated document number.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id()),
        err
    )]
    pub fn create_transfer(
        &self,
        ctx: &AuthContext,
        new: NewTransfer,
    ) -> Result<StockTransfer, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        let now = self.clock.now();
        let year = self.clock.current_year();

        let (transfer, events) = self.coordinator.execute(&scope, "create_transfer", move |tx| {
            let (tenant_id, company_id) = tx.owner()?;
            let mut transfer = StockTransfer::empty(TransferId::new(), tenant_id, company_id);

            // Structural checks run before anything is locked or written.
            new.validate()?;
            self.check_references(tx, (tenant_id, company_id), &new)?;

            let number = self.allocator.allocate(tx, DocumentType::StockTransfer, year)?;
            let events = transfer.handle(&TransferCommand::Create(CreateTransfer {
                number,
                draft: new,
                user_id: ctx.user_id(),
                occurred_at: now,
            }))?;
            apply_all(&mut transfer, &events);

            tx.insert_transfer(transfer.clone())?;
            Ok((transfer, events))
        })?;

        tracing::info!(
            transfer_id = %transfer.id_typed(),
            number = ?transfer.number().map(|n| n.to_string()),
            "transfer created"
        );
        self.publish(&transfer, &events);
        Ok(transfer)
    }

    /// Replace header fields and the full item list of a DRAFT transfer.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn update_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
        draft: TransferDraft,
        expected_version: ExpectedVersion,
    ) -> Result<StockTransfer, ServiceError> {
        let command = TransferCommand::Update(UpdateTransfer {
            draft,
            expected_version,
            user_id: ctx.user_id(),
            occurred_at: self.clock.now(),
        });
        self.transition(ctx, "update_transfer", transfer_id, command)
    }

    /// DRAFT → SHIPPED; takes every line out of the source warehouse.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn ship_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
    ) -> Result<StockTransfer, ServiceError> {
        let command = TransferCommand::Ship(self.actor(ctx));
        self.transition(ctx, "ship_transfer", transfer_id, command)
    }

    /// SHIPPED → RECEIVED; puts every line into the destination warehouse.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn receive_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
    ) -> Result<StockTransfer, ServiceError> {
        let command = TransferCommand::Receive(self.actor(ctx));
        self.transition(ctx, "receive_transfer", transfer_id, command)
    }

    /// DRAFT|SHIPPED → CANCELLED. Cancelling a shipped transfer returns the
    /// stock to the source warehouse.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn cancel_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
        reason: &str,
    ) -> Result<StockTransfer, ServiceError> {
        let command = TransferCommand::Cancel(CancelTransfer {
            reason: reason.to_string(),
            user_id: ctx.user_id(),
            occurred_at: self.clock.now(),
        });
        self.transition(ctx, "cancel_transfer", transfer_id, command)
    }

    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn delete_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
    ) -> Result<(), ServiceError> {
        let command = TransferCommand::Delete(self.actor(ctx));
        self.transition(ctx, "delete_transfer", transfer_id, command)
            .map(|_| ())
    }

    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), transfer_id = %transfer_id),
        err
    )]
    pub fn get_transfer(
        &self,
        ctx: &AuthContext,
        transfer_id: TransferId,
    ) -> Result<StockTransfer, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        self.coordinator.execute(&scope, "get_transfer", |tx| {
            tx.transfer(transfer_id, LockMode::Read)?
                .ok_or_else(|| ServiceError::not_found(format!("transfer {transfer_id}")))
        })
    }

    /// Transfers visible to the caller, ordered by document number.
    #[instrument(
        skip_all,
        fields(tenant_id = ?ctx.tenant_id(), company_id = ?ctx.company_id(), status = ?status),
        err
    )]
    pub fn list_transfers(
        &self,
        ctx: &AuthContext,
        status: Option<TransferStatus>,
    ) -> Result<Vec<StockTransfer>, ServiceError> {
        let scope = self.guard.scope(ctx)?;
        let mut rows = self
            .coordinator
            .execute(&scope, "list_transfers", |tx| tx.transfers())?;
        if let Some(status) = status {
            rows.retain(|t| t.status() == status);
        }
        Ok(rows)
    }

    fn actor(&self, ctx: &AuthContext) -> TransferActor {
        TransferActor {
            user_id: ctx.user_id(),
            occurred_at: self.clock.now(),
        }
    }

    /// Shared path of every transition on an existing transfer.
    fn transition(
        &self,
        ctx: &AuthContext,
        operation: &'static str,
        transfer_id: TransferId,
        command: TransferCommand,
    ) -> Result<StockTransfer, ServiceError> {
        let scope = self.guard.scope(ctx)?;

        let (transfer, events) = self.coordinator.execute(&scope, operation, |tx| {
            let mut transfer = tx
                .transfer(transfer_id, LockMode::ForUpdate)?
                .ok_or_else(|| ServiceError::not_found(format!("transfer {transfer_id}")))?;

            // A pinned bypass can read other companies' transfers but not move them.
            let (tenant_id, company_id) = transfer.owner();
            if !tx.acts_for(tenant_id, company_id) {
                return Err(ServiceError::not_found(format!("transfer {transfer_id}")));
            }

            let events = transfer.handle(&command)?;
            if let TransferCommand::Update(update) = &command {
                self.check_references(tx, (tenant_id, company_id), &update.draft)?;
            }
            apply_all(&mut transfer, &events);

            for event in &events {
                let movements = event.stock_movements();
                if movements.is_empty() {
                    continue;
                }
                let origin = MovementOrigin {
                    reference: transfer.number().map(|n| n.to_string()),
                    transfer_id: Some(transfer_id),
                    user_id: ctx.user_id(),
                    occurred_at: event.occurred_at(),
                };
                self.ledger.apply(tx, &movements, &origin)?;
            }

            if matches!(command, TransferCommand::Delete(_)) {
                tx.delete_transfer(transfer_id)?;
            } else {
                tx.update_transfer(transfer.clone())?;
            }
            Ok((transfer, events))
        })?;

        tracing::info!(
            operation,
            status = %transfer.status(),
            version = transfer.version(),
            "transfer transition committed"
        );
        self.publish(&transfer, &events);
        Ok(transfer)
    }

    /// Warehouses and products named by a draft must exist in the company
    /// owning the transfer (anything else reads as not found) and be active.
    fn check_references(
        &self,
        tx: &mut ScopedTransaction<'_>,
        (tenant_id, company_id): (TenantId, CompanyId),
        draft: &TransferDraft,
    ) -> Result<(), ServiceError> {

        for (field, id) in [
            ("source_warehouse_id", draft.source_warehouse_id),
            ("destination_warehouse_id", draft.destination_warehouse_id),
        ] {
            match tx.warehouse(id)? {
                Some(w) if w.tenant_id == tenant_id && w.company_id == company_id => {
                    if !w.active {
                        return Err(ServiceError::validation(format!(
                            "{field}: warehouse {} is inactive",
                            w.code
                        )));
                    }
                }
                _ => {
                    return Err(ServiceError::not_found(format!("warehouse {id} ({field})")));
                }
            }
        }

        for (idx, line) in draft.items.iter().enumerate() {
            let line_no = idx + 1;
            match tx.product(line.product_id)? {
                Some(p) if p.tenant_id == tenant_id && p.company_id == company_id => {
                    if !p.active {
                        return Err(ServiceError::validation(format!(
                            "items[{line_no}].product_id: product {} is inactive",
                            p.sku
                        )));
                    }
                }
                _ => {
                    return Err(ServiceError::not_found(format!(
                        "product {} (items[{line_no}].product_id)",
                        line.product_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Publish committed events. Failures are logged, never surfaced: the
    /// transition already committed.
    fn publish(&self, transfer: &StockTransfer, events: &[TransferEvent]) {
        let (tenant_id, company_id) = transfer.owner();
        let base = transfer.version().saturating_sub(events.len() as u64);

        for (offset, event) in events.iter().enumerate() {
            let source = EventSource {
                tenant_id,
                company_id,
                aggregate_id: transfer.id_typed().0,
                aggregate_type: TRANSFER_AGGREGATE_TYPE,
                sequence_number: base + offset as u64 + 1,
            };
            let published = EventEnvelope::wrap(source, event.clone())
                .into_json()
                .map_err(|e| e.to_string())
                .and_then(|envelope| self.bus.publish(envelope).map_err(|e| format!("{e:?}")));

            if let Err(error) = published {
                tracing::error!(
                    transfer_id = %transfer.id_typed(),
                    event_type = event.event_type(),
                    %error,
                    "failed to publish transfer event"
                );
            }
        }
    }
}

fn apply_all(transfer: &mut StockTransfer, events: &[TransferEvent]) {
    for event in events {
        transfer.apply(event);
    }
}
