use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockflow_core::{AggregateId, CompanyId, TenantId};

use crate::Event;

/// Envelope for a published event, carrying tenancy + aggregate metadata.
///
/// Notes:
/// - **Multi-tenancy** is carried on the envelope (`tenant_id`, `company_id`)
///   so consumers can filter without decoding the payload.
/// - `sequence_number` is the aggregate version right after the event was
///   applied; it increases monotonically per aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    company_id: CompanyId,

    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub tenant_id: TenantId,
    pub company_id: CompanyId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: &'static str,
    pub sequence_number: u64,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event; event type and time are taken from the event itself.
    pub fn wrap(source: EventSource, event: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id: source.tenant_id,
            company_id: source.company_id,
            aggregate_id: source.aggregate_id,
            aggregate_type: source.aggregate_type.to_string(),
            sequence_number: source.sequence_number,
            event_type: event.event_type().to_string(),
            occurred_at: event.occurred_at(),
            payload: event,
        }
    }
}

impl<E: Serialize> EventEnvelope<E> {
    /// Re-encode the payload as JSON for transport-agnostic buses.
    pub fn into_json(self) -> Result<EventEnvelope<JsonValue>, serde_json::Error> {
        let payload = serde_json::to_value(&self.payload)?;
        Ok(EventEnvelope {
            event_id: self.event_id,
            tenant_id: self.tenant_id,
            company_id: self.company_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            payload,
        })
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
