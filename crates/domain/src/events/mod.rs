//! Domain Events
//!
//! Coarse-grained events for significant state changes. They are published
//! post-commit, best-effort, and consumed by the audit trail; business
//! correctness never depends on one being delivered.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::EntityKind;
use crate::{OrderId, QuoteId};

/// Domain event for significant state changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainEvent {
    // CAD conversion pipeline
    ConversionQueued {
        entity_kind: EntityKind,
        entity_id: Uuid,
        job_id: Option<String>,
    },
    ConversionCompleted {
        entity_kind: EntityKind,
        entity_id: Uuid,
        mesh_file_key: String,
    },
    ConversionFailed {
        entity_kind: EntityKind,
        entity_id: Uuid,
        error: String,
    },
    ConversionSkipped {
        entity_kind: EntityKind,
        entity_id: Uuid,
        reason: String,
    },

    // Quote-to-order conversion
    QuoteConverted {
        quote_id: QuoteId,
        order_id: OrderId,
        part_count: u32,
    },
    OrderCreated {
        order_id: OrderId,
        order_number: String,
        total_cents: i64,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversionQueued { .. } => "conversion_queued",
            Self::ConversionCompleted { .. } => "conversion_completed",
            Self::ConversionFailed { .. } => "conversion_failed",
            Self::ConversionSkipped { .. } => "conversion_skipped",
            Self::QuoteConverted { .. } => "quote_converted",
            Self::OrderCreated { .. } => "order_created",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_stable() {
        let event = DomainEvent::QuoteConverted {
            quote_id: QuoteId::new(),
            order_id: OrderId::new(),
            part_count: 2,
        };
        assert_eq!(event.event_type(), "quote_converted");
    }
}
