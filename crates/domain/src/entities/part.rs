//! Part entity - a permanent part record owned by an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversionState, PartName};
use crate::{OrderId, PartId, QuotePartId};

/// A permanent part. Created either directly (outside this core) or by
/// promoting a quote part during quote-to-order conversion, in which case
/// `source_quote_part_id` records provenance and the file keys point into
/// the part namespace (or, after a degraded migration, back into the
/// originating quote-part namespace).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    id: PartId,
    order_id: Option<OrderId>,
    name: PartName,
    source_quote_part_id: Option<QuotePartId>,
    source_file_key: Option<String>,
    source_file_name: Option<String>,
    thumbnail_key: Option<String>,
    conversion: ConversionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Part {
    pub fn new(name: PartName, order_id: Option<OrderId>, now: DateTime<Utc>) -> Self {
        Self {
            id: PartId::new(),
            order_id,
            name,
            source_quote_part_id: None,
            source_file_key: None,
            source_file_name: None,
            thumbnail_key: None,
            conversion: ConversionState::pending(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A part promoted from a quote part. File keys are filled in after
    /// asset migration; the conversion state carries over so a completed
    /// mesh stays completed and a failed one stays visible.
    pub fn promoted_from(
        name: PartName,
        order_id: OrderId,
        quote_part_id: QuotePartId,
        conversion: ConversionState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PartId::new(),
            order_id: Some(order_id),
            name,
            source_quote_part_id: Some(quote_part_id),
            source_file_key: None,
            source_file_name: None,
            thumbnail_key: None,
            conversion,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct from stored data.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: PartId,
        order_id: Option<OrderId>,
        name: PartName,
        source_quote_part_id: Option<QuotePartId>,
        source_file_key: Option<String>,
        source_file_name: Option<String>,
        thumbnail_key: Option<String>,
        conversion: ConversionState,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            name,
            source_quote_part_id,
            source_file_key,
            source_file_name,
            thumbnail_key,
            conversion,
            created_at,
            updated_at,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn name(&self) -> &PartName {
        &self.name
    }

    pub fn source_quote_part_id(&self) -> Option<QuotePartId> {
        self.source_quote_part_id
    }

    pub fn source_file_key(&self) -> Option<&str> {
        self.source_file_key.as_deref()
    }

    pub fn source_file_name(&self) -> Option<&str> {
        self.source_file_name.as_deref()
    }

    pub fn thumbnail_key(&self) -> Option<&str> {
        self.thumbnail_key.as_deref()
    }

    pub fn conversion(&self) -> &ConversionState {
        &self.conversion
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // --- Mutations ---

    /// Attach or replace the source CAD file; discards any existing mesh.
    pub fn replace_source_file(
        &mut self,
        file_key: impl Into<String>,
        file_name: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.source_file_key = Some(file_key.into());
        self.source_file_name = Some(file_name.into());
        self.conversion = ConversionState::pending();
        self.updated_at = now;
    }

    /// Point file references at migrated objects. Used once, right after
    /// asset migration during quote conversion.
    pub fn set_file_refs(
        &mut self,
        source_file_key: Option<String>,
        source_file_name: Option<String>,
        thumbnail_key: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.source_file_key = source_file_key;
        self.source_file_name = source_file_name;
        self.thumbnail_key = thumbnail_key;
        self.updated_at = now;
    }

    pub fn set_conversion(&mut self, state: ConversionState, now: DateTime<Utc>) {
        self.conversion = state;
        self.updated_at = now;
    }
}
