//! QuotePart entity - a CAD part attached to a quote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversionState, PartName};
use crate::{QuoteId, QuotePartId};

/// A part belonging to a quote under negotiation.
///
/// Quote parts are working copies: their CAD file can be replaced freely
/// while the quote is open. When the quote converts to an order, each part
/// is promoted to a permanent [`crate::entities::Part`] with its assets
/// copied into the part namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePart {
    id: QuotePartId,
    quote_id: QuoteId,
    name: PartName,
    source_file_key: Option<String>,
    source_file_name: Option<String>,
    thumbnail_key: Option<String>,
    conversion: ConversionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QuotePart {
    pub fn new(quote_id: QuoteId, name: PartName, now: DateTime<Utc>) -> Self {
        Self {
            id: QuotePartId::new(),
            quote_id,
            name,
            source_file_key: None,
            source_file_name: None,
            thumbnail_key: None,
            conversion: ConversionState::pending(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct from stored data.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: QuotePartId,
        quote_id: QuoteId,
        name: PartName,
        source_file_key: Option<String>,
        source_file_name: Option<String>,
        thumbnail_key: Option<String>,
        conversion: ConversionState,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            quote_id,
            name,
            source_file_key,
            source_file_name,
            thumbnail_key,
            conversion,
            created_at,
            updated_at,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> QuotePartId {
        self.id
    }

    pub fn quote_id(&self) -> QuoteId {
        self.quote_id
    }

    pub fn name(&self) -> &PartName {
        &self.name
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

    /// Attach or replace the source CAD file. Any previous mesh no longer
    /// matches the new geometry, so conversion resets to pending.
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

    pub fn set_thumbnail(&mut self, key: impl Into<String>, now: DateTime<Utc>) {
        self.thumbnail_key = Some(key.into());
        self.updated_at = now;
    }

    pub fn set_conversion(&mut self, state: ConversionState, now: DateTime<Utc>) {
        self.conversion = state;
        self.updated_at = now;
    }
}
