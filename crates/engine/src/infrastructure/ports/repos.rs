//! Repository port traits for database access.

use async_trait::async_trait;
use quoteforge_domain::*;
use uuid::Uuid;

use super::error::RepoError;
use super::types::{ConvertibleRecord, PartFileRefs};
use crate::infrastructure::app_settings::AppSettings;

// =============================================================================
// Settings Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Current settings, or `None` before first save (callers apply defaults).
    async fn get(&self) -> Result<Option<AppSettings>, RepoError>;
    async fn save(&self, settings: &AppSettings) -> Result<(), RepoError>;
}

// =============================================================================
// Database Ports (one per aggregate)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteRepo: Send + Sync {
    async fn get(&self, id: QuoteId) -> Result<Option<Quote>, RepoError>;
    async fn save(&self, quote: &Quote) -> Result<(), RepoError>;

    async fn list_line_items(&self, id: QuoteId) -> Result<Vec<QuoteLineItem>, RepoError>;
    async fn list_parts(&self, id: QuoteId) -> Result<Vec<QuotePart>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotePartRepo: Send + Sync {
    async fn get(&self, id: QuotePartId) -> Result<Option<QuotePart>, RepoError>;
    async fn save(&self, part: &QuotePart) -> Result<(), RepoError>;
    async fn delete(&self, id: QuotePartId) -> Result<(), RepoError>;
}

/// Parts are created only inside the conversion transaction; this port
/// reads them back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PartRepo: Send + Sync {
    async fn get(&self, id: PartId) -> Result<Option<Part>, RepoError>;
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Part>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepo: Send + Sync {
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepoError>;
    async fn list_line_items(&self, id: OrderId) -> Result<Vec<OrderLineItem>, RepoError>;

    /// Order-number collision check for the reservation loop.
    async fn number_exists(&self, number: &str) -> Result<bool, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CadVersionRepo: Send + Sync {
    /// All versions for one entity, ascending by version number.
    async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<CadVersion>, RepoError>;

    /// Highest version number on the entity, if any.
    async fn latest_version(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<u32>, RepoError>;

    /// Append a new version row.
    async fn append(&self, version: &CadVersion) -> Result<(), RepoError>;

    /// Move the `is_current` flag to the given version as one atomic
    /// unset-all-then-set-one statement.
    async fn set_current(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        version: u32,
    ) -> Result<(), RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttachmentRepo: Send + Sync {
    async fn list_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Attachment>, RepoError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoteRepo: Send + Sync {
    async fn list_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Note>, RepoError>;
}

// =============================================================================
// Conversion State Store
// =============================================================================

/// The conversion-state capability of one entity kind.
///
/// Parts and quote parts persist an identical conversion-state shape; this
/// trait is what lets a single orchestrator drive both. Implementations
/// are wired once per kind (entity-kind specifics stay confined to key
/// prefixes and repository wiring).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConvertibleRepo: Send + Sync {
    /// Which kind this repository serves; selects the storage namespace.
    fn entity_kind(&self) -> EntityKind;

    async fn get(&self, id: Uuid) -> Result<Option<ConvertibleRecord>, RepoError>;

    /// Persist the conversion state (including any mesh reference it holds).
    async fn save_state(&self, id: Uuid, state: &ConversionState) -> Result<(), RepoError>;

    /// Point the entity at a different source file (replacement or version
    /// restore). Conversion state is reset separately via `save_state`.
    async fn set_source_file(
        &self,
        id: Uuid,
        file_key: &str,
        file_name: &str,
    ) -> Result<(), RepoError>;
}

// =============================================================================
// Quote Conversion Unit of Work
// =============================================================================

/// Factory for the atomic quote-to-order conversion transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversionUowPort: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ConversionTxn>, RepoError>;
}

/// One open quote-conversion transaction.
///
/// Every mutation of the conversion lands through this trait so that a
/// failure at any step rolls the whole unit back. Dropping the transaction
/// without `commit` must roll back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversionTxn: Send {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepoError>;

    /// The conditional claim: set `converted_to_order_id = order_id` where
    /// it is still null. Returns `false` when zero rows matched, i.e. a
    /// concurrent request already converted the quote. This is the sole
    /// concurrency-safety mechanism for conversion; it must stay a single
    /// storage-level compare-and-swap.
    async fn claim_quote(
        &mut self,
        quote_id: QuoteId,
        order_id: OrderId,
    ) -> Result<bool, RepoError>;

    async fn insert_part(&mut self, part: &Part) -> Result<(), RepoError>;

    async fn update_part_files(
        &mut self,
        part_id: PartId,
        refs: &PartFileRefs,
    ) -> Result<(), RepoError>;

    async fn insert_order_line_item(&mut self, item: &OrderLineItem) -> Result<(), RepoError>;

    async fn insert_cad_version(&mut self, version: &CadVersion) -> Result<(), RepoError>;

    /// Duplicate quote attachments onto the order; returns how many.
    async fn copy_attachments(
        &mut self,
        quote_id: QuoteId,
        order_id: OrderId,
    ) -> Result<u32, RepoError>;

    /// Duplicate non-archived quote notes onto the order; returns how many.
    async fn copy_notes(&mut self, quote_id: QuoteId, order_id: OrderId)
        -> Result<u32, RepoError>;

    async fn commit(&mut self) -> Result<(), RepoError>;

    async fn rollback(&mut self) -> Result<(), RepoError>;
}
