//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Database access (could swap Neo4j -> Postgres)
//! - The external conversion service (vendor could change)
//! - Object storage (filesystem today, S3-compatible tomorrow)
//! - Clock/Random (for testing)

mod error;
mod external;
mod repos;
mod testing;
pub mod types;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{
    AttachmentRepo, CadVersionRepo, ConversionTxn, ConversionUowPort, ConvertibleRepo, NoteRepo,
    OrderRepo, PartRepo, QuotePartRepo, QuoteRepo, SettingsRepo,
};

// =============================================================================
// Shared Port Types
// =============================================================================
pub use types::{ConvertibleRecord, PartFileRefs};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ConversionOptions, ConversionServicePort, ConvertedFile, EventBusPort, JobStatus,
    ObjectStorePort,
};

// =============================================================================
// Test-Only Mocks (generated by mockall, only in test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockConversionServicePort, MockEventBusPort, MockObjectStorePort};
#[cfg(test)]
pub use repos::{
    MockAttachmentRepo, MockCadVersionRepo, MockConversionTxn, MockConversionUowPort,
    MockConvertibleRepo, MockNoteRepo, MockOrderRepo, MockPartRepo, MockQuotePartRepo,
    MockQuoteRepo, MockSettingsRepo,
};
#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{ConversionServiceError, EventBusError, ObjectStoreError, RepoError};
