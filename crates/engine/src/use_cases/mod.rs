//! Use cases - user story orchestration.
//!
//! Each module covers one domain area. Use cases depend on port traits
//! only; wiring to concrete adapters happens in `app`.

pub mod cad;
pub mod conversion;
pub mod migration;
pub mod orders;

pub use cad::{ReplaceCadFile, RestoreCadVersion};
pub use conversion::{ConvertCadFile, FormatGuard};
pub use migration::AssetMigrator;
pub use orders::{ConvertQuoteToOrder, OrderNumberGenerator};
