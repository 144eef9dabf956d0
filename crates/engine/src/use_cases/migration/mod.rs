//! Asset migration use cases.

pub mod asset_migrator;

pub use asset_migrator::{AssetMigrator, MigratedAssets};
