//! QuoteForge Engine library.
//!
//! This crate contains all server-side code for the quoting back office
//! core: the CAD-to-mesh conversion pipeline and the quote-to-order
//! conversion transaction.
//!
//! ## Structure
//!
//! - `use_cases/` - User story orchestration over port traits
//! - `infrastructure/` - Port traits + adapters (Neo4j, SQLite settings,
//!   filesystem object store, conversion-service client)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
