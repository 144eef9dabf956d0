//! Neo4j database implementations.

use neo4rs::Graph;
use quoteforge_domain::EntityKind;
use std::sync::Arc;

use crate::infrastructure::ports::ClockPort;

mod helpers;
mod schema;

mod attachment_repo;
mod cad_version_repo;
mod conversion_txn;
mod convertible_repo;
mod order_repo;
mod part_repo;
mod quote_part_repo;
mod quote_repo;

pub use attachment_repo::{Neo4jAttachmentRepo, Neo4jNoteRepo};
pub use cad_version_repo::Neo4jCadVersionRepo;
pub use conversion_txn::Neo4jConversionUow;
pub use convertible_repo::Neo4jConvertibleRepo;
pub use order_repo::Neo4jOrderRepo;
pub use part_repo::Neo4jPartRepo;
pub use quote_part_repo::Neo4jQuotePartRepo;
pub use quote_repo::Neo4jQuoteRepo;
pub use schema::ensure_schema;

/// Create all Neo4j repositories from a graph connection.
pub struct Neo4jRepositories {
    pub quote: Arc<Neo4jQuoteRepo>,
    pub quote_part: Arc<Neo4jQuotePartRepo>,
    pub part: Arc<Neo4jPartRepo>,
    pub order: Arc<Neo4jOrderRepo>,
    pub cad_version: Arc<Neo4jCadVersionRepo>,
    pub attachment: Arc<Neo4jAttachmentRepo>,
    pub note: Arc<Neo4jNoteRepo>,
    /// Conversion-state stores, one per entity kind.
    pub convertible_parts: Arc<Neo4jConvertibleRepo>,
    pub convertible_quote_parts: Arc<Neo4jConvertibleRepo>,
    pub conversion_uow: Arc<Neo4jConversionUow>,
}

impl Neo4jRepositories {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            quote: Arc::new(Neo4jQuoteRepo::new(graph.clone(), clock.clone())),
            quote_part: Arc::new(Neo4jQuotePartRepo::new(graph.clone(), clock.clone())),
            part: Arc::new(Neo4jPartRepo::new(graph.clone(), clock.clone())),
            order: Arc::new(Neo4jOrderRepo::new(graph.clone(), clock.clone())),
            cad_version: Arc::new(Neo4jCadVersionRepo::new(graph.clone(), clock.clone())),
            attachment: Arc::new(Neo4jAttachmentRepo::new(graph.clone(), clock.clone())),
            note: Arc::new(Neo4jNoteRepo::new(graph.clone(), clock.clone())),
            convertible_parts: Arc::new(Neo4jConvertibleRepo::new(
                graph.clone(),
                EntityKind::Part,
                clock.clone(),
            )),
            convertible_quote_parts: Arc::new(Neo4jConvertibleRepo::new(
                graph.clone(),
                EntityKind::QuotePart,
                clock.clone(),
            )),
            conversion_uow: Arc::new(Neo4jConversionUow::new(graph, clock)),
        }
    }
}
