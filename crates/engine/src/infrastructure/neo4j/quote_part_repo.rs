//! Neo4j quote-part repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Node, Query, Row};
use quoteforge_domain::*;
use std::sync::Arc;

use super::helpers::{bind_conversion_state, read_conversion_state, NodeExt};
use crate::infrastructure::ports::{ClockPort, QuotePartRepo, RepoError};

pub struct Neo4jQuotePartRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jQuotePartRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }
}

/// Convert a row holding a `p:QuotePart` node. Shared with the quote repo's
/// part listing.
pub(super) fn row_to_quote_part(row: Row, fallback: DateTime<Utc>) -> Result<QuotePart, RepoError> {
    let node: Node = row
        .get("p")
        .map_err(|e| RepoError::database("query", e))?;

    let name = PartName::new(node.get_string_strict("name")?)?;
    Ok(QuotePart::reconstruct(
        QuotePartId::from_uuid(node.get_uuid("id")?),
        QuoteId::from_uuid(node.get_uuid("quote_id")?),
        name,
        node.get_optional_string("source_file_key"),
        node.get_optional_string("source_file_name"),
        node.get_optional_string("thumbnail_key"),
        read_conversion_state(&node)?,
        node.get_datetime_or("created_at", fallback),
        node.get_datetime_or("updated_at", fallback),
    ))
}

/// The SET clause used wherever a quote part is written in full.
pub(super) fn bind_quote_part(q: Query, part: &QuotePart) -> Query {
    let q = q
        .param("id", part.id().to_string())
        .param("quote_id", part.quote_id().to_string())
        .param("name", part.name().as_str())
        .param("source_file_key", part.source_file_key().unwrap_or_default())
        .param(
            "source_file_name",
            part.source_file_name().unwrap_or_default(),
        )
        .param("thumbnail_key", part.thumbnail_key().unwrap_or_default())
        .param("created_at", part.created_at().to_rfc3339())
        .param("updated_at", part.updated_at().to_rfc3339());
    bind_conversion_state(q, part.conversion())
}

pub(super) const QUOTE_PART_SET_CLAUSE: &str = "SET p.quote_id = $quote_id,
        p.name = $name,
        p.source_file_key = $source_file_key,
        p.source_file_name = $source_file_name,
        p.thumbnail_key = $thumbnail_key,
        p.conversion_status = $conversion_status,
        p.conversion_job_id = $conversion_job_id,
        p.conversion_error = $conversion_error,
        p.mesh_file_key = $mesh_file_key,
        p.conversion_started_at = $conversion_started_at,
        p.conversion_completed_at = $conversion_completed_at,
        p.created_at = $created_at,
        p.updated_at = $updated_at";

#[async_trait]
impl QuotePartRepo for Neo4jQuotePartRepo {
    async fn get(&self, id: QuotePartId) -> Result<Option<QuotePart>, RepoError> {
        let q = query("MATCH (p:QuotePart {id: $id}) RETURN p").param("id", id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        match result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            Some(row) => Ok(Some(row_to_quote_part(row, self.clock.now())?)),
            None => Ok(None),
        }
    }

    async fn save(&self, part: &QuotePart) -> Result<(), RepoError> {
        let cypher = format!(
            "MATCH (q:Quote {{id: $quote_id}})
            MERGE (p:QuotePart {{id: $id}})
            MERGE (q)-[:HAS_PART]->(p)
            {QUOTE_PART_SET_CLAUSE}"
        );
        let q = bind_quote_part(query(&cypher), part);

        self.graph
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        Ok(())
    }

    async fn delete(&self, id: QuotePartId) -> Result<(), RepoError> {
        let q = query("MATCH (p:QuotePart {id: $id}) DETACH DELETE p")
            .param("id", id.to_string());

        self.graph
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        Ok(())
    }
}
