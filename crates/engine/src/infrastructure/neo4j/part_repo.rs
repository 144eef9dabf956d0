//! Neo4j part repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Node, Query, Row};
use quoteforge_domain::*;
use std::sync::Arc;

use super::helpers::{bind_conversion_state, read_conversion_state, NodeExt};
use crate::infrastructure::ports::{ClockPort, PartRepo, RepoError};

pub struct Neo4jPartRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jPartRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }
}

pub(super) fn row_to_part(row: Row, fallback: DateTime<Utc>) -> Result<Part, RepoError> {
    let node: Node = row
        .get("p")
        .map_err(|e| RepoError::database("query", e))?;

    let order_id = node
        .get_optional_string("order_id")
        .map(|s| {
            uuid::Uuid::parse_str(&s)
                .map(OrderId::from_uuid)
                .map_err(|e| RepoError::database("parse", e))
        })
        .transpose()?;
    let source_quote_part_id = node
        .get_optional_string("source_quote_part_id")
        .map(|s| {
            uuid::Uuid::parse_str(&s)
                .map(QuotePartId::from_uuid)
                .map_err(|e| RepoError::database("parse", e))
        })
        .transpose()?;

    let name = PartName::new(node.get_string_strict("name")?)?;
    Ok(Part::reconstruct(
        PartId::from_uuid(node.get_uuid("id")?),
        order_id,
        name,
        source_quote_part_id,
        node.get_optional_string("source_file_key"),
        node.get_optional_string("source_file_name"),
        node.get_optional_string("thumbnail_key"),
        read_conversion_state(&node)?,
        node.get_datetime_or("created_at", fallback),
        node.get_datetime_or("updated_at", fallback),
    ))
}

pub(super) fn bind_part(q: Query, part: &Part) -> Query {
    let q = q
        .param("id", part.id().to_string())
        .param(
            "order_id",
            part.order_id().map(|id| id.to_string()).unwrap_or_default(),
        )
        .param("name", part.name().as_str())
        .param(
            "source_quote_part_id",
            part.source_quote_part_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
        )
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

pub(super) const PART_SET_CLAUSE: &str = "SET p.order_id = $order_id,
        p.name = $name,
        p.source_quote_part_id = $source_quote_part_id,
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
impl PartRepo for Neo4jPartRepo {
    async fn get(&self, id: PartId) -> Result<Option<Part>, RepoError> {
        let q = query("MATCH (p:Part {id: $id}) RETURN p").param("id", id.to_string());

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
            Some(row) => Ok(Some(row_to_part(row, self.clock.now())?)),
            None => Ok(None),
        }
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Part>, RepoError> {
        let q = query(
            "MATCH (o:Order {id: $order_id})-[:HAS_PART]->(p:Part)
            RETURN p
            ORDER BY p.created_at",
        )
        .param("order_id", order_id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let fallback = self.clock.now();
        let mut parts = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            parts.push(row_to_part(row, fallback)?);
        }
        Ok(parts)
    }
}
