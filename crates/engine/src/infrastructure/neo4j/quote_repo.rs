//! Neo4j quote repository.
//!
//! Graph layout: `(Quote)-[:HAS_PART]->(QuotePart)` and
//! `(Quote)-[:HAS_LINE_ITEM]->(QuoteLineItem)`; a line item priced off a
//! part also carries `(QuoteLineItem)-[:PRICES]->(QuotePart)`.

use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Row};
use quoteforge_domain::*;
use std::sync::Arc;

use super::helpers::{parse_stored, NodeExt};
use super::quote_part_repo::row_to_quote_part;
use crate::infrastructure::ports::{ClockPort, QuoteRepo, RepoError};

pub struct Neo4jQuoteRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jQuoteRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }

    fn row_to_quote(&self, row: Row) -> Result<Quote, RepoError> {
        let node: Node = row
            .get("q")
            .map_err(|e| RepoError::database("query", e))?;

        let status_str = node.get_string_strict("status")?;
        let converted = node
            .get_optional_string("converted_to_order_id")
            .map(|s| {
                uuid::Uuid::parse_str(&s)
                    .map(OrderId::from_uuid)
                    .map_err(|e| RepoError::database("parse", e))
            })
            .transpose()?;

        let fallback = self.clock.now();
        Ok(Quote::reconstruct(
            QuoteId::from_uuid(node.get_uuid("id")?),
            CustomerId::from_uuid(node.get_uuid("customer_id")?),
            node.get_string_strict("number")?,
            parse_stored("status", &status_str)?,
            converted,
            node.get_datetime_or("created_at", fallback),
            node.get_datetime_or("updated_at", fallback),
        ))
    }

    fn row_to_line_item(row: Row) -> Result<QuoteLineItem, RepoError> {
        let node: Node = row
            .get("li")
            .map_err(|e| RepoError::database("query", e))?;

        let quote_part_id = node
            .get_optional_string("quote_part_id")
            .map(|s| {
                uuid::Uuid::parse_str(&s)
                    .map(QuotePartId::from_uuid)
                    .map_err(|e| RepoError::database("parse", e))
            })
            .transpose()?;

        let quantity = node.get_i64_or("quantity", 0);
        Ok(QuoteLineItem {
            id: QuoteLineItemId::from_uuid(node.get_uuid("id")?),
            quote_id: QuoteId::from_uuid(node.get_uuid("quote_id")?),
            quote_part_id,
            description: node.get_string_strict("description")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| RepoError::database("parse", "negative quantity"))?,
            unit_price_cents: node.get_i64_or("unit_price_cents", 0),
        })
    }
}

#[async_trait]
impl QuoteRepo for Neo4jQuoteRepo {
    async fn get(&self, id: QuoteId) -> Result<Option<Quote>, RepoError> {
        let q = query("MATCH (q:Quote {id: $id}) RETURN q").param("id", id.to_string());

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
            Some(row) => Ok(Some(self.row_to_quote(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, quote: &Quote) -> Result<(), RepoError> {
        // converted_to_order_id is deliberately absent: the only writer of
        // that property is the conversion transaction's conditional claim.
        let q = query(
            "MERGE (q:Quote {id: $id})
            SET q.customer_id = $customer_id,
                q.number = $number,
                q.status = $status,
                q.created_at = $created_at,
                q.updated_at = $updated_at",
        )
        .param("id", quote.id().to_string())
        .param("customer_id", quote.customer_id().to_string())
        .param("number", quote.number())
        .param("status", quote.status().as_str())
        .param("created_at", quote.created_at().to_rfc3339())
        .param("updated_at", quote.updated_at().to_rfc3339());

        self.graph
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        Ok(())
    }

    async fn list_line_items(&self, id: QuoteId) -> Result<Vec<QuoteLineItem>, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $id})-[:HAS_LINE_ITEM]->(li:QuoteLineItem)
            RETURN li
            ORDER BY li.position, li.id",
        )
        .param("id", id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let mut items = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            items.push(Self::row_to_line_item(row)?);
        }
        Ok(items)
    }

    async fn list_parts(&self, id: QuoteId) -> Result<Vec<QuotePart>, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $id})-[:HAS_PART]->(p:QuotePart)
            RETURN p
            ORDER BY p.created_at",
        )
        .param("id", id.to_string());

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
            parts.push(row_to_quote_part(row, fallback)?);
        }
        Ok(parts)
    }
}
