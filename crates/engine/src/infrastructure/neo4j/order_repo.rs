//! Neo4j order repository.
//!
//! Orders are inserted through the conversion transaction; this repository
//! only reads them back and serves the order-number collision check.

use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Row};
use quoteforge_domain::*;
use std::sync::Arc;

use super::helpers::{parse_stored, NodeExt};
use crate::infrastructure::ports::{ClockPort, OrderRepo, RepoError};

pub struct Neo4jOrderRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jOrderRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }

    fn row_to_order(&self, row: Row) -> Result<Order, RepoError> {
        let node: Node = row
            .get("o")
            .map_err(|e| RepoError::database("query", e))?;

        let status_str = node.get_string_strict("status")?;
        let quote_id = node
            .get_optional_string("quote_id")
            .map(|s| {
                uuid::Uuid::parse_str(&s)
                    .map(QuoteId::from_uuid)
                    .map_err(|e| RepoError::database("parse", e))
            })
            .transpose()?;

        Ok(Order::reconstruct(
            OrderId::from_uuid(node.get_uuid("id")?),
            node.get_string_strict("number")?,
            CustomerId::from_uuid(node.get_uuid("customer_id")?),
            quote_id,
            parse_stored("status", &status_str)?,
            node.get_i64_or("total_cents", 0),
            node.get_datetime_or("created_at", self.clock.now()),
        ))
    }

    fn row_to_line_item(row: Row) -> Result<OrderLineItem, RepoError> {
        let node: Node = row
            .get("li")
            .map_err(|e| RepoError::database("query", e))?;

        let part_id = node
            .get_optional_string("part_id")
            .map(|s| {
                uuid::Uuid::parse_str(&s)
                    .map(PartId::from_uuid)
                    .map_err(|e| RepoError::database("parse", e))
            })
            .transpose()?;

        let quantity = node.get_i64_or("quantity", 0);
        Ok(OrderLineItem {
            id: OrderLineItemId::from_uuid(node.get_uuid("id")?),
            order_id: OrderId::from_uuid(node.get_uuid("order_id")?),
            part_id,
            description: node.get_string_strict("description")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| RepoError::database("parse", "negative quantity"))?,
            unit_price_cents: node.get_i64_or("unit_price_cents", 0),
        })
    }
}

#[async_trait]
impl OrderRepo for Neo4jOrderRepo {
    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepoError> {
        let q = query("MATCH (o:Order {id: $id}) RETURN o").param("id", id.to_string());

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
            Some(row) => Ok(Some(self.row_to_order(row)?)),
            None => Ok(None),
        }
    }

    async fn list_line_items(&self, id: OrderId) -> Result<Vec<OrderLineItem>, RepoError> {
        let q = query(
            "MATCH (o:Order {id: $id})-[:HAS_LINE_ITEM]->(li:OrderLineItem)
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

    async fn number_exists(&self, number: &str) -> Result<bool, RepoError> {
        let q = query("MATCH (o:Order {number: $number}) RETURN count(o) AS n")
            .param("number", number);

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let count: i64 = match result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            Some(row) => row.get("n").map_err(|e| RepoError::database("query", e))?,
            None => 0,
        };
        Ok(count > 0)
    }
}
