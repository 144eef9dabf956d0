//! Neo4j implementation of the quote-conversion unit of work.
//!
//! All writes of the quote-to-order conversion run inside one explicit
//! Neo4j transaction, so a failure at any step leaves nothing behind. The
//! quote claim is a conditional SET whose matched-row count distinguishes
//! "claimed" from "someone else got there first".

use async_trait::async_trait;
use neo4rs::{query, Graph, Txn};
use quoteforge_domain::*;
use std::sync::Arc;

use super::cad_version_repo::{bind_cad_version, CAD_VERSION_CREATE};
use super::part_repo::{bind_part, PART_SET_CLAUSE};
use crate::infrastructure::ports::{
    ClockPort, ConversionTxn, ConversionUowPort, PartFileRefs, RepoError,
};

pub struct Neo4jConversionUow {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jConversionUow {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }
}

#[async_trait]
impl ConversionUowPort for Neo4jConversionUow {
    async fn begin(&self) -> Result<Box<dyn ConversionTxn>, RepoError> {
        let txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| RepoError::database("begin", e))?;
        Ok(Box::new(Neo4jConversionTxn {
            txn: Some(txn),
            clock: self.clock.clone(),
        }))
    }
}

pub struct Neo4jConversionTxn {
    /// `None` after commit/rollback; neo4rs consumes the txn on both.
    txn: Option<Txn>,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jConversionTxn {
    fn txn(&mut self) -> Result<&mut Txn, RepoError> {
        self.txn
            .as_mut()
            .ok_or_else(|| RepoError::database("txn", "transaction already finished"))
    }

    /// Run a statement and return the value of its single `n` column.
    async fn run_counting(&mut self, q: neo4rs::Query) -> Result<i64, RepoError> {
        let txn = self.txn()?;
        let mut result = txn
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        let row = result
            .next(txn.handle())
            .await
            .map_err(|e| RepoError::database("query", e))?;
        match row {
            Some(row) => row.get("n").map_err(|e| RepoError::database("query", e)),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl ConversionTxn for Neo4jConversionTxn {
    async fn insert_order(&mut self, order: &Order) -> Result<(), RepoError> {
        let q = query(
            "CREATE (o:Order {
                id: $id,
                number: $number,
                customer_id: $customer_id,
                quote_id: $quote_id,
                status: $status,
                total_cents: $total_cents,
                created_at: $created_at
            })",
        )
        .param("id", order.id().to_string())
        .param("number", order.number())
        .param("customer_id", order.customer_id().to_string())
        .param(
            "quote_id",
            order.quote_id().map(|id| id.to_string()).unwrap_or_default(),
        )
        .param("status", order.status().as_str())
        .param("total_cents", order.total_cents())
        .param("created_at", order.created_at().to_rfc3339());

        self.txn()?
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))
    }

    async fn claim_quote(
        &mut self,
        quote_id: QuoteId,
        order_id: OrderId,
    ) -> Result<bool, RepoError> {
        // Single compare-and-swap statement; zero matched rows means a
        // concurrent request already converted this quote.
        let now = self.clock.now().to_rfc3339();
        let q = query(
            "MATCH (q:Quote {id: $quote_id})
            WHERE q.converted_to_order_id IS NULL
            SET q.converted_to_order_id = $order_id,
                q.updated_at = $now
            WITH q
            MATCH (o:Order {id: $order_id})
            MERGE (q)-[:CONVERTED_TO]->(o)
            RETURN count(q) AS n",
        )
        .param("quote_id", quote_id.to_string())
        .param("order_id", order_id.to_string())
        .param("now", now);

        Ok(self.run_counting(q).await? > 0)
    }

    async fn insert_part(&mut self, part: &Part) -> Result<(), RepoError> {
        let cypher = format!(
            "CREATE (p:Part {{id: $id}})
            WITH p
            {PART_SET_CLAUSE}
            WITH p
            OPTIONAL MATCH (o:Order {{id: $order_id}})
            FOREACH (_ IN CASE WHEN o IS NULL THEN [] ELSE [1] END |
                MERGE (o)-[:HAS_PART]->(p))"
        );
        let q = bind_part(query(&cypher), part);

        self.txn()?
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))
    }

    async fn update_part_files(
        &mut self,
        part_id: PartId,
        refs: &PartFileRefs,
    ) -> Result<(), RepoError> {
        let now = self.clock.now().to_rfc3339();
        let q = query(
            "MATCH (p:Part {id: $id})
            SET p.source_file_key = $source_file_key,
                p.source_file_name = $source_file_name,
                p.mesh_file_key = $mesh_file_key,
                p.thumbnail_key = $thumbnail_key,
                p.updated_at = $now
            RETURN count(p) AS n",
        )
        .param("id", part_id.to_string())
        .param(
            "source_file_key",
            refs.source_file_key.clone().unwrap_or_default(),
        )
        .param(
            "source_file_name",
            refs.source_file_name.clone().unwrap_or_default(),
        )
        .param(
            "mesh_file_key",
            refs.mesh_file_key.clone().unwrap_or_default(),
        )
        .param(
            "thumbnail_key",
            refs.thumbnail_key.clone().unwrap_or_default(),
        )
        .param("now", now);

        if self.run_counting(q).await? == 0 {
            return Err(RepoError::not_found("Part", part_id));
        }
        Ok(())
    }

    async fn insert_order_line_item(&mut self, item: &OrderLineItem) -> Result<(), RepoError> {
        let q = query(
            "MATCH (o:Order {id: $order_id})
            CREATE (o)-[:HAS_LINE_ITEM]->(li:OrderLineItem {
                id: $id,
                order_id: $order_id,
                part_id: $part_id,
                description: $description,
                quantity: $quantity,
                unit_price_cents: $unit_price_cents
            })
            WITH li
            OPTIONAL MATCH (p:Part {id: $part_id})
            FOREACH (_ IN CASE WHEN p IS NULL THEN [] ELSE [1] END |
                MERGE (li)-[:PRICES]->(p))",
        )
        .param("id", item.id.to_string())
        .param("order_id", item.order_id.to_string())
        .param(
            "part_id",
            item.part_id.map(|id| id.to_string()).unwrap_or_default(),
        )
        .param("description", item.description.as_str())
        .param("quantity", i64::from(item.quantity))
        .param("unit_price_cents", item.unit_price_cents);

        self.txn()?
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))
    }

    async fn insert_cad_version(&mut self, version: &CadVersion) -> Result<(), RepoError> {
        let q = bind_cad_version(query(CAD_VERSION_CREATE), version);
        self.txn()?
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))
    }

    async fn copy_attachments(
        &mut self,
        quote_id: QuoteId,
        order_id: OrderId,
    ) -> Result<u32, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $quote_id})-[:HAS_ATTACHMENT]->(a:Attachment)
            MATCH (o:Order {id: $order_id})
            CREATE (o)-[:HAS_ATTACHMENT]->(b:Attachment)
            SET b = properties(a), b.id = randomUUID()
            RETURN count(b) AS n",
        )
        .param("quote_id", quote_id.to_string())
        .param("order_id", order_id.to_string());

        let n = self.run_counting(q).await?;
        Ok(u32::try_from(n).unwrap_or(0))
    }

    async fn copy_notes(
        &mut self,
        quote_id: QuoteId,
        order_id: OrderId,
    ) -> Result<u32, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $quote_id})-[:HAS_NOTE]->(note:Note)
            WHERE coalesce(note.archived, false) = false
            MATCH (o:Order {id: $order_id})
            CREATE (o)-[:HAS_NOTE]->(copy:Note)
            SET copy = properties(note), copy.id = randomUUID()
            RETURN count(copy) AS n",
        )
        .param("quote_id", quote_id.to_string())
        .param("order_id", order_id.to_string());

        let n = self.run_counting(q).await?;
        Ok(u32::try_from(n).unwrap_or(0))
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| RepoError::database("txn", "transaction already finished"))?;
        txn.commit()
            .await
            .map_err(|e| RepoError::database("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        let txn = self
            .txn
            .take()
            .ok_or_else(|| RepoError::database("txn", "transaction already finished"))?;
        txn.rollback()
            .await
            .map_err(|e| RepoError::database("rollback", e))
    }
}
