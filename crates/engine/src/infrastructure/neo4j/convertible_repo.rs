//! Neo4j conversion-state store.
//!
//! One struct serves both entity kinds; the kind picks the node label at
//! construction time. This is the projection the conversion pipeline runs
//! against, so it reads and writes only the conversion-relevant properties
//! of a part node.

use async_trait::async_trait;
use neo4rs::{query, Graph, Node};
use quoteforge_domain::{ConversionState, EntityKind};
use uuid::Uuid;

use super::helpers::{bind_conversion_state, read_conversion_state, NodeExt};
use crate::infrastructure::ports::{ClockPort, ConvertibleRecord, ConvertibleRepo, RepoError};
use std::sync::Arc;

pub struct Neo4jConvertibleRepo {
    graph: Graph,
    kind: EntityKind,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jConvertibleRepo {
    pub fn new(graph: Graph, kind: EntityKind, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, kind, clock }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            EntityKind::Part => "Part",
            EntityKind::QuotePart => "QuotePart",
        }
    }
}

#[async_trait]
impl ConvertibleRepo for Neo4jConvertibleRepo {
    fn entity_kind(&self) -> EntityKind {
        self.kind
    }

    async fn get(&self, id: Uuid) -> Result<Option<ConvertibleRecord>, RepoError> {
        let cypher = format!("MATCH (p:{} {{id: $id}}) RETURN p", self.label());
        let q = query(&cypher).param("id", id.to_string());

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
            Some(row) => {
                let node: Node = row
                    .get("p")
                    .map_err(|e| RepoError::database("query", e))?;
                Ok(Some(ConvertibleRecord {
                    id: node.get_uuid("id")?,
                    kind: self.kind,
                    source_file_key: node.get_optional_string("source_file_key"),
                    source_file_name: node.get_optional_string("source_file_name"),
                    conversion: read_conversion_state(&node)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_state(&self, id: Uuid, state: &ConversionState) -> Result<(), RepoError> {
        let cypher = format!(
            "MATCH (p:{} {{id: $id}})
            SET p.conversion_status = $conversion_status,
                p.conversion_job_id = $conversion_job_id,
                p.conversion_error = $conversion_error,
                p.mesh_file_key = $mesh_file_key,
                p.conversion_started_at = $conversion_started_at,
                p.conversion_completed_at = $conversion_completed_at
            RETURN count(p) AS n",
            self.label()
        );
        let q = bind_conversion_state(query(&cypher).param("id", id.to_string()), state);

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let matched: i64 = match result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            Some(row) => row.get("n").map_err(|e| RepoError::database("query", e))?,
            None => 0,
        };
        if matched == 0 {
            return Err(RepoError::not_found(self.label(), id));
        }
        Ok(())
    }

    async fn set_source_file(
        &self,
        id: Uuid,
        file_key: &str,
        file_name: &str,
    ) -> Result<(), RepoError> {
        let cypher = format!(
            "MATCH (p:{} {{id: $id}})
            SET p.source_file_key = $file_key,
                p.source_file_name = $file_name,
                p.updated_at = $now
            RETURN count(p) AS n",
            self.label()
        );
        let q = query(&cypher)
            .param("id", id.to_string())
            .param("file_key", file_key)
            .param("file_name", file_name)
            .param("now", self.clock.now().to_rfc3339());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let matched: i64 = match result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            Some(row) => row.get("n").map_err(|e| RepoError::database("query", e))?,
            None => 0,
        };
        if matched == 0 {
            return Err(RepoError::not_found(self.label(), id));
        }
        Ok(())
    }
}
