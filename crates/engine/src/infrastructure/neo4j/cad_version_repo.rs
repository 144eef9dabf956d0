//! Neo4j CAD version repository.
//!
//! Version rows are append-only; the only mutation ever applied is moving
//! the `is_current` flag, which `set_current` performs as one statement so
//! no reader observes zero or two current versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Node, Query, Row};
use quoteforge_domain::*;
use std::sync::Arc;
use uuid::Uuid;

use super::helpers::{parse_stored, NodeExt};
use crate::infrastructure::ports::{CadVersionRepo, ClockPort, RepoError};

pub struct Neo4jCadVersionRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jCadVersionRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }
}

pub(super) fn row_to_cad_version(
    row: Row,
    fallback: DateTime<Utc>,
) -> Result<CadVersion, RepoError> {
    let node: Node = row
        .get("v")
        .map_err(|e| RepoError::database("query", e))?;

    let kind_str = node.get_string_strict("entity_kind")?;
    let version = node.get_i64_or("version", 0);
    Ok(CadVersion::reconstruct(
        CadVersionId::from_uuid(node.get_uuid("id")?),
        parse_stored("entity_kind", &kind_str)?,
        node.get_uuid("entity_id")?,
        u32::try_from(version).map_err(|_| RepoError::database("parse", "negative version"))?,
        node.get_string_strict("file_key")?,
        node.get_string_strict("file_name")?,
        node.get_bool_or("is_current", false),
        node.get_datetime_or("created_at", fallback),
    ))
}

pub(super) fn bind_cad_version(q: Query, version: &CadVersion) -> Query {
    q.param("id", version.id().to_string())
        .param("entity_kind", version.entity_kind().as_str())
        .param("entity_id", version.entity_id().to_string())
        .param("version", i64::from(version.version()))
        .param(
            "entity_version_key",
            format!(
                "{}:{}:{}",
                version.entity_kind().as_str(),
                version.entity_id(),
                version.version()
            ),
        )
        .param("file_key", version.file_key())
        .param("file_name", version.file_name())
        .param("is_current", version.is_current())
        .param("created_at", version.created_at().to_rfc3339())
}

pub(super) const CAD_VERSION_CREATE: &str = "CREATE (v:CadVersion {
        id: $id,
        entity_kind: $entity_kind,
        entity_id: $entity_id,
        version: $version,
        entity_version_key: $entity_version_key,
        file_key: $file_key,
        file_name: $file_name,
        is_current: $is_current,
        created_at: $created_at
    })";

#[async_trait]
impl CadVersionRepo for Neo4jCadVersionRepo {
    async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<CadVersion>, RepoError> {
        let q = query(
            "MATCH (v:CadVersion {entity_kind: $kind, entity_id: $entity_id})
            RETURN v
            ORDER BY v.version",
        )
        .param("kind", kind.as_str())
        .param("entity_id", entity_id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let fallback = self.clock.now();
        let mut versions = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            versions.push(row_to_cad_version(row, fallback)?);
        }
        Ok(versions)
    }

    async fn latest_version(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Option<u32>, RepoError> {
        let q = query(
            "MATCH (v:CadVersion {entity_kind: $kind, entity_id: $entity_id})
            RETURN max(v.version) AS latest",
        )
        .param("kind", kind.as_str())
        .param("entity_id", entity_id.to_string());

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
                let latest: Option<i64> =
                    row.get("latest").map_err(|e| RepoError::database("query", e))?;
                Ok(latest.and_then(|n| u32::try_from(n).ok()))
            }
            None => Ok(None),
        }
    }

    async fn append(&self, version: &CadVersion) -> Result<(), RepoError> {
        let q = bind_cad_version(query(CAD_VERSION_CREATE), version);

        self.graph
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        Ok(())
    }

    async fn set_current(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        version: u32,
    ) -> Result<(), RepoError> {
        // Unset-all-then-set-one in a single statement.
        let q = query(
            "MATCH (v:CadVersion {entity_kind: $kind, entity_id: $entity_id})
            SET v.is_current = (v.version = $version)",
        )
        .param("kind", kind.as_str())
        .param("entity_id", entity_id.to_string())
        .param("version", i64::from(version));

        self.graph
            .run(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;
        Ok(())
    }
}
