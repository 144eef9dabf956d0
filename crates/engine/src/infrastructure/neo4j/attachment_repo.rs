//! Neo4j attachment and note repositories.
//!
//! CRUD for attachments and notes lives in the surrounding application;
//! this core only reads them off quotes (for validation/reporting) and
//! duplicates them onto orders inside the conversion transaction.

use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Row};
use quoteforge_domain::*;
use std::sync::Arc;

use super::helpers::NodeExt;
use crate::infrastructure::ports::{AttachmentRepo, ClockPort, NoteRepo, RepoError};

pub struct Neo4jAttachmentRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jAttachmentRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }
}

#[async_trait]
impl AttachmentRepo for Neo4jAttachmentRepo {
    async fn list_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Attachment>, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $id})-[:HAS_ATTACHMENT]->(a:Attachment)
            RETURN a
            ORDER BY a.uploaded_at",
        )
        .param("id", quote_id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let owner = RecordOwner::Quote(quote_id.to_uuid());
        let mut attachments = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            let node: Node = row
                .get("a")
                .map_err(|e| RepoError::database("query", e))?;
            attachments.push(Attachment {
                id: AttachmentId::from_uuid(node.get_uuid("id")?),
                owner,
                file_key: node.get_string_strict("file_key")?,
                file_name: node.get_string_strict("file_name")?,
                content_type: node
                    .get_optional_string("content_type")
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                uploaded_at: node.get_datetime_or("uploaded_at", self.clock.now()),
            });
        }
        Ok(attachments)
    }
}

pub struct Neo4jNoteRepo {
    graph: Graph,
    clock: Arc<dyn ClockPort>,
}

impl Neo4jNoteRepo {
    pub fn new(graph: Graph, clock: Arc<dyn ClockPort>) -> Self {
        Self { graph, clock }
    }

    fn row_to_note(row: Row, owner: RecordOwner, fallback: chrono::DateTime<chrono::Utc>) -> Result<Note, RepoError> {
        let node: Node = row
            .get("n")
            .map_err(|e| RepoError::database("query", e))?;
        Ok(Note {
            id: NoteId::from_uuid(node.get_uuid("id")?),
            owner,
            body: node.get_string_strict("body")?,
            author: node.get_optional_string("author").unwrap_or_default(),
            archived: node.get_bool_or("archived", false),
            created_at: node.get_datetime_or("created_at", fallback),
        })
    }
}

#[async_trait]
impl NoteRepo for Neo4jNoteRepo {
    async fn list_for_quote(&self, quote_id: QuoteId) -> Result<Vec<Note>, RepoError> {
        let q = query(
            "MATCH (q:Quote {id: $id})-[:HAS_NOTE]->(n:Note)
            RETURN n
            ORDER BY n.created_at",
        )
        .param("id", quote_id.to_string());

        let mut result = self
            .graph
            .execute(q)
            .await
            .map_err(|e| RepoError::database("query", e))?;

        let owner = RecordOwner::Quote(quote_id.to_uuid());
        let fallback = self.clock.now();
        let mut notes = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| RepoError::database("query", e))?
        {
            notes.push(Self::row_to_note(row, owner, fallback)?);
        }
        Ok(notes)
    }
}
