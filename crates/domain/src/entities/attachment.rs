//! Attachment and note records attached to quotes and orders.
//!
//! CRUD for these lives outside this core; they appear here because the
//! quote-to-order conversion migrates them onto the new order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AttachmentId, NoteId};

/// What an attachment or note hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum RecordOwner {
    Quote(Uuid),
    Order(Uuid),
}

/// A file attached to a quote or order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub owner: RecordOwner,
    pub file_key: String,
    pub file_name: String,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A staff note on a quote or order. Archived notes do not migrate when a
/// quote converts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub owner: RecordOwner,
    pub body: String,
    pub author: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}
