//! CadVersion entity - append-only CAD file revision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::EntityKind;
use crate::CadVersionId;

/// One revision of an entity's source CAD file, keyed by
/// `(entity_kind, entity_id, version)`.
///
/// Rows are never mutated after creation except for the `is_current` flag,
/// which is moved atomically (unset-all-then-set-one) on file replacement
/// or explicit restore. Exactly one version per entity is current. The row
/// references an object-store key it does not own; the object store is the
/// source of truth for the bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadVersion {
    id: CadVersionId,
    entity_kind: EntityKind,
    entity_id: Uuid,
    version: u32,
    file_key: String,
    file_name: String,
    is_current: bool,
    created_at: DateTime<Utc>,
}

impl CadVersion {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Uuid,
        version: u32,
        file_key: impl Into<String>,
        file_name: impl Into<String>,
        is_current: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CadVersionId::new(),
            entity_kind,
            entity_id,
            version,
            file_key: file_key.into(),
            file_name: file_name.into(),
            is_current,
            created_at: now,
        }
    }

    /// Reconstruct from stored data.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: CadVersionId,
        entity_kind: EntityKind,
        entity_id: Uuid,
        version: u32,
        file_key: String,
        file_name: String,
        is_current: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            entity_kind,
            entity_id,
            version,
            file_key,
            file_name,
            is_current,
            created_at,
        }
    }

    /// The same revision re-homed onto another entity, preserving version
    /// number and currency. Used when quote-part history migrates to a
    /// permanent part.
    pub fn rehomed(
        &self,
        entity_kind: EntityKind,
        entity_id: Uuid,
        file_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CadVersionId::new(),
            entity_kind,
            entity_id,
            version: self.version,
            file_key: file_key.into(),
            file_name: self.file_name.clone(),
            is_current: self.is_current,
            created_at: now,
        }
    }

    pub fn id(&self) -> CadVersionId {
        self.id
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
