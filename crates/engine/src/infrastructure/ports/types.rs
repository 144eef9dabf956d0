//! Data types shared across port boundaries.

use quoteforge_domain::{ConversionState, EntityKind};
use uuid::Uuid;

/// Snapshot of a convertible entity as seen by the conversion pipeline.
///
/// Both entity kinds (part, quote part) project onto this one shape; the
/// pipeline never needs the rest of the row.
#[derive(Debug, Clone)]
pub struct ConvertibleRecord {
    pub id: Uuid,
    pub kind: EntityKind,
    pub source_file_key: Option<String>,
    pub source_file_name: Option<String>,
    pub conversion: ConversionState,
}

impl ConvertibleRecord {
    /// The filename used for classification and job submission: the stored
    /// original name, falling back to the last key segment.
    pub fn effective_file_name(&self) -> Option<String> {
        if let Some(name) = &self.source_file_name {
            return Some(name.clone());
        }
        self.source_file_key
            .as_deref()
            .and_then(|key| key.rsplit('/').next())
            .map(|s| s.to_string())
    }
}

/// File references written back onto a part after asset migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartFileRefs {
    pub source_file_key: Option<String>,
    pub source_file_name: Option<String>,
    pub mesh_file_key: Option<String>,
    pub thumbnail_key: Option<String>,
}
