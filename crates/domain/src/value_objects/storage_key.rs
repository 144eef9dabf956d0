//! Object-store key layout for convertible entities.
//!
//! Keys are derived from freshly generated entity ids, so concurrent
//! writers to the same key do not occur in practice. Layout:
//!
//! ```text
//! <kind>/<entityId>/source/<file>          current CAD file
//! <kind>/<entityId>/source/v{n}/<file>     archived revision n
//! <kind>/<entityId>/mesh/<file>            generated mesh
//! <kind>/<entityId>/thumbnails/<file>      preview renders
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The kinds of entity a CAD file can be attached to.
///
/// Both kinds share an identical conversion-state shape; the kind only
/// selects the storage namespace and the backing repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Part,
    QuotePart,
}

impl EntityKind {
    /// Storage namespace segment for this kind.
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Part => "parts",
            Self::QuotePart => "quote-parts",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Part => "part",
            Self::QuotePart => "quote_part",
        }
    }

    /// Key for the current source CAD file.
    pub fn source_key(self, entity_id: Uuid, filename: &str) -> String {
        format!("{}/{}/source/{}", self.key_prefix(), entity_id, filename)
    }

    /// Key for an archived source revision.
    pub fn versioned_source_key(self, entity_id: Uuid, version: u32, filename: &str) -> String {
        format!(
            "{}/{}/source/v{}/{}",
            self.key_prefix(),
            entity_id,
            version,
            filename
        )
    }

    /// Key for the generated mesh file.
    pub fn mesh_key(self, entity_id: Uuid, filename: &str) -> String {
        format!("{}/{}/mesh/{}", self.key_prefix(), entity_id, filename)
    }

    /// Key for a thumbnail render.
    pub fn thumbnail_key(self, entity_id: Uuid, filename: &str) -> String {
        format!("{}/{}/thumbnails/{}", self.key_prefix(), entity_id, filename)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "part" | "parts" => Ok(Self::Part),
            "quote_part" | "quote-part" | "quote-parts" => Ok(Self::QuotePart),
            other => Err(DomainError::parse(format!("Unknown entity kind: {other}"))),
        }
    }
}
