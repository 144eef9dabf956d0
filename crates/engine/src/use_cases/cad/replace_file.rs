//! Source CAD file replacement.
//!
//! Every replacement appends a CadVersion revision, moves the current
//! flag, and resets conversion to pending - a replaced file always
//! discards any existing mesh, whether or not the new file needs
//! conversion. Files that don't need conversion are marked skipped here so
//! the pipeline never sees them.

use std::sync::Arc;

use quoteforge_domain::{CadFormat, CadVersion, ConversionState, EntityKind, SkipReason};
use uuid::Uuid;

use crate::infrastructure::ports::{
    CadVersionRepo, ClockPort, ConvertibleRepo, ObjectStoreError, ObjectStorePort, RepoError,
};
use crate::use_cases::conversion::FormatGuard;

#[derive(Debug, thiserror::Error)]
pub enum CadFileError {
    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: EntityKind, id: Uuid },

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Uploaded filename is empty")]
    MissingFilename,

    #[error("Version {version} does not exist for this entity")]
    VersionNotFound { version: u32 },

    #[error("Failed to store file: {0}")]
    Store(#[from] ObjectStoreError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Result of a replacement, telling the caller whether to run conversion.
#[derive(Debug, Clone)]
pub struct ReplacedCadFile {
    pub version: u32,
    pub file_key: String,
    pub format: CadFormat,
    /// True when the new file is solid-body CAD; the caller should invoke
    /// the conversion pipeline next. False means the state was already
    /// marked skipped.
    pub conversion_required: bool,
}

pub struct ReplaceCadFile {
    convertibles: Arc<dyn ConvertibleRepo>,
    cad_versions: Arc<dyn CadVersionRepo>,
    object_store: Arc<dyn ObjectStorePort>,
    clock: Arc<dyn ClockPort>,
}

impl ReplaceCadFile {
    pub fn new(
        convertibles: Arc<dyn ConvertibleRepo>,
        cad_versions: Arc<dyn CadVersionRepo>,
        object_store: Arc<dyn ObjectStorePort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            convertibles,
            cad_versions,
            object_store,
            clock,
        }
    }

    pub async fn execute(
        &self,
        id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<ReplacedCadFile, CadFileError> {
        if bytes.is_empty() {
            return Err(CadFileError::EmptyUpload);
        }
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(CadFileError::MissingFilename);
        }

        let kind = self.convertibles.entity_kind();
        if self.convertibles.get(id).await?.is_none() {
            return Err(CadFileError::EntityNotFound { kind, id });
        }

        let version = self
            .cad_versions
            .latest_version(kind, id)
            .await?
            .map_or(1, |latest| latest + 1);

        // Each revision gets its own stable object; the entity points at
        // the revision it currently uses.
        let file_key = kind.versioned_source_key(id, version, filename);
        self.object_store
            .put(&file_key, bytes, "application/octet-stream")
            .await?;

        let now = self.clock.now();
        let record = CadVersion::new(kind, id, version, &file_key, filename, false, now);
        self.cad_versions.append(&record).await?;
        // Atomic unset-all-then-set-one.
        self.cad_versions.set_current(kind, id, version).await?;

        self.convertibles
            .set_source_file(id, &file_key, filename)
            .await?;

        // Replacement discards any existing mesh.
        let mut state = ConversionState::pending();
        let format = FormatGuard::classify(filename);
        let conversion_required = FormatGuard::needs_conversion(format);
        if !conversion_required {
            state.skip(SkipReason::NotRequired, now)?;
        }
        self.convertibles.save_state(id, &state).await?;

        tracing::info!(
            entity_kind = %kind,
            entity_id = %id,
            version,
            format = %format,
            "CAD file replaced"
        );
        Ok(ReplacedCadFile {
            version,
            file_key,
            format,
            conversion_required,
        })
    }
}

impl From<quoteforge_domain::DomainError> for CadFileError {
    fn from(err: quoteforge_domain::DomainError) -> Self {
        Self::Repo(err.into())
    }
}
