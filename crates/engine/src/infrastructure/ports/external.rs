//! External service port traits (conversion service, object store, events).

use async_trait::async_trait;
use quoteforge_domain::DomainEvent;

use super::error::{ConversionServiceError, EventBusError, ObjectStoreError};

// =============================================================================
// Conversion Service Types
// =============================================================================

/// Options submitted with a conversion job.
///
/// Tolerances are fixed application-wide (they trade mesh fidelity against
/// file size); the output format is operator-tunable and read fresh from
/// settings for every submission.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Target mesh format, e.g. "glb".
    pub output_format: String,
    /// Maximum chord deviation in millimetres.
    pub chordal_deflection_mm: f64,
    /// Maximum angle between adjacent facet normals, radians.
    pub angular_deflection_rad: f64,
    /// Submit as an asynchronous job (the only mode this core uses).
    pub run_async: bool,
}

/// Status reported by the external service for one job.
///
/// The service is untrusted: a job may sit in `Queued` forever, so callers
/// bound their polling and treat budget exhaustion as a distinct timeout
/// failure rather than conflating it with `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed { error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// The downloaded result of a completed job.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Thin typed interface to the external CAD-to-mesh conversion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversionServicePort: Send + Sync {
    /// Submit a file for conversion; returns the job correlation id.
    async fn submit(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: ConversionOptions,
    ) -> Result<String, ConversionServiceError>;

    /// Poll one job's status.
    async fn poll(&self, job_id: &str) -> Result<JobStatus, ConversionServiceError>;

    /// Download the result of a completed job.
    async fn download(&self, job_id: &str) -> Result<ConvertedFile, ConversionServiceError>;

    /// Cheap liveness probe.
    async fn check_health(&self) -> Result<bool, ConversionServiceError>;
}

// =============================================================================
// Object Store
// =============================================================================

/// Object storage for CAD sources, meshes and thumbnails.
///
/// Keys follow the layout in `quoteforge_domain::EntityKind`. There is no
/// locking: keys are derived from freshly generated entity ids, so
/// concurrent writers to one key do not occur in practice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Store bytes under `key`; returns the key actually written.
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    /// Server-side copy between keys.
    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<(), ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

// =============================================================================
// Event Bus
// =============================================================================

/// Publish domain events for the audit trail.
///
/// Publication is best-effort: callers log failures and carry on, so an
/// implementation must never block business writes on a slow consumer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBusPort: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventBusError>;
}
