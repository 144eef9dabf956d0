//! Conversion state for entities that carry a CAD file.
//!
//! The state machine is
//!
//! ```text
//! pending -> queued -> in_progress -> completed
//!                                  \-> failed -> (retry) -> pending
//! pending -> skipped
//! ```
//!
//! `completed`, `failed` and `skipped` are terminal; the only way out is an
//! explicit retry, which is legal from `failed` alone. Invariants held by
//! construction: the mesh key is present iff `completed`, the error message
//! is present iff `failed`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Status of a CAD-to-mesh conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Pending,
    Queued,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ConversionStatus {
    /// Terminal states are left only via explicit retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// States that block a quote from converting into an order.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConversionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(DomainError::parse(format!(
                "Unknown conversion status: {other}"
            ))),
        }
    }
}

/// Why a conversion was skipped without being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The conversion subsystem is disabled by configuration.
    ConversionDisabled,
    /// The file is already renderable (or not CAD at all).
    NotRequired,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversionDisabled => write!(f, "conversion subsystem disabled"),
            Self::NotRequired => write!(f, "file does not require conversion"),
        }
    }
}

/// Per-entity conversion status and job metadata.
///
/// Fields are private so transitions go through the methods below, which is
/// what keeps the status/mesh/error invariants from drifting apart in
/// storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionState {
    status: ConversionStatus,
    job_id: Option<String>,
    error: Option<String>,
    mesh_file_key: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl ConversionState {
    /// Initial state for a newly created entity or a freshly replaced file.
    pub fn pending() -> Self {
        Self {
            status: ConversionStatus::Pending,
            job_id: None,
            error: None,
            mesh_file_key: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Reconstruct from stored data. Used by repositories only; trusts the
    /// store to hold a state this type previously produced.
    pub fn reconstruct(
        status: ConversionStatus,
        job_id: Option<String>,
        error: Option<String>,
        mesh_file_key: Option<String>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status,
            job_id,
            error,
            mesh_file_key,
            started_at,
            completed_at,
        }
    }

    // --- Accessors ---

    pub fn status(&self) -> ConversionStatus {
        self.status
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn mesh_file_key(&self) -> Option<&str> {
        self.mesh_file_key.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    // --- Transitions ---

    /// Enter the pipeline. Discards any stale mesh reference.
    pub fn mark_queued(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != ConversionStatus::Pending {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot queue a conversion in state {}",
                self.status
            )));
        }
        self.status = ConversionStatus::Queued;
        self.error = None;
        self.mesh_file_key = None;
        self.started_at = Some(now);
        self.completed_at = None;
        Ok(())
    }

    /// Record the external job id once submission succeeded.
    pub fn mark_in_progress(&mut self, job_id: impl Into<String>) -> Result<(), DomainError> {
        if self.status != ConversionStatus::Queued {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot start a conversion in state {}",
                self.status
            )));
        }
        self.status = ConversionStatus::InProgress;
        self.job_id = Some(job_id.into());
        Ok(())
    }

    /// Terminal success. This is the only way a mesh reference is set.
    pub fn complete(
        &mut self,
        mesh_file_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != ConversionStatus::InProgress {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot complete a conversion in state {}",
                self.status
            )));
        }
        self.status = ConversionStatus::Completed;
        self.mesh_file_key = Some(mesh_file_key.into());
        self.error = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Terminal failure from any non-terminal state.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot fail a conversion already in terminal state {}",
                self.status
            )));
        }
        self.status = ConversionStatus::Failed;
        self.error = Some(error.into());
        self.mesh_file_key = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Deliberate no-op outcome; reachable only before the pipeline ran.
    pub fn skip(&mut self, reason: SkipReason, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != ConversionStatus::Pending {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot skip a conversion in state {} ({})",
                self.status, reason
            )));
        }
        self.status = ConversionStatus::Skipped;
        self.error = None;
        self.mesh_file_key = None;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Manual retry; legal from `failed` only. The pipeline then re-runs in
    /// full against the entity's current source file.
    pub fn reset_for_retry(&mut self) -> Result<(), DomainError> {
        if self.status != ConversionStatus::Failed {
            return Err(DomainError::invalid_state_transition(format!(
                "retry is only allowed from failed, not {}",
                self.status
            )));
        }
        *self = Self::pending();
        Ok(())
    }
}

impl Default for ConversionState {
    fn default() -> Self {
        Self::pending()
    }
}
