//! Neo4j deserialization helpers for node-to-entity conversion.

use chrono::{DateTime, Utc};
use neo4rs::Node;
use quoteforge_domain::common::{parse_datetime_or, some_if_not_empty};
use uuid::Uuid;

use crate::infrastructure::ports::RepoError;

/// Extension trait for Neo4j Node to cut row-conversion boilerplate.
pub trait NodeExt {
    /// Get a required UUID field and parse it.
    fn get_uuid(&self, field: &str) -> Result<Uuid, RepoError>;

    /// Get a required string field (fail-fast on absence).
    fn get_string_strict(&self, field: &str) -> Result<String, RepoError>;

    /// Get an optional string field, returning None if empty or missing.
    fn get_optional_string(&self, field: &str) -> Option<String>;

    /// Get a timestamp field, falling back to the provided time on parse error.
    fn get_datetime_or(&self, field: &str, fallback: DateTime<Utc>) -> DateTime<Utc>;

    /// Get an optional timestamp field.
    fn get_optional_datetime(&self, field: &str) -> Option<DateTime<Utc>>;

    /// Get a bool field with a default value if missing.
    fn get_bool_or(&self, field: &str, default: bool) -> bool;

    /// Get an i64 field with a default value if missing.
    fn get_i64_or(&self, field: &str, default: i64) -> i64;
}

impl NodeExt for Node {
    fn get_uuid(&self, field: &str) -> Result<Uuid, RepoError> {
        let s: String = self.get(field).map_err(|e| {
            RepoError::database("query", format!("Missing required field '{field}': {e}"))
        })?;
        Uuid::parse_str(&s).map_err(|e| {
            RepoError::database("parse", format!("Invalid UUID in field '{field}': {e}"))
        })
    }

    fn get_string_strict(&self, field: &str) -> Result<String, RepoError> {
        self.get(field).map_err(|e| {
            RepoError::database("query", format!("Missing required field '{field}': {e}"))
        })
    }

    fn get_optional_string(&self, field: &str) -> Option<String> {
        self.get::<String>(field).ok().and_then(some_if_not_empty)
    }

    fn get_datetime_or(&self, field: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.get::<String>(field)
            .ok()
            .map(|s| parse_datetime_or(&s, fallback))
            .unwrap_or(fallback)
    }

    fn get_optional_datetime(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get::<String>(field)
            .ok()
            .and_then(|s| quoteforge_domain::common::parse_datetime(&s).ok())
    }

    fn get_bool_or(&self, field: &str, default: bool) -> bool {
        self.get(field).unwrap_or(default)
    }

    fn get_i64_or(&self, field: &str, default: i64) -> i64 {
        self.get(field).unwrap_or(default)
    }
}

/// Parse a stored status string into an enum, wrapping parse failures as
/// database errors (the store held something this build can't read).
pub fn parse_stored<T>(field: &str, value: &str) -> Result<T, RepoError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        RepoError::database(
            "parse",
            format!("Invalid value in field '{field}': {e} (value: '{value}')"),
        )
    })
}

// =============================================================================
// Conversion-state property mapping
// =============================================================================
//
// Parts and quote parts store the identical set of conversion properties on
// their node; these two functions are the single definition of that layout.

/// Read the conversion-state properties off an entity node.
pub fn read_conversion_state(
    node: &Node,
) -> Result<quoteforge_domain::ConversionState, RepoError> {
    let status_str = node.get_string_strict("conversion_status")?;
    let status = parse_stored("conversion_status", &status_str)?;
    Ok(quoteforge_domain::ConversionState::reconstruct(
        status,
        node.get_optional_string("conversion_job_id"),
        node.get_optional_string("conversion_error"),
        node.get_optional_string("mesh_file_key"),
        node.get_optional_datetime("conversion_started_at"),
        node.get_optional_datetime("conversion_completed_at"),
    ))
}

/// Bind the conversion-state properties onto a query.
///
/// The Cypher using these must SET all six properties (absent options are
/// bound as empty strings, which read back as None).
pub fn bind_conversion_state(
    q: neo4rs::Query,
    state: &quoteforge_domain::ConversionState,
) -> neo4rs::Query {
    q.param("conversion_status", state.status().as_str())
        .param("conversion_job_id", state.job_id().unwrap_or_default())
        .param("conversion_error", state.error().unwrap_or_default())
        .param("mesh_file_key", state.mesh_file_key().unwrap_or_default())
        .param(
            "conversion_started_at",
            state.started_at().map(|t| t.to_rfc3339()).unwrap_or_default(),
        )
        .param(
            "conversion_completed_at",
            state
                .completed_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        )
}
