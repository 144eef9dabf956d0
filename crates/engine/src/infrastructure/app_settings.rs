//! Application settings for the conversion subsystem.
//!
//! Settings are stored as a JSON blob and read fresh on every conversion
//! attempt, so operators can flip the toggle or re-tune the service limits
//! without redeploying. Every field carries a serde default so blobs saved
//! by older builds still deserialize.

use serde::{Deserialize, Serialize};

fn default_conversion_enabled() -> bool {
    true
}

fn default_mesh_output_format() -> String {
    "glb".to_string()
}

fn default_max_cad_file_bytes() -> u64 {
    // The conversion service rejects anything larger; stay under its limit.
    100 * 1024 * 1024
}

fn default_chordal_deflection_mm() -> f64 {
    0.1
}

fn default_angular_deflection_rad() -> f64 {
    0.5
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_max_attempts() -> u32 {
    150
}

fn default_max_concurrent_conversions() -> usize {
    3
}

fn default_order_number_prefix() -> String {
    "SO".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Global toggle for the conversion subsystem. Off degrades every
    /// conversion to a `skipped` outcome instead of failing uploads when
    /// the external service is unavailable.
    #[serde(default = "default_conversion_enabled")]
    pub conversion_enabled: bool,

    /// Mesh format requested from the conversion service.
    #[serde(default = "default_mesh_output_format")]
    pub mesh_output_format: String,

    /// Upload size cap; oversize files fail conversion terminally.
    #[serde(default = "default_max_cad_file_bytes")]
    pub max_cad_file_bytes: u64,

    /// Triangulation tolerance: maximum chord deviation.
    #[serde(default = "default_chordal_deflection_mm")]
    pub chordal_deflection_mm: f64,

    /// Triangulation tolerance: maximum facet normal angle.
    #[serde(default = "default_angular_deflection_rad")]
    pub angular_deflection_rad: f64,

    /// Delay between job status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Poll budget; exhausting it fails the conversion with a timeout.
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Batch concurrency cap. Protects the external service from load,
    /// not a correctness mechanism.
    #[serde(default = "default_max_concurrent_conversions")]
    pub max_concurrent_conversions: usize,

    /// Prefix for generated order numbers, e.g. "SO" -> "SO-2025-483920".
    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            conversion_enabled: default_conversion_enabled(),
            mesh_output_format: default_mesh_output_format(),
            max_cad_file_bytes: default_max_cad_file_bytes(),
            chordal_deflection_mm: default_chordal_deflection_mm(),
            angular_deflection_rad: default_angular_deflection_rad(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            max_concurrent_conversions: default_max_concurrent_conversions(),
            order_number_prefix: default_order_number_prefix(),
        }
    }
}
