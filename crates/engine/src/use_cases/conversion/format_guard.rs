//! Upload format and size gating for the conversion pipeline.

use quoteforge_domain::CadFormat;

use crate::infrastructure::app_settings::AppSettings;

/// File rejected for size; terminal and not retryable without a smaller file.
#[derive(Debug, Clone, thiserror::Error)]
#[error("File is {actual_bytes} bytes, above the {max_bytes} byte conversion limit")]
pub struct OversizedFile {
    pub actual_bytes: u64,
    pub max_bytes: u64,
}

/// Classifies uploads and enforces the service's input limits.
///
/// Stateless; limits and the preferred output format come from settings,
/// which callers fetch fresh per conversion so operator changes take effect
/// without a redeploy.
pub struct FormatGuard;

impl FormatGuard {
    pub fn classify(filename: &str) -> CadFormat {
        CadFormat::from_filename(filename)
    }

    pub fn needs_conversion(format: CadFormat) -> bool {
        format.needs_conversion()
    }

    pub fn validate_size(byte_length: u64, settings: &AppSettings) -> Result<(), OversizedFile> {
        if byte_length > settings.max_cad_file_bytes {
            return Err(OversizedFile {
                actual_bytes: byte_length,
                max_bytes: settings.max_cad_file_bytes,
            });
        }
        Ok(())
    }

    pub fn recommended_output_format(settings: &AppSettings) -> String {
        settings.mesh_output_format.clone()
    }
}
