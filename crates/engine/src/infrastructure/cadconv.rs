//! CadConv conversion service client
//!
//! Implements the ConversionServicePort trait against the hosted CadConv
//! REST API (`POST /api/v1/jobs`, `GET /api/v1/jobs/{id}`,
//! `GET /api/v1/jobs/{id}/result`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::infrastructure::ports::{
    ConversionOptions, ConversionServiceError, ConversionServicePort, ConvertedFile, JobStatus,
};

/// Client for the CadConv API
#[derive(Clone)]
pub struct CadConvClient {
    client: Client,
    base_url: String,
}

impl CadConvClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            // Uploads of large solids can be slow; polls reuse the same
            // client, so this is the ceiling for any single call.
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/api/v1/jobs/{}", self.base_url, job_id)
    }
}

#[async_trait]
impl ConversionServicePort for CadConvClient {
    async fn submit(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        options: ConversionOptions,
    ) -> Result<String, ConversionServiceError> {
        let response = self
            .client
            .post(format!("{}/api/v1/jobs", self.base_url))
            .query(&[
                ("filename", filename),
                ("output_format", options.output_format.as_str()),
            ])
            .query(&[
                ("chordal_deflection", options.chordal_deflection_mm),
                ("angular_deflection", options.angular_deflection_rad),
            ])
            .query(&[("async", options.run_async)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ConversionServiceError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConversionServiceError::RequestFailed(error_text));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| ConversionServiceError::InvalidResponse(e.to_string()))?;

        Ok(submitted.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, ConversionServiceError> {
        let response = self
            .client
            .get(self.job_url(job_id))
            .send()
            .await
            .map_err(|e| ConversionServiceError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConversionServiceError::RequestFailed(error_text));
        }

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| ConversionServiceError::InvalidResponse(e.to_string()))?;

        Ok(match job.status.as_str() {
            "queued" => JobStatus::Queued,
            "in_progress" | "running" => JobStatus::InProgress,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed {
                error: job
                    .error
                    .unwrap_or_else(|| "conversion service reported failure".to_string()),
            },
            other => {
                return Err(ConversionServiceError::InvalidResponse(format!(
                    "unknown job status: {other}"
                )))
            }
        })
    }

    async fn download(&self, job_id: &str) -> Result<ConvertedFile, ConversionServiceError> {
        let response = self
            .client
            .get(format!("{}/result", self.job_url(job_id)))
            .send()
            .await
            .map_err(|e| ConversionServiceError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ConversionServiceError::RequestFailed(error_text));
        }

        // Result filename travels in Content-Disposition; fall back to the
        // job id so the stored mesh key is still unique and extension-less
        // rather than wrong.
        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition_filename)
            .unwrap_or_else(|| job_id.to_string());

        let bytes = response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ConversionServiceError::RequestFailed(e.to_string()))?;

        Ok(ConvertedFile { filename, bytes })
    }

    async fn check_health(&self) -> Result<bool, ConversionServiceError> {
        let response = self
            .client
            .get(format!("{}/api/v1/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| ConversionServiceError::Unavailable)?;

        Ok(response.status().is_success())
    }
}

fn parse_content_disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|segment| {
        let segment = segment.trim();
        segment
            .strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}

// =============================================================================
// CadConv API types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    error: Option<String>,
}
