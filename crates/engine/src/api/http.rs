//! HTTP routes.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use quoteforge_domain::{EntityKind, QuoteId};

use crate::app::App;
use crate::infrastructure::app_settings::AppSettings;
use crate::infrastructure::ports::ConvertibleRecord;
use crate::use_cases::cad::CadFileError;
use crate::use_cases::conversion::{ConversionError, ConversionOutcome};
use crate::use_cases::orders::ConvertQuoteError;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/quotes/{id}", get(get_quote))
        .route("/api/quotes/{id}/status", put(set_quote_status))
        .route("/api/quotes/{id}/parts", post(create_quote_part))
        .route("/api/quotes/{id}/attachments", get(list_quote_attachments))
        .route("/api/quotes/{id}/notes", get(list_quote_notes))
        .route("/api/quotes/{id}/convert", post(convert_quote))
        .route("/api/quote-parts/{id}", get(get_quote_part).delete(delete_quote_part))
        .route("/api/parts/{id}", get(get_part))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/{kind}/{id}/conversion", get(conversion_status))
        .route("/api/{kind}/{id}/conversion/retry", post(retry_conversion))
        .route("/api/{kind}/conversion/batch", post(batch_convert))
        .route("/api/{kind}/{id}/cad", put(replace_cad_file))
        .route("/api/{kind}/{id}/cad/restore", post(restore_cad_version))
        .route("/api/{kind}/{id}/cad/versions", get(list_cad_versions))
        .route("/api/settings", get(get_settings).put(update_settings))
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Quotes and orders
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteView {
    quote: quoteforge_domain::Quote,
    line_items: Vec<quoteforge_domain::QuoteLineItem>,
    parts: Vec<quoteforge_domain::QuotePart>,
}

async fn get_quote(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuoteView>, ApiError> {
    let quote_id = QuoteId::from_uuid(id);
    let quote = app
        .repositories
        .quote
        .get(quote_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    let line_items = app
        .repositories
        .quote
        .list_line_items(quote_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let parts = app
        .repositories
        .quote
        .list_parts(quote_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(QuoteView {
        quote,
        line_items,
        parts,
    }))
}

#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    status: quoteforge_domain::QuoteStatus,
}

async fn set_quote_status(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<quoteforge_domain::Quote>, ApiError> {
    let quote_id = QuoteId::from_uuid(id);
    let mut quote = app
        .repositories
        .quote
        .get(quote_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    quote.set_status(request.status, app.clock.now());
    app.repositories
        .quote
        .save(&quote)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
struct CreateQuotePartRequest {
    name: String,
}

async fn create_quote_part(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateQuotePartRequest>,
) -> Result<Json<quoteforge_domain::QuotePart>, ApiError> {
    let quote_id = QuoteId::from_uuid(id);
    app.repositories
        .quote
        .get(quote_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;

    let name = quoteforge_domain::PartName::new(request.name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let part = quoteforge_domain::QuotePart::new(quote_id, name, app.clock.now());
    app.repositories
        .quote_part
        .save(&part)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(part))
}

async fn get_quote_part(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<quoteforge_domain::QuotePart>, ApiError> {
    let part = app
        .repositories
        .quote_part
        .get(quoteforge_domain::QuotePartId::from_uuid(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(part))
}

async fn delete_quote_part(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    app.repositories
        .quote_part
        .delete(quoteforge_domain::QuotePartId::from_uuid(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn list_quote_attachments(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<quoteforge_domain::Attachment>>, ApiError> {
    let attachments = app
        .repositories
        .attachment
        .list_for_quote(QuoteId::from_uuid(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(attachments))
}

async fn list_quote_notes(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<quoteforge_domain::Note>>, ApiError> {
    let notes = app
        .repositories
        .note
        .list_for_quote(QuoteId::from_uuid(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(notes))
}

async fn get_part(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<quoteforge_domain::Part>, ApiError> {
    let part = app
        .repositories
        .part
        .get(quoteforge_domain::PartId::from_uuid(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(part))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderView {
    order: quoteforge_domain::Order,
    line_items: Vec<quoteforge_domain::OrderLineItem>,
    parts: Vec<quoteforge_domain::Part>,
}

async fn get_order(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = quoteforge_domain::OrderId::from_uuid(id);
    let order = app
        .repositories
        .order
        .get(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    let line_items = app
        .repositories
        .order
        .list_line_items(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let parts = app
        .repositories
        .part
        .list_for_order(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(OrderView {
        order,
        line_items,
        parts,
    }))
}

async fn list_cad_versions(
    State(app): State<Arc<App>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<quoteforge_domain::CadVersion>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let versions = app
        .repositories
        .cad_version
        .list_for_entity(kind, id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(versions))
}

// =============================================================================
// Quote conversion
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertedQuoteResponse {
    order_id: Uuid,
    order_number: String,
    part_count: u32,
    line_item_count: u32,
    attachment_count: u32,
    note_count: u32,
}

async fn convert_quote(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConvertedQuoteResponse>, ApiError> {
    let summary = app
        .use_cases
        .convert_quote
        .execute(QuoteId::from_uuid(id))
        .await?;
    Ok(Json(ConvertedQuoteResponse {
        order_id: summary.order_id.to_uuid(),
        order_number: summary.order_number,
        part_count: summary.part_count,
        line_item_count: summary.line_item_count,
        attachment_count: summary.attachment_count,
        note_count: summary.note_count,
    }))
}

// =============================================================================
// Conversion pipeline
// =============================================================================

/// Conversion status as surfaced to staff UIs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversionStatusView {
    entity_id: Uuid,
    entity_kind: EntityKind,
    status: String,
    error: Option<String>,
    job_id: Option<String>,
    mesh_file_key: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ConvertibleRecord> for ConversionStatusView {
    fn from(record: ConvertibleRecord) -> Self {
        let state = &record.conversion;
        Self {
            entity_id: record.id,
            entity_kind: record.kind,
            status: state.status().to_string(),
            error: state.error().map(String::from),
            job_id: state.job_id().map(String::from),
            mesh_file_key: state.mesh_file_key().map(String::from),
            started_at: state.started_at(),
            completed_at: state.completed_at(),
        }
    }
}

async fn conversion_status(
    State(app): State<Arc<App>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<ConversionStatusView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let record = app
        .repositories
        .convertibles_for(kind)
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(record.into()))
}

async fn retry_conversion(
    State(app): State<Arc<App>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<ConversionStatusView>, ApiError> {
    let kind = parse_kind(&kind)?;
    app.use_cases.conversion_for(kind).retry(id).await?;
    status_view(&app, kind, id).await
}

#[derive(Debug, Deserialize)]
struct BatchConvertRequest {
    ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
enum BatchItemResult {
    Completed { mesh_file_key: String },
    Skipped { reason: String },
    Failed { error: String },
}

async fn batch_convert(
    State(app): State<Arc<App>>,
    Path(kind): Path<String>,
    Json(request): Json<BatchConvertRequest>,
) -> Result<Json<HashMap<Uuid, BatchItemResult>>, ApiError> {
    let kind = parse_kind(&kind)?;
    let results = app
        .use_cases
        .conversion_for(kind)
        .convert_batch(&request.ids)
        .await;

    let view = results
        .into_iter()
        .map(|(id, result)| {
            let item = match result {
                Ok(ConversionOutcome::Completed { mesh_file_key }) => {
                    BatchItemResult::Completed { mesh_file_key }
                }
                Ok(ConversionOutcome::Skipped { reason }) => BatchItemResult::Skipped {
                    reason: reason.to_string(),
                },
                Ok(ConversionOutcome::Failed { error }) => BatchItemResult::Failed { error },
                Err(e) => BatchItemResult::Failed {
                    error: e.to_string(),
                },
            };
            (id, item)
        })
        .collect();
    Ok(Json(view))
}

// =============================================================================
// CAD files
// =============================================================================

#[derive(Debug, Deserialize)]
struct UploadQuery {
    filename: String,
}

async fn replace_cad_file(
    State(app): State<Arc<App>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<ConversionStatusView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let replaced = app
        .use_cases
        .replace_file_for(kind)
        .execute(id, &query.filename, body.to_vec())
        .await?;

    // Solid-body files go straight through the pipeline; the poll loop dies
    // with this request if the client walks away.
    if replaced.conversion_required {
        app.use_cases.conversion_for(kind).convert(id).await?;
    }
    status_view(&app, kind, id).await
}

#[derive(Debug, Deserialize)]
struct RestoreRequest {
    version: u32,
}

async fn restore_cad_version(
    State(app): State<Arc<App>>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(request): Json<RestoreRequest>,
) -> Result<Json<ConversionStatusView>, ApiError> {
    let kind = parse_kind(&kind)?;
    let restored = app
        .use_cases
        .restore_version_for(kind)
        .execute(id, request.version)
        .await?;

    if restored.conversion_required {
        app.use_cases.conversion_for(kind).convert(id).await?;
    }
    status_view(&app, kind, id).await
}

// =============================================================================
// Settings
// =============================================================================

async fn get_settings(State(app): State<Arc<App>>) -> Result<Json<AppSettings>, ApiError> {
    let settings = app
        .repositories
        .settings
        .get()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .unwrap_or_default();
    Ok(Json(settings))
}

async fn update_settings(
    State(app): State<Arc<App>>,
    Json(settings): Json<AppSettings>,
) -> Result<Json<AppSettings>, ApiError> {
    app.repositories
        .settings
        .save(&settings)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(settings))
}

// =============================================================================
// Helpers & error mapping
// =============================================================================

async fn status_view(
    app: &App,
    kind: EntityKind,
    id: Uuid,
) -> Result<Json<ConversionStatusView>, ApiError> {
    let record = app
        .repositories
        .convertibles_for(kind)
        .get(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(record.into()))
}

fn parse_kind(value: &str) -> Result<EntityKind, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown entity kind: {value}")))
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Conflict(msg) => (axum::http::StatusCode::CONFLICT, msg).into_response(),
            ApiError::Unprocessable(msg) => {
                (axum::http::StatusCode::UNPROCESSABLE_ENTITY, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                )
                    .into_response()
            }
        }
    }
}

impl From<ConvertQuoteError> for ApiError {
    fn from(e: ConvertQuoteError) -> Self {
        match e {
            ConvertQuoteError::QuoteNotFound(_) => ApiError::NotFound,
            // "Someone else already did this" is a conflict, not a bug.
            ConvertQuoteError::AlreadyConverted => ApiError::Conflict(e.to_string()),
            ConvertQuoteError::NotConvertible(_)
            | ConvertQuoteError::NoLineItems
            | ConvertQuoteError::InvalidLineItem { .. }
            | ConvertQuoteError::ZeroTotal
            | ConvertQuoteError::ConversionsOutstanding { .. }
            | ConvertQuoteError::InvalidPart { .. } => ApiError::Unprocessable(e.to_string()),
            ConvertQuoteError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(e: ConversionError) -> Self {
        match e {
            ConversionError::EntityNotFound { .. } => ApiError::NotFound,
            ConversionError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            ConversionError::NotRetryable(_) | ConversionError::InvalidState(_) => {
                ApiError::Unprocessable(e.to_string())
            }
            ConversionError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CadFileError> for ApiError {
    fn from(e: CadFileError) -> Self {
        match e {
            CadFileError::EntityNotFound { .. } => ApiError::NotFound,
            CadFileError::EmptyUpload | CadFileError::MissingFilename => {
                ApiError::BadRequest(e.to_string())
            }
            CadFileError::VersionNotFound { .. } => ApiError::NotFound,
            CadFileError::Store(e) => ApiError::Internal(e.to_string()),
            CadFileError::Repo(e) => ApiError::Internal(e.to_string()),
        }
    }
}
