//! HTTP intake server.
//!
//! Exposes duplicate checking, upload and replacement over a small JSON API
//! built on axum. Uploads are `multipart/form-data`; see
//! [`UploadForm`](crate::upload::UploadForm) for the accepted fields.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents/check` | Score an upload, store nothing |
//! | `POST` | `/documents` | Store an upload unless it is a (possible) duplicate |
//! | `POST` | `/documents/replace` | Replace `existingDocumentId` with the upload |
//! | `GET`  | `/documents/{id}` | Fetch one document |
//! | `GET`  | `/projects/{id}/documents` | List a project's documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "projectId is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `payload_too_large` (413), `store_unavailable` (503).
//! A 503 means the store could not be read or written; the request can be
//! retried and must not be read as "no duplicates".
//!
//! # Authentication
//!
//! When `[server].api_token_env` is configured, every route except
//! `/health` requires `Authorization: Bearer <token>`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use paper_intake_core::models::{DocumentRecord, SimilarityVerdict, UploadStatus};
use paper_intake_core::replace::ReplaceOutcome;

use crate::config::Config;
use crate::error::IntakeError;
use crate::service::{CommitOutcome, IntakeService};
use crate::upload::{UploadForm, ValidatedUpload};

/// Room left in the request body for non-file multipart fields.
const FORM_OVERHEAD_BYTES: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    service: IntakeService,
}

/// Opens the configured SQLite store and serves until the process exits.
///
/// This is the entry point used by `intake serve`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = IntakeService::open(config).await?;
    run_server_with_service(config, service).await
}

/// Serves the API over an already-built [`IntakeService`].
pub async fn run_server_with_service(
    config: &Config,
    service: IntakeService,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(Arc::new(config.clone()), service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        bind = %bind_addr,
        auth = config.server.api_token.is_some(),
        "intake server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router with all routes and layers attached.
pub fn router(config: Arc<Config>, service: IntakeService) -> Router {
    let body_limit = config
        .server
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);
    let state = AppState { config, service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/documents", post(handle_commit))
        .route("/documents/check", post(handle_check))
        .route("/documents/replace", post(handle_replace))
        .route("/documents/{id}", get(handle_get))
        .route("/projects/{id}/documents", get(handle_list))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_token,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        let (status, code) = match err {
            IntakeError::Invalid(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            IntakeError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            IntakeError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            IntakeError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            IntakeError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large")
            }
            IntakeError::StoreUnavailable(ref msg) => {
                error!(error = %msg, "document store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ Auth ============

async fn require_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(ref expected) = state.config.server.api_token {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected.as_str()) {
            warn!(path = %req.uri().path(), "rejected request without valid token");
            return Err(IntakeError::Unauthorized.into());
        }
    }
    Ok(next.run(req).await)
}

async fn read_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<ValidatedUpload, AppError> {
    let form = UploadForm::from_multipart(multipart, state.config.server.max_upload_bytes).await?;
    Ok(form.validate()?)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents/check ============

async fn handle_check(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SimilarityVerdict>, AppError> {
    let upload = read_upload(&state, multipart).await?;
    let verdict = state.service.check(&upload.document).await?;
    Ok(Json(verdict))
}

// ============ POST /documents ============

#[derive(Serialize)]
struct StoredResponse {
    document: DocumentRecord,
    verdict: SimilarityVerdict,
}

#[derive(Serialize)]
struct HeldResponse {
    error: ErrorDetail,
    verdict: SimilarityVerdict,
}

/// Stores the upload, or answers 409 with the verdict when it resembles an
/// existing document and `force` was not set.
async fn handle_commit(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(&state, multipart).await?;
    let response = match state.service.commit(upload.document, upload.force).await? {
        CommitOutcome::Stored { document, verdict } => (
            StatusCode::CREATED,
            Json(StoredResponse { document, verdict }),
        )
            .into_response(),
        CommitOutcome::Held { verdict } => {
            let message = format!(
                "upload resembles an existing document ({}, confidence {}); \
                 resend with force=true or replace it",
                verdict.recommendation, verdict.confidence
            );
            (
                StatusCode::CONFLICT,
                Json(HeldResponse {
                    error: ErrorDetail {
                        code: "conflict".to_string(),
                        message,
                    },
                    verdict,
                }),
            )
                .into_response()
        }
    };
    Ok(response)
}

// ============ POST /documents/replace ============

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReplaceResponse {
    success: bool,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<DocumentRecord>,
}

/// Maps each [`ReplaceOutcome`] to a distinct status so clients never
/// mistake a partial replacement for a clean failure.
///
/// | Outcome | Status |
/// |---------|--------|
/// | `replaced` | 200 |
/// | `replace-unverified` | 409 |
/// | `replace-partial` | 500 |
/// | `replace-failed` | 503 |
async fn handle_replace(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = read_upload(&state, multipart).await?;
    let existing_id = upload
        .existing_document_id
        .ok_or_else(|| IntakeError::invalid("existingDocumentId is required"))?;

    let outcome = state.service.replace(&existing_id, upload.document).await?;
    let label = outcome.label();
    let (status, body) = match outcome {
        ReplaceOutcome::Replaced(document) => (
            StatusCode::OK,
            ReplaceResponse {
                success: true,
                outcome: label,
                new_document_id: Some(document.id.clone()),
                document: Some(document),
                ..Default::default()
            },
        ),
        ReplaceOutcome::Failed {
            project_id,
            existing_document_id,
            reason,
        } => (
            StatusCode::SERVICE_UNAVAILABLE,
            ReplaceResponse {
                outcome: label,
                error: Some(reason),
                project_id: Some(project_id),
                old_document_id: Some(existing_document_id),
                ..Default::default()
            },
        ),
        ReplaceOutcome::Partial {
            project_id,
            old_document_id,
            new_document_id,
            reason,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ReplaceResponse {
                outcome: label,
                error: Some(reason),
                project_id: Some(project_id),
                old_document_id: Some(old_document_id),
                new_document_id,
                ..Default::default()
            },
        ),
        ReplaceOutcome::Unverified {
            document,
            completed_count,
        } => (
            StatusCode::CONFLICT,
            ReplaceResponse {
                outcome: label,
                error: Some("replacement stored but could not be verified".to_string()),
                project_id: Some(document.project_id.clone()),
                new_document_id: Some(document.id.clone()),
                completed_count,
                ..Default::default()
            },
        ),
    };

    Ok((status, Json(body)).into_response())
}

// ============ GET /documents/{id} ============

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>, AppError> {
    Ok(Json(state.service.get(&id).await?))
}

// ============ GET /projects/{id}/documents ============

/// A document without its extracted text.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentSummary {
    id: String,
    user_id: String,
    file_name: String,
    file_size: i64,
    mime_type: String,
    status: UploadStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRecord> for DocumentSummary {
    fn from(d: DocumentRecord) -> Self {
        DocumentSummary {
            id: d.id,
            user_id: d.user_id,
            file_name: d.file_name,
            file_size: d.file_size,
            mime_type: d.mime_type,
            status: d.status,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_list(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ListResponse>, AppError> {
    let documents = state.service.list(&project_id).await?;
    Ok(Json(ListResponse {
        documents: documents.into_iter().map(DocumentSummary::from).collect(),
    }))
}
