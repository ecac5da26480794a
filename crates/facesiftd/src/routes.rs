use crate::config::Config;
use crate::engine::EngineHandle;
use crate::error::{ServerError, ServerResult};
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use facesift_net::{extract_folder_id, is_drive_folder_url, FolderLister};
use facesift_scan::{build_archive, Candidate, ScanPolicy, ARCHIVE_FILE_NAME, ARCHIVE_MIME_TYPE};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub lister: Arc<FolderLister>,
}

/// GET /: service info.
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "facesift",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /": "service info",
            "GET /status": "backend and scan policy tiers",
            "POST /process": "multipart: selfie (file), drive_link (text); returns a ZIP of matching photos",
        }
    }))
}

#[derive(Serialize)]
struct PolicySample {
    total: usize,
    policy: ScanPolicy,
}

/// GET /status: backend in use and the policy applied at sample sizes.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let policies: Vec<PolicySample> = [30, 60, 100, 250]
        .into_iter()
        .map(|total| PolicySample { total, policy: ScanPolicy::for_total(total) })
        .collect();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.engine.backend(),
        "listing_limit": state.config.listing_limit,
        "max_upload_bytes": state.config.max_upload_bytes,
        "policies": policies,
    }))
}

/// Fields of a `/process` upload.
#[derive(Default)]
struct Upload {
    selfie: Option<Selfie>,
    drive_link: Option<String>,
}

struct Selfie {
    file_name: String,
    bytes: Vec<u8>,
}

impl Upload {
    async fn read(mut multipart: Multipart, max_bytes: usize) -> ServerResult<Self> {
        let mut upload = Upload::default();
        let too_large = |e: MultipartError| multipart_error(e, max_bytes);

        while let Some(field) = multipart.next_field().await.map_err(too_large)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("selfie") => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(too_large)?;
                    upload.selfie = Some(Selfie { file_name, bytes: bytes.to_vec() });
                }
                Some("drive_link") => {
                    upload.drive_link = Some(field.text().await.map_err(too_large)?);
                }
                _ => {}
            }
        }
        Ok(upload)
    }
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(max_bytes / (1024 * 1024))
    } else {
        ServerError::BadRequest(err.body_text())
    }
}

/// POST /process: find the uploader's face in a shared folder and return
/// the matching photos as a ZIP archive.
pub async fn process(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Response> {
    let span = tracing::info_span!("process", request_id = %Uuid::new_v4());
    process_upload(state, multipart).instrument(span).await
}

async fn process_upload(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Response> {
    let started = Instant::now();
    let multipart = multipart.map_err(|_| ServerError::MissingSelfie)?;
    let upload = Upload::read(multipart, state.config.max_upload_bytes).await?;

    let selfie = upload.selfie.ok_or(ServerError::MissingSelfie)?;
    let drive_link = upload.drive_link.ok_or(ServerError::MissingDriveLink)?;
    let drive_link = drive_link.trim();
    if selfie.file_name.is_empty() {
        return Err(ServerError::EmptySelfieName);
    }
    if !is_drive_folder_url(drive_link) {
        return Err(ServerError::InvalidFolderUrl);
    }

    let reference = state.engine.encode(selfie.bytes).await?;

    let folder_id = extract_folder_id(drive_link).ok_or(ServerError::MissingFolderId)?;
    let urls = match state.lister.list(&folder_id).await {
        Ok(urls) => urls,
        Err(e) => {
            tracing::warn!(folder_id = %folder_id, error = %e, "folder listing failed");
            Vec::new()
        }
    };
    if urls.is_empty() {
        return Err(ServerError::EmptyFolder);
    }

    let report = state.engine.scan(Candidate::sequence(urls), reference).await?;
    if !report.has_matches() {
        return Err(ServerError::NoMatches);
    }

    let archive = build_archive(&report.matched)?;
    tracing::info!(
        folder_id = %folder_id,
        matches = report.matched.len(),
        examined = report.examined,
        total = report.total,
        bytes = archive.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "archive ready"
    );

    Ok((
        [
            (header::CONTENT_TYPE, ARCHIVE_MIME_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{ARCHIVE_FILE_NAME}\"")),
        ],
        archive,
    )
        .into_response())
}
