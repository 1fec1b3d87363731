//! Upload handlers: multipart form in, one conversion out.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::super::history::ConversionRecord;
use super::super::AppState;
use crate::config::{ConversionConfig, OutputFormat};
use crate::convert::document_dir;
use crate::error::{ErrorKind, Pdf2MdError};
use crate::output::OutputArtifactSet;

const SUCCESS_MESSAGE: &str = "PDF converted successfully!";

/// Everything read from the multipart body.
struct Upload {
    filename: String,
    bytes: Bytes,
    fields: HashMap<String, String>,
}

/// Why an upload did not produce a conversion.
#[derive(Debug)]
enum UploadFailure {
    /// Rejected before the orchestrator ran.
    Request { status: StatusCode, message: String },
    Conversion(Pdf2MdError),
}

impl UploadFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        UploadFailure::Request {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            UploadFailure::Request { status, .. } => *status,
            UploadFailure::Conversion(e) => status_for(e.kind()),
        }
    }

    fn kind(&self) -> String {
        match self {
            UploadFailure::Request { .. } => "UploadError".to_string(),
            UploadFailure::Conversion(e) => e.kind().to_string(),
        }
    }

    fn message(&self) -> String {
        match self {
            UploadFailure::Request { message, .. } => message.clone(),
            UploadFailure::Conversion(e) => e.to_string(),
        }
    }
}

impl From<MultipartError> for UploadFailure {
    fn from(e: MultipartError) -> Self {
        UploadFailure::Request {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<Pdf2MdError> for UploadFailure {
    fn from(e: Pdf2MdError) -> Self {
        UploadFailure::Conversion(e)
    }
}

/// HTTP status for an error kind.
pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Config => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conversion => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::LlmService => StatusCode::BAD_GATEWAY,
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A finished conversion, before it is turned into a response.
struct Converted {
    record: ConversionRecord,
    artifacts: OutputArtifactSet,
    format: OutputFormat,
}

#[derive(Serialize)]
struct ConvertResponse {
    id: String,
    filename: String,
    output_path: PathBuf,
    document_path: PathBuf,
    images: Vec<PathBuf>,
    metadata_path: PathBuf,
    output_format: OutputFormat,
    /// Document text when the output format is Markdown.
    markdown: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

/// `POST /convert`: redirect to the preview, or back to `/` with `?error=`.
pub async fn convert_form(State(state): State<AppState>, multipart: Multipart) -> Redirect {
    match handle_upload(&state, multipart).await {
        Ok(done) => Redirect::to(&format!(
            "/preview/{}?success={}",
            done.record.id,
            urlencoding::encode(SUCCESS_MESSAGE)
        )),
        Err(failure) => {
            warn!("Upload failed: {}", failure.message());
            Redirect::to(&format!(
                "/?error={}",
                urlencoding::encode(&format!("Error: {}", failure.message()))
            ))
        }
    }
}

/// `POST /api/convert`: JSON result or `{error, kind}` with a status code.
pub async fn api_convert(State(state): State<AppState>, multipart: Multipart) -> Response {
    let done = match handle_upload(&state, multipart).await {
        Ok(done) => done,
        Err(failure) => {
            warn!("Upload failed: {}", failure.message());
            let body = ErrorResponse {
                error: failure.message(),
                kind: failure.kind(),
            };
            return (failure.status(), Json(body)).into_response();
        }
    };

    let markdown = match done.format {
        OutputFormat::Markdown => tokio::fs::read_to_string(&done.artifacts.document).await.ok(),
        _ => None,
    };

    Json(ConvertResponse {
        id: done.record.id,
        filename: done.record.filename,
        output_path: done.artifacts.directory,
        document_path: done.artifacts.document,
        images: done.artifacts.images,
        metadata_path: done.artifacts.metadata,
        output_format: done.format,
        markdown,
    })
    .into_response()
}

async fn handle_upload(state: &AppState, multipart: Multipart) -> Result<Converted, UploadFailure> {
    let upload = read_upload(multipart).await?;
    let config = request_config(&state.base_config, &upload.fields)?;

    // The upload only lives as long as this request.
    let staging = tempfile::tempdir().map_err(|source| Pdf2MdError::OutputWriteFailed {
        path: std::env::temp_dir(),
        source,
    })?;
    let pdf_path = staging.path().join(&upload.filename);
    tokio::fs::write(&pdf_path, &upload.bytes)
        .await
        .map_err(|source| Pdf2MdError::OutputWriteFailed {
            path: pdf_path.clone(),
            source,
        })?;

    let id = Uuid::new_v4().to_string();
    let output_dir = document_dir(&state.output_root.join(&id), &pdf_path);
    info!(
        "Converting upload {} ({} bytes) as {}",
        upload.filename,
        upload.bytes.len(),
        id
    );

    let artifacts = state.converter.convert(&pdf_path, &output_dir, &config).await?;

    let record = ConversionRecord {
        id,
        filename: upload.filename,
        output_path: artifacts.directory.clone(),
        document_path: artifacts.document.clone(),
        timestamp: Utc::now(),
        has_preview: config.output_format == OutputFormat::Markdown,
    };
    if let Err(e) = state.history.add(record.clone()).await {
        warn!(
            "Cannot update history {}: {}",
            state.history.path().display(),
            e
        );
    }

    Ok(Converted {
        record,
        artifacts,
        format: config.output_format,
    })
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, UploadFailure> {
    let mut file: Option<(String, Bytes)> = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            file = Some((filename, bytes));
        } else {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let Some((raw_name, bytes)) = file else {
        return Err(UploadFailure::bad_request("No file part"));
    };
    if raw_name.is_empty() {
        return Err(UploadFailure::bad_request("No selected file"));
    }
    if !has_pdf_extension(&raw_name) {
        return Err(UploadFailure::bad_request(
            "Invalid file type. Please upload a PDF file.",
        ));
    }

    Ok(Upload {
        filename: secure_filename(&raw_name),
        bytes,
        fields,
    })
}

/// Apply the form's overrides to the server's base configuration.
fn request_config(
    base: &ConversionConfig,
    fields: &HashMap<String, String>,
) -> Result<ConversionConfig, Pdf2MdError> {
    let field = |name: &str| {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut builder = base.to_builder();
    if let Some(v) = field("output_format") {
        builder = builder.output_format(v.parse().map_err(Pdf2MdError::InvalidConfig)?);
    }
    if let Some(v) = field("llm_service") {
        builder = builder.llm_service(v.parse().map_err(Pdf2MdError::InvalidConfig)?);
    }
    if let Some(v) = field("ollama_model") {
        builder = builder.ollama_model(v);
    }
    if let Some(v) = field("ollama_base_url") {
        builder = builder.ollama_base_url(v);
    }
    if let Some(v) = field("use_llm") {
        let enabled = parse_flag(v)
            .ok_or_else(|| Pdf2MdError::InvalidConfig(format!("use_llm: not a boolean: '{v}'")))?;
        builder = builder.use_llm(enabled);
    }
    builder.build()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Some(true),
        "false" | "off" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn has_pdf_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied filename to `[A-Za-z0-9._-]`, keeping the `.pdf`
/// extension. Falls back to `upload.pdf`.
fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']);

    let stem_ok = Path::new(cleaned)
        .file_stem()
        .is_some_and(|s| !s.is_empty() && s.len() < cleaned.len());
    if stem_ok && has_pdf_extension(cleaned) {
        cleaned.to_string()
    } else {
        "upload.pdf".to_string()
    }
}
