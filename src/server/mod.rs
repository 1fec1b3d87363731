//! Web front-end for uploading and converting PDFs.
//!
//! - `GET /` upload form and recent conversions
//! - `POST /convert` form upload, redirects to the preview or back with an error
//! - `POST /api/convert` same conversion, JSON in and out
//! - `GET /preview/:id`, `GET /download/:id/:kind`, `GET /api/conversions`
//!
//! One request runs one conversion. The only shared mutable state is the
//! history file, guarded by a mutex.

mod assets;
mod handlers;
pub mod history;
mod routes;
mod templates;

pub use history::{ConversionHistory, ConversionRecord, DEFAULT_MAX_ENTRIES};
pub use routes::create_router;

use crate::config::ConversionConfig;
use crate::convert::Converter;
use std::path::PathBuf;
use std::sync::Arc;

/// Default request body limit (20 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Models offered in the upload form alongside the configured one.
pub const SUGGESTED_MODELS: &[&str] = &["qwen2.5:14b", "qwen2.5:7b", "llama3:8b", "mistral:7b"];

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    /// Defaults that each request's form fields override.
    pub base_config: Arc<ConversionConfig>,
    pub converter: Converter,
    /// Each conversion writes to `<output_root>/<id>/<pdf stem>/`.
    pub output_root: PathBuf,
    pub history: Arc<ConversionHistory>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        base_config: ConversionConfig,
        output_root: impl Into<PathBuf>,
        history_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_config: Arc::new(base_config),
            converter: Converter::new(),
            output_root: output_root.into(),
            history: Arc::new(ConversionHistory::new(history_file, DEFAULT_MAX_ENTRIES)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

/// Bind `host:port` and serve until the process is stopped.
pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineServices, ExtractionEngine};
    use crate::error::Pdf2MdError;
    use crate::output::RenderedDocument;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Map, Value};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfmark-test-boundary";

    /// Returns a fixed document and records whether it was handed an LLM.
    #[derive(Default)]
    struct StubEngine {
        saw_llm: AtomicBool,
    }

    #[async_trait]
    impl ExtractionEngine for StubEngine {
        async fn extract(
            &self,
            _pdf_path: &Path,
            config: &ConversionConfig,
            services: &EngineServices,
        ) -> Result<RenderedDocument, Pdf2MdError> {
            self.saw_llm.store(services.llm.is_some(), Ordering::SeqCst);
            let mut images = BTreeMap::new();
            images.insert("_page_0_Picture_0.png".to_string(), vec![0x89, b'P', b'N', b'G']);
            let mut metadata = Map::new();
            metadata.insert("pages".into(), json!(1));
            Ok(RenderedDocument {
                text: "# Stub <Title>\n\nBody text.\n".into(),
                format: config.output_format,
                images,
                metadata,
            })
        }
    }

    fn setup_test_app() -> (axum::Router, AppState, Arc<StubEngine>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let engine = Arc::new(StubEngine::default());
        let state = AppState::new(
            ConversionConfig::default(),
            dir.path().join("output"),
            dir.path().join("history.json"),
        )
        .with_converter(Converter::with_engine(engine.clone()));
        (create_router(state.clone()), state, engine, dir)
    }

    fn multipart(filename: &str, content: &[u8], fields: &[(&str, &str)]) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }

    fn upload(uri: &str, filename: &str, content: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let (content_type, body) = multipart(filename, content, fields);
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &axum::response::Response) -> String {
        response.headers()[header::LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_index_renders_upload_form() {
        let (app, _, _, _dir) = setup_test_app();
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("qwen2.5:7b"));
        assert!(html.contains("No conversions yet"));
    }

    #[tokio::test]
    async fn test_form_convert_redirects_to_preview() {
        let (app, state, engine, _dir) = setup_test_app();
        let response = app
            .clone()
            .oneshot(upload(
                "/convert",
                "My Report.pdf",
                b"%PDF-1.7 stub",
                &[("use_llm", "false")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = location(&response);
        assert!(target.starts_with("/preview/"), "{target}");
        assert!(target.contains("success="));
        assert!(!engine.saw_llm.load(Ordering::SeqCst));

        let records = state.history.recent().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "My_Report.pdf");
        assert!(records[0].document_path.ends_with("My_Report/My_Report.md"));
        assert!(records[0].metadata_path().is_file());

        let page = body_string(app.oneshot(get(&target)).await.unwrap()).await;
        assert!(page.contains("# Stub &lt;Title&gt;"));
        assert!(page.contains("My_Report.pdf"));
    }

    #[tokio::test]
    async fn test_use_llm_field_enables_service() {
        let (app, _, engine, _dir) = setup_test_app();
        let response = app
            .oneshot(upload(
                "/api/convert",
                "a.pdf",
                b"%PDF-1.4",
                &[("use_llm", "false"), ("use_llm", "true"), ("ollama_model", "mistral:7b")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(engine.saw_llm.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_non_pdf_upload_redirects_with_error() {
        let (app, state, _, _dir) = setup_test_app();
        let response = app
            .oneshot(upload("/convert", "notes.txt", b"%PDF-1.4", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with("/?error="));
        assert!(state.history.recent().await.is_empty());
    }

    #[tokio::test]
    async fn test_api_convert_returns_paths_and_markdown() {
        let (app, _, _, _dir) = setup_test_app();
        let response = app
            .oneshot(upload("/api/convert", "paper.pdf", b"%PDF-1.7", &[("use_llm", "off")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["filename"], "paper.pdf");
        assert_eq!(json["output_format"], "markdown");
        assert_eq!(json["images"].as_array().unwrap().len(), 1);
        assert!(json["markdown"].as_str().unwrap().starts_with("# Stub"));
        assert!(json["metadata_path"].as_str().unwrap().ends_with("meta.json"));
    }

    #[tokio::test]
    async fn test_api_convert_html_has_no_inline_markdown() {
        let (app, _, _, _dir) = setup_test_app();
        let response = app
            .oneshot(upload(
                "/api/convert",
                "paper.pdf",
                b"%PDF-1.7",
                &[("use_llm", "false"), ("output_format", "html")],
            ))
            .await
            .unwrap();
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["document_path"].as_str().unwrap().ends_with("paper.html"));
        assert_eq!(json["markdown"], Value::Null);
    }

    #[tokio::test]
    async fn test_api_convert_error_status_follows_kind() {
        let (app, _, _, _dir) = setup_test_app();
        let response = app
            .clone()
            .oneshot(upload("/api/convert", "fake.pdf", b"hello", &[("use_llm", "false")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["kind"], "ConversionError");

        let response = app
            .oneshot(upload(
                "/api/convert",
                "ok.pdf",
                b"%PDF-1.7",
                &[("output_format", "docx")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["kind"], "ConfigError");
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_rejected() {
        let (_, state, _, _dir) = setup_test_app();
        let app = create_router(state.with_max_upload_bytes(64));
        let response = app
            .oneshot(upload("/api/convert", "big.pdf", &[b'%'; 1024], &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_download_and_listing() {
        let (app, state, _, _dir) = setup_test_app();
        app.clone()
            .oneshot(upload("/api/convert", "doc.pdf", b"%PDF-1.7", &[("use_llm", "false")]))
            .await
            .unwrap();
        let id = state.history.recent().await[0].id.clone();

        let response = app
            .clone()
            .oneshot(get(&format!("/download/{id}/meta")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(body_string(response).await.contains("\"pages\": 1"));

        let response = app
            .clone()
            .oneshot(get(&format!("/download/{id}/md")))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"doc.md\""
        );

        let response = app
            .clone()
            .oneshot(get(&format!("/download/{id}/exe")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(get("/download/unknown/md"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let listing: Value =
            serde_json::from_str(&body_string(app.oneshot(get("/api/conversions")).await.unwrap()).await)
                .unwrap();
        assert_eq!(listing.as_array().unwrap().len(), 1);
        assert_eq!(listing[0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_unknown_routes_and_static_assets() {
        let (app, _, _, _dir) = setup_test_app();
        let response = app.clone().oneshot(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.clone().oneshot(get("/preview/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/static/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    }
}
