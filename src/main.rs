//! Unification engine - screenshot upload, OCR, and signal-scan server.

mod config;
mod content_store;
mod ocr;
mod signals;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use content_store::{ContentStore, StoreError};
use ocr::{OcrError, TextExtractor};
use signals::SignalReport;

const ENGINE_NAME: &str = "Unification v2.0";
const ENGINE_MODE: &str = "Basketball 1H Structural Analysis";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: ContentStore,
    extractor: Arc<dyn TextExtractor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unification_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store = ContentStore::open(config.uploads_dir.as_str()).await?;
    info!("Uploads directory: {}", store.root().display());

    // Probe once; the chosen engine is fixed for the process lifetime.
    let extractor = ocr::select_engine(config.ocr_sidecar_url.as_deref()).await;
    info!(
        "Text extraction engine: {} (available: {})",
        extractor.name(),
        extractor.available()
    );

    let state = AppState { store, extractor };
    let app = app(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Split out of `main` so tests can drive it directly.
fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api", get(api_status))
        .route("/upload", post(upload))
        .route("/extract/{file_id}", get(extract))
        .route("/parse/{file_id}", get(parse))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ApiStatus {
    engine: &'static str,
    status: &'static str,
    mode: &'static str,
    ocr_available: bool,
}

#[derive(Serialize)]
struct NextLinks {
    extract_text: String,
    parse: String,
}

#[derive(Serialize)]
struct UploadResponse {
    ok: bool,
    file_id: String,
    filename: String,
    stored_at: String,
    next: NextLinks,
}

#[derive(Serialize)]
struct ExtractResponse {
    ok: bool,
    file_id: String,
    text: String,
}

#[derive(Serialize)]
struct ParseResponse {
    ok: bool,
    file_id: String,
    parsed: SignalReport,
}

/// Body of every failure response.
#[derive(Serialize)]
struct ApiFailure {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

type ApiError = (StatusCode, Json<ApiFailure>);

fn failure(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiFailure {
            ok: false,
            error: error.into(),
            detail: None,
        }),
    )
}

fn failure_with_detail(
    status: StatusCode,
    error: impl Into<String>,
    detail: impl Into<String>,
) -> ApiError {
    (
        status,
        Json(ApiFailure {
            ok: false,
            error: error.into(),
            detail: Some(detail.into()),
        }),
    )
}

fn store_failure(err: StoreError) -> ApiError {
    match &err {
        StoreError::EmptyPayload => failure(StatusCode::BAD_REQUEST, err.to_string()),
        StoreError::NotFound(_) => failure(StatusCode::NOT_FOUND, err.to_string()),
        StoreError::AmbiguousId(_) => {
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        StoreError::Io(e) => {
            error!("Storage error: {}", e);
            failure_with_detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage I/O failed",
                e.to_string(),
            )
        }
    }
}

fn ocr_failure(err: OcrError) -> ApiError {
    match &err {
        OcrError::Unavailable => failure(StatusCode::NOT_IMPLEMENTED, err.to_string()),
        OcrError::InvalidImage(detail) | OcrError::Engine(detail) => failure_with_detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text extraction failed",
            detail.clone(),
        ),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Engine status endpoint.
async fn api_status(State(state): State<AppState>) -> Json<ApiStatus> {
    Json(ApiStatus {
        engine: ENGINE_NAME,
        status: "running",
        mode: ENGINE_MODE,
        ocr_available: state.extractor.available(),
    })
}

/// Accept a screenshot upload and store it under a fresh id.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename: Option<String> = None;
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        failure_with_detail(StatusCode::BAD_REQUEST, "multipart error", e.to_string())
    })? {
        if field.name() == Some("file") {
            let content_type = field.content_type().unwrap_or("").to_string();
            if !content_type.starts_with("image/") {
                return Err(failure(
                    StatusCode::BAD_REQUEST,
                    format!("unsupported content type: {}", content_type),
                ));
            }
            filename = field.file_name().map(|s| s.to_string());
            file_data = field
                .bytes()
                .await
                .map_err(|e| {
                    failure_with_detail(
                        StatusCode::BAD_REQUEST,
                        "failed to read upload",
                        e.to_string(),
                    )
                })?
                .to_vec();
            break;
        }
    }

    let stored = state
        .store
        .store(&file_data, filename.as_deref())
        .await
        .map_err(store_failure)?;

    info!(
        "Received {} ({} bytes) as {} (sha256={})",
        filename.as_deref().unwrap_or("<unnamed>"),
        file_data.len(),
        stored.id,
        stored.sha256
    );

    Ok(Json(UploadResponse {
        ok: true,
        file_id: stored.id.clone(),
        filename: filename.unwrap_or_else(|| format!("upload{}", stored.extension)),
        stored_at: stored.path.display().to_string(),
        next: NextLinks {
            extract_text: format!("/extract/{}", stored.id),
            parse: format!("/parse/{}", stored.id),
        },
    }))
}

/// Return raw extracted text for a stored screenshot.
async fn extract(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let text = run_extraction(&state, &file_id).await?;
    Ok(Json(ExtractResponse {
        ok: true,
        file_id,
        text,
    }))
}

/// Run the keyword-signal scan over extracted text.
async fn parse(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ParseResponse>, ApiError> {
    let text = run_extraction(&state, &file_id).await?;
    Ok(Json(ParseResponse {
        ok: true,
        file_id,
        parsed: signals::scan_text(&text),
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Resolve a stored file and run the configured engine over it.
///
/// The id is resolved first, so an unknown id reports 404 even when no
/// engine is available.
async fn run_extraction(state: &AppState, file_id: &str) -> Result<String, ApiError> {
    let path = state.store.resolve(file_id).await.map_err(store_failure)?;

    if !state.extractor.available() {
        return Err(ocr_failure(OcrError::Unavailable));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read {}: {}", path.display(), e);
        failure_with_detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage I/O failed",
            e.to_string(),
        )
    })?;

    let text = state.extractor.extract_text(&bytes).await.map_err(|e| {
        error!("Extraction failed for {}: {}", file_id, e);
        ocr_failure(e)
    })?;

    Ok(ocr::cap_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    /// Engine stand-in returning a fixed string.
    struct FakeExtractor(String);

    #[async_trait::async_trait]
    impl TextExtractor for FakeExtractor {
        fn name(&self) -> &str {
            "fake"
        }

        async fn extract_text(&self, _image: &[u8]) -> Result<String, OcrError> {
            Ok(self.0.clone())
        }
    }

    async fn test_app(extractor: Arc<dyn TextExtractor>) -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let state = AppState { store, extractor };
        (dir, app(state, 1024 * 1024))
    }

    fn multipart_request(content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"shot.png\"\r\n\
                 Content-Type: {}\r\n\r\n",
                content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn test_api_status_reports_missing_engine() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;
        let response = app
            .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["engine"], "Unification v2.0");
        assert_eq!(body["status"], "running");
        assert_eq!(body["ocr_available"], false);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;
        let response = app
            .oneshot(multipart_request("text/plain", b"0123456789"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_payload() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;
        let response = app
            .oneshot(multipart_request("image/png", b""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_upload_then_extract_without_engine_is_501() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;

        let response = app
            .clone()
            .oneshot(multipart_request("image/png", b"0123456789"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        let file_id = body["file_id"].as_str().unwrap().to_string();
        assert_eq!(
            body["next"]["extract_text"],
            format!("/extract/{}", file_id)
        );
        assert_eq!(body["next"]["parse"], format!("/parse/{}", file_id));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/extract/{}", file_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_extract_unknown_id_is_404_even_without_engine() {
        let (_dir, app) = test_app(Arc::new(ocr::UnavailableExtractor)).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/extract/deadbeef")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_parse_end_to_end() {
        let fake = Arc::new(FakeExtractor("Over/Under Total\n1st Half".to_string()));
        let (_dir, app) = test_app(fake).await;

        let response = app
            .clone()
            .oneshot(multipart_request("image/png", b"0123456789"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let file_id = body["file_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/parse/{}", file_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        let parsed = &body["parsed"];
        assert_eq!(parsed["signals"]["mentions_over"], true);
        assert_eq!(parsed["signals"]["mentions_under"], true);
        assert_eq!(parsed["signals"]["mentions_total"], true);
        assert_eq!(parsed["signals"]["mentions_1st_half"], true);
        assert_eq!(parsed["raw_sample"], "Over/Under Total 1st Half");
        assert!(parsed["ladder"].is_null());
    }

    #[tokio::test]
    async fn test_extract_caps_text_length() {
        let long = "x".repeat(ocr::MAX_TEXT_CHARS + 500);
        let (_dir, app) = test_app(Arc::new(FakeExtractor(long))).await;

        let response = app
            .clone()
            .oneshot(multipart_request("image/png", b"0123456789"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let file_id = body["file_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/extract/{}", file_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(
            body["text"].as_str().unwrap().chars().count(),
            ocr::MAX_TEXT_CHARS
        );
    }
}
