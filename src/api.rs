//! HTTP surface for the PDF RAG server.
//!
//! The Axum router exposes three endpoints:
//!
//! - `POST /upload-pdf/` – Accept a multipart `file` field, save it under the upload directory,
//!   then extract, chunk, embed and index it. Returns `201 {message, file_name}`.
//! - `POST /query/` – Answer `{query, file_name}` from the chunks of a previously uploaded file.
//!   Returns `200 {answer, file_name}`.
//! - `GET /metrics` – Observe upload and query counters.
//!
//! Every route is also served without (or with) its trailing slash. Every non-2xx response
//! carries a `{detail}` body, including extractor rejections and caught panics.

use crate::service::{IngestOutcome, ProcessingError, RagApi};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

const UPLOAD_SUCCESS_MESSAGE: &str = "File processed and added to vector store successfully.";

/// Shared state handed to every handler.
struct AppState<S> {
    service: Arc<S>,
    upload_dir: Arc<PathBuf>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            upload_dir: Arc::clone(&self.upload_dir),
        }
    }
}

/// Build the HTTP router.
///
/// Uploaded files are written to `upload_dir`, which must already exist. Upload bodies larger
/// than `max_upload_bytes` are rejected.
pub fn create_router<S>(service: Arc<S>, upload_dir: PathBuf, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    let state = AppState {
        service,
        upload_dir: Arc::new(upload_dir),
    };
    let upload = post(upload_pdf::<S>).layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .route("/upload-pdf/", upload.clone())
        .route("/upload-pdf", upload)
        .route("/query/", post(query_pdf::<S>))
        .route("/query", post(query_pdf::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/metrics/", get(get_metrics::<S>))
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

/// Success response for the upload endpoint.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    file_name: String,
}

/// Request body for the query endpoint.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural-language question.
    query: String,
    /// Name the file was uploaded under.
    file_name: String,
}

/// Success response for the query endpoint.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    file_name: String,
}

/// Save an uploaded PDF and ingest it into the vector index.
async fn upload_pdf<S>(
    State(state): State<AppState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError>
where
    S: RagApi,
{
    let mut multipart =
        multipart.map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(AppError::multipart)? {
        if field.name() == Some("file") {
            return store_and_ingest(&state, field).await;
        }
    }

    Err(AppError::new(
        StatusCode::BAD_REQUEST,
        "No file provided. Send the PDF in a multipart field named 'file'.",
    ))
}

async fn store_and_ingest<S>(
    state: &AppState<S>,
    mut field: Field<'_>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError>
where
    S: RagApi,
{
    let raw_name = field.file_name().unwrap_or_default().to_string();
    if !raw_name.ends_with(".pdf") {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Invalid file type. Only PDF files are allowed.",
        ));
    }
    let file_name = sanitize_file_name(&raw_name).ok_or_else(|| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "Invalid file type. Only PDF files are allowed.",
        )
    })?;

    let path = state.upload_dir.join(&file_name);
    save_field(&mut field, &path).await?;
    tracing::info!(file_name, path = %path.display(), "Upload saved");

    match state.service.ingest_pdf(&path, &file_name).await {
        Ok(IngestOutcome::Indexed { chunk_count }) => {
            tracing::info!(file_name, chunk_count, "Upload processed");
            Ok((
                StatusCode::CREATED,
                Json(UploadResponse {
                    message: UPLOAD_SUCCESS_MESSAGE,
                    file_name,
                }),
            ))
        }
        Ok(IngestOutcome::Empty) => Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "The PDF file appears to be empty or corrupted.",
        )),
        Err(ProcessingError::Segment(error)) => Err(AppError::internal(format!(
            "Failed to process PDF: {error}"
        ))),
        Err(ProcessingError::Index(error)) => Err(AppError::internal(format!(
            "An error occurred during file processing: {error}"
        ))),
    }
}

/// Stream a multipart field to `path`.
///
/// Disk failures map to 500; a client-side read failure maps to the multipart error status and
/// removes the partial file.
async fn save_field(field: &mut Field<'_>, path: &Path) -> Result<(), AppError> {
    let save_error = |error: std::io::Error| {
        AppError::internal(format!("Failed to save uploaded file: {error}"))
    };

    let mut file = tokio::fs::File::create(path).await.map_err(save_error)?;
    loop {
        match field.chunk().await {
            Ok(Some(bytes)) => file.write_all(&bytes).await.map_err(save_error)?,
            Ok(None) => break,
            Err(error) => {
                drop(file);
                if let Err(remove_error) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), %remove_error, "Failed to remove partial upload");
                }
                return Err(AppError::multipart(error));
            }
        }
    }
    file.flush().await.map_err(save_error)?;
    Ok(())
}

/// Answer a question about a previously uploaded file.
async fn query_pdf<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    let Json(request) =
        payload.map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;
    let QueryRequest { query, file_name } = request;

    if !is_uploaded(&state.upload_dir, &file_name).await {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            format!("File not found: {file_name}. Please upload it first."),
        ));
    }

    let answer = state
        .service
        .answer(&query, &file_name)
        .await
        .map_err(|error| {
            AppError::internal(format!(
                "An error occurred while generating the answer: {error}"
            ))
        })?;
    tracing::info!(file_name, "Query answered");
    Ok(Json(QueryResponse { answer, file_name }))
}

/// Return upload and query counters.
async fn get_metrics<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    Json(state.service.metrics_snapshot())
}

/// Reduce a client-supplied file name to its last path component.
///
/// Returns `None` when nothing usable remains.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

/// `true` when `file_name` is a plain base name with a matching file in `upload_dir`.
async fn is_uploaded(upload_dir: &Path, file_name: &str) -> bool {
    if sanitize_file_name(file_name).as_deref() != Some(file_name) {
        return false;
    }
    tokio::fs::metadata(upload_dir.join(file_name))
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    AppError::internal(format!("An internal server error occurred: {message}")).into_response()
}

/// Error response rendered as `{detail}` with an explicit status.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    fn multipart(error: MultipartError) -> Self {
        Self::new(error.status(), format!("Invalid multipart body: {}", error.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "Request failed");
        } else {
            tracing::warn!(status = %self.status, detail = %self.detail, "Request rejected");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::answer::AnswerError;
    use crate::completion::CompletionError;
    use crate::metrics::MetricsSnapshot;
    use crate::segmenter::SegmentError;
    use crate::service::{IngestOutcome, ProcessingError, RagApi};
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfragboundary";

    #[derive(Clone, Copy)]
    enum IngestBehavior {
        Indexed,
        Empty,
        ExtractionFails,
        Panics,
    }

    struct StubRagService {
        behavior: IngestBehavior,
        ingested: Mutex<Vec<(PathBuf, String)>>,
        fail_answers: bool,
    }

    impl StubRagService {
        fn new(behavior: IngestBehavior) -> Self {
            Self {
                behavior,
                ingested: Mutex::new(Vec::new()),
                fail_answers: false,
            }
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest_pdf(
            &self,
            path: &Path,
            file_name: &str,
        ) -> Result<IngestOutcome, ProcessingError> {
            self.ingested
                .lock()
                .await
                .push((path.to_path_buf(), file_name.to_string()));
            match self.behavior {
                IngestBehavior::Indexed => Ok(IngestOutcome::Indexed { chunk_count: 3 }),
                IngestBehavior::Empty => Ok(IngestOutcome::Empty),
                IngestBehavior::ExtractionFails => {
                    Err(ProcessingError::Segment(SegmentError::Extraction {
                        path: path.to_path_buf(),
                        message: "invalid xref".into(),
                    }))
                }
                IngestBehavior::Panics => panic!("extractor exploded"),
            }
        }

        async fn answer(&self, query: &str, file_name: &str) -> Result<String, AnswerError> {
            if self.fail_answers {
                return Err(AnswerError::Completion(CompletionError::GenerationFailed(
                    "provider returned 429".into(),
                )));
            }
            Ok(format!("{file_name}: {query}"))
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_indexed: 1,
                chunks_indexed: 3,
                queries_answered: 2,
            }
        }
    }

    fn app(service: Arc<StubRagService>, dir: &Path) -> Router {
        create_router(service, dir.to_path_buf(), 1024 * 1024)
    }

    fn multipart_request(uri: &str, field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn query_request(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn upload_saves_file_and_reports_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service.clone(), dir.path())
            .oneshot(multipart_request("/upload-pdf/", "file", "report.pdf", b"%PDF-1.4 body"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = json_body(response).await;
        assert_eq!(
            json["message"],
            "File processed and added to vector store successfully."
        );
        assert_eq!(json["file_name"], "report.pdf");

        let saved = std::fs::read(dir.path().join("report.pdf")).expect("saved file");
        assert_eq!(saved, b"%PDF-1.4 body");
        let calls = service.ingested.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "report.pdf");
    }

    #[tokio::test]
    async fn upload_route_accepts_missing_trailing_slash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(multipart_request("/upload-pdf", "file", "a.pdf", b"%PDF"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service.clone(), dir.path())
            .oneshot(multipart_request("/upload-pdf/", "file", "notes.txt", b"plain text"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["detail"], "Invalid file type. Only PDF files are allowed.");
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
        assert!(service.ingested.lock().await.is_empty());
    }

    #[tokio::test]
    async fn upload_strips_directory_components() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service.clone(), dir.path())
            .oneshot(multipart_request(
                "/upload-pdf/",
                "file",
                "../../etc/evil.pdf",
                b"%PDF",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["file_name"], "evil.pdf");
        assert!(dir.path().join("evil.pdf").exists());
    }

    #[tokio::test]
    async fn upload_without_file_field_is_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(multipart_request("/upload-pdf/", "document", "a.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn upload_of_empty_document_is_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Empty));

        let response = app(service, dir.path())
            .oneshot(multipart_request("/upload-pdf/", "file", "blank.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "The PDF file appears to be empty or corrupted."
        );
    }

    #[tokio::test]
    async fn extraction_failure_is_internal_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::ExtractionFails));

        let response = app(service, dir.path())
            .oneshot(multipart_request("/upload-pdf/", "file", "broken.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"]
            .as_str()
            .expect("detail")
            .to_string();
        assert!(detail.starts_with("Failed to process PDF: "));
        assert!(detail.contains("invalid xref"));
    }

    #[tokio::test]
    async fn panics_are_reported_as_detail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Panics));

        let response = app(service, dir.path())
            .oneshot(multipart_request("/upload-pdf/", "file", "boom.pdf", b"%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["detail"],
            "An internal server error occurred: extractor exploded"
        );
    }

    #[tokio::test]
    async fn query_unknown_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(query_request(
                "/query/",
                json!({ "query": "What is this?", "file_name": "missing.pdf" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await["detail"],
            "File not found: missing.pdf. Please upload it first."
        );
    }

    #[tokio::test]
    async fn query_rejects_path_traversal_as_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uploads = dir.path().join("uploads");
        std::fs::create_dir(&uploads).expect("uploads dir");
        std::fs::write(dir.path().join("secret.pdf"), b"%PDF").expect("outside file");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, &uploads)
            .oneshot(query_request(
                "/query/",
                json!({ "query": "q", "file_name": "../secret.pdf" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query_existing_file_returns_answer() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("guide.pdf"), b"%PDF").expect("uploaded file");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(query_request(
                "/query",
                json!({ "query": "What is covered?", "file_name": "guide.pdf" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["answer"], "guide.pdf: What is covered?");
        assert_eq!(json["file_name"], "guide.pdf");
    }

    #[tokio::test]
    async fn query_generation_failure_is_internal_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("guide.pdf"), b"%PDF").expect("uploaded file");
        let mut stub = StubRagService::new(IngestBehavior::Indexed);
        stub.fail_answers = true;

        let response = app(Arc::new(stub), dir.path())
            .oneshot(query_request(
                "/query/",
                json!({ "query": "q", "file_name": "guide.pdf" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        let detail = json["detail"].as_str().expect("detail");
        assert!(detail.starts_with("An error occurred while generating the answer: "));
        assert!(detail.contains("429"));
    }

    #[tokio::test]
    async fn malformed_query_body_carries_detail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(query_request("/query/", json!({ "question": "missing fields" })))
            .await
            .expect("router response");

        assert!(response.status().is_client_error());
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = Arc::new(StubRagService::new(IngestBehavior::Indexed));

        let response = app(service, dir.path())
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "documents_indexed": 1, "chunks_indexed": 3, "queries_answered": 2 })
        );
    }
}
