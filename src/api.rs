//! HTTP surface for the document service.
//!
//! - `GET /` – Liveness greeting.
//! - `POST /upload` – Store, transform and index multipart `file` fields; returns indexing counters.
//! - `POST /chat` – Answer a question over indexed documents within a chat session.
//! - `GET /chat/:session_id` / `DELETE /chat/:session_id` – Read or reset a session's history.
//! - `POST /sentiment` – Classify free text as Positive, Neutral or Negative.
//! - `POST /summarize` – Summarize each uploaded file.
//! - `GET /metrics` – Activity counters.
//! - `GET /commands` – Machine-readable catalog of the routes above.

use crate::chat::{ChatMessage, SessionStore};
use crate::error::ProcessingError;
use crate::ingestion::UploadedFile;
use crate::pipeline::{DocumentApi, DocumentProcessingOutcome, Sentiment};
use axum::{
    Json, Router,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error as _;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handler state: the service plus chat sessions.
pub struct AppState<S> {
    service: Arc<S>,
    sessions: Arc<SessionStore>,
}

impl<S> AppState<S> {
    /// State around `service` with an empty session store.
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Build the HTTP router exposing the document API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    router(AppState::new(service))
}

fn router<S>(state: AppState<S>) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/", get(hello))
        .route("/upload", post(upload::<S>))
        .route("/chat", post(chat::<S>))
        .route(
            "/chat/:session_id",
            get(chat_history::<S>).delete(reset_chat::<S>),
        )
        .route("/sentiment", post(sentiment::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(state)
}

async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello World!" }))
}

/// Response body for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    result: &'static str,
    #[serde(flatten)]
    outcome: DocumentProcessingOutcome,
}

/// Store uploaded files in a new run, transform them and index the chunks.
async fn upload<S>(
    State(state): State<AppState<S>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let files = collect_files(multipart).await?;
    let outcome = state.service.process_documents(files).await?;
    tracing::info!(
        files = outcome.files,
        chunks = outcome.chunks,
        added = outcome.indexing.num_added,
        skipped = outcome.indexing.num_skipped,
        deleted = outcome.indexing.num_deleted,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        result: "Data Processed",
        outcome,
    }))
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequestBody {
    question: String,
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    session_id: Uuid,
}

/// Answer a question and append the exchange to the session.
///
/// Without a session id a new session is started once the answer succeeds, so failed requests
/// leave no state behind. Unknown ids are rejected before the question is answered.
async fn chat<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<ChatRequestBody>,
) -> Result<Json<ChatResponse>, AppError>
where
    S: DocumentApi,
{
    let ChatRequestBody {
        question,
        session_id,
    } = request;
    let Some(session_id) = session_id else {
        let answer = state.service.answer_question(&question).await?;
        let session_id = state.sessions.start(&question, &answer).await;
        return Ok(Json(ChatResponse { answer, session_id }));
    };

    if !state.sessions.contains(session_id).await {
        return Err(AppError::NotFound("Unknown chat session"));
    }
    let answer = state.service.answer_question(&question).await?;
    if !state
        .sessions
        .record_exchange(session_id, &question, &answer)
        .await
    {
        return Err(AppError::NotFound("Unknown chat session"));
    }
    Ok(Json(ChatResponse { answer, session_id }))
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

async fn chat_history<S>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError>
where
    S: DocumentApi,
{
    state
        .sessions
        .history(session_id)
        .await
        .map(|messages| Json(HistoryResponse { messages }))
        .ok_or(AppError::NotFound("Unknown chat session"))
}

async fn reset_chat<S>(
    State(state): State<AppState<S>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError>
where
    S: DocumentApi,
{
    if state.sessions.reset(session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Unknown chat session"))
    }
}

#[derive(Deserialize)]
struct SentimentRequest {
    text: String,
}

#[derive(Serialize)]
struct SentimentResponse {
    sentiment: Sentiment,
}

async fn sentiment<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<SentimentRequest>,
) -> Result<Json<SentimentResponse>, AppError>
where
    S: DocumentApi,
{
    let sentiment = state.service.analyze_sentiment(&request.text).await?;
    Ok(Json(SentimentResponse { sentiment }))
}

#[derive(Serialize)]
struct SummarizeResponse {
    summaries: BTreeMap<String, String>,
}

async fn summarize<S>(
    State(state): State<AppState<S>>,
    multipart: Multipart,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: DocumentApi,
{
    let files = collect_files(multipart).await?;
    let summaries = state.service.summarize_documents(files).await?;
    tracing::info!(count = summaries.len(), "Summarize request completed");
    Ok(Json(SummarizeResponse { summaries }))
}

async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(state.service.metrics_snapshot())
}

/// Gather every multipart `file` field; other fields are ignored.
async fn collect_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }
    if files.is_empty() {
        return Err(AppError::BadRequest("No files provided".into()));
    }
    Ok(files)
}

/// Descriptor for a single route in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP routes for discovery by clients.
async fn get_commands() -> Json<CommandsResponse> {
    let command = |name, method, path, description| CommandDescriptor {
        name,
        method,
        path,
        description,
    };
    Json(CommandsResponse {
        commands: vec![
            command(
                "upload",
                "POST",
                "/upload",
                "Store multipart `file` fields, chunk them and index the chunks in Qdrant.",
            ),
            command(
                "chat",
                "POST",
                "/chat",
                "Answer { \"question\", \"session_id\"? } from the indexed documents.",
            ),
            command("chat_history", "GET", "/chat/:session_id", "Return a session's messages."),
            command("chat_reset", "DELETE", "/chat/:session_id", "Reset a session to the greeting."),
            command("sentiment", "POST", "/sentiment", "Classify { \"text\" } as Positive, Neutral or Negative."),
            command("summarize", "POST", "/summarize", "Summarize each uploaded multipart `file` field."),
            command("metrics", "GET", "/metrics", "Return ingestion and request counters."),
        ],
    })
}

enum AppError {
    BadRequest(String),
    NotFound(&'static str),
    Processing(ProcessingError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Self::Processing(err) => {
                let detail = cause_chain(&err);
                tracing::error!(error = %detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Request failed", "detail": detail })),
                )
                    .into_response()
            }
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(err.body_text())
    }
}

/// `err` followed by each distinct source message.
fn cause_chain(err: &ProcessingError) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !detail.contains(&message) {
            detail.push_str(": ");
            detail.push_str(&message);
        }
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::ReaderError;
    use crate::metrics::MetricsSnapshot;
    use crate::pipeline::IndexingOutcome;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-test-boundary";

    #[derive(Default)]
    struct StubDocumentService {
        uploads: Mutex<Vec<Vec<UploadedFile>>>,
        questions: AtomicUsize,
        fail_questions: bool,
    }

    #[async_trait]
    impl DocumentApi for StubDocumentService {
        async fn process_documents(
            &self,
            files: Vec<UploadedFile>,
        ) -> Result<DocumentProcessingOutcome, ProcessingError> {
            let count = files.len();
            self.uploads.lock().await.push(files);
            Ok(DocumentProcessingOutcome {
                files: count,
                chunks: 3,
                indexing: IndexingOutcome {
                    num_added: 3,
                    num_skipped: 0,
                    num_deleted: 0,
                },
            })
        }

        async fn answer_question(&self, question: &str) -> Result<String, ProcessingError> {
            self.questions.fetch_add(1, Ordering::SeqCst);
            if self.fail_questions {
                return Err(ProcessingError::new(
                    "failed to answer question",
                    ReaderError::Task {
                        path: "x".into(),
                        message: "backend down".into(),
                    },
                ));
            }
            Ok(format!("answer to {question}"))
        }

        async fn summarize_documents(
            &self,
            files: Vec<UploadedFile>,
        ) -> Result<BTreeMap<String, String>, ProcessingError> {
            Ok(files
                .into_iter()
                .map(|file| (file.name, "short".to_string()))
                .collect())
        }

        async fn analyze_sentiment(&self, _text: &str) -> Result<Sentiment, ProcessingError> {
            Ok(Sentiment::Positive)
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                files_ingested: 1,
                ..MetricsSnapshot::default()
            }
        }
    }

    fn multipart_body(files: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, contents) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n{contents}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn multipart_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn hello_route_greets() {
        let app = create_router(Arc::new(StubDocumentService::default()));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "message": "Hello World!" }));
    }

    #[tokio::test]
    async fn upload_forwards_files_and_reports_counters() {
        let service = Arc::new(StubDocumentService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(multipart_request(
                "/upload",
                &[("notes.txt", "alpha"), ("My Report.md", "# beta")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["result"], "Data Processed");
        assert_eq!(json["files"], 2);
        assert_eq!(json["num_added"], 3);

        let uploads = service.uploads.lock().await;
        assert_eq!(uploads[0][0].name, "notes.txt");
        assert_eq!(uploads[0][1].name, "My Report.md");
        assert_eq!(uploads[0][1].bytes, b"# beta");
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        let app = create_router(Arc::new(StubDocumentService::default()));
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nnothing\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "error": "No files provided" }));
    }

    #[tokio::test]
    async fn chat_records_history_per_session() {
        let app = create_router(Arc::new(StubDocumentService::default()));

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/chat", json!({ "question": "total?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["answer"], "answer to total?");
        let session_id = json["session_id"].as_str().unwrap().to_string();

        let follow_up = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/chat",
                json!({ "question": "due?", "session_id": session_id }),
            ))
            .await
            .unwrap();
        assert_eq!(follow_up.status(), StatusCode::OK);
        assert_eq!(json_body(follow_up).await["session_id"], session_id.as_str());

        let history = app
            .clone()
            .oneshot(
                Request::get(format!("/chat/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let messages = json_body(history).await["messages"].clone();
        assert_eq!(messages.as_array().unwrap().len(), 5);
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[1], json!({ "role": "user", "content": "total?" }));
        assert_eq!(messages[4], json!({ "role": "assistant", "content": "answer to due?" }));

        let reset = app
            .clone()
            .oneshot(
                Request::delete(format!("/chat/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::NO_CONTENT);

        let history = app
            .oneshot(
                Request::get(format!("/chat/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(history).await["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_answers_return_detail_and_start_no_session() {
        let service = Arc::new(StubDocumentService {
            fail_questions: true,
            ..StubDocumentService::default()
        });
        let state = AppState::new(service);
        let sessions = state.sessions.clone();
        let app = router(state);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(json_request(Method::POST, "/chat", json!({ "question": "total?" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let json = json_body(response).await;
            assert_eq!(json["error"], "Request failed");
            assert!(
                json["detail"]
                    .as_str()
                    .unwrap()
                    .starts_with("failed to answer question")
            );
        }
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_session_ids_are_rejected_without_answering() {
        let service = Arc::new(StubDocumentService::default());
        let state = AppState::new(service.clone());
        let sessions = state.sessions.clone();
        let app = router(state);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(json_request(
                    Method::POST,
                    "/chat",
                    json!({ "question": "total?", "session_id": Uuid::new_v4() }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(
                json_body(response).await,
                json!({ "error": "Unknown chat session" })
            );
        }
        assert!(sessions.is_empty().await);
        assert_eq!(service.questions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sentiment_and_summaries_round_trip_through_json() {
        let app = create_router(Arc::new(StubDocumentService::default()));

        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/sentiment", json!({ "text": "great" })))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "sentiment": "Positive" }));

        let response = app
            .oneshot(multipart_request("/summarize", &[("a.txt", "alpha")]))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "summaries": { "a.txt": "short" } })
        );
    }

    #[tokio::test]
    async fn metrics_and_commands_are_exposed() {
        let app = create_router(Arc::new(StubDocumentService::default()));
        let response = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["files_ingested"], 1);

        let commands = get_commands().await.0.commands;
        let upload = commands.iter().find(|cmd| cmd.name == "upload").unwrap();
        assert_eq!(upload.method, "POST");
        assert!(commands.len() >= 6);
    }
}
