//! HTTP surface: login, admin file management, chat, and a health probe.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use docqa_core::{
    authorize_admin, login, AdminPolicy, AnswerCoordinator, AuthenticatedUser, ChatAnswer,
    CompletionModel, DeleteReceipt, Document, DocumentRepository, Embedder, IdentityProvider,
    IngestionService, LoginSession, ObjectStore, RagError, UploadReceipt,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub type Ingestion =
    IngestionService<Arc<dyn DocumentRepository>, Arc<dyn ObjectStore>, Arc<dyn Embedder>>;
pub type Answers =
    AnswerCoordinator<Arc<dyn DocumentRepository>, Arc<dyn Embedder>, Arc<dyn CompletionModel>>;

/// Concrete backends the services are assembled from.
pub struct Backends {
    pub repository: Arc<dyn DocumentRepository>,
    pub objects: Arc<dyn ObjectStore>,
    pub embedder: Arc<dyn Embedder>,
    pub completion: Arc<dyn CompletionModel>,
    pub identity: Arc<dyn IdentityProvider>,
}

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<Ingestion>,
    pub answers: Arc<Answers>,
    identity: Arc<dyn IdentityProvider>,
    policy: AdminPolicy,
}

impl AppState {
    pub fn new(backends: Backends, policy: AdminPolicy) -> Self {
        let ingestion = IngestionService::new(
            backends.repository.clone(),
            backends.objects,
            backends.embedder.clone(),
        );
        let answers =
            AnswerCoordinator::new(backends.repository, backends.embedder, backends.completion);

        Self {
            ingestion: Arc::new(ingestion),
            answers: Arc::new(answers),
            identity: backends.identity,
            policy,
        }
    }

    async fn require_admin(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
        let token = bearer_token(headers)?;
        Ok(authorize_admin(self.identity.as_ref(), &self.policy, token).await?)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login_handler))
        .route("/admin/files", get(list_files))
        .route("/admin/files/:id", delete(delete_file))
        .route("/admin/upload", post(upload_file))
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins))
}

pub async fn serve(state: AppState, config: ServerConfig) -> anyhow::Result<()> {
    let router = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "docqa server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(origin = %origin, %error, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Wraps `RagError` so it renders as `{"detail", "kind"}` with the mapped status.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(error: RagError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// Framework rejections keep their message; only an oversized body keeps its status.
    fn rejected(status: StatusCode, detail: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self(RagError::PayloadTooLarge(detail))
        } else {
            Self(RagError::Validation(detail))
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::rejected(error.status(), error.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "request failed");
        }

        (
            status,
            Json(json!({ "detail": self.0.to_string(), "kind": self.0.kind() })),
        )
            .into_response()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError(RagError::Authentication(
                "missing or malformed bearer token".to_string(),
            ))
        })
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FileSummary {
    pub id: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for FileSummary {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            filename: document.filename,
            created_at: document.created_at,
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn login_handler(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginSession>, ApiError> {
    let Json(request) = payload?;
    let session = login(state.identity.as_ref(), &request.email, &request.password).await?;
    Ok(Json(session))
}

async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileSummary>>, ApiError> {
    state.require_admin(&headers).await?;
    let documents = state.ingestion.list_documents().await?;
    Ok(Json(documents.into_iter().map(FileSummary::from).collect()))
}

async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReceipt>, ApiError> {
    let user = state.require_admin(&headers).await?;
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| RagError::Validation("file field has no filename".to_string()))?;
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload
        .ok_or_else(|| RagError::Validation("multipart field `file` is required".to_string()))?;
    info!(user = %user.email, filename = %filename, size = bytes.len(), "upload received");

    let receipt = state.ingestion.upload(&filename, &bytes).await?;
    Ok(Json(receipt))
}

async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeleteReceipt>, ApiError> {
    state.require_admin(&headers).await?;
    Ok(Json(state.ingestion.delete(&id).await?))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatAnswer>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.answers.ask(&request.question).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use docqa_core::{
        BackendError, CharacterNgramEmbedder, CompletionRequest, InMemoryIdentityProvider,
        InMemoryObjectStore, InMemoryRepository,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    struct CannedCompletion;

    #[async_trait]
    impl CompletionModel for CannedCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
            Ok("canned answer".to_string())
        }
    }

    async fn app() -> (Router, String) {
        let identity = InMemoryIdentityProvider::default();
        identity.register("admin@example.com", "secret", "user").await;
        let session = identity
            .sign_in("admin@example.com", "secret")
            .await
            .unwrap()
            .unwrap();

        let backends = Backends {
            repository: Arc::new(InMemoryRepository::default()),
            objects: Arc::new(InMemoryObjectStore::default()),
            embedder: Arc::new(CharacterNgramEmbedder::default()),
            completion: Arc::new(CannedCompletion),
            identity: Arc::new(identity),
        };
        let config = ServerConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 1024 * 1024,
        };
        let router = build_router(AppState::new(backends, AdminPolicy::default()), &config);
        (router, session.access_token)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_upload(token: &str, filename: &str, content: &str) -> Request<Body> {
        let boundary = "docqa-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );
        Request::post("/admin/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (router, _) = app().await;
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn admin_routes_require_a_bearer_token() {
        let (router, _) = app().await;
        let response = router
            .oneshot(Request::get("/admin/files").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["kind"], "authentication_failure");
    }

    #[tokio::test]
    async fn upload_list_chat_and_delete_round_trip() {
        let (router, token) = app().await;

        let response = router
            .clone()
            .oneshot(multipart_upload(&token, "pumps.txt", "Pump pressure is limited to 40 bar."))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["status"], "success");
        let id = receipt["id"].as_str().unwrap().to_string();

        let duplicate = router
            .clone()
            .oneshot(multipart_upload(&token, "pumps.txt", "other"))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

        let listed = router
            .clone()
            .oneshot(
                Request::get("/admin/files")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let files = json_body(listed).await;
        assert_eq!(files[0]["filename"], "pumps.txt");
        assert!(files[0].get("storage_path").is_none());

        let answer = router
            .clone()
            .oneshot(
                Request::post("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"question":"pump pressure"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(answer.status(), StatusCode::OK);
        let answer = json_body(answer).await;
        assert_eq!(answer["answer"], "canned answer");
        assert_eq!(answer["sources"][0]["file_id"], id.as_str());

        let deleted = router
            .clone()
            .oneshot(
                Request::delete(format!("/admin/files/{id}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(deleted).await, json!({ "status": "deleted", "id": id }));

        let empty = router
            .oneshot(
                Request::post("/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"question":"pump pressure"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(empty).await["kind"], "empty_corpus");
    }

    #[tokio::test]
    async fn deleting_unknown_file_is_404() {
        let (router, token) = app().await;
        let response = router
            .oneshot(
                Request::delete("/admin/files/missing")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_credentials_are_401() {
        let (router, _) = app().await;
        let response = router
            .oneshot(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"admin@example.com","password":"wrong"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn incomplete_json_bodies_are_validation_errors() {
        let (router, _) = app().await;

        for (uri, body) in [
            ("/chat", "{}"),
            ("/chat", "not json"),
            ("/auth/login", "{}"),
            ("/auth/login", r#"{"email":"a"}"#),
        ] {
            let response = router.clone().oneshot(post_json(uri, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
            let payload = json_body(response).await;
            assert_eq!(payload["kind"], "validation_error", "{uri} {body}");
            assert!(payload["detail"].as_str().is_some_and(|detail| !detail.is_empty()));
        }
    }

    #[tokio::test]
    async fn oversized_bodies_are_structured_413s() {
        let (router, token) = app().await;

        let question = "x".repeat(2 * 1024 * 1024);
        let response = router
            .clone()
            .oneshot(post_json("/chat", format!(r#"{{"question":"{question}"}}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["kind"], "payload_too_large");

        let response = router
            .oneshot(multipart_upload(&token, "big.txt", &question))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        let kind = json_body(response).await["kind"].clone();
        assert!(kind == "payload_too_large" || kind == "validation_error");
    }

    #[tokio::test]
    async fn upload_without_multipart_content_type_is_a_validation_error() {
        let (router, token) = app().await;
        let response = router
            .oneshot(
                Request::post("/admin/upload")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "validation_error");
    }

    #[test]
    fn bearer_token_is_parsed_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());
    }
}
