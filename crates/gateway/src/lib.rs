//! HTTP gateway for Atlas.
//!
//! - `POST /api/chat` runs one turn against the shared conversation memory
//! - `GET  /health` reports liveness and version
//! - anything else is served from the static directory (`index.html` at `/`),
//!   except the config file, the knowledge documents and dotfiles
//!
//! Built on Axum. One process-wide conversation is shared by every client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

use atlas_agent::AgentOrchestrator;
use atlas_config::{AppConfig, CONFIG_FILE};
use atlas_core::knowledge::{INSTRUCTIONS_FILE, KNOWLEDGE_BASE_FILE};
use atlas_core::memory::ConversationMemory;

/// Shared application state for the gateway.
pub struct GatewayState {
    /// `None` when the chat model could not be configured.
    pub agent: Option<Arc<AgentOrchestrator>>,
    /// Locked for the whole turn so concurrent requests take turns.
    pub memory: Mutex<ConversationMemory>,
}

impl GatewayState {
    pub fn new(agent: Option<Arc<AgentOrchestrator>>) -> Self {
        Self {
            agent,
            memory: Mutex::new(ConversationMemory::new()),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// The static directory behind the fallback route.
///
/// Files named like the config file or a knowledge document are never
/// served, whatever directory they sit in, and neither are dotfiles. The
/// config file holds both API keys.
#[derive(Debug, Clone)]
pub struct StaticSite {
    root: PathBuf,
    private: Vec<String>,
}

impl StaticSite {
    /// Serve `root`, hiding the default config and document file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            private: [CONFIG_FILE, INSTRUCTIONS_FILE, KNOWLEDGE_BASE_FILE]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Serve the configured static directory, also hiding the configured
    /// document file names.
    pub fn from_config(config: &AppConfig) -> Self {
        let knowledge = &config.knowledge;
        [&knowledge.instructions_path, &knowledge.knowledge_base_path]
            .into_iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .fold(Self::new(&config.gateway.static_dir), |site, name| {
                site.hide(name)
            })
    }

    /// Never serve files called `name`.
    pub fn hide(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.private.iter().any(|p| p.eq_ignore_ascii_case(&name)) {
            self.private.push(name);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether any segment of the request path names a hidden file.
    /// Segments are percent-decoded first, so `/%61tlas.toml` is caught too.
    pub fn is_private(&self, path: &str) -> bool {
        path.split('/').filter(|s| !s.is_empty()).any(|segment| {
            let segment = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            segment.starts_with('.')
                || self.private.iter().any(|p| p.eq_ignore_ascii_case(&segment))
        })
    }

    async fn serve(&self, request: Request) -> Response {
        if self.is_private(request.uri().path()) {
            debug!(path = %request.uri().path(), "Refused private file");
            return StatusCode::NOT_FOUND.into_response();
        }
        match ServeDir::new(&self.root).oneshot(request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        }
    }
}

/// Build the Axum router.
pub fn build_router(state: SharedState, site: StaticSite) -> Router {
    let site = Arc::new(site);
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .fallback(move |request: Request| {
            let site = site.clone();
            async move { site.serve(request).await }
        })
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// A missing chat-model key is not fatal here: the server starts and
/// `/api/chat` answers 500 until it is configured.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let agent = match AgentOrchestrator::from_config(&config) {
        Ok(agent) => Some(Arc::new(agent)),
        Err(e) => {
            warn!(error = %e, "Agent not initialized; /api/chat will return 500");
            None
        }
    };

    let state = Arc::new(GatewayState::new(agent));
    let site = StaticSite::from_config(&config);
    info!(addr = %addr, static_dir = %site.root().display(), "Gateway starting");
    let app = build_router(state, site);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// `POST /api/chat`
async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = match payload {
        Ok(Json(ChatRequest {
            message: Some(message),
        })) if !message.is_empty() => message,
        Ok(_) => return Err(api_error(StatusCode::BAD_REQUEST, "No message provided")),
        Err(rejection) => {
            warn!(error = %rejection, "Rejected chat request body");
            return Err(api_error(StatusCode::BAD_REQUEST, "No message provided"));
        }
    };

    let Some(agent) = state.agent.clone() else {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Agent not initialized",
        ));
    };

    info!(message_len = message.len(), "Chat message received");

    let mut memory = state.memory.lock().await;
    match agent.process(&mut memory, &message).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            error!(error = %e, "Agent processing failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_agent::AgentMode;
    use atlas_core::error::ProviderError;
    use atlas_core::knowledge::InstructionBlock;
    use atlas_core::message::Message;
    use atlas_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed reply, or fails when `reply` is `None`.
    struct StubProvider {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(reply) => Ok(ProviderResponse {
                    message: Message::assistant(reply),
                    usage: None,
                    model: "stub-model".into(),
                }),
                None => Err(ProviderError::AuthenticationFailed("bad key".into())),
            }
        }
    }

    fn state_with(reply: Option<&'static str>) -> (SharedState, Arc<StubProvider>) {
        let provider = Arc::new(StubProvider {
            reply,
            calls: AtomicUsize::new(0),
        });
        let agent = AgentOrchestrator::new(
            provider.clone(),
            "stub-model",
            &InstructionBlock::fallback(),
            AgentMode::SingleShot,
        )
        .unwrap();
        (Arc::new(GatewayState::new(Some(Arc::new(agent)))), provider)
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = state_with(Some("hi"));
        let app = build_router(state, StaticSite::new("."));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn chat_returns_answer_and_grows_memory() {
        let (state, provider) = state_with(Some("BTC is up today."));
        let app = build_router(state.clone(), StaticSite::new("."));

        let response = app
            .oneshot(chat_request(r#"{"message": "How is BTC?"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"response": "BTC is up today."})
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.memory.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_or_missing_message_is_rejected() {
        for body in [
            r#"{"message": ""}"#,
            r#"{}"#,
            r#"{"message": null}"#,
            r#"{"message": 42}"#,
            "not json",
        ] {
            let (state, provider) = state_with(Some("unused"));
            let app = build_router(state, StaticSite::new("."));

            let response = app.oneshot(chat_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(
                json_body(response).await,
                serde_json::json!({"error": "No message provided"})
            );
            assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn missing_agent_is_a_server_error() {
        let state = Arc::new(GatewayState::new(None));
        let app = build_router(state, StaticSite::new("."));

        let response = app
            .oneshot(chat_request(r#"{"message": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"error": "Agent not initialized"})
        );
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_memory_untouched() {
        let (state, _) = state_with(None);
        let app = build_router(state.clone(), StaticSite::new("."));

        let response = app
            .oneshot(chat_request(r#"{"message": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("bad key"));
        assert!(state.memory.lock().await.is_empty());
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Atlas</h1>").unwrap();
        std::fs::write(dir.path().join("script.js"), "console.log('hi');").unwrap();

        let (state, _) = state_with(Some("hi"));
        let app = build_router(state, StaticSite::new(dir.path()));

        let index = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(index.status(), StatusCode::OK);
        let bytes = index.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<h1>Atlas</h1>");

        let script = app
            .oneshot(Request::builder().uri("/script.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(script.status(), StatusCode::OK);
    }

    async fn get_status(app: &Router, uri: &str) -> StatusCode {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn config_and_documents_are_never_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Atlas</h1>").unwrap();
        std::fs::write(dir.path().join("atlas.toml"), "api_key = \"sk-or-SECRET\"\n").unwrap();
        std::fs::write(dir.path().join("systemprompt.txt"), "instructions").unwrap();
        std::fs::write(dir.path().join("Crypto_Knowledge_Base.md"), "# BTC").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# private notes").unwrap();
        std::fs::write(dir.path().join(".env"), "FREECRYPTO_API_KEY=fc-SECRET").unwrap();

        let (state, _) = state_with(Some("hi"));
        let app = build_router(state, StaticSite::new(dir.path()).hide("notes.md"));

        for uri in [
            "/atlas.toml",
            "/ATLAS.TOML",
            "/%61tlas.toml",
            "/systemprompt.txt",
            "/Crypto_Knowledge_Base.md",
            "/notes.md",
            "/.env",
        ] {
            assert_eq!(get_status(&app, uri).await, StatusCode::NOT_FOUND, "{uri}");
        }
        assert_eq!(get_status(&app, "/").await, StatusCode::OK);
    }

    #[test]
    fn site_from_config_hides_configured_documents() {
        let mut config = AppConfig::default();
        config.knowledge.instructions_path = PathBuf::from("docs/prompt.txt");
        config.knowledge.knowledge_base_path = PathBuf::from("docs/kb.md");

        let site = StaticSite::from_config(&config);
        assert_eq!(site.root(), Path::new("static"));
        assert!(site.is_private("/docs/prompt.txt"));
        assert!(site.is_private("/kb.md"));
        assert!(site.is_private("/atlas.toml"));
        assert!(!site.is_private("/index.html"));
        assert!(!site.is_private("/"));
    }
}
