use anyhow::{Context, Result};
use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};
use uuid::Uuid;

use crate::function::config::{AuthLevel, ForwarderConfig};
use crate::function::handler::Forwarder;
use crate::function::settings::Settings;
use crate::function::TRIGGER_ROUTE;
use crate::security::audit_log::AuditLogger;
use crate::security::chain::build_credential;
use crate::security::credential::TokenCredential;
use crate::security::function_key::{presented_key, verify};

type SharedState = Arc<AppState>;

const INVOCATION_ID_HEADER: &str = "x-ms-invocation-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of one invocation.
///
/// Taken from the Functions host header, then `x-request-id`, else generated.
#[derive(Debug, Clone)]
pub struct InvocationId(pub String);

impl InvocationId {
    fn from_parts(parts: &Parts) -> Self {
        for header in [INVOCATION_ID_HEADER, REQUEST_ID_HEADER] {
            if let Some(value) = parts.headers.get(header) {
                if let Ok(s) = value.to_str() {
                    let id = s.trim();
                    if !id.is_empty() && id.len() <= 128 {
                        return InvocationId(id.to_string());
                    }
                }
            }
        }
        InvocationId(Uuid::new_v4().to_string())
    }
}

impl<S> FromRequestParts<S> for InvocationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by `tag_invocation` so every layer sees the same id.
        if let Some(id) = parts.extensions.get::<InvocationId>() {
            return Ok(id.clone());
        }
        Ok(InvocationId::from_parts(parts))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub forwarder: Forwarder,
    pub audit: AuditLogger,
}

impl AppState {
    pub fn new(config: ForwarderConfig, credential: Arc<dyn TokenCredential>) -> Result<Self> {
        let http_client = Client::builder().build().context("creating HTTP client")?;
        Ok(Self::with_client(config, credential, http_client))
    }

    pub fn with_client(
        config: ForwarderConfig,
        credential: Arc<dyn TokenCredential>,
        http_client: Client,
    ) -> Self {
        Self {
            forwarder: Forwarder::new(Arc::new(config), credential, http_client),
            audit: AuditLogger::new(),
        }
    }

    /// Config and credential both resolved from application settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let config = ForwarderConfig::from_settings(settings)?;
        let http_client = Client::builder().build().context("creating HTTP client")?;
        let credential = build_credential(config.credential_mode, settings, http_client.clone());
        Ok(Self::with_client(config, credential, http_client))
    }
}

/// Query parameters of the trigger. A repeated `name` keeps its first value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TriggerParams {
    pub name: Option<String>,
}

impl From<Vec<(String, String)>> for TriggerParams {
    fn from(pairs: Vec<(String, String)>) -> Self {
        let name = pairs
            .into_iter()
            .find(|(key, _)| key == "name")
            .map(|(_, value)| value);
        Self { name }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn frontend_trigger(
    State(state): State<SharedState>,
    InvocationId(invocation_id): InvocationId,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let params = TriggerParams::from(pairs);
    match state
        .forwarder
        .invoke(&invocation_id, params.name.as_deref())
        .await
    {
        Ok(relay) => relay.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Pin the invocation id on the request and echo it on the response.
async fn tag_invocation(mut request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let id = InvocationId::from_parts(&parts);
    parts.extensions.insert(id.clone());
    request = Request::from_parts(parts, body);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert(INVOCATION_ID_HEADER, value);
    }
    response
}

/// Function-level authorization: the caller must present the function key.
async fn require_function_key(
    State(state): State<SharedState>,
    InvocationId(invocation_id): InvocationId,
    request: Request,
    next: Next,
) -> Response {
    if let AuthLevel::Function { key } = &state.forwarder.config().auth_level {
        let presented = presented_key(request.headers(), request.uri());
        if let Err(rejection) = verify(key, presented.as_deref()) {
            state
                .audit
                .key_rejected(&invocation_id, request.uri().path(), &rejection.to_string());
            return (StatusCode::UNAUTHORIZED, rejection.to_string()).into_response();
        }
    }
    next.run(request).await
}

/// Request span without the query string; `code` carries the function key.
fn request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

pub fn create_router(state: SharedState) -> Router {
    let trigger_path = format!("/api/{}", TRIGGER_ROUTE);

    let trigger = Router::new()
        .route(&trigger_path, any(frontend_trigger))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_function_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(trigger)
        .layer(middleware::from_fn(tag_invocation))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the host kills the process.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let config = state.forwarder.config();
    info!(
        route = TRIGGER_ROUTE,
        target = %config.target_url(),
        credential = state.forwarder.credential().kind(),
        auth_level = match config.auth_level {
            AuthLevel::Anonymous => "anonymous",
            AuthLevel::Function { .. } => "function",
        },
        "frontend function starting"
    );

    let app = create_router(Arc::new(state));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
