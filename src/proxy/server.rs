//! Main proxy server implementation

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use super::handler::ChatHandler;
use super::upstream::UpstreamClient;
use crate::config::AppConfig;
use crate::tokenizer::TokenCounter;

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub upstream: UpstreamClient,
    pub tokenizer: Arc<dyn TokenCounter>,
    pub api_key: Option<Arc<SecretString>>,
    /// Token cost of the policy's system prompt, counted once at startup
    pub system_prompt_tokens: usize,
}

impl ProxyState {
    pub fn new(
        config: AppConfig,
        tokenizer: Arc<dyn TokenCounter>,
        api_key: Option<SecretString>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = build_http_client(&config)?;
        let upstream = UpstreamClient::new(http_client, &config.upstream);
        let system_prompt_tokens = tokenizer.count_tokens(&config.policy.system_prompt);

        Ok(Self {
            config: Arc::new(config),
            upstream,
            tokenizer,
            api_key: api_key.map(Arc::new),
            system_prompt_tokens,
        })
    }
}

const CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Build an HTTP client with TLS configuration
fn build_http_client(config: &AppConfig) -> Result<reqwest::Client, Box<dyn std::error::Error>> {
    // Only silence between reads is capped; a live stream may outlast timeout_seconds
    let mut client_builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
        .read_timeout(Duration::from_secs(config.upstream.timeout_seconds))
        .pool_max_idle_per_host(10);

    if let Some(ref tls) = config.upstream.tls {
        if tls.accept_invalid_certs {
            client_builder = client_builder.danger_accept_invalid_certs(true);
            tracing::warn!("TLS: Accepting invalid certificates (use only for development/testing)");
        }

        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_cert = std::fs::read(ca_path)?;
            let ca_cert = reqwest::Certificate::from_pem(&ca_cert)?;
            client_builder = client_builder.add_root_certificate(ca_cert);
            tracing::info!("TLS: Loaded custom CA certificate from {}", ca_path);
        }
    }

    Ok(client_builder.build()?)
}

/// Build the router serving the chat route and health check
pub fn build_router(state: ProxyState) -> Router {
    let route = state.config.server.route.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route(&route, post(chat_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
        .with_state(state)
}

/// Run the proxy server
pub async fn run_server(state: ProxyState) -> Result<(), Box<dyn std::error::Error>> {
    let config = state.config.clone();
    let app = build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("chat-proxy listening on {}{}", addr, config.server.route);
    tracing::info!(
        upstream = %config.upstream.base_url(),
        model = %config.policy.model,
        token_limit = config.policy.token_limit,
        system_prompt_tokens = state.system_prompt_tokens,
        "Proxying chat completions"
    );
    if state.api_key.is_none() {
        tracing::warn!(
            env = %config.upstream.api_key_env,
            "No upstream API key configured; chat requests will fail until one is set"
        );
    }

    Ok(axum::serve(listener, app).await?)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Chat route; each request gets its own span and id
async fn chat_handler(State(state): State<ProxyState>, req: axum::extract::Request) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    let handler = ChatHandler::new(state);
    handler.handle(req).instrument(span).await
}
