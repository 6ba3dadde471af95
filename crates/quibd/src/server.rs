//! HTTP server for quibd

use crate::ai::AiClient;
use crate::auth::TokenIssuer;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::middleware::{self, RateLimiter};
use crate::routes;
use anyhow::Result;
use axum::Router;
use quib_common::{ProgressionEngine, Store};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub engine: ProgressionEngine,
    pub ai: AiClient,
    pub chain: ChainClient,
    pub tokens: TokenIssuer,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, store: Arc<Store>) -> Result<Self> {
        let engine = ProgressionEngine::new(store.clone());
        let ai = AiClient::new(
            config.openai.api_url.clone(),
            config.openai.api_key.clone(),
            config.openai.chat_model.clone(),
            config.openai.light_model.clone(),
            config.openai.timeout_secs,
        )?;
        let chain = ChainClient::new(
            config.chain.rpc_url.clone(),
            config.chain.token_contract.clone(),
            config.chain.token_decimals,
            config.chain.chain_id,
            config.chain.timeout_secs,
        )?;
        let tokens = TokenIssuer::new(
            config.auth.jwt_secret.clone(),
            config.auth.jwt_expiry_secs,
        );

        Ok(Self {
            config,
            store,
            engine,
            ai,
            chain,
            tokens,
            start_time: Instant::now(),
        })
    }
}

/// Run the HTTP server
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.server.bind_addr.clone();
    let state = Arc::new(state);

    let rate_limiter = RateLimiter::new();
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup().await;
        }
    });

    let app = Router::new()
        .merge(routes::auth_routes())
        .merge(routes::creature_routes())
        .merge(routes::chat_routes())
        .merge(routes::task_routes())
        .merge(routes::evolution_routes())
        .merge(routes::admin_routes())
        .merge(routes::token_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::body_size_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
