//! Fluency HTTP API.
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /api/ai-feedback - Coaching feedback on a learner's answer (SSE)
//! - POST /api/module-chat - Tutor chat scoped to one module (SSE)
//! - GET /api/courses - Course list
//! - GET /api/courses/{course}/curriculum - Levels and module metadata
//! - GET /api/courses/{course}/modules/{*path} - One module with prev/next
//! - GET /api/courses/{course}/competencies
//! - GET /api/courses/{course}/resources

mod handlers;
mod types;


use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::content::ContentLibrary;
use crate::identity::{Authenticator, NoAuth, SupabaseAuth};
use crate::throttle::{CounterError, UsageThrottle};
use crate::upstream::AnthropicClient;

pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub throttle: UsageThrottle,
    pub authenticator: Arc<dyn Authenticator>,
    /// `None` when no upstream API key is configured.
    pub upstream: Option<AnthropicClient>,
    pub content: ContentLibrary,
}

impl AppState {
    pub fn new(config: Config, throttle: UsageThrottle, authenticator: Arc<dyn Authenticator>) -> Self {
        let upstream = AnthropicClient::from_config(&config.upstream);
        let content = ContentLibrary::with_cache_ttl(
            config.content.root.clone(),
            Duration::from_secs(config.content.cache_ttl_secs),
        );
        Self {
            config,
            throttle,
            authenticator,
            upstream,
            content,
        }
    }

    /// Build every component from config.
    ///
    /// Without Supabase settings every caller is anonymous.
    pub fn from_config(config: Config) -> Result<Self, CounterError> {
        let throttle = UsageThrottle::from_config(&config)?;
        let authenticator: Arc<dyn Authenticator> = match SupabaseAuth::from_config(&config.supabase) {
            Some(auth) => Arc::new(auth),
            None => Arc::new(NoAuth),
        };
        Ok(Self::new(config, throttle, authenticator))
    }
}

/// Create the API router with the given state.
pub fn create_router_with_state(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/ai-feedback", post(handlers::ai_feedback))
        .route("/api/module-chat", post(handlers::module_chat))
        .route("/api/courses", get(handlers::list_courses))
        .route("/api/courses/{course}/curriculum", get(handlers::get_curriculum))
        .route("/api/courses/{course}/modules/{*path}", get(handlers::get_module))
        .route("/api/courses/{course}/competencies", get(handlers::get_competencies))
        .route("/api/courses/{course}/resources", get(handlers::get_resources))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
