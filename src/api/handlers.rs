//! HTTP handlers for the Fluency API.

use super::types::*;
use super::AppState;
use crate::config::StreamMode;
use crate::content::{Adjacent, Competency, CourseInfo, CurriculumData, Resource};
use crate::error::{rate_limit_headers, FluencyError};
use crate::identity::{resolve, Identity};
use crate::logger::{format_call, log_call_end, log_call_start, AiCall, AiOutcome};
use crate::prompts::{
    feedback_system_prompt, feedback_user_message, module_chat_system_prompt, recent, FeedbackKind,
};
use crate::sse;
use crate::throttle::RateLimitResult;
use crate::upstream::{AnthropicClient, ChatMessage};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

const FEEDBACK_ROUTE: &str = "/api/ai-feedback";
const CHAT_ROUTE: &str = "/api/module-chat";

// ============================================================================
// Health
// ============================================================================

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: "fluency",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// AI endpoints
// ============================================================================

/// A caller that passed the key check and the throttle.
struct Admitted<'a> {
    upstream: &'a AnthropicClient,
    identity: Identity,
    quota: RateLimitResult,
    started: Instant,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Log a refused call and turn the error into its response.
fn refuse(
    state: &AppState,
    call: &AiCall<'_>,
    quota: Option<&RateLimitResult>,
    started: Instant,
    err: FluencyError,
) -> Response {
    let outcome = AiOutcome {
        status: err.status_code().as_u16(),
        duration_ms: elapsed_ms(started),
        quota,
    };
    tracing::info!("{}", format_call(call, &outcome, &state.config.app.log_verbosity));
    err.into_response()
}

/// Key check, identity, throttle, in that order.
async fn admit<'a>(state: &'a AppState, headers: &HeaderMap, route: &str) -> Result<Admitted<'a>, Response> {
    let started = Instant::now();

    let Some(upstream) = state.upstream.as_ref() else {
        tracing::warn!(route, "Upstream API key not configured");
        return Err(FluencyError::ApiKeyMissing.into_response());
    };

    let identity = resolve(headers, state.authenticator.as_ref()).await;
    let quota = state.throttle.check_and_increment(&identity).await;

    if !quota.allowed {
        let call = AiCall {
            route,
            identity: &identity,
            model: upstream.model(),
            kind: None,
        };
        return Err(refuse(state, &call, Some(&quota), started, FluencyError::RateLimited(quota)));
    }

    Ok(Admitted {
        upstream,
        identity,
        quota,
        started,
    })
}

/// Wrap an upstream stream as the event-stream response.
fn event_stream(upstream: reqwest::Response, mode: StreamMode, quota: &RateLimitResult) -> Response {
    let body = match mode {
        StreamMode::Reframe => Body::from_stream(sse::reframe(upstream.bytes_stream())),
        StreamMode::Passthrough => Body::from_stream(
            upstream
                .bytes_stream()
                .map(|result| result.map_err(std::io::Error::other)),
        ),
    };

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response();

    let headers = response.headers_mut();
    for (name, value) in rate_limit_headers(quota, false) {
        headers.insert(name, value);
    }
    response
}

/// Open the upstream call and stream it back, logging either way.
async fn proxy(
    state: &AppState,
    admitted: Admitted<'_>,
    call: AiCall<'_>,
    system: &str,
    messages: &[ChatMessage],
    mode: StreamMode,
) -> Response {
    let verbosity = &state.config.app.log_verbosity;

    match admitted.upstream.stream_messages(system, messages).await {
        Ok(upstream) => {
            log_call_start(&call, verbosity);
            log_call_end(
                &AiOutcome {
                    status: 200,
                    duration_ms: elapsed_ms(admitted.started),
                    quota: Some(&admitted.quota),
                },
                verbosity,
            );
            event_stream(upstream, mode, &admitted.quota)
        }
        Err(e) => refuse(state, &call, Some(&admitted.quota), admitted.started, e),
    }
}

pub async fn ai_feedback(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let admitted = match admit(&state, &headers, FEEDBACK_ROUTE).await {
        Ok(a) => a,
        Err(response) => return response,
    };
    let identity = admitted.identity.clone();
    let upstream = admitted.upstream;
    let model = upstream.model();

    let request: FeedbackRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let call = AiCall {
                route: FEEDBACK_ROUTE,
                identity: &identity,
                model,
                kind: None,
            };
            let err = FluencyError::InvalidRequest(e.to_string());
            return refuse(&state, &call, Some(&admitted.quota), admitted.started, err);
        }
    };

    let call = AiCall {
        route: FEEDBACK_ROUTE,
        identity: &identity,
        model,
        kind: Some(&request.kind),
    };

    let Some(kind) = FeedbackKind::parse(&request.kind) else {
        return refuse(
            &state,
            &call,
            Some(&admitted.quota),
            admitted.started,
            FluencyError::UnknownFeedbackType,
        );
    };

    let system = feedback_system_prompt(kind, &request.fields());
    let messages = [ChatMessage::user(feedback_user_message(
        &request.module_title,
        &request.user_input,
    ))];
    let mode = state.config.upstream.feedback_stream;

    proxy(&state, admitted, call, &system, &messages, mode).await
}

pub async fn module_chat(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let admitted = match admit(&state, &headers, CHAT_ROUTE).await {
        Ok(a) => a,
        Err(response) => return response,
    };
    let identity = admitted.identity.clone();
    let upstream = admitted.upstream;
    let call = AiCall {
        route: CHAT_ROUTE,
        identity: &identity,
        model: upstream.model(),
        kind: None,
    };

    let request = match serde_json::from_slice::<ModuleChatRequest>(&body) {
        Ok(r) if r.messages.is_empty() => Err(FluencyError::InvalidRequest(
            "messages must not be empty".to_string(),
        )),
        Ok(r) => Ok(r),
        Err(e) => Err(FluencyError::InvalidRequest(e.to_string())),
    };
    let request = match request {
        Ok(r) => r,
        Err(err) => return refuse(&state, &call, Some(&admitted.quota), admitted.started, err),
    };

    let system = module_chat_system_prompt(
        &request.module_title,
        &request.level_title,
        request.course_name.as_deref(),
    );
    let messages = recent(&request.messages, state.config.upstream.max_chat_messages);

    proxy(&state, admitted, call, &system, messages, StreamMode::Reframe).await
}

// ============================================================================
// Content endpoints
// ============================================================================

pub async fn list_courses(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CourseInfo>>, FluencyError> {
    Ok(Json(state.content.courses().await?))
}

pub async fn get_curriculum(
    State(state): State<Arc<AppState>>,
    Path(course): Path<String>,
) -> Result<Json<CurriculumData>, FluencyError> {
    let curriculum = state.content.curriculum(&course).await?;
    Ok(Json(curriculum.as_ref().clone()))
}

pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path((course, path)): Path<(String, String)>,
) -> Result<Json<ModuleResponse>, FluencyError> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    let module = state
        .content
        .module_by_slug_path(&course, &parts)
        .await?
        .ok_or_else(|| FluencyError::NotFound("Module".to_string()))?;

    let adjacent = match parts.as_slice() {
        [level, slug] => state.content.adjacent_modules(&course, level, slug).await?,
        _ => Adjacent::default(),
    };

    Ok(Json(ModuleResponse {
        module,
        prev: adjacent.prev,
        next: adjacent.next,
    }))
}

pub async fn get_competencies(
    State(state): State<Arc<AppState>>,
    Path(course): Path<String>,
) -> Result<Json<Vec<Competency>>, FluencyError> {
    Ok(Json(state.content.competencies(&course).await?))
}

pub async fn get_resources(
    State(state): State<Arc<AppState>>,
    Path(course): Path<String>,
) -> Result<Json<Vec<Resource>>, FluencyError> {
    Ok(Json(state.content.resources(&course).await?))
}
