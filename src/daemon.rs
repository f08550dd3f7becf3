use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::channels::VerifyQuery;
use crate::config::ServerConfig;
use crate::error::{ConciergeError, Result};
use crate::services::concierge::{
    AddTrainingRequest, ChatRequest, ConciergeService, ConfirmRequest, RejectRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConciergeService>,
}

impl AppState {
    pub fn new(service: ConciergeService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Deserialize)]
struct ConfigBody {
    config: Value,
}

#[derive(Serialize)]
struct ConfigWriteResponse {
    status: &'static str,
    agent_id: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/agents/{agent_id}/leads", get(list_leads))
        .route("/api/agents/{agent_id}/leads/{lead_id}", get(get_lead))
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/confirm",
            post(confirm_meeting),
        )
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/reject",
            post(reject_meeting),
        )
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/email-preview",
            get(email_preview),
        )
        .route(
            "/api/agents/{agent_id}/config",
            get(get_config).put(update_config).post(create_agent),
        )
        .route("/api/agents/{agent_id}/prompt-preview", get(prompt_preview))
        .route(
            "/api/agents/{agent_id}/training",
            get(get_training).post(add_training),
        )
        .route(
            "/api/agents/{agent_id}/training/{kind}/{index}",
            delete(delete_training),
        )
        .route(
            "/api/webhook/whatsapp",
            get(whatsapp_verify).post(whatsapp_incoming),
        )
        .route(
            "/api/webhook/instagram",
            get(instagram_verify).post(instagram_incoming),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(err: ConciergeError) -> Response {
    let status = match &err {
        ConciergeError::NotFound(_) => StatusCode::NOT_FOUND,
        ConciergeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ConciergeError::Conflict(_) => StatusCode::CONFLICT,
        ConciergeError::Http(_) => StatusCode::BAD_GATEWAY,
        ConciergeError::Config(_)
        | ConciergeError::Serialization(_)
        | ConciergeError::Io(_)
        | ConciergeError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {err}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn json_result<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    json_result(state.service.health().await)
}

async fn chat(State(state): State<AppState>, Json(payload): Json<ChatRequest>) -> impl IntoResponse {
    json_result(state.service.chat(payload).await)
}

async fn list_leads(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    json_result(state.service.list_leads(&agent_id).await)
}

async fn get_lead(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
) -> impl IntoResponse {
    json_result(state.service.lead(&agent_id, &lead_id).await)
}

async fn confirm_meeting(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
    Json(payload): Json<ConfirmRequest>,
) -> impl IntoResponse {
    json_result(
        state
            .service
            .confirm_meeting(&agent_id, &lead_id, payload)
            .await,
    )
}

async fn reject_meeting(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
    Json(payload): Json<RejectRequest>,
) -> impl IntoResponse {
    json_result(
        state
            .service
            .reject_meeting(&agent_id, &lead_id, payload)
            .await,
    )
}

async fn email_preview(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.service.email_preview(&agent_id, &lead_id).await {
        Ok(html) => Html(html).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    json_result(state.service.agent_config(&agent_id).await)
}

async fn update_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(payload): Json<ConfigBody>,
) -> impl IntoResponse {
    let result = state
        .service
        .update_agent(&agent_id, payload.config)
        .await
        .map(|_| ConfigWriteResponse {
            status: "updated",
            agent_id: agent_id.clone(),
        });
    json_result(result)
}

async fn create_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(payload): Json<ConfigBody>,
) -> impl IntoResponse {
    let result = state
        .service
        .create_agent(&agent_id, payload.config)
        .await
        .map(|()| ConfigWriteResponse {
            status: "created",
            agent_id: agent_id.clone(),
        });
    json_result(result)
}

async fn prompt_preview(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    json_result(state.service.prompt_preview(&agent_id).await)
}

async fn get_training(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    json_result(state.service.training(&agent_id).await)
}

async fn add_training(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(payload): Json<AddTrainingRequest>,
) -> impl IntoResponse {
    json_result(state.service.add_training(&agent_id, payload).await)
}

async fn delete_training(
    State(state): State<AppState>,
    Path((agent_id, kind, index)): Path<(String, String, usize)>,
) -> impl IntoResponse {
    let result = state
        .service
        .remove_training(&agent_id, &kind, index)
        .await
        .map(|()| StatusResponse { status: "deleted" });
    json_result(result)
}

fn verify_subscription(query: &VerifyQuery, expected_token: &str, channel: &str) -> Response {
    match query.verify(expected_token) {
        Some(challenge) => {
            tracing::info!("[{channel}] Webhook verified");
            (StatusCode::OK, Json(challenge)).into_response()
        }
        None => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "Verification failed".to_string(),
            }),
        )
            .into_response(),
    }
}

/// Meta retries any non-2xx delivery, so failures are reported in the body.
fn webhook_result(result: Result<&'static str>, channel: &str) -> Response {
    match result {
        Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))).into_response(),
        Err(err) => {
            tracing::warn!("[{channel}] Error processing webhook: {err}");
            (
                StatusCode::OK,
                Json(json!({ "status": "error", "detail": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn whatsapp_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    verify_subscription(&query, state.service.whatsapp_verify_token(), "whatsapp")
}

async fn whatsapp_incoming(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    webhook_result(state.service.handle_whatsapp(&payload).await, "whatsapp")
}

async fn instagram_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    verify_subscription(&query, state.service.instagram_verify_token(), "instagram")
}

async fn instagram_incoming(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    webhook_result(state.service.handle_instagram(&payload).await, "instagram")
}

pub async fn run(config: ServerConfig) -> Result<()> {
    run_with_shutdown(config, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let service = ConciergeService::from_config(config)?;
    service.seed().await?;

    let agents = service.store().list_agents().await?;
    tracing::info!(
        provider = service.provider_name(),
        data_dir = %service.store().base_dir().display(),
        "AI Concierge ready with {} agent(s): {:?}",
        agents.len(),
        agents
    );

    let app = build_router(AppState::new(service));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ConciergeError::Runtime(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConciergeError::Runtime(e.to_string()))?;

    Ok(())
}
