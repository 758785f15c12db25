//! # API REST
//!
//! HTTP surface of the intake assistant.
//!
//! Handles:
//! - WhatsApp Cloud webhook verification and inbound messages
//! - a form-encoded `/message` endpoint for manual testing
//! - health checks and the OpenAPI document
//!
//! Every inbound message runs one intake turn keyed by the sender. The reply is stored as a
//! conversation reference and sent back through the [`Messenger`]; both steps are best
//! effort and only logged when they fail.

#![warn(rust_2018_idioms)]

mod messenger;

pub use messenger::{
    Messenger, MessengerConfig, MessengerError, WhatsAppMessenger, DEFAULT_GRAPH_URL,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Form, Router,
};
use intake_core::{IntakeError, IntakeService, LanguageModel, RecordStore};
use intake_types::mask;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Application state shared across handlers.
pub struct AppState<M, S, D> {
    intake: Arc<IntakeService<M, S>>,
    messenger: Arc<D>,
    verify_token: Arc<str>,
}

impl<M, S, D> Clone for AppState<M, S, D> {
    fn clone(&self) -> Self {
        Self {
            intake: Arc::clone(&self.intake),
            messenger: Arc::clone(&self.messenger),
            verify_token: Arc::clone(&self.verify_token),
        }
    }
}

impl<M, S, D> AppState<M, S, D> {
    pub fn new(
        intake: Arc<IntakeService<M, S>>,
        messenger: Arc<D>,
        verify_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            intake,
            messenger,
            verify_token: verify_token.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Webhook subscription handshake parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// WhatsApp Cloud webhook payload. Only the fields the intake needs are read.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InboundMessage {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub text: Option<InboundText>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InboundText {
    #[serde(default)]
    pub body: String,
}

/// Form body of `POST /message`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MessageForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, verify_webhook, receive_webhook, receive_message),
    components(schemas(
        HealthRes,
        WebhookPayload,
        WebhookEntry,
        WebhookChange,
        WebhookValue,
        InboundMessage,
        InboundText,
        MessageForm,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router.
pub fn router<M, S, D>(state: AppState<M, S, D>) -> Router
where
    M: LanguageModel + 'static,
    S: RecordStore + 'static,
    D: Messenger + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/facebook/webhook",
            get(verify_webhook::<M, S, D>).post(receive_webhook::<M, S, D>),
        )
        .route("/message", post(receive_message::<M, S, D>))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Intake REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/facebook/webhook",
    params(VerifyParams),
    responses(
        (status = 200, description = "Subscription confirmed; body is the challenge", body = String),
        (status = 403, description = "Verification failed")
    )
)]
/// Webhook subscription handshake.
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and the token matches.
async fn verify_webhook<M, S, D>(
    State(state): State<AppState<M, S, D>>,
    Query(params): Query<VerifyParams>,
) -> Result<String, (StatusCode, &'static str)> {
    let subscribed = params.mode.as_deref() == Some("subscribe")
        && params.verify_token.as_deref() == Some(&*state.verify_token);
    if subscribed {
        tracing::info!("webhook subscription verified");
        Ok(params.challenge.unwrap_or_default())
    } else {
        tracing::warn!("webhook verification failed");
        Err((StatusCode::FORBIDDEN, "Verification failed"))
    }
}

#[utoipa::path(
    post,
    path = "/facebook/webhook",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Payload accepted")
    )
)]
/// Inbound WhatsApp messages.
///
/// Runs one intake turn per text message. Per-message failures are logged and do not change
/// the response.
async fn receive_webhook<M, S, D>(
    State(state): State<AppState<M, S, D>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode
where
    M: LanguageModel,
    S: RecordStore,
    D: Messenger,
{
    let messages = payload
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .flat_map(|change| change.value.messages);

    for message in messages {
        let Some(sender) = message.from.filter(|from| !from.is_empty()) else {
            continue;
        };
        let Some(text) = message.text.map(|t| t.body).filter(|body| !body.is_empty()) else {
            continue;
        };
        if let Err(e) = run_turn(&state, &sender, &text).await {
            tracing::error!(from = %mask(&sender), error = %e, "intake turn failed");
        }
    }

    StatusCode::OK
}

#[utoipa::path(
    post,
    path = "/message",
    request_body(content = MessageForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Message processed and reply sent"),
        (status = 400, description = "Invalid sender"),
        (status = 422, description = "Missing form fields"),
        (status = 500, description = "Intake turn failed")
    )
)]
/// Form-encoded message endpoint for manual testing.
async fn receive_message<M, S, D>(
    State(state): State<AppState<M, S, D>>,
    Form(form): Form<MessageForm>,
) -> Result<StatusCode, (StatusCode, &'static str)>
where
    M: LanguageModel,
    S: RecordStore,
    D: Messenger,
{
    let sender = strip_channel_prefix(&form.from);
    tracing::info!(from = %mask(sender), "message received");

    match run_turn(&state, sender, &form.body).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(IntakeError::InvalidInput(_)) => Err((StatusCode::BAD_REQUEST, "Invalid sender")),
        Err(e) => {
            tracing::error!(from = %mask(sender), error = %e, "intake turn failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Intake turn failed"))
        }
    }
}

/// `whatsapp:+15550100` becomes `+15550100`.
fn strip_channel_prefix(from: &str) -> &str {
    from.rsplit(WHATSAPP_PREFIX).next().unwrap_or(from)
}

/// One intake turn plus the best-effort side effects around it.
async fn run_turn<M, S, D>(
    state: &AppState<M, S, D>,
    sender: &str,
    text: &str,
) -> Result<(), IntakeError>
where
    M: LanguageModel,
    S: RecordStore,
    D: Messenger,
{
    let reply = state.intake.handle_message(sender, text).await?.message();

    match state
        .intake
        .store()
        .store_conversation_reference(sender, text, &reply)
    {
        Ok(id) => tracing::debug!(reference_id = %id, "conversation reference stored"),
        Err(e) => tracing::error!(from = %mask(sender), error = %e, "failed to store conversation"),
    }

    if let Err(e) = state.messenger.send_text(sender, &reply).await {
        tracing::error!(to = %mask(sender), error = %e, "failed to send reply");
    }
    Ok(())
}
