//! HTTP routes
//!
//! - `POST /webhook/whatsapp`: inbound message (form encoded), TwiML reply
//! - `POST /webhook/sms`: plain SMS, stored in the inbox
//! - `GET /sms/latest`: inbox contents
//! - `GET /`: health
//! - `GET /conversations`: stored sessions
//!
//! Request signatures are checked upstream of this service.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use courier_core::{CancellationToken, Courier, HealthReport, InboundMessage, SessionSummary};

use crate::sms::{SmsInbox, SmsMessage};
use crate::twiml;

/// Reply sent when a message could not be processed at all
pub const ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your message. Please try again.";

/// Reply to a message with neither text nor media
pub const EMPTY_MESSAGE_REPLY: &str = "I didn't catch any text there. What can I help you with?";

#[derive(Clone)]
pub struct AppState {
    courier: Arc<Courier>,
    sms: Arc<SmsInbox>,
}

impl AppState {
    pub fn new(courier: Arc<Courier>) -> Self {
        Self {
            courier,
            sms: Arc::new(SmsInbox::default()),
        }
    }
}

pub fn router(courier: Arc<Courier>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/conversations", get(conversations))
        .route("/webhook/whatsapp", post(webhook))
        .route("/webhook/sms", post(sms_webhook))
        .route("/sms/latest", get(sms_latest))
        .with_state(AppState::new(courier))
}

/// Twilio-style webhook form
#[derive(Debug, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url0: Option<String>,
}

impl WebhookForm {
    fn into_inbound(self) -> InboundMessage {
        let has_media = self
            .num_media
            .as_deref()
            .and_then(|n| n.trim().parse::<u32>().ok())
            .map(|n| n > 0)
            .unwrap_or(false);

        let message = InboundMessage::new(self.from, self.body);
        match self.media_url0 {
            Some(url) if has_media => message.with_attachment(url),
            _ => message,
        }
    }
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

pub async fn webhook(State(state): State<AppState>, Form(form): Form<WebhookForm>) -> Response {
    info!(
        from = %form.from,
        to = form.to.as_deref().unwrap_or(""),
        sid = form.message_sid.as_deref().unwrap_or(""),
        "Received message"
    );
    let inbound = form.into_inbound();
    debug!(text = %inbound.text, attachment = ?inbound.attachment, "Inbound message");

    if inbound.text.trim().is_empty() && inbound.attachment.is_none() {
        debug!(from = %inbound.user_id, "Empty message, not starting a turn");
        return xml(twiml::message(EMPTY_MESSAGE_REPLY));
    }

    // The turn runs as its own task; if the client goes away the guard
    // cancels it and nothing is recorded.
    let cancel = CancellationToken::new();
    let guard = cancel.drop_guard();
    let courier = Arc::clone(&state.courier);
    let token = cancel.clone();
    let turn = tokio::spawn(async move { courier.handle(inbound, token).await });

    let reply = match turn.await {
        Ok(Ok(report)) => {
            if report.is_failed() {
                warn!(user = %report.user_id, "Turn failed, sending apology");
            }
            report.turn.reply
        }
        Ok(Err(e)) => {
            error!(error = %e, "Turn could not be processed");
            ERROR_REPLY.to_string()
        }
        Err(e) => {
            error!(error = %e, "Turn task aborted");
            ERROR_REPLY.to_string()
        }
    };
    guard.disarm();

    xml(twiml::message(&reply))
}

/// Twilio SMS webhook form
#[derive(Debug, Deserialize)]
pub struct SmsForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
}

#[derive(Debug, Serialize)]
pub struct SmsReceived {
    pub status: &'static str,
}

pub async fn sms_webhook(State(state): State<AppState>, Form(form): Form<SmsForm>) -> Json<SmsReceived> {
    info!(from = %form.from, sid = %form.message_sid, "Received SMS");
    state.sms.push(SmsMessage {
        from: form.from,
        to: form.to,
        body: form.body,
        sid: form.message_sid,
    });
    Json(SmsReceived { status: "received" })
}

#[derive(Debug, Serialize)]
pub struct SmsListing {
    pub messages: Vec<SmsMessage>,
    pub count: usize,
}

pub async fn sms_latest(State(state): State<AppState>) -> Json<SmsListing> {
    let messages = state.sms.latest();
    Json(SmsListing {
        count: messages.len(),
        messages,
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    #[serde(flatten)]
    pub health: HealthReport,
}

pub async fn health(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: "courier",
        health: state.courier.health(),
    })
}

pub async fn conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, String)> {
    state.courier.conversations().await.map(Json).map_err(|e| {
        error!(error = %e, "Listing conversations failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
