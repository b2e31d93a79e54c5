//! WebSocket layer: live pushes of store subscriptions.
//!
//! Each socket owns its subscriptions. When the client goes away the
//! subscriptions are released before the handler returns, so nothing keeps
//! listening for a closed connection.
//!
//! Routes:
//! - `/ws/sessions`: the patient's session list, plus the messages of the
//!   session selected with `{"type":"select","session_id":...}`.
//! - `/ws/sessions/:id/messages`: one session's messages.
//! - `/ws/clinician/tickets?view=pending|all`: the clinician queue.
//! - `/ws/clinician/tickets/:id/messages`: the conversation behind a ticket.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::access::ClinicianGrant;
use crate::api::endpoints::clinician::{parse_view, QueueQuery};
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, Caller};
use crate::escalation::QueueView;
use crate::models::{Identity, Message as ChatMessage};
use crate::sessions::ActiveSession;
use crate::store::Topic;
use crate::subscription::{Snapshot, Subscription};

/// Heartbeat interval: server sends Heartbeat every 30 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

const OUTBOX_CAPACITY: usize = 64;

/// Server → client frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    Snapshot {
        topic: String,
        items: serde_json::Value,
    },
    /// Acknowledges a `select` or `clear`.
    Selected { session_id: Option<Uuid> },
    Error { code: &'static str, message: String },
    Heartbeat { server_time: String },
}

/// Client → server frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Select { session_id: Uuid },
    Clear,
}

// ═══════════════════════════════════════════════════════════
// Upgrade handlers
// ═══════════════════════════════════════════════════════════

/// `GET /ws/sessions`
pub async fn sessions(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?.clone();
    tracing::info!(patient_id = %patient.id, "Session list socket accepted");
    Ok(ws.on_upgrade(move |socket| handle_sessions(socket, ctx, patient)))
}

/// `GET /ws/sessions/:id/messages`
pub async fn session_messages(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let patient = ctx.gate.patient(caller.identity())?;
    let session_id = parse_id(&id)?;
    ctx.sessions.get_owned(&patient.id, &session_id)?;
    tracing::info!(patient_id = %patient.id, session_id = %session_id, "Message socket accepted");
    let stream = ctx.stream.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        forward(socket, stream.subscribe(&session_id)).await;
    }))
}

/// `GET /ws/clinician/tickets?view=pending|all`
pub async fn clinician_tickets(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<QueueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let view = parse_view(query.view.as_deref())?;
    tracing::info!(clinician = grant.email(), ?view, "Queue socket accepted");
    Ok(ws.on_upgrade(move |socket| handle_queue(socket, ctx, grant, view)))
}

/// `GET /ws/clinician/tickets/:id/messages`
pub async fn clinician_session(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = ctx.gate.grant(caller.identity())?;
    let ticket_id = parse_id(&id)?;
    let subscription = ctx.console.subscribe_session(&grant, &ticket_id)?;
    Ok(ws.on_upgrade(move |socket| async move {
        forward(socket, subscription).await;
        tracing::info!(clinician = grant.email(), ticket_id = %ticket_id, "Ticket session socket closed");
    }))
}

// ═══════════════════════════════════════════════════════════
// Connection handlers
// ═══════════════════════════════════════════════════════════

async fn handle_queue(socket: WebSocket, ctx: ApiContext, grant: ClinicianGrant, view: QueueView) {
    forward(socket, ctx.console.subscribe_queue(&grant, view)).await;
    tracing::info!(clinician = grant.email(), "Queue socket closed");
}

/// Push every snapshot of one subscription until either side ends.
async fn forward<T>(socket: WebSocket, mut subscription: Subscription<T>)
where
    T: Clone + PartialEq + Serialize + Send + 'static,
{
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, sender_handle) = spawn_sender(ws_sink);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else { break };
                if tx.send(snapshot_frame(subscription.topic(), snapshot)).await.is_err() {
                    break;
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                let _ = tx.send(heartbeat_frame()).await;
            }
        }
    }

    subscription.release().await;
    drop(tx);
    let _ = sender_handle.await;
}

/// Session list plus the selected session's messages.
///
/// Selecting another session releases the previous message subscription
/// before the next one opens.
async fn handle_sessions(socket: WebSocket, ctx: ApiContext, patient: Identity) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, sender_handle) = spawn_sender(ws_sink);
    let mut list = ctx.sessions.open_sessions(&patient.id);
    let mut active = ActiveSession::new(ctx.stream.clone());
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            snapshot = list.next() => {
                let Some(snapshot) = snapshot else { break };
                if tx.send(snapshot_frame(list.topic(), snapshot)).await.is_err() {
                    break;
                }
            }
            update = next_active(&mut active) => {
                match update {
                    Some((topic, snapshot)) => {
                        if tx.send(snapshot_frame(&topic, snapshot)).await.is_err() {
                            break;
                        }
                    }
                    // Store went away under the message subscription.
                    None => active.clear().await,
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_frame(&ctx, &patient, &mut active, &text).await;
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                let _ = tx.send(heartbeat_frame()).await;
            }
        }
    }

    active.clear().await;
    list.release().await;
    drop(tx);
    let _ = sender_handle.await;
    tracing::info!(patient_id = %patient.id, "Session list socket closed");
}

async fn handle_client_frame(
    ctx: &ApiContext,
    patient: &Identity,
    active: &mut ActiveSession,
    text: &str,
) -> PushFrame {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            return PushFrame::Error {
                code: "BAD_FRAME",
                message: err.to_string(),
            }
        }
    };
    match frame {
        ClientFrame::Select { session_id } => {
            if let Err(err) = ctx.sessions.get_owned(&patient.id, &session_id) {
                return PushFrame::Error {
                    code: "SELECT_REJECTED",
                    message: err.to_string(),
                };
            }
            active.switch_to(session_id).await;
            PushFrame::Selected {
                session_id: Some(session_id),
            }
        }
        ClientFrame::Clear => {
            active.clear().await;
            PushFrame::Selected { session_id: None }
        }
    }
}

/// Next snapshot of the selected session; pends forever when none is selected.
async fn next_active(active: &mut ActiveSession) -> Option<(Topic, Snapshot<ChatMessage>)> {
    match active.subscription() {
        Some(subscription) => {
            let snapshot = subscription.next().await?;
            Some((subscription.topic().clone(), snapshot))
        }
        None => std::future::pending().await,
    }
}

// ═══════════════════════════════════════════════════════════
// Frames
// ═══════════════════════════════════════════════════════════

/// Spawn the sender task (reads from channel, writes to WebSocket).
fn spawn_sender(
    ws_sink: SplitSink<WebSocket, Message>,
) -> (mpsc::Sender<PushFrame>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<PushFrame>(OUTBOX_CAPACITY);
    let handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });
    (tx, handle)
}

fn snapshot_frame<T: Serialize>(topic: &Topic, snapshot: Snapshot<T>) -> PushFrame {
    match snapshot {
        Ok(items) => match serde_json::to_value(&items) {
            Ok(items) => PushFrame::Snapshot {
                topic: topic.to_string(),
                items,
            },
            Err(err) => PushFrame::Error {
                code: "INTERNAL",
                message: err.to_string(),
            },
        },
        Err(err) => PushFrame::Error {
            code: "STORE_UNAVAILABLE",
            message: err.to_string(),
        },
    }
}

fn heartbeat_frame() -> PushFrame {
    PushFrame::Heartbeat {
        server_time: chrono::Utc::now().to_rfc3339(),
    }
}
