//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic; we reply with a single JSON message per request.
//!
//! Feature requests run as their own tasks and reply through a channel, so the
//! loop keeps reading while a model call is pending. A repeat of a feature that
//! is still running is answered with a busy error, never queued.
//!
//! Once a socket authenticates, session events for its user are pushed as they
//! happen. Events for other users are never forwarded.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::SessionEvent;
use crate::state::AppState;

/// Feature replies waiting to be written to one socket.
const REPLY_QUEUE: usize = 16;

#[instrument(level = "info", skip_all)]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "studymate_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Per-connection identity. Anonymous sockets get their own owner id so their
/// in-flight slots do not collide with other connections.
struct Conn {
  owner: String,
  user_id: Option<String>,
}

#[instrument(level = "info", skip_all)]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "studymate_backend", "WebSocket connected");
  let mut events = state.sessions.subscribe();
  let (replies, mut pending) = mpsc::channel::<ServerWsMessage>(REPLY_QUEUE);
  let mut conn = Conn { owner: format!("ws-{}", Uuid::new_v4()), user_id: None };

  loop {
    let reply = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) if is_feature(&msg) => {
            debug!(target: "studymate_backend", "WS received: {:?}", &msg);
            spawn_feature(msg, state.clone(), &conn, replies.clone());
            None
          }
          Ok(msg) => {
            debug!(target: "studymate_backend", "WS received: {:?}", &msg);
            Some(handle_client_ws(msg, &state, &mut conn).await)
          }
          Err(e) => Some(ServerWsMessage::error(&AppError::validation("Invalid message", format!("Invalid JSON: {e}")))),
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          None
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => None,
        Some(Err(e)) => {
          warn!(target: "studymate_backend", error = %e, "WS receive error");
          break;
        }
      },
      Some(done) = pending.recv() => Some(done),
      event = events.recv() => match event {
        Ok(event) => forward_event(&mut conn, event),
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "session", skipped, "WS session listener lagged");
          None
        }
        Err(RecvError::Closed) => break,
      },
    };

    let Some(reply) = reply else { continue };
    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "error": { "title": "Something went wrong", "description": format!("Serialization error: {e}"), "code": "INTERNAL_ERROR" } }).to_string()
    });
    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "studymate_backend", error = %e, "WS send error");
      break;
    }
  }
  info!(target: "studymate_backend", "WebSocket disconnected");
}

/// Session events for this connection's user; a sign-out also unbinds the socket.
fn forward_event(conn: &mut Conn, event: SessionEvent) -> Option<ServerWsMessage> {
  let user_id = conn.user_id.as_deref()?;
  if event.user_id() != user_id {
    return None;
  }
  if matches!(event, SessionEvent::SignedOut { .. }) {
    conn.user_id = None;
  }
  Some(ServerWsMessage::Session { event })
}

fn is_feature(msg: &ClientWsMessage) -> bool {
  !matches!(msg, ClientWsMessage::Ping | ClientWsMessage::Authenticate { .. })
}

/// Run a feature request off the socket loop. The connection's identity is
/// captured now; a later sign-out does not cancel the running call.
fn spawn_feature(msg: ClientWsMessage, state: Arc<AppState>, conn: &Conn, replies: mpsc::Sender<ServerWsMessage>) {
  let owner = conn.owner.clone();
  let signed_in = conn.user_id.is_some();
  tokio::spawn(async move {
    let reply = feature_reply(msg, &state, &owner, signed_in).await;
    if replies.send(reply).await.is_err() {
      debug!(target: "studymate_backend", "WS closed before the feature reply was ready");
    }
  });
}

#[instrument(level = "info", skip(state, conn))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, conn: &mut Conn) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Authenticate { access_token } => match state.session_user(&access_token).await {
      Some(user) => {
        info!(target: "session", user_id = %user.id, "WS bound to session");
        conn.owner = user.id.clone();
        conn.user_id = Some(user.id.clone());
        ServerWsMessage::Authenticated { user }
      }
      None => ServerWsMessage::error(&AppError::Unauthorized("Session not found. Please sign in again.".into())),
    },

    feature => feature_reply(feature, state, &conn.owner, conn.user_id.is_some()).await,
  }
}

async fn feature_reply(msg: ClientWsMessage, state: &AppState, owner: &str, signed_in: bool) -> ServerWsMessage {
  let result = match msg {
    _ if state.require_auth && !signed_in => Err(AppError::Unauthorized("Please sign in to use this feature.".into())),

    ClientWsMessage::ReviewEssay(body) => {
      review_essay(state, owner, body.into_request()).await.map(ServerWsMessage::EssayReview)
    }
    ClientWsMessage::PlanSchedule(body) => match body.into_request(server_today()) {
      Ok(req) => plan_schedule(state, owner, req).await.map(ServerWsMessage::Schedule),
      Err(e) => Err(e),
    },
    ClientWsMessage::GenerateQuiz(body) => {
      generate_quiz(state, owner, body.into_request()).await.map(ServerWsMessage::Quiz)
    }
    ClientWsMessage::ExplainTopic(body) => {
      explain_topic(state, owner, body.into_request()).await.map(ServerWsMessage::Explanation)
    }
    ClientWsMessage::GenerateFlashcards(body) => {
      generate_flashcards(state, owner, body.into_request()).await.map(ServerWsMessage::Flashcards)
    }
    ClientWsMessage::Ping | ClientWsMessage::Authenticate { .. } => {
      Err(AppError::validation("Invalid message", "Not a feature request."))
    }
  };
  result.unwrap_or_else(|e| ServerWsMessage::error(&e))
}
