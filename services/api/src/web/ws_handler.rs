//! services/api/src/web/ws_handler.rs
//!
//! The live session stream. Each connection holds one `SessionContext` for the
//! caller's token and pushes a message whenever the session changes, e.g. when
//! the same account signs out in another tab.

use crate::web::{
    middleware::AccessToken,
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};
use trustpaws_core::domain::SessionUser;
use trustpaws_core::ports::IdentityProvider;
use trustpaws_core::session::SessionContext;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Extension(AccessToken(token)): Extension<AccessToken>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user, token))
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    let json = serde_json::to_string(message).map_err(|e| {
        error!("Failed to serialize message: {:?}", e);
    })?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| warn!("Failed to send message: {:?}", e))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: SessionUser, token: String) {
    info!("Session stream opened for user: {}", user.user_id);
    let (sender, receiver) = socket.split();
    stream_session(sender, receiver, app_state.identity.clone(), token).await;
    info!("Session stream closed for user: {}", user.user_id);
}

/// Pushes session snapshots to `sender` until the session ends or the client
/// goes away. A snapshot without a user is followed by a close frame.
async fn stream_session<S, R>(
    mut sender: S,
    mut receiver: R,
    identity: Arc<dyn IdentityProvider>,
    token: String,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let context = SessionContext::attach(identity.clone(), token.clone());
    let mut updates = context.subscribe();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.is_loading {
                    continue;
                }
                let ended = snapshot.user.is_none();
                if send(&mut sender, &ServerMessage::from(snapshot)).await.is_err() {
                    break;
                }
                if ended {
                    if let Err(e) = sender.send(Message::Close(None)).await {
                        warn!("Failed to close session stream: {:?}", e);
                    }
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::SignOut) => {
                            if let Err(e) = identity.sign_out(&token).await {
                                error!("Failed to sign out over stream: {:?}", e);
                                let msg = ServerMessage::Error {
                                    message: "Failed to sign out".to_string(),
                                };
                                if send(&mut sender, &msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            let msg = ServerMessage::Error {
                                message: format!("Unrecognised message: {}", e),
                            };
                            if send(&mut sender, &msg).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("Session stream error: {:?}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::timeout;
    use trustpaws_core::testing::MemoryIdentity;

    async fn next_message(outgoing: &mut mpsc::UnboundedReceiver<Message>) -> Option<Message> {
        timeout(Duration::from_secs(1), outgoing.next())
            .await
            .expect("expected the stream to make progress")
    }

    fn as_json(message: Option<Message>) -> Value {
        match message {
            Some(Message::Text(text)) => {
                serde_json::from_str(text.as_str()).expect("expected a JSON message")
            }
            other => panic!("expected a text message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn sign_out_sends_null_session_then_closes() {
        let identity = Arc::new(MemoryIdentity::new());
        identity.register("ana@example.com", "secret123");
        let session = identity
            .sign_in_with_password("ana@example.com", "secret123")
            .await
            .expect("expected sign in to succeed");

        let (out_tx, mut outgoing) = mpsc::unbounded::<Message>();
        let (in_tx, incoming) = mpsc::unbounded::<Result<Message, axum::Error>>();
        let stream = tokio::spawn(stream_session(
            out_tx,
            incoming,
            identity.clone(),
            session.access_token.clone(),
        ));

        let first = as_json(next_message(&mut outgoing).await);
        assert_eq!(first["type"], "session");
        assert_eq!(first["user"]["email"], "ana@example.com");

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"type":"sign_out"}"#.into())))
            .expect("expected the stream to accept input");

        let ended = as_json(next_message(&mut outgoing).await);
        assert_eq!(ended["type"], "session");
        assert!(ended["user"].is_null());
        assert!(matches!(
            next_message(&mut outgoing).await,
            Some(Message::Close(None))
        ));

        timeout(Duration::from_secs(1), stream)
            .await
            .expect("expected the stream to finish")
            .expect("expected the stream task not to panic");
        assert!(next_message(&mut outgoing).await.is_none());
    }

    #[tokio::test]
    async fn unknown_token_is_closed_immediately() {
        let identity = Arc::new(MemoryIdentity::new());
        let (out_tx, mut outgoing) = mpsc::unbounded::<Message>();
        let (_in_tx, incoming) = mpsc::unbounded::<Result<Message, axum::Error>>();
        tokio::spawn(stream_session(out_tx, incoming, identity, "nope".to_string()));

        let snapshot = as_json(next_message(&mut outgoing).await);
        assert!(snapshot["user"].is_null());
        assert!(matches!(
            next_message(&mut outgoing).await,
            Some(Message::Close(None))
        ));
    }
}
