//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol for the live session stream.

use serde::{Deserialize, Serialize};
use trustpaws_core::domain::SessionUser;
use trustpaws_core::session::SessionSnapshot;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ends the session. Every stream on the same session then reports `user: null`.
    SignOut,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The session as of now. Sent once on connect and again after every change.
    Session { user: Option<SessionUser> },

    /// Reports a failed client request; the stream stays open.
    Error { message: String },
}

impl From<SessionSnapshot> for ServerMessage {
    fn from(snapshot: SessionSnapshot) -> Self {
        ServerMessage::Session {
            user: snapshot.user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged() {
        let json = serde_json::to_string(&ServerMessage::from(SessionSnapshot::anonymous())).unwrap();
        assert_eq!(json, r#"{"type":"session","user":null}"#);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"sign_out"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SignOut);
    }
}
