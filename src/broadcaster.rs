//! The contract the core uses to push events to connected peers
//! (spec §4.3). The core never knows about the transport; it only ever
//! talks to a `Broadcaster`.

use crate::ids::{ClientId, SessionId};
use async_trait::async_trait;
use serde::Serialize;

/// External collaborator that delivers events to clients. Implementations
/// are thin adapters over whatever transport is in use (WebSocket,
/// Socket.IO-alike, raw TCP, ...) — picking and implementing that transport
/// is explicitly out of scope for this crate (spec §1).
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send_to_client(&self, client_id: &ClientId, event: &str, payload: serde_json::Value);

    async fn send_to_session(
        &self,
        session_id: &SessionId,
        event: &str,
        payload: serde_json::Value,
        exclude_client_id: Option<&ClientId>,
    );
}

/// Event payloads emitted by the core (spec §4.3, §6). Event names are part
/// of the external wire contract and must not change independently of the
/// spec.
#[derive(Debug, Serialize)]
pub struct InitPayload {
    pub text: String,
    pub revision: u64,
    pub clients: Vec<crate::session::SessionClient>,
}

#[derive(Debug, Serialize)]
pub struct UserJoinedPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    pub clients: Vec<crate::session::SessionClient>,
}

#[derive(Debug, Serialize)]
pub struct UserLeftPayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    pub clients: Vec<crate::session::SessionClient>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    pub revision: u64,
    pub operations: Vec<crate::operation::Operation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryUpdateAction {
    Undo,
}

#[derive(Debug, Serialize)]
pub struct HistoryUpdatePayload {
    pub operation: crate::operation::Operation,
    pub action: HistoryUpdateAction,
}

#[derive(Debug, Serialize)]
pub struct CursorUpdatePayload {
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    pub position: u64,
    #[serde(rename = "selectionEnd")]
    pub selection_end: u64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct DelayUpdatedPayload {
    pub delay: f64,
}

/// A `Broadcaster` that records every call instead of delivering it
/// anywhere, for use in tests (see `tests/edit_flow.rs`).
#[cfg(any(test, feature = "test-util"))]
pub mod recording {
    use super::{Broadcaster, ClientId, SessionId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Recorded {
        pub target: Target,
        pub event: String,
        pub payload: serde_json::Value,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Target {
        Client(ClientId),
        Session {
            session_id: SessionId,
            exclude: Option<ClientId>,
        },
    }

    #[derive(Default)]
    pub struct RecordingBroadcaster {
        sent: Mutex<Vec<Recorded>>,
    }

    impl RecordingBroadcaster {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn sent(&self) -> Vec<Recorded> {
            self.sent.lock().expect("recording broadcaster poisoned").clone()
        }
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn send_to_client(
            &self,
            client_id: &ClientId,
            event: &str,
            payload: serde_json::Value,
        ) {
            self.sent
                .lock()
                .expect("recording broadcaster poisoned")
                .push(Recorded {
                    target: Target::Client(client_id.clone()),
                    event: event.to_string(),
                    payload,
                });
        }

        async fn send_to_session(
            &self,
            session_id: &SessionId,
            event: &str,
            payload: serde_json::Value,
            exclude_client_id: Option<&ClientId>,
        ) {
            self.sent
                .lock()
                .expect("recording broadcaster poisoned")
                .push(Recorded {
                    target: Target::Session {
                        session_id: session_id.clone(),
                        exclude: exclude_client_id.cloned(),
                    },
                    event: event.to_string(),
                    payload,
                });
        }
    }
}
