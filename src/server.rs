//! Wires the [`SessionManager`], per-document dispatchers, and a
//! [`Broadcaster`] together into the inbound event handlers fixed by the
//! wire contract (spec §6). This is the "Global mutable state" the design
//! notes call for: `NETWORK_DELAY` and the session manager are members of
//! one `Server` value, not hidden globals (spec §9).

use crate::broadcaster::{
    Broadcaster, CursorUpdatePayload, DelayUpdatedPayload, InitPayload, UserJoinedPayload,
    UserLeftPayload,
};
use crate::ids::{ClientId, SessionId};
use crate::operation::Operation;
use crate::session::SessionManager;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

fn anonymous() -> String {
    "Anonymous".to_string()
}

#[derive(Debug, Deserialize)]
pub struct JoinPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(default = "anonymous")]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct EditPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub revision: u64,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Deserialize)]
pub struct CursorPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub position: u64,
    #[serde(rename = "selectionEnd", default)]
    pub selection_end: Option<u64>,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestHistoryPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct UndoPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct SetDelayPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub delay: f64,
}

/// The process-wide server state: the session manager, the broadcaster
/// every document actor and every direct reply fans events out through, and
/// the simulated network delay knob (spec §6 `set_delay`, §5 "Suspension
/// points").
///
/// The broadcaster is a field set once at construction, not a per-call
/// argument: a document's actor holds onto the same `Arc` for its entire
/// lifetime (spec §5's FIFO broadcast-order guarantee requires the commit
/// and the broadcast to happen from inside the same serialized loop, so the
/// actor — not `Server` — makes the `update`/`history_update` calls for
/// edits and undos; `Server` only broadcasts directly for events that don't
/// go through a document actor at all: `init`/`user_joined`,
/// `cursor_update`, `history`, `delay_updated`, `user_left`).
pub struct Server {
    sessions: Arc<SessionManager>,
    broadcaster: Arc<dyn Broadcaster>,
    network_delay: RwLock<f64>,
}

impl Server {
    #[must_use]
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self::with_sessions(Arc::new(SessionManager::new()), broadcaster)
    }

    /// Builds a `Server` over an already-constructed session manager. Useful
    /// when the broadcaster implementation itself needs a handle to the same
    /// `SessionManager` (e.g. to resolve session membership when fanning a
    /// `send_to_session` call out to sockets) and so must be built before
    /// the `Server` that will own it.
    #[must_use]
    pub fn with_sessions(sessions: Arc<SessionManager>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            sessions,
            broadcaster,
            network_delay: RwLock::new(0.0),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Shares the underlying session manager with a broadcaster
    /// implementation, which needs it to resolve session membership when
    /// fanning a `send_to_session` call out to sockets.
    #[must_use]
    pub fn sessions_arc(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    pub async fn handle_join(&self, client_id: ClientId, payload: JoinPayload) {
        let JoinPayload {
            session_id,
            username,
        } = payload;

        let document = self
            .sessions
            .get_or_create_document(&session_id, self.broadcaster.clone());
        self.sessions
            .add_client(client_id.clone(), session_id.clone(), username);

        let (text, revision) = match document.register_client(client_id.clone()).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%session_id, error = %err, "join failed: document actor unavailable");
                return;
            }
        };

        let clients = self.sessions.get_session_clients(&session_id);

        self.broadcaster
            .send_to_client(
                &client_id,
                "init",
                serde_json::to_value(InitPayload {
                    text,
                    revision,
                    clients: clients.clone(),
                })
                .expect("InitPayload always serializes"),
            )
            .await;

        self.broadcaster
            .send_to_session(
                &session_id,
                "user_joined",
                serde_json::to_value(UserJoinedPayload {
                    client_id: client_id.clone(),
                    clients,
                })
                .expect("UserJoinedPayload always serializes"),
                Some(&client_id),
            )
            .await;
    }

    pub async fn handle_edit(&self, client_id: ClientId, payload: EditPayload) {
        let EditPayload {
            session_id,
            revision,
            operations,
        } = payload;

        self.sleep_for_network_delay().await;

        let Some(document) = self.sessions.get_document(&session_id) else {
            // Unknown session: silently no-op (spec §7).
            return;
        };

        // The actor broadcasts the resulting `update` event itself, from
        // inside the same serialized loop iteration that committed it
        // (spec §5), so there is nothing left to do here but surface
        // rejections.
        if let Err(err) = document
            .apply_operations(client_id.clone(), revision, operations)
            .await
        {
            // Malformed payload: reject by broadcasting nothing (spec §7).
            warn!(%session_id, %client_id, error = %err, "edit rejected");
        }
    }

    pub async fn handle_cursor(&self, client_id: ClientId, payload: CursorPayload) {
        let selection_end = payload.selection_end.unwrap_or(payload.position);
        self.broadcaster
            .send_to_session(
                &payload.session_id,
                "cursor_update",
                serde_json::to_value(CursorUpdatePayload {
                    client_id: client_id.clone(),
                    position: payload.position,
                    selection_end,
                    username: payload.username,
                })
                .expect("CursorUpdatePayload always serializes"),
                Some(&client_id),
            )
            .await;
    }

    pub async fn handle_request_history(
        &self,
        client_id: ClientId,
        payload: RequestHistoryPayload,
    ) {
        let Some(document) = self.sessions.get_document(&payload.session_id) else {
            return;
        };
        if let Ok(history) = document.get_edit_history().await {
            self.broadcaster
                .send_to_client(
                    &client_id,
                    "history",
                    serde_json::to_value(history).expect("history always serializes"),
                )
                .await;
        }
    }

    pub async fn handle_undo(&self, client_id: ClientId, payload: UndoPayload) {
        let Some(document) = self.sessions.get_document(&payload.session_id) else {
            return;
        };
        // The actor broadcasts both the `update` and `history_update` events
        // itself, from inside the same serialized loop iteration that
        // performed the undo (spec §5).
        let _ = document.undo(client_id).await;
    }

    pub async fn handle_set_delay(&self, payload: SetDelayPayload) {
        *self.network_delay.write().await = payload.delay;
        self.broadcaster
            .send_to_session(
                &payload.session_id,
                "delay_updated",
                serde_json::to_value(DelayUpdatedPayload {
                    delay: payload.delay,
                })
                .expect("DelayUpdatedPayload always serializes"),
                None,
            )
            .await;
    }

    /// Triggered by the transport on disconnection (spec §6 "(disconnect)").
    pub async fn handle_disconnect(&self, client_id: ClientId) {
        let Some(session_id) = self.sessions.remove_client(&client_id) else {
            return;
        };
        if let Some(document) = self.sessions.get_document(&session_id) {
            let _ = document.remove_client(client_id.clone()).await;
        }

        let clients = self.sessions.get_session_clients(&session_id);
        self.broadcaster
            .send_to_session(
                &session_id,
                "user_left",
                serde_json::to_value(UserLeftPayload {
                    client_id,
                    clients,
                })
                .expect("UserLeftPayload always serializes"),
                None,
            )
            .await;
    }

    async fn sleep_for_network_delay(&self) {
        let delay = *self.network_delay.read().await;
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }
}
