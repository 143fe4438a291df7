//! The membership manager: the mapping of clients to sessions, and the
//! contract between session state and documents (spec §4.1).
//!
//! `SessionManager`'s own bookkeeping (`sessions`, `clients`, `client_info`)
//! lives behind its own mutex, separate from any given document's actor —
//! the two are never held at once while calling out to a broadcaster
//! (spec §5 "Shared resource policy"). Lock order, when both are needed: the
//! session manager's maps first, then (after releasing that lock) the
//! per-document handle.

use crate::broadcaster::Broadcaster;
use crate::dispatcher::DocumentHandle;
use crate::ids::{ClientId, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub username: String,
}

/// A single entry of [`SessionManager::get_session_clients`]'s snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionClient {
    pub id: ClientId,
    pub username: String,
}

#[derive(Default)]
struct State {
    sessions: HashMap<SessionId, DocumentHandle>,
    clients: HashMap<ClientId, SessionId>,
    client_info: HashMap<ClientId, ClientInfo>,
}

/// Owns the set of documents and the client-to-session / client-to-metadata
/// mappings (spec §3, §4.1). Safe to share across connections behind an
/// `Arc`; internal state is guarded by a single std `Mutex`, since every
/// operation on it is a short, synchronous map lookup/update with no
/// `.await` points while the lock is held.
#[derive(Default)]
pub struct SessionManager {
    state: Mutex<State>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing document handle for `session_id`, or spawns and
    /// installs a fresh one (spec §4.1). `broadcaster` is only consulted
    /// when a document is actually spawned: the new actor holds onto it for
    /// the rest of its lifetime, so every commit it makes can broadcast
    /// from inside its own serialized loop (spec §5's FIFO guarantee).
    pub fn get_or_create_document(
        &self,
        session_id: &SessionId,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> DocumentHandle {
        let mut state = self.state.lock().expect("session manager mutex poisoned");
        if let Some(handle) = state.sessions.get(session_id) {
            return handle.clone();
        }
        let handle = DocumentHandle::spawn(session_id.as_ref().to_string(), broadcaster);
        state.sessions.insert(session_id.clone(), handle.clone());
        handle
    }

    /// Lookup only; never creates a document (spec §4.1).
    #[must_use]
    pub fn get_document(&self, session_id: &SessionId) -> Option<DocumentHandle> {
        let state = self.state.lock().expect("session manager mutex poisoned");
        state.sessions.get(session_id).cloned()
    }

    /// Records the client/session/metadata mappings. Does *not* touch the
    /// document's own per-client revision map — callers must separately
    /// drive [`DocumentHandle::register_client`] on the returned handle,
    /// since that requires a round-trip through the document's actor
    /// (spec §4.1: "set `document.clients[client_id] = document.revision`").
    pub fn add_client(&self, client_id: ClientId, session_id: SessionId, username: String) {
        info!(%client_id, %session_id, %username, "client added to session");
        let mut state = self.state.lock().expect("session manager mutex poisoned");
        state.clients.insert(client_id.clone(), session_id);
        state.client_info.insert(client_id, ClientInfo { username });
    }

    /// Removes `client_id` from `clients` and `client_info`. Idempotent for
    /// unknown client ids. Returns the session id the client was in, if
    /// any, so the caller can also clean up the document's per-client
    /// revision entry.
    pub fn remove_client(&self, client_id: &ClientId) -> Option<SessionId> {
        let mut state = self.state.lock().expect("session manager mutex poisoned");
        state.client_info.remove(client_id);
        let session_id = state.clients.remove(client_id);
        if session_id.is_some() {
            info!(%client_id, "client removed from session");
        }
        session_id
    }

    /// Enumerates clients whose session matches and for whom metadata
    /// exists. Order is unspecified; the result is a snapshot (spec §4.1).
    #[must_use]
    pub fn get_session_clients(&self, session_id: &SessionId) -> Vec<SessionClient> {
        let state = self.state.lock().expect("session manager mutex poisoned");
        state
            .clients
            .iter()
            .filter(|(_, sid)| *sid == session_id)
            .filter_map(|(client_id, _)| {
                state.client_info.get(client_id).map(|info| SessionClient {
                    id: client_id.clone(),
                    username: info.username.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::recording::RecordingBroadcaster;

    fn cid(s: &str) -> ClientId {
        ClientId::new(s)
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s)
    }

    fn broadcaster() -> Arc<dyn Broadcaster> {
        Arc::new(RecordingBroadcaster::new())
    }

    #[tokio::test]
    async fn get_or_create_document_installs_lazily_and_reuses() {
        let manager = SessionManager::new();
        assert!(manager.get_document(&sid("s1")).is_none());

        let first = manager.get_or_create_document(&sid("s1"), broadcaster());
        let second = manager.get_or_create_document(&sid("s1"), broadcaster());
        assert_eq!(first.session_id(), second.session_id());
        assert!(manager.get_document(&sid("s1")).is_some());
    }

    #[test]
    fn add_and_remove_client_updates_membership() {
        let manager = SessionManager::new();
        manager.add_client(cid("a"), sid("s1"), "alice".into());
        manager.add_client(cid("b"), sid("s1"), "bob".into());
        manager.add_client(cid("c"), sid("s2"), "carol".into());

        let mut clients = manager.get_session_clients(&sid("s1"));
        clients.sort_by(|a, b| a.id.as_ref().cmp(b.id.as_ref()));
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].username, "alice");
        assert_eq!(clients[1].username, "bob");

        let removed_session = manager.remove_client(&cid("a"));
        assert_eq!(removed_session, Some(sid("s1")));
        assert_eq!(manager.get_session_clients(&sid("s1")).len(), 1);

        // Idempotent for unknown client ids.
        assert_eq!(manager.remove_client(&cid("a")), None);
    }
}
