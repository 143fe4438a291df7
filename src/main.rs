//! A minimal line-delimited JSON TCP adapter for [`collab_core::Server`].
//!
//! This binary exists to make the crate runnable end-to-end; the choice of
//! transport and wire framing is explicitly out of scope for the core
//! (spec §1). Each line in is one inbound event `{"event": "...", ...}`,
//! each line out is one outbound event in the same shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use collab_core::broadcaster::Broadcaster;
use collab_core::cli::Cli;
use collab_core::config::AppConfig;
use collab_core::ids::{ClientId, SessionId};
use collab_core::logging;
use collab_core::server::{
    CursorPayload, EditPayload, JoinPayload, RequestHistoryPayload, Server, SetDelayPayload,
    UndoPayload,
};
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum InboundMessage {
    Join(JoinPayload),
    Edit(EditPayload),
    Cursor(CursorPayload),
    RequestHistory(RequestHistoryPayload),
    Undo(UndoPayload),
    SetDelay(SetDelayPayload),
}

struct TcpBroadcaster {
    sessions: Arc<collab_core::SessionManager>,
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<String>>>,
}

impl TcpBroadcaster {
    fn new(sessions: Arc<collab_core::SessionManager>) -> Self {
        Self {
            sessions,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, client_id: ClientId, tx: mpsc::UnboundedSender<String>) {
        self.clients
            .lock()
            .expect("broadcaster registry poisoned")
            .insert(client_id, tx);
    }

    fn unregister(&self, client_id: &ClientId) {
        self.clients
            .lock()
            .expect("broadcaster registry poisoned")
            .remove(client_id);
    }

    fn deliver(&self, client_id: &ClientId, line: &str) {
        let clients = self.clients.lock().expect("broadcaster registry poisoned");
        if let Some(tx) = clients.get(client_id) {
            let _ = tx.send(line.to_string());
        }
    }
}

#[async_trait]
impl Broadcaster for TcpBroadcaster {
    async fn send_to_client(&self, client_id: &ClientId, event: &str, payload: serde_json::Value) {
        let line = format!("{}\n", wrap(event, payload));
        self.deliver(client_id, &line);
    }

    async fn send_to_session(
        &self,
        session_id: &SessionId,
        event: &str,
        payload: serde_json::Value,
        exclude_client_id: Option<&ClientId>,
    ) {
        let line = format!("{}\n", wrap(event, payload));
        for client in self.sessions.get_session_clients(session_id) {
            if Some(&client.id) == exclude_client_id {
                continue;
            }
            self.deliver(&client.id, &line);
        }
    }
}

fn wrap(event: &str, payload: serde_json::Value) -> serde_json::Value {
    let mut value = payload;
    if let Some(map) = value.as_object_mut() {
        map.insert("event".to_string(), serde_json::Value::String(event.to_string()));
    }
    value
}

fn random_client_id() -> ClientId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    ClientId::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli);
    logging::initialize(config.debug);

    let sessions = Arc::new(collab_core::SessionManager::new());
    let broadcaster = Arc::new(TcpBroadcaster::new(sessions.clone()));
    let server = Arc::new(Server::with_sessions(sessions, broadcaster.clone()));

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");

    loop {
        let (socket, peer_addr) = listener.accept().await?;
        let server = Arc::clone(&server);
        let broadcaster = Arc::clone(&broadcaster);
        tokio::spawn(async move {
            let client_id = random_client_id();
            info!(%client_id, %peer_addr, "connection accepted");

            let (reader, mut writer) = socket.into_split();
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();
            broadcaster.register(client_id.clone(), tx);

            let writer_task = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
            });

            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        dispatch(&server, &client_id, &line).await;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%client_id, error = %err, "connection read error");
                        break;
                    }
                }
            }

            server.handle_disconnect(client_id.clone()).await;
            broadcaster.unregister(&client_id);
            writer_task.abort();
            info!(%client_id, "connection closed");
        });
    }
}

async fn dispatch(server: &Server, client_id: &ClientId, line: &str) {
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(err) => {
            warn!(%client_id, error = %err, "dropping malformed inbound message");
            return;
        }
    };

    match message {
        InboundMessage::Join(payload) => {
            server.handle_join(client_id.clone(), payload).await;
        }
        InboundMessage::Edit(payload) => {
            server.handle_edit(client_id.clone(), payload).await;
        }
        InboundMessage::Cursor(payload) => {
            server.handle_cursor(client_id.clone(), payload).await;
        }
        InboundMessage::RequestHistory(payload) => {
            server
                .handle_request_history(client_id.clone(), payload)
                .await;
        }
        InboundMessage::Undo(payload) => {
            server.handle_undo(client_id.clone(), payload).await;
        }
        InboundMessage::SetDelay(payload) => {
            server.handle_set_delay(payload).await;
        }
    }
}
