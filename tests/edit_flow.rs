//! End-to-end exercise of [`Server`] against a [`RecordingBroadcaster`],
//! covering the join/edit/undo/disconnect event flow (spec §6, §8 scenario
//! 6).

use collab_core::broadcaster::recording::{RecordingBroadcaster, Target};
use collab_core::broadcaster::Broadcaster;
use collab_core::ids::{ClientId, SessionId};
use collab_core::server::{EditPayload, JoinPayload, Server, UndoPayload};
use collab_core::Operation;
use std::sync::Arc;

fn cid(s: &str) -> ClientId {
    ClientId::new(s)
}

fn sid(s: &str) -> SessionId {
    SessionId::new(s)
}

fn server_and_recorder() -> (Server, Arc<RecordingBroadcaster>) {
    let recorder = Arc::new(RecordingBroadcaster::new());
    let server = Server::new(recorder.clone() as Arc<dyn Broadcaster>);
    (server, recorder)
}

#[tokio::test]
async fn join_sends_init_then_broadcasts_user_joined() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_join(
            cid("alice"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Alice".into(),
            },
        )
        .await;

    let sent = broadcaster.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].target, Target::Client(cid("alice")));
    assert_eq!(sent[0].event, "init");
    assert_eq!(sent[0].payload["revision"], 0);

    assert_eq!(
        sent[1].target,
        Target::Session {
            session_id: sid("doc-1"),
            exclude: Some(cid("alice")),
        }
    );
    assert_eq!(sent[1].event, "user_joined");
}

#[tokio::test]
async fn second_joiner_sees_both_clients_in_init_snapshot() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_join(
            cid("alice"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Alice".into(),
            },
        )
        .await;
    server
        .handle_join(
            cid("bob"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Bob".into(),
            },
        )
        .await;

    let sent = broadcaster.sent();
    let bob_init = sent
        .iter()
        .find(|r| r.target == Target::Client(cid("bob")) && r.event == "init")
        .expect("bob must receive an init event");
    let clients = bob_init.payload["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 2);
}

#[tokio::test]
async fn edit_broadcasts_update_to_session_excluding_sender() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_join(
            cid("alice"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Alice".into(),
            },
        )
        .await;

    server
        .handle_edit(
            cid("alice"),
            EditPayload {
                session_id: sid("doc-1"),
                revision: 0,
                operations: vec![Operation::insert(0, "hello")],
            },
        )
        .await;

    let sent = broadcaster.sent();
    let update = sent
        .iter()
        .find(|r| r.event == "update")
        .expect("an update event must be sent");
    assert_eq!(
        update.target,
        Target::Session {
            session_id: sid("doc-1"),
            exclude: Some(cid("alice")),
        }
    );
    assert_eq!(update.payload["revision"], 1);
}

#[tokio::test]
async fn edit_against_unknown_session_is_a_silent_no_op() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_edit(
            cid("alice"),
            EditPayload {
                session_id: sid("ghost"),
                revision: 0,
                operations: vec![Operation::insert(0, "hello")],
            },
        )
        .await;

    assert!(broadcaster.sent().is_empty());
}

#[tokio::test]
async fn undo_broadcasts_update_and_history_update_to_everyone() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_join(
            cid("alice"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Alice".into(),
            },
        )
        .await;
    server
        .handle_edit(
            cid("alice"),
            EditPayload {
                session_id: sid("doc-1"),
                revision: 0,
                operations: vec![Operation::insert(0, "hi")],
            },
        )
        .await;

    server
        .handle_undo(
            cid("alice"),
            UndoPayload {
                session_id: sid("doc-1"),
            },
        )
        .await;

    let sent = broadcaster.sent();
    let undo_update = sent
        .iter()
        .rev()
        .find(|r| r.event == "update")
        .expect("undo must broadcast an update event");
    assert_eq!(
        undo_update.target,
        Target::Session {
            session_id: sid("doc-1"),
            exclude: None,
        }
    );

    let history_update = sent
        .iter()
        .find(|r| r.event == "history_update")
        .expect("undo must broadcast a history_update event");
    assert_eq!(history_update.payload["action"], "undo");
}

#[tokio::test]
async fn disconnect_broadcasts_user_left_with_remaining_clients() {
    let (server, broadcaster) = server_and_recorder();

    server
        .handle_join(
            cid("alice"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Alice".into(),
            },
        )
        .await;
    server
        .handle_join(
            cid("bob"),
            JoinPayload {
                session_id: sid("doc-1"),
                username: "Bob".into(),
            },
        )
        .await;

    server.handle_disconnect(cid("alice")).await;

    let sent = broadcaster.sent();
    let left = sent
        .iter()
        .rev()
        .find(|r| r.event == "user_left")
        .expect("disconnect must broadcast a user_left event");
    let clients = left.payload["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["id"], "bob");
}
