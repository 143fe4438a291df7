//! The per-session document: owns the text, revision counter, and history,
//! and is the only place that applies or transforms operations (spec §3,
//! §4.2).
//!
//! `Document` itself does no locking or async work — it's a plain data
//! structure. Serializing concurrent access to it is the dispatcher's job
//! (spec §5); see [`crate::dispatcher`].

use crate::error::{CoreError, Result};
use crate::ids::ClientId;
use crate::operation::{Operation, OperationType};
use crate::ot;
use std::collections::HashMap;

/// Invariant H1/H2/H3 (spec §3) hold at every point outside of
/// [`Document::apply_operations`] and [`Document::undo_last_operation`].
#[derive(Debug)]
pub struct Document {
    session_id: String,
    text: Vec<u16>,
    revision: u64,
    clients: HashMap<ClientId, u64>,
    history: Vec<Operation>,
}

impl Document {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: Vec::new(),
            revision: 0,
            clients: HashMap::new(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf16_lossy(&self.text)
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn client_revision(&self, client_id: &ClientId) -> Option<u64> {
        self.clients.get(client_id).copied()
    }

    /// Installs `client_id` at the document's current revision (spec §4.1
    /// `add_client`: `document.clients[client_id] = document.revision`).
    pub fn register_client(&mut self, client_id: ClientId) {
        self.clients.insert(client_id, self.revision);
    }

    /// Idempotent for unknown client ids (spec §4.1 `remove_client`).
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    /// Applies an incoming batch of operations from `client_id`, who last
    /// saw `client_revision`. Returns the operations as actually applied
    /// (post-transform, post-clamp), in order (spec §4.2).
    pub fn apply_operations(
        &mut self,
        client_id: ClientId,
        client_revision: u64,
        operations: Vec<Operation>,
    ) -> Result<Vec<Operation>> {
        for op in &operations {
            op.validate_shape()?;
        }

        let mut ops = operations;
        for op in &mut ops {
            // Mint ids/timestamps the client left unassigned before this op
            // is transformed or touches history (spec §3, §4.2).
            op.stamp_if_unassigned();
        }
        let server_revision = self.revision;

        // client_revision > server_revision is defensive-only (spec §7): treat as equal.
        let effective_client_revision = client_revision.min(server_revision);
        if effective_client_revision < server_revision {
            let missed = &self.history[effective_client_revision as usize..server_revision as usize];
            ot::transform_batch(&mut ops, missed);
        }

        let mut applied = Vec::with_capacity(ops.len());
        for mut op in ops {
            self.clamp_and_apply(&mut op);
            self.history.push(op.clone());
            self.revision += 1;
            applied.push(op);
        }

        self.clients.insert(client_id, self.revision);
        Ok(applied)
    }

    /// Clamps `op`'s position/length to the live text (spec §4.2 step 4),
    /// records `deleted_text` for deletes, and splices `self.text`.
    fn clamp_and_apply(&mut self, op: &mut Operation) {
        let len = self.text.len() as u64;
        op.position = op.position.min(len);

        match op.op_type {
            OperationType::Insert => {
                let inserted: Vec<u16> = op.text.encode_utf16().collect();
                let at = op.position as usize;
                self.text.splice(at..at, inserted);
            }
            OperationType::Delete => {
                op.length = op.length.min(len - op.position);
                let start = op.position as usize;
                let end = start + op.length as usize;
                op.deleted_text = String::from_utf16_lossy(&self.text[start..end]);
                self.text.splice(start..end, std::iter::empty());
            }
        }
    }

    /// Pops the last history entry and applies its inverse, rewinding the
    /// document by one revision (spec §4.2.2). Returns `None` if history is
    /// empty. Undo is global per document, not per-client, and is not
    /// itself recorded in `history`.
    pub fn undo_last_operation(&mut self) -> Option<Vec<Operation>> {
        let last = self.history.pop()?;

        let mut inverse = match last.op_type {
            OperationType::Insert => {
                Operation::delete(last.position, last.insert_len())
            }
            OperationType::Delete => Operation::insert(last.position, last.deleted_text.clone()),
        };

        self.clamp_and_apply(&mut inverse);
        self.revision -= 1;

        Some(vec![inverse])
    }

    /// Snapshot of the full applied history, in order (spec §4.2.3).
    #[must_use]
    pub fn get_edit_history(&self) -> Vec<Operation> {
        self.history.clone()
    }
}
