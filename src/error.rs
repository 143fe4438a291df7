use thiserror::Error;

/// Errors the core rejects with, as opposed to the silent no-ops described
/// in the error handling design (unknown session, stale client revision).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("operation has type {op_type:?} but fields for the other type (position {position}, length {length})")]
    MalformedOperation {
        op_type: crate::operation::OperationType,
        position: u64,
        length: u64,
    },

    #[error("document task for session '{session_id}' is no longer running")]
    DocumentGone { session_id: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
