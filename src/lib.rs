//! Server-side core of a real-time collaborative plain-text editor: the
//! document model, the operational-transform engine, the per-document
//! dispatcher, and session/membership tracking.
//!
//! The crate deliberately stops at the edge of the network: [`Server`]
//! drives the wire-contract event handlers, but turning bytes on a socket
//! into calls on `Server` — and the reverse, delivering a [`Broadcaster`]
//! call to a socket — is the adapter's job. `main.rs` behind the
//! `executable-deps` feature is one such adapter, kept intentionally thin.

pub mod broadcaster;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod ids;
pub mod operation;
pub mod ot;
pub mod server;
pub mod session;

#[cfg(feature = "executable-deps")]
pub mod cli;
#[cfg(feature = "executable-deps")]
pub mod config;
pub mod logging;

pub use broadcaster::Broadcaster;
pub use error::{CoreError, Result};
pub use ids::{ClientId, SessionId};
pub use operation::{OpId, Operation, OperationType};
pub use server::Server;
pub use session::SessionManager;
