#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! Headless client core for a remote torrent daemon.
//!
//! Layout: `config.rs` (connection profile), `session.rs` (lifecycle state
//! machine), `reconcile.rs` (snapshot merging), `poll.rs` (poll loop),
//! `dispatch.rs` (user actions and batch adds), `client.rs` (coordinator),
//! `model.rs` (records and action types), `error.rs` (error types).

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod poll;
pub mod reconcile;
pub mod session;
mod shared;

pub use client::{RemoraClient, STATUS_CONNECTING, STATUS_DISCONNECTED, SessionInfo};
pub use config::ClientConfig;
pub use dispatch::{ActionDispatcher, ActionTicket, AddOutcome, BatchTicket};
pub use error::{ClientError, ConfigError, ReconcileError};
pub use model::{
    AddSource, StatusFlags, TorrentAction, TorrentFilter, TorrentId, TorrentRecord, TorrentSnapshot,
};
pub use poll::{PollPhase, PollScheduler};
pub use reconcile::{CompletedTorrent, Reconciliation, TorrentCatalog};
pub use session::{ConnectionState, Epoch, FailureOutcome, MAX_POLL_FAILURES, Session};
