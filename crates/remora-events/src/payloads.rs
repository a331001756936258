//! Event payload types published by the client core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to each event emitted by the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed events surfaced to presentation front ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The session became connected or was torn down.
    ConnectionChanged {
        /// `true` once the daemon accepted the session.
        connected: bool,
    },
    /// Transient, human-readable status line (connection progress, retries).
    StatusMessage {
        /// Message text.
        text: String,
    },
    /// Failure the user should acknowledge.
    ErrorRaised {
        /// Human-readable failure description.
        message: String,
    },
    /// A torrent-list snapshot was reconciled.
    TorrentsUpdated {
        /// Aggregates computed during reconciliation.
        stats: AggregateStats,
        /// Serial of the reconciliation that produced this update.
        update_serial: u64,
    },
    /// A tracked torrent finished downloading.
    TorrentCompleted {
        /// Daemon-assigned torrent identifier.
        torrent_id: i64,
        /// Display name reported by the daemon.
        name: String,
    },
    /// Server-side session settings were replaced.
    SettingsRefreshed {
        /// Daemon version string, when reported.
        version: Option<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for subscribers and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::StatusMessage { .. } => "status_message",
            Self::ErrorRaised { .. } => "error_raised",
            Self::TorrentsUpdated { .. } => "torrents_updated",
            Self::TorrentCompleted { .. } => "torrent_completed",
            Self::SettingsRefreshed { .. } => "settings_refreshed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Per-snapshot totals derived while reconciling the torrent list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    /// Sum of download rates in bytes per second.
    pub down_rate_total: u64,
    /// Sum of upload rates in bytes per second.
    pub up_rate_total: u64,
    /// Torrents currently seeding.
    pub seeding: u32,
    /// Torrents currently downloading.
    pub downloading: u32,
    /// Torrents currently paused.
    pub paused: u32,
    /// Torrents present in the snapshot.
    pub total: u32,
}
