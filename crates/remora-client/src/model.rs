//! Torrent records and the values exchanged with front ends.

use std::fmt;
use std::path::PathBuf;

use remora_events::AggregateStats;
use remora_rpc::RpcRequest;
use remora_rpc::request::{torrent_remove, torrent_start, torrent_stop, torrent_verify};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ReconcileError;

/// Daemon-assigned torrent identifier.
pub type TorrentId = i64;

/// Status bitmask reported by the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlags(u32);

impl StatusFlags {
    /// Queued for a data check.
    pub const CHECK_WAIT: Self = Self(1);
    /// Data check running.
    pub const CHECKING: Self = Self(2);
    /// Download finished; seeding.
    pub const SEEDING: Self = Self(4);
    /// Downloading.
    pub const DOWNLOADING: Self = Self(8);
    /// Stopped by the user.
    pub const PAUSED: Self = Self(16);

    /// Wrap raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Seeding, i.e. the download is complete.
    #[must_use]
    pub const fn is_seeding(self) -> bool {
        self.contains(Self::SEEDING)
    }

    /// Actively downloading.
    #[must_use]
    pub const fn is_downloading(self) -> bool {
        self.contains(Self::DOWNLOADING)
    }

    /// Stopped.
    #[must_use]
    pub const fn is_paused(self) -> bool {
        self.contains(Self::PAUSED)
    }

    /// Queued for or running a data check.
    #[must_use]
    pub const fn is_checking(self) -> bool {
        self.0 & (Self::CHECK_WAIT.0 | Self::CHECKING.0) != 0
    }

    /// Whether any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Flags selected by a state name. `checking` also covers torrents
    /// queued for a check.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "downloading" => Some(Self::DOWNLOADING),
            "seeding" => Some(Self::SEEDING),
            "paused" => Some(Self::PAUSED),
            "checking" => Some(Self(Self::CHECK_WAIT.0 | Self::CHECKING.0)),
            "check-wait" => Some(Self::CHECK_WAIT),
            _ => None,
        }
    }

    /// Short label for listings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        if self.is_paused() {
            "paused"
        } else if self.is_checking() {
            if self.contains(Self::CHECKING) {
                "checking"
            } else {
                "check-wait"
            }
        } else if self.is_downloading() {
            "downloading"
        } else if self.is_seeding() {
            "seeding"
        } else {
            "idle"
        }
    }
}

/// One torrent as last reported by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentRecord {
    /// Daemon-assigned identifier.
    pub id: TorrentId,
    /// Display name.
    pub name: String,
    /// Status bitmask.
    pub status: StatusFlags,
    /// Download rate in bytes per second.
    pub rate_download: u64,
    /// Upload rate in bytes per second.
    pub rate_upload: u64,
    /// Completion ratio between 0 and 1.
    pub percent_done: f64,
    /// Bytes still to download.
    pub left_until_done: u64,
    /// Daemon-reported error, if any.
    pub error_string: Option<String>,
    /// Every field the daemon sent, untouched.
    pub fields: Map<String, Value>,
}

impl TorrentRecord {
    /// Parse a `torrent-get` entry. Only `id` is mandatory.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Malformed`] when the entry is not an object
    /// or lacks an integer `id`.
    pub fn from_json(index: usize, value: &Value) -> Result<Self, ReconcileError> {
        let fields = value.as_object().ok_or(ReconcileError::Malformed {
            reason: "torrent entry is not an object",
            index: Some(index),
        })?;
        let id = fields
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(ReconcileError::Malformed {
                reason: "torrent entry has no integer id",
                index: Some(index),
            })?;

        Ok(Self {
            id,
            name: fields
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: StatusFlags::from_bits(
                fields
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|bits| u32::try_from(bits).ok())
                    .unwrap_or_default(),
            ),
            rate_download: unsigned(fields, "rateDownload"),
            rate_upload: unsigned(fields, "rateUpload"),
            percent_done: fields
                .get("percentDone")
                .and_then(Value::as_f64)
                .unwrap_or_default(),
            left_until_done: unsigned(fields, "leftUntilDone"),
            error_string: fields
                .get("errorString")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            fields: fields.clone(),
        })
    }

    /// The torrent has finished downloading.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.status.is_seeding()
    }
}

fn unsigned(fields: &Map<String, Value>, key: &str) -> u64 {
    fields.get(key).and_then(Value::as_u64).unwrap_or_default()
}

/// User-initiated operation on a set of torrents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentAction {
    /// Resume transfer.
    Start,
    /// Pause transfer.
    Stop,
    /// Re-check local data.
    Verify,
    /// Drop from the daemon.
    Remove {
        /// Also delete downloaded data.
        delete_data: bool,
    },
}

impl TorrentAction {
    /// Request performing this action on `ids`.
    #[must_use]
    pub fn request(self, ids: &[TorrentId]) -> RpcRequest {
        match self {
            Self::Start => torrent_start(ids),
            Self::Stop => torrent_stop(ids),
            Self::Verify => torrent_verify(ids),
            Self::Remove { delete_data } => torrent_remove(ids, delete_data),
        }
    }

    /// Daemon method backing this action.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Start => remora_rpc::methods::TORRENT_START,
            Self::Stop => remora_rpc::methods::TORRENT_STOP,
            Self::Verify => remora_rpc::methods::TORRENT_VERIFY,
            Self::Remove { .. } => remora_rpc::methods::TORRENT_REMOVE,
        }
    }
}

impl fmt::Display for TorrentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Verify => "verify",
            Self::Remove { delete_data: false } => "remove",
            Self::Remove { delete_data: true } => "remove and delete",
        };
        f.write_str(label)
    }
}

/// Where a new torrent comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddSource {
    /// Link the daemon fetches itself (http(s) or magnet).
    Url(String),
    /// Local `.torrent` file uploaded as metainfo.
    File(PathBuf),
}

impl AddSource {
    /// Treat magnet and http(s) links as URLs and anything else as a path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if ["magnet:", "http://", "https://"]
            .iter()
            .any(|prefix| lower.starts_with(prefix))
        {
            Self::Url(raw.to_string())
        } else {
            Self::File(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for AddSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Narrows a torrent listing by state and name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentFilter {
    /// Keep records carrying any of these flags. Empty keeps every state.
    pub state: StatusFlags,
    /// Keep records whose name contains this text, ignoring case.
    pub name: Option<String>,
}

impl TorrentFilter {
    /// Filter that keeps everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only records in `state`.
    #[must_use]
    pub fn with_state(mut self, state: StatusFlags) -> Self {
        self.state = state;
        self
    }

    /// Keep only records whose name contains `text`.
    #[must_use]
    pub fn with_name(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.name = (!text.is_empty()).then_some(text);
        self
    }

    /// Whether `record` passes.
    #[must_use]
    pub fn matches(&self, record: &TorrentRecord) -> bool {
        if self.state.bits() != 0 && !record.status.intersects(self.state) {
            return false;
        }
        self.name.as_deref().is_none_or(|needle| {
            record
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        })
    }
}

/// Point-in-time copy of the catalog handed to front ends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TorrentSnapshot {
    /// Records ordered by name, then id.
    pub records: Vec<TorrentRecord>,
    /// Aggregates from the latest reconciliation.
    pub stats: AggregateStats,
    /// Serial of the latest reconciliation.
    pub update_serial: u64,
}
