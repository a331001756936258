//! Merges `torrent-get` snapshots into the in-memory catalog.
//!
//! Every snapshot is treated as the complete list: torrents absent from it
//! are dropped from the catalog.

use std::cmp::Ordering;
use std::collections::HashMap;

use remora_events::AggregateStats;
use serde_json::{Map, Value};

use crate::error::ReconcileError;
use crate::model::{TorrentFilter, TorrentId, TorrentRecord};

/// A tracked torrent that just finished downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTorrent {
    /// Torrent identifier.
    pub id: TorrentId,
    /// Display name.
    pub name: String,
}

/// Result of applying one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Aggregates over the new catalog contents.
    pub stats: AggregateStats,
    /// Torrents that gained the seeding flag since the previous snapshot.
    pub completed: Vec<CompletedTorrent>,
    /// Records seen for the first time.
    pub added: usize,
    /// Records dropped because the daemon no longer reports them.
    pub removed: usize,
}

/// Torrent records keyed by id.
#[derive(Debug, Default)]
pub struct TorrentCatalog {
    entries: HashMap<TorrentId, TorrentRecord>,
    stats: AggregateStats,
}

impl TorrentCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the `arguments` of a `torrent-get` reply.
    ///
    /// With `first` set the catalog is rebuilt from scratch and no completion
    /// is reported. Otherwise records are updated by id, new ones inserted and
    /// missing ones removed; a record already present that gains the seeding
    /// flag is reported as completed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Malformed`] without touching the catalog when
    /// `torrents` is missing or any entry lacks an integer id.
    pub fn reconcile(
        &mut self,
        arguments: &Map<String, Value>,
        first: bool,
    ) -> Result<Reconciliation, ReconcileError> {
        let incoming = Self::parse(arguments)?;

        if first {
            self.entries.clear();
        }

        let mut next = HashMap::with_capacity(incoming.len());
        let mut completed = Vec::new();
        let mut added = 0;
        for record in incoming {
            match self.entries.remove(&record.id) {
                Some(previous) => {
                    if !first && !previous.is_complete() && record.is_complete() {
                        completed.push(CompletedTorrent {
                            id: record.id,
                            name: record.name.clone(),
                        });
                    }
                }
                None if !next.contains_key(&record.id) => added += 1,
                None => {}
            }
            next.insert(record.id, record);
        }

        let removed = self.entries.len();
        self.entries = next;
        self.stats = Self::aggregate(self.entries.values());
        completed.sort_by_key(|item| item.id);

        Ok(Reconciliation {
            stats: self.stats,
            completed,
            added,
            removed,
        })
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = AggregateStats::default();
    }

    /// Number of tracked torrents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No torrents tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record for `id`.
    #[must_use]
    pub fn get(&self, id: TorrentId) -> Option<&TorrentRecord> {
        self.entries.get(&id)
    }

    /// Tracked ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<TorrentId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Records ordered by name, then id.
    #[must_use]
    pub fn list(&self) -> Vec<TorrentRecord> {
        let mut values: Vec<_> = self.entries.values().cloned().collect();
        values.sort_by(Self::compare_records);
        values
    }

    /// Records passing `filter`, ordered like [`TorrentCatalog::list`].
    #[must_use]
    pub fn filtered(&self, filter: &TorrentFilter) -> Vec<TorrentRecord> {
        let mut values: Vec<_> = self
            .entries
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        values.sort_by(Self::compare_records);
        values
    }

    /// Aggregates from the latest reconciliation.
    #[must_use]
    pub const fn stats(&self) -> AggregateStats {
        self.stats
    }

    fn parse(arguments: &Map<String, Value>) -> Result<Vec<TorrentRecord>, ReconcileError> {
        let torrents = arguments
            .get("torrents")
            .and_then(Value::as_array)
            .ok_or(ReconcileError::Malformed {
                reason: "response has no torrents array",
                index: None,
            })?;
        torrents
            .iter()
            .enumerate()
            .map(|(index, value)| TorrentRecord::from_json(index, value))
            .collect()
    }

    fn aggregate<'a>(records: impl Iterator<Item = &'a TorrentRecord>) -> AggregateStats {
        records.fold(AggregateStats::default(), |mut stats, record| {
            stats.down_rate_total = stats.down_rate_total.saturating_add(record.rate_download);
            stats.up_rate_total = stats.up_rate_total.saturating_add(record.rate_upload);
            stats.total += 1;
            if record.status.is_seeding() {
                stats.seeding += 1;
            }
            if record.status.is_downloading() {
                stats.downloading += 1;
            }
            if record.status.is_paused() {
                stats.paused += 1;
            }
            stats
        })
    }

    fn compare_records(a: &TorrentRecord, b: &TorrentRecord) -> Ordering {
        a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
    }
}
