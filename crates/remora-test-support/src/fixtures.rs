//! Test fixtures and async helpers.

use std::future::Future;
use std::time::Duration;

use serde_json::{Value, json};

/// A torrent object as the daemon reports it in `torrent-get`.
#[must_use]
pub fn torrent_json(id: i64, name: &str, status: u32, rate_download: u64) -> Value {
    let seeding = status & 4 == 4;
    let (percent_done, left_until_done) = if seeding { (1.0, 0) } else { (0.5, 1_024) };
    json!({
        "id": id,
        "name": name,
        "status": status,
        "rateDownload": rate_download,
        "rateUpload": 0,
        "percentDone": percent_done,
        "leftUntilDone": left_until_done,
        "errorString": "",
    })
}

/// `torrent-get` arguments wrapping the supplied torrent objects.
#[must_use]
pub fn torrent_get_response(torrents: Vec<Value>) -> Value {
    json!({ "torrents": torrents })
}

/// `session-get` arguments for a daemon reporting `version`.
#[must_use]
pub fn session_get_response(version: &str) -> Value {
    json!({
        "version": version,
        "rpc-version": 17,
        "download-dir": "/var/lib/downloads",
        "speed-limit-down": 100,
        "speed-limit-down-enabled": false,
    })
}

/// Re-evaluate `check` until it returns `true` or `timeout` elapses.
///
/// Returns the final result of `check`.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
