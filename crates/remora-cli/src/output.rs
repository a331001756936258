//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use remora_client::{StatusFlags, TorrentRecord, TorrentSnapshot};
use remora_events::{Event, EventEnvelope};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_torrent_list(snapshot: &TorrentSnapshot, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(snapshot)?,
        OutputFormat::Table => {
            println!(
                "{:>5} {:<12} {:>7} {:>12} {:>12} NAME",
                "ID", "STATUS", "DONE", "DOWN", "UP"
            );
            for record in &snapshot.records {
                println!("{}", torrent_row(record));
            }
            let stats = &snapshot.stats;
            println!(
                "total: {} (downloading {}, seeding {}, paused {}) down {} up {}",
                stats.total,
                stats.downloading,
                stats.seeding,
                stats.paused,
                format_rate(stats.down_rate_total),
                format_rate(stats.up_rate_total)
            );
        }
    }
    Ok(())
}

pub(crate) fn render_settings(settings: &Map<String, Value>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(settings)?,
        OutputFormat::Table => {
            let mut keys: Vec<_> = settings.keys().collect();
            keys.sort();
            for key in keys {
                println!("{key}: {}", setting_value(&settings[key.as_str()]));
            }
        }
    }
    Ok(())
}

pub(crate) fn render_event(envelope: &EventEnvelope, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string(envelope)
                .map_err(|err| CliError::failure(anyhow!("failed to format event JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => println!(
            "{} {}",
            envelope.timestamp.format("%H:%M:%S"),
            event_line(&envelope.event)
        ),
    }
    Ok(())
}

pub(crate) fn render_metrics(text: &str) {
    eprint!("{text}");
}

#[must_use]
pub(crate) fn torrent_row(record: &TorrentRecord) -> String {
    let done = format!("{:.1}%", record.percent_done * 100.0);
    format!(
        "{:>5} {:<12} {:>7} {:>12} {:>12} {}",
        record.id,
        status_label(record.status, record.error_string.as_deref()),
        done,
        format_rate(record.rate_download),
        format_rate(record.rate_upload),
        record.name
    )
}

#[must_use]
pub(crate) fn status_label(status: StatusFlags, error: Option<&str>) -> &'static str {
    if error.is_some_and(|text| !text.is_empty()) {
        "error"
    } else {
        status.label()
    }
}

#[must_use]
pub(crate) fn event_line(event: &Event) -> String {
    match event {
        Event::ConnectionChanged { connected: true } => "connected".to_string(),
        Event::ConnectionChanged { connected: false } => "disconnected".to_string(),
        Event::StatusMessage { text } => format!("status: {text}"),
        Event::ErrorRaised { message } => format!("error: {message}"),
        Event::TorrentsUpdated {
            stats,
            update_serial,
        } => format!(
            "update #{update_serial}: {} torrents, down {} up {}",
            stats.total,
            format_rate(stats.down_rate_total),
            format_rate(stats.up_rate_total)
        ),
        Event::TorrentCompleted { torrent_id, name } => {
            format!("completed: {name} (#{torrent_id})")
        }
        Event::SettingsRefreshed { version } => format!(
            "settings refreshed ({})",
            version.as_deref().unwrap_or("unknown version")
        ),
    }
}

fn setting_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub(crate) fn format_rate(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_events::AggregateStats;
    use serde_json::json;

    #[test]
    fn byte_units_scale() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2_048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_rate(0), "0 B/s");
    }

    #[test]
    fn error_string_overrides_status_label() {
        assert_eq!(status_label(StatusFlags::SEEDING, None), "seeding");
        assert_eq!(status_label(StatusFlags::SEEDING, Some("")), "seeding");
        assert_eq!(
            status_label(StatusFlags::DOWNLOADING, Some("tracker gone")),
            "error"
        );
    }

    #[test]
    fn rows_carry_percent_and_name() -> anyhow::Result<()> {
        let record = TorrentRecord::from_json(
            0,
            &json!({
                "id": 7,
                "name": "debian.iso",
                "status": 8,
                "rateDownload": 1_024,
                "percentDone": 0.25
            }),
        )?;
        let row = torrent_row(&record);
        assert!(row.contains("25.0%"));
        assert!(row.contains("1.00 KiB/s"));
        assert!(row.ends_with("debian.iso"));
        Ok(())
    }

    #[test]
    fn event_lines_are_human_readable() {
        let update = Event::TorrentsUpdated {
            stats: AggregateStats {
                down_rate_total: 2_048,
                total: 2,
                ..AggregateStats::default()
            },
            update_serial: 4,
        };
        assert_eq!(
            event_line(&update),
            "update #4: 2 torrents, down 2.00 KiB/s up 0 B/s"
        );
        assert_eq!(
            event_line(&Event::TorrentCompleted {
                torrent_id: 3,
                name: "ubuntu.iso".into()
            }),
            "completed: ubuntu.iso (#3)"
        );
        assert_eq!(
            event_line(&Event::SettingsRefreshed { version: None }),
            "settings refreshed (unknown version)"
        );
    }

    #[test]
    fn string_settings_print_unquoted() {
        assert_eq!(setting_value(&json!("/srv")), "/srv");
        assert_eq!(setting_value(&json!(250)), "250");
    }
}
