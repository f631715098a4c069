//! Append-only JSONL provenance event log.

use crate::core::types::{ProvenanceEvent, TimestampedEvent};
use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Generate an ISO 8601 timestamp.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_epoch(secs)
}

/// Render seconds since the epoch as `YYYY-MM-DDTHH:MM:SSZ` (UTC).
fn format_epoch(secs: u64) -> String {
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    let mut y = 1970i64;
    let mut remaining = days as i64;
    loop {
        let year_days = if is_leap(y) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        y += 1;
    }
    let month_days = [
        31,
        if is_leap(y) { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];
    let mut m = 0;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md {
            m = i + 1;
            break;
        }
        remaining -= md;
    }
    let d = remaining + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y, m, d, hours, minutes, seconds
    )
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Event log path within an output directory.
pub fn event_log_path(out_dir: &Path) -> PathBuf {
    out_dir.join("events.jsonl")
}

/// Append an event to the output directory's event log.
pub fn append_event(out_dir: &Path, event: ProvenanceEvent) -> Result<()> {
    std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let path = event_log_path(out_dir);

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;
    writeln!(file, "{}", json).map_err(|e| Error::io(&path, e))?;

    Ok(())
}

/// Read every event back, oldest first.
pub fn read_events(out_dir: &Path) -> Result<Vec<TimestampedEvent>> {
    let path = event_log_path(out_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_format_epoch_known_values() {
        assert_eq!(format_epoch(0), "1970-01-01T00:00:00Z");
        // 2024-02-29T12:34:56Z
        assert_eq!(format_epoch(1_709_210_096), "2024-02-29T12:34:56Z");
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            append_event(
                dir.path(),
                ProvenanceEvent::ResourceDeclared {
                    stack: "S".to_string(),
                    resource: format!("r{}", i),
                    resource_type: "AWS::S3::Bucket".to_string(),
                    hash: "blake3:xxx".to_string(),
                },
            )
            .unwrap();
        }
        let events = read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 3);
        let content = std::fs::read_to_string(event_log_path(dir.path())).unwrap();
        assert!(content.contains("resource_declared"));
    }

    #[test]
    fn test_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_is_leap() {
        assert!(is_leap(2000));
        assert!(!is_leap(1900));
        assert!(is_leap(2024));
        assert!(!is_leap(2026));
    }
}
