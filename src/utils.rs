//! Small helpers for logging, JSON error classification and the data directory.

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging.
///
/// Strings longer than `max` bytes are cut at the nearest char boundary at or
/// below `max` and suffixed with `"…(+N bytes)"`. Bengali text is multi-byte,
/// so a plain byte slice would panic.
///
/// # Arguments
///
/// * `s` - The text to shorten, usually a model response body
/// * `max` - Maximum number of bytes kept before the suffix
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("বাংলা", 4), "ব…(+12 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// `true` if a serde_json error is an unexpected EOF, i.e. the model output was cut off.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Create `path` if needed and prove it is writable with a probe file.
///
/// Run once at startup so a bad `--data-dir` fails before any scraping or
/// model calls are made.
///
/// # Arguments
///
/// * `path` - The data directory for snapshots, the URL cache and the store
///
/// # Returns
///
/// `Ok(())` if the directory exists and a file could be created in it,
/// otherwise the underlying I/O error.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Data directory is writable");
    Ok(())
}

/// Filesystem-safe timestamp, e.g. `2026-02-25T10-15-30-123Z`.
///
/// RFC 3339 in UTC with millisecond precision, with `:` and `.` replaced by
/// `-` so the result is a valid file name on every platform.
pub fn file_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        // each Bengali letter is three bytes
        let s = "ঢাকা".repeat(10);
        let result = truncate_for_log(&s, 4);
        assert!(result.starts_with("ঢ…"));
    }

    #[test]
    fn test_looks_truncated() {
        let err = serde_json::from_str::<serde_json::Value>(r#"{"field": "value"#).unwrap_err();
        assert!(looks_truncated(&err));
        let err = serde_json::from_str::<serde_json::Value>("{]").unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[test]
    fn test_file_timestamp_has_no_colons() {
        let t = chrono::Utc.with_ymd_and_hms(2026, 2, 25, 10, 15, 30).unwrap();
        assert_eq!(file_timestamp(t), "2026-02-25T10-15-30-000Z");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
