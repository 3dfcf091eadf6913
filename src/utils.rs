//! Utility functions for time classification, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Time classification for edition naming
//! - Character-safe truncation for prompts and logging
//! - JSON error detection for handling model response truncation
//! - Slugs for output file names
//! - File system validation for output directories

use chrono::{Local, NaiveTime, Timelike};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Classify the current local time into morning, afternoon, or evening.
///
/// - **Morning**: 00:00 - 08:00
/// - **Afternoon**: 08:00 - 16:00
/// - **Evening**: 16:00 - 24:00
#[instrument]
pub fn time_of_day() -> String {
    let tod = Local::now().time();
    let which = classify_time(tod);
    tracing::debug!(%tod, %which, "Computed time_of_day");
    which.to_string()
}

fn classify_time(tod: NaiveTime) -> &'static str {
    match tod.hour() {
        0..=7 => "morning",
        8..=15 => "afternoon",
        _ => "evening",
    }
}

/// Cut `input` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let head = truncate_chars(s, max);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", head, s.len() - head.len())
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model response is cut off (e.g., by its output token limit),
/// the JSON fails to parse with an EOF error. Such responses are worth one
/// more ask.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Convert a title or query to a URL-friendly slug.
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Test-Article!"), "test-article");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        let s = "पंजाब news";
        assert_eq!(truncate_chars(s, 5), "पंजाब");
        assert_eq!(truncate_chars(s, 100), s);
        assert_eq!(truncate_chars("", 3), "");
        // Would panic if sliced by bytes.
        assert!(truncate_for_log("पंजाब", 2).contains("bytes"));
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Test-Article!"), "test-article");
        assert_eq!(slugify_title(" Tamil Nadu "), "tamil-nadu");
        assert_eq!(slugify_title("Special@#$Characters"), "specialcharacters");
    }

    #[test]
    fn test_classify_time() {
        let at = |h| NaiveTime::from_hms_opt(h, 30, 0).unwrap();
        assert_eq!(classify_time(at(0)), "morning");
        assert_eq!(classify_time(at(7)), "morning");
        assert_eq!(classify_time(at(8)), "afternoon");
        assert_eq!(classify_time(at(15)), "afternoon");
        assert_eq!(classify_time(at(16)), "evening");
        assert_eq!(classify_time(at(23)), "evening");
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let err = serde_json::from_str::<serde_json::Value>(json_eof).unwrap_err();
        assert!(looks_truncated(&err));

        let err = serde_json::from_str::<serde_json::Value>("{nope}").unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested() {
        let dir = std::env::temp_dir().join(format!(
            "awful_local_news_probe_{}",
            std::process::id()
        ));
        let nested = dir.join("a/b");
        ensure_writable_dir(nested.to_str().unwrap()).await.unwrap();
        assert!(nested.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
