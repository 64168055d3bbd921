//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry and DefaultLogger formatting.
//! Logger registry tests live in tests/logging_integration_tests.rs (they need #[serial]).

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
use std::time::SystemTime;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "crossgfx::test".to_string(),
        message: "heap created with 3 descriptors".to_string(),
        file,
        line,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY TESTS
// ============================================================================

#[test]
fn test_log_entry_without_file_line() {
    let e = entry(LogSeverity::Info, None, None);
    assert_eq!(e.severity, LogSeverity::Info);
    assert_eq!(e.source, "crossgfx::test");
    assert!(e.file.is_none());
    assert!(e.line.is_none());
}

#[test]
fn test_log_entry_clone() {
    let e = entry(LogSeverity::Error, Some("device.rs"), Some(42));
    let c = e.clone();
    assert_eq!(c.severity, e.severity);
    assert_eq!(c.message, e.message);
    assert_eq!(c.file, Some("device.rs"));
    assert_eq!(c.line, Some(42));
}

// ============================================================================
// DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Warn, None, None));
    assert!(line.contains("[WARN ]"));
    assert!(line.contains("[crossgfx::test]"));
    assert!(line.ends_with("heap created with 3 descriptors"));
}

#[test]
fn test_format_plain_with_location() {
    let line = DefaultLogger::format_plain(&entry(LogSeverity::Error, Some("device.rs"), Some(42)));
    assert!(line.contains("[ERROR]"));
    assert!(line.ends_with("(device.rs:42)"));
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
    ] {
        logger.log(&entry(severity, None, None));
    }
    logger.log(&entry(LogSeverity::Error, Some("log_tests.rs"), Some(1)));
}
