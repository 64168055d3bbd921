//! Integration tests for the logging registry
//!
//! These tests verify that device failures reach a custom logger.
//! No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests

mod software_test_utils;

use std::sync::{Arc, Mutex};
use crossgfx::gfx::log::{self, LogEntry, LogSeverity, Logger};
use crossgfx::gfx::render::{BufferDesc, BufferKind, ColorFormat, Resource};
use crossgfx::gfx::{Error, GraphicsDevice};
use crossgfx::software::SoftwareDevice;
use serial_test::serial;
use software_test_utils::{create_test_context, test_config};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn errors(entries: &Arc<Mutex<Vec<LogEntry>>>) -> Vec<LogEntry> {
    entries
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.severity == LogSeverity::Error)
        .cloned()
        .collect()
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger_receives_macros() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    crossgfx::gfx_info!("test::module", "Test info message {}", 1);
    crossgfx::gfx_warn!("test::module", "Test warning message");
    crossgfx::gfx_error!("test::module", "Test error message");

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].severity, LogSeverity::Info);
        assert_eq!(captured[0].message, "Test info message 1");
        assert_eq!(captured[1].severity, LogSeverity::Warn);
        assert!(captured[1].file.is_none());
        assert_eq!(captured[2].severity, LogSeverity::Error);
        assert_eq!(captured[2].source, "test::module");
        assert!(captured[2].file.is_some());
        assert!(captured[2].line.is_some());
    }

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_failed_creation_is_logged() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    let device = SoftwareDevice::new(test_config()).unwrap();
    let result = device.create_render_target(ColorFormat::R8G8B8A8_UNORM, 0, 16, [0.0; 4]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));

    let logged = errors(&entries);
    assert_eq!(logged.len(), 1);
    assert!(logged[0].message.contains("0x16"), "message was {:?}", logged[0].message);

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_usage_mismatch_is_logged() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    let device = SoftwareDevice::new(test_config()).unwrap();
    let buffer = device.create_buffer(&BufferDesc { size: 64, kind: BufferKind::Readback }).unwrap();
    let mut list = device.create_command_list().unwrap();
    list.open().unwrap();
    list.resource_barriers(&[crossgfx::gfx::render::Transition::new(
        &buffer,
        crossgfx::gfx::render::ResourceUsage::GenericRead,
        crossgfx::gfx::render::ResourceUsage::CopySource,
    )])
    .unwrap();
    list.close().unwrap();
    assert!(errors(&entries).is_empty());

    let result = device.submit(&[list.as_ref()]);
    assert!(matches!(result, Err(Error::UsageMismatch(_))));
    assert_eq!(errors(&entries).len(), 1);

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_device_drop_reports_live_resources() {
    let device = SoftwareDevice::new(test_config()).unwrap();
    let buffer = device.create_buffer(&BufferDesc { size: 64, kind: BufferKind::Upload }).unwrap();

    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);
    drop(device);

    let captured = entries.lock().unwrap().clone();
    let report: Vec<&LogEntry> = captured
        .iter()
        .filter(|entry| entry.severity == LogSeverity::Warn)
        .collect();
    assert_eq!(report.len(), 1);
    assert!(report[0].message.contains("1 live resource"));
    assert!(report[0].message.contains(&format!("{:?}", buffer.id())));

    log::reset_logger();
}

#[test]
#[serial]
fn test_integration_context_shutdown_is_logged() {
    let (test_logger, entries) = TestLogger::new();
    log::set_logger(test_logger);

    let context = create_test_context();
    context.shutdown().unwrap();
    assert!(matches!(context.device(), Err(Error::InvalidState(_))));

    let captured = entries.lock().unwrap().clone();
    assert!(captured.iter().any(|entry| entry.severity == LogSeverity::Info));
    assert!(captured.iter().any(|entry| entry.severity == LogSeverity::Error));

    log::reset_logger();
}
