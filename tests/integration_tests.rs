//! Integration tests for the dispatch engine
//!
//! These tests verify:
//! - Level gating and per-binding formatting
//! - Failure isolation and the error hook
//! - File and queued sinks end to end
//! - Custom levels and logger muting
//! - Declarative configuration

use rust_log_dispatch::config::{DispatchConfig, SinkRecipes};
use rust_log_dispatch::core::filter::{filter_fn, ContextFilter, LoggerNameFilter};
use rust_log_dispatch::prelude::*;
use rust_log_dispatch::sinks::{AsyncSink, FileSink, MemorySink};
use rust_log_dispatch::{info, DispatchStage, Synchronization};
use parking_lot::Mutex;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn template(text: &str) -> TemplateFormatter {
    TemplateFormatter::new(text).expect("valid template")
}

fn memory_binding(memory: &MemorySink, text: &str) -> Binding {
    Binding::builder(memory.clone()).formatter(template(text)).build()
}

struct CountingFormatter {
    calls: Arc<AtomicUsize>,
}

impl Formatter for CountingFormatter {
    fn format(&self, record: &Record) -> Result<Rendered> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Rendered::from(record.message()?.to_string()))
    }
}

struct RefusingSink;

impl Sink for RefusingSink {
    fn write(&self, _output: &Rendered) -> Result<()> {
        Err(LoggerError::sink_write("refusing", "device unplugged"))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "refusing"
    }

    fn synchronization(&self) -> Synchronization {
        Synchronization::SelfSynchronizing
    }
}

#[test]
fn test_debug_suppressed_info_delivered() {
    let memory = MemorySink::new();
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(memory_binding(&memory, "{level} {message}"))
        .unwrap();
    let logger = Logger::new("app", dispatcher);

    logger.debug("warming up");
    assert!(memory.is_empty());

    logger.info("ready");
    assert_eq!(memory.entries(), vec!["INFO ready"]);
}

#[test]
fn test_suppressed_records_never_reach_formatters() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.set_min_level(Level::WARNING);
    dispatcher
        .register(
            Binding::builder(MemorySink::new())
                .formatter(CountingFormatter {
                    calls: Arc::clone(&calls),
                })
                .build(),
        )
        .unwrap();
    let logger = Logger::new("lazy", dispatcher);

    for i in 0..100 {
        logger.log_args(Level::INFO, "item {}", [i]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    logger.warning("disk at 91%");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_each_binding_renders_its_own_format() {
    let plain = MemorySink::new().named("plain");
    let json = MemorySink::new().named("json");
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(memory_binding(&plain, "{level}|{logger}|{message}"))
        .unwrap();
    dispatcher
        .register(Binding::builder(json.clone()).formatter(JsonFormatter::new()).build())
        .unwrap();

    Logger::new("svc.http", dispatcher)
        .with_field("status", 200)
        .info("served");

    assert_eq!(plain.entries(), vec!["INFO|svc.http|served"]);
    let value: serde_json::Value = serde_json::from_str(&json.entries()[0]).unwrap();
    assert_eq!(value["message"], "served");
    assert_eq!(value["context"]["status"], 200);
}

#[test]
fn test_failing_binding_is_isolated_and_reported() {
    let memory = MemorySink::new();
    let seen: Arc<Mutex<Vec<(DispatchStage, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
    let hook_seen = Arc::clone(&seen);

    let dispatcher = Arc::new(
        Dispatcher::builder()
            .binding(Binding::builder(RefusingSink).name("broken").build())
            .binding(
                Binding::builder(memory.clone())
                    .formatter(template("{message} {ctx:missing}"))
                    .name("strict")
                    .build(),
            )
            .binding(memory_binding(&memory, "{message}"))
            .error_hook(move |error| hook_seen.lock().push((error.stage, error.binding.clone())))
            .build()
            .unwrap(),
    );

    let summary = dispatcher.dispatch(&Record::new(Level::ERROR, "app", "boom"));

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(memory.entries(), vec!["boom"]);
    assert_eq!(
        *seen.lock(),
        vec![
            (DispatchStage::Write, Some("broken".to_string())),
            (DispatchStage::Format, Some("strict".to_string())),
        ]
    );
    assert_eq!(dispatcher.metrics().write_failures(), 1);
    assert_eq!(dispatcher.metrics().format_failures(), 1);
}

#[test]
fn test_panicking_hook_does_not_escape() {
    let memory = MemorySink::new();
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(Binding::builder(RefusingSink).build())
        .unwrap();
    dispatcher
        .register(memory_binding(&memory, "{message}"))
        .unwrap();
    dispatcher.set_error_hook(|_| panic!("hook exploded"));

    Logger::new("app", dispatcher).info("still delivered");
    assert_eq!(memory.entries(), vec!["still delivered"]);
}

#[test]
fn test_filters_route_records() {
    let db = MemorySink::new().named("db");
    let audit = MemorySink::new().named("audit");
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(
            Binding::builder(db.clone())
                .formatter(template("{logger} {message}"))
                .filter(LoggerNameFilter::include(["app.db"]))
                .build(),
        )
        .unwrap();
    dispatcher
        .register(
            Binding::builder(audit.clone())
                .formatter(template("{ctx:user} {message}"))
                .filter(ContextFilter::has_key("user").and(filter_fn(|r| r.level() >= Level::WARNING)))
                .build(),
        )
        .unwrap();

    let root = Logger::new("app", dispatcher);
    root.child("db").info("query took 3ms");
    root.child("dbx").info("not a descendant");
    root.with_field("user", "alice").warning("password changed");
    root.with_field("user", "bob").info("viewed dashboard");

    assert_eq!(db.entries(), vec!["app.db query took 3ms"]);
    assert_eq!(audit.entries(), vec!["alice password changed"]);
}

#[test]
fn test_custom_level_between_builtins() {
    let memory = MemorySink::new();
    let dispatcher = Arc::new(Dispatcher::builder().level("NOTICE", 22).build().unwrap());
    dispatcher
        .register(
            Binding::builder(memory.clone())
                .formatter(template("{level} {message}"))
                .min_level(dispatcher.level("NOTICE").unwrap())
                .build(),
        )
        .unwrap();
    let logger = Logger::new("app", Arc::clone(&dispatcher));
    let notice = dispatcher.level("notice").unwrap();

    logger.info("below");
    logger.log(notice, "exactly");
    logger.success("above");

    assert_eq!(memory.entries(), vec!["NOTICE exactly", "SUCCESS above"]);
    assert!(matches!(
        dispatcher.register_level("NOTICE", 26),
        Err(LoggerError::DuplicateLevelName { .. })
    ));
}

#[test]
fn test_disabled_logger_subtree() {
    let memory = MemorySink::new();
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(memory_binding(&memory, "{logger}"))
        .unwrap();
    let root = Logger::new("net", Arc::clone(&dispatcher));

    dispatcher.disable("net.http");
    root.child("http").info("x");
    root.child("http").child("client").info("x");
    root.child("tcp").info("x");

    assert!(dispatcher.enable("net.http"));
    root.child("http").info("x");

    assert_eq!(memory.entries(), vec!["net.tcp", "net.http"]);
}

#[test]
fn test_file_sink_flushes_on_shutdown() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("app.log");

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(
            Binding::builder(FileSink::new(&log_file).expect("Failed to create sink"))
                .formatter(template("{level} {message}"))
                .build(),
        )
        .unwrap();
    let logger = Logger::new("app", Arc::clone(&dispatcher));

    for i in 0..20 {
        info!(logger, "line {}", i);
    }
    let report = dispatcher.shutdown();
    assert!(report.is_clean());
    assert_eq!(report.closed, 1);

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 20);
    assert_eq!(lines[0], "INFO line 0");
    assert_eq!(lines[19], "INFO line 19");

    // Logging after shutdown is a quiet no-op
    logger.error("too late");
    assert_eq!(fs::read_to_string(&log_file).unwrap().lines().count(), 20);
}

#[test]
fn test_async_sink_delivers_in_order() {
    let memory = MemorySink::new();
    let queued = AsyncSink::builder(memory.clone())
        .capacity(256)
        .overflow_policy(OverflowPolicy::Block)
        .build()
        .unwrap();

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(Binding::builder(queued).formatter(template("{message}")).build())
        .unwrap();
    let logger = Logger::new("worker", Arc::clone(&dispatcher));

    for i in 0..500 {
        logger.log_args(Level::INFO, "job {}", [i]);
    }
    assert!(dispatcher.flush());

    let entries = memory.entries();
    assert_eq!(entries.len(), 500);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry, &format!("job {}", i));
    }
    assert!(dispatcher.shutdown().is_clean());
    assert!(memory.is_closed());
}

#[test]
fn test_exception_rendering_policies() {
    let summary = MemorySink::new().named("summary");
    let omitted = MemorySink::new().named("omitted");
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(memory_binding(&summary, "{message}"))
        .unwrap();
    dispatcher
        .register(
            Binding::builder(omitted.clone())
                .formatter(template("{message}").with_error_policy(ErrorPolicy::Omit))
                .build(),
        )
        .unwrap();

    let logger = Logger::new("app", dispatcher);
    let parsed = logger.catch(Level::ERROR, "x1".parse::<i32>());
    assert!(parsed.is_err());

    assert!(summary.entries()[0].starts_with("Caught error: invalid digit found in string\nParseIntError"));
    assert_eq!(omitted.entries(), vec!["Caught error: invalid digit found in string"]);
}

#[test]
fn test_deregistered_binding_stops_receiving() {
    let memory = MemorySink::new();
    let dispatcher = Arc::new(Dispatcher::new());
    let handle = dispatcher
        .register(memory_binding(&memory, "{message}"))
        .unwrap();
    let logger = Logger::new("app", Arc::clone(&dispatcher));

    logger.info("one");
    assert!(dispatcher.deregister(&handle));
    assert!(!dispatcher.deregister(&handle));
    logger.info("two");

    assert_eq!(memory.entries(), vec!["one"]);
    assert!(memory.is_closed());
    assert_eq!(dispatcher.binding_count(), 0);
}

#[test]
fn test_configure_from_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("configured.log");
    let config: DispatchConfig = serde_json::from_value(serde_json::json!({
        "min_level": "trace",
        "bindings": [{
            "name": "file",
            "sink": { "kind": "file", "params": { "path": log_file } },
            "format": "logfmt",
            "timestamp_format": "iso8601",
            "filter": { "type": "level", "min": "debug", "max": "info" }
        }]
    }))
    .unwrap();

    let dispatcher = Arc::new(Dispatcher::new());
    let handles = dispatcher.configure(&config, &SinkRecipes::new()).unwrap();
    assert_eq!(handles[0].name(), "file");

    let logger = Logger::new("cfg", Arc::clone(&dispatcher));
    logger.trace("outside range");
    logger.debug("inside range");
    logger.warning("outside range");
    assert!(dispatcher.shutdown().is_clean());

    let content = fs::read_to_string(&log_file).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("level=DEBUG"));
    assert!(lines[0].contains("msg=\"inside range\""));
}
