//! File logging example
//!
//! Demonstrates several bindings with different formats and filters, and a
//! configuration loaded from JSON.
//!
//! Run with: cargo run --example file_logging

use rust_log_dispatch::config::{DispatchConfig, SinkRecipes};
use rust_log_dispatch::prelude::*;
use rust_log_dispatch::sinks::FileSink;
use std::fs;
use std::sync::Arc;

const CONFIG: &str = r#"{
    "min_level": "debug",
    "bindings": [
        {
            "name": "errors",
            "sink": { "kind": "file", "params": { "path": "errors.log" } },
            "template": "{timestamp} {level} {logger} {location:bare} - {message}",
            "error_policy": "full",
            "min_level": "error"
        },
        {
            "name": "stderr",
            "sink": { "kind": "stderr" },
            "template": "[{level}] {message}",
            "filter": { "type": "sample", "rate": 0.5, "always": "warning" }
        }
    ]
}"#;

fn main() -> Result<()> {
    println!("=== Rust Log Dispatch - File Logging Example ===\n");

    let dispatcher = Arc::new(Dispatcher::new());

    println!("1. Bindings from configuration:");
    let config: DispatchConfig = serde_json::from_str(CONFIG)?;
    for handle in dispatcher.configure(&config, &SinkRecipes::new())? {
        println!("   registered {}", handle);
    }

    println!("\n2. A JSON lines binding added in code:");
    dispatcher.register(
        Binding::builder(FileSink::new("app.jsonl")?)
            .name("json")
            .formatter(JsonFormatter::new().with_timestamp_format(TimestampFormat::UnixMillis))
            .build(),
    )?;

    let logger = Logger::new("files", Arc::clone(&dispatcher)).with_field("service", "demo");
    logger.debug("Written to app.jsonl only (sampled on stderr)");
    logger.info("Request handled");
    logger.warning("Cache miss rate is high");

    let parsed: std::result::Result<u32, _> = "12x".parse::<u32>();
    let _ = logger.catch(Level::ERROR, parsed);

    let report = dispatcher.shutdown();
    println!("\n3. Shutdown closed {} sinks cleanly: {}", report.closed, report.is_clean());

    println!("\nerrors.log:\n{}", fs::read_to_string("errors.log")?);
    println!("app.jsonl has {} lines", fs::read_to_string("app.jsonl")?.lines().count());

    println!("\n=== Example completed successfully! ===");

    Ok(())
}
