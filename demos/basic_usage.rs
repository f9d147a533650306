//! Basic dispatcher usage example
//!
//! Demonstrates console output, levels, child loggers and context fields.
//!
//! Run with: cargo run --example basic_usage

use rust_log_dispatch::prelude::*;
use rust_log_dispatch::sinks::ConsoleSink;
use rust_log_dispatch::{info, warning};
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Rust Log Dispatch - Basic Usage Example ===\n");

    let dispatcher = Arc::new(Dispatcher::builder().min_level(Level::TRACE).build()?);
    dispatcher.register(
        Binding::builder(ConsoleSink::stdout())
            .name("console")
            .formatter(
                TemplateFormatter::new("{timestamp:%H:%M:%S} [{level}] {logger}: {message} {context}")?
                    .with_color(true),
            )
            .build(),
    )?;

    let logger = Logger::new("demo", Arc::clone(&dispatcher));

    println!("1. Logging at every built-in level:");
    logger.trace("This is a trace message");
    logger.debug("This is a debug message");
    logger.info("This is an info message");
    logger.success("This is a success message");
    logger.warning("This is a warning message");
    logger.error("This is an error message");
    logger.critical("This is a critical message");

    println!("\n2. Raising the minimum level to INFO:");
    dispatcher.set_min_level(Level::INFO);
    logger.debug("Debug message (hidden)");
    logger.info("Info message (visible)");

    println!("\n3. Child loggers and context:");
    let db = logger.child("db").with_field("pool", "primary");
    info!(db, "Connected in {} ms", 12);
    warning!(db.with_field("attempt", 2), "Retrying query");

    println!("\n4. A custom level:");
    let notice = dispatcher.register_level("NOTICE", 22)?;
    logger.log(notice, "Between INFO and SUCCESS");

    println!("\n5. Muting a subtree:");
    dispatcher.disable("demo.db");
    db.error("Muted (hidden)");
    logger.info("Root still logs");

    dispatcher.shutdown();
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
