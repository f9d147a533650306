//! Async logging example
//!
//! Demonstrates a queued sink shared by many threads, overflow handling and
//! the error hook.
//!
//! Run with: cargo run --example async_logging

use rust_log_dispatch::prelude::*;
use rust_log_dispatch::sinks::{AsyncSink, FileSink};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

fn main() -> Result<()> {
    println!("=== Rust Log Dispatch - Async Logging Example ===\n");

    let alerts = Arc::new(AtomicU64::new(0));
    let alert_counter = Arc::clone(&alerts);

    let queued = Arc::new(
        AsyncSink::builder(FileSink::new("async_test.log")?)
            .capacity(1000)
            .overflow_policy(OverflowPolicy::AlertAndDrop)
            .on_overflow(move |dropped| {
                alert_counter.store(dropped, Ordering::Relaxed);
            })
            .build()?,
    );

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.set_error_hook(|error| eprintln!("dispatch problem: {}", error));
    dispatcher.register(
        Binding::builder(Arc::clone(&queued))
            .formatter(TemplateFormatter::new("{timestamp} {thread} {logger} {message}")?)
            .build(),
    )?;

    println!("1. High-volume logging through the queue:");
    let logger = Logger::new("async", Arc::clone(&dispatcher));
    for i in 0..100 {
        logger.log_args(Level::INFO, "Message #{}", [i]);
    }
    println!("   Logged 100 messages");

    println!("\n2. Multi-threaded logging:");
    let handles: Vec<_> = (0..5)
        .map(|thread_id| {
            let logger = logger.child(&format!("worker{}", thread_id));
            thread::spawn(move || {
                for i in 0..20 {
                    logger.log_args(Level::INFO, "Thread {} - Message {}", [thread_id, i]);
                }
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
    println!("   5 threads logged 20 messages each");

    dispatcher.flush();
    let metrics = queued.metrics();
    println!("\n3. Queue metrics:");
    println!("   written:  {}", metrics.written());
    println!("   dropped:  {}", metrics.dropped_count());
    println!("   alerts:   {}", alerts.load(Ordering::Relaxed));

    dispatcher.shutdown();
    println!("\n=== Example completed successfully! ===");
    println!("Check 'async_test.log' for file output");

    Ok(())
}
