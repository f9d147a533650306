//! Process-wide default dispatcher
//!
//! The default dispatcher is created on first use (empty, minimum INFO) or
//! installed explicitly with [`init`]. Nothing flushes it implicitly: call
//! [`shutdown`] before the process exits to get buffered output out.
//!
//! ```
//! use rust_log_dispatch::global;
//! use rust_log_dispatch::prelude::*;
//! use rust_log_dispatch::sinks::ConsoleSink;
//!
//! global::dispatcher()
//!     .register(Binding::builder(ConsoleSink::stderr()).build())
//!     .unwrap();
//!
//! global::logger("app").info("started");
//!
//! let report = global::shutdown();
//! assert!(report.is_clean());
//! ```

use crate::core::dispatcher::{Dispatcher, ShutdownReport};
use crate::core::error::{LoggerError, Result};
use crate::core::logger::Logger;
use std::sync::{Arc, OnceLock};

static DISPATCHER: OnceLock<Arc<Dispatcher>> = OnceLock::new();

/// The process-wide dispatcher, created on first use
pub fn dispatcher() -> &'static Arc<Dispatcher> {
    DISPATCHER.get_or_init(|| Arc::new(Dispatcher::new()))
}

/// The process-wide dispatcher if it exists yet
pub fn try_dispatcher() -> Option<&'static Arc<Dispatcher>> {
    DISPATCHER.get()
}

/// Install `dispatcher` as the process-wide default.
///
/// Fails with a configuration error once a default exists, whether it was
/// installed by an earlier `init` or created by first use.
pub fn init(dispatcher: Dispatcher) -> Result<&'static Arc<Dispatcher>> {
    let mut installed = false;
    let current = DISPATCHER.get_or_init(|| {
        installed = true;
        Arc::new(dispatcher)
    });
    if installed {
        Ok(current)
    } else {
        Err(LoggerError::config(
            "global",
            "the process-wide dispatcher is already initialized",
        ))
    }
}

/// Logger bound to the process-wide dispatcher
pub fn logger(name: impl Into<Arc<str>>) -> Logger {
    Logger::new(name, Arc::clone(dispatcher()))
}

/// Flush and close every sink of the process-wide dispatcher.
///
/// Does nothing (and creates nothing) if the default was never used.
pub fn shutdown() -> ShutdownReport {
    match DISPATCHER.get() {
        Some(dispatcher) => dispatcher.shutdown(),
        None => ShutdownReport::default(),
    }
}
