//! # Rust Log Dispatch
//!
//! A logging core that routes records through an ordered set of bindings.
//! Each binding pairs a sink with its own formatter, optional filter and
//! minimum level, so one record can be rendered differently for every
//! destination.
//!
//! ## Features
//!
//! - **Open level set**: seven built-in levels plus custom ones registered at runtime
//! - **Per-binding formatting**: templates, JSON and logfmt
//! - **Failure isolation**: a failing filter, formatter or sink never stops the others
//! - **Queued sinks**: [`sinks::AsyncSink`] moves writes to a worker thread
//!
//! ```
//! use rust_log_dispatch::prelude::*;
//! use rust_log_dispatch::sinks::MemorySink;
//! use std::sync::Arc;
//!
//! let memory = MemorySink::new();
//! let dispatcher = Arc::new(Dispatcher::new());
//! dispatcher
//!     .register(
//!         Binding::builder(memory.clone())
//!             .formatter(TemplateFormatter::new("{level} {logger}: {message}").unwrap())
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let logger = Logger::new("app", dispatcher);
//! logger.info("ready");
//! assert_eq!(memory.entries(), vec!["INFO app: ready"]);
//! ```

pub mod config;
pub mod core;
pub mod formatters;
pub mod global;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::config::{DispatchConfig, SinkRecipes};
    pub use crate::core::{
        Binding, BindingHandle, DispatchError, DispatchSummary, Dispatcher, ErrorPolicy,
        FieldValue, Filter, FilterExt, Formatter, Level, LevelFilter, LogContext, Logger,
        LoggerError, LoggerNameFilter, Message, OverflowPolicy, Record, Rendered, Result,
        SamplingFilter, Sink, TimestampFormat, Timezone,
    };
    pub use crate::formatters::{JsonFormatter, LogfmtFormatter, TemplateFormatter};
}

pub use crate::core::{
    Binding, BindingBuilder, BindingHandle, DispatchError, DispatchMetrics, DispatchStage,
    DispatchSummary, Dispatcher, DispatcherBuilder, ErrorPayload, ErrorPolicy, FieldValue,
    Filter, FilterExt, Formatter, Level, LevelRegistry, Location, LogContext, Logger,
    LoggerError, Message, OverflowPolicy, QueueMetrics, Record, Rendered, Result, SharedSink,
    ShutdownReport, Sink, Synchronization, TimestampFormat, Timezone,
};
