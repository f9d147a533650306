//! Where dispatch-time failures go
//!
//! Failures inside filters, formatters and sinks never travel back to the log
//! call site. They are wrapped in a [`DispatchError`] and handed to the
//! installed hook, or written to stderr when no hook is installed.

use super::error::LoggerError;
use super::level::Level;
use parking_lot::RwLock;
use std::fmt;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pipeline step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStage {
    Filter,
    Format,
    Write,
    Flush,
    Close,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchStage::Filter => "filter",
            DispatchStage::Format => "format",
            DispatchStage::Write => "write",
            DispatchStage::Flush => "flush",
            DispatchStage::Close => "close",
        };
        f.write_str(name)
    }
}

/// A failure observed while dispatching, flushing or closing
#[derive(Debug)]
pub struct DispatchError {
    pub stage: DispatchStage,
    /// Binding name, when the failure belongs to one binding
    pub binding: Option<String>,
    pub sink: Option<String>,
    /// Level of the record being dispatched, if any
    pub level: Option<Level>,
    pub logger: Option<String>,
    pub error: LoggerError,
}

impl DispatchError {
    pub fn new(stage: DispatchStage, error: LoggerError) -> Self {
        Self {
            stage,
            binding: None,
            sink: None,
            level: None,
            logger: None,
            error,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_sink(mut self, sink: impl Into<String>) -> Self {
        self.sink = Some(sink.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_record(mut self, level: Level, logger: impl Into<String>) -> Self {
        self.level = Some(level);
        self.logger = Some(logger.into());
        self
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.stage)?;
        if let Some(ref binding) = self.binding {
            write!(f, " in binding '{}'", binding)?;
        }
        if let Some(ref sink) = self.sink {
            write!(f, " (sink '{}')", sink)?;
        }
        if let (Some(level), Some(logger)) = (self.level, self.logger.as_deref()) {
            write!(f, " for {} record from '{}'", level.name(), logger)?;
        }
        write!(f, ": {}", self.error)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type ErrorHook = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Cloneable handle to a dispatcher's error-reporting hook.
///
/// Clones share the hook, so a sink that runs its own worker thread can keep
/// a clone and report through the same place as the dispatcher.
#[derive(Clone, Default)]
pub struct ErrorChannel {
    hook: Arc<RwLock<Option<ErrorHook>>>,
    reported: Arc<AtomicU64>,
}

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `hook`, replacing any previous one
    pub fn set_hook<F>(&self, hook: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        *self.hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_hook(&self) {
        *self.hook.write() = None;
    }

    pub fn has_hook(&self) -> bool {
        self.hook.read().is_some()
    }

    /// Number of failures reported so far
    pub fn reported_count(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    /// Deliver `error` to the hook, or to stderr without one.
    ///
    /// Never panics and never returns an error.
    pub fn report(&self, error: &DispatchError) {
        self.reported.fetch_add(1, Ordering::Relaxed);

        // Clone out of the lock so a hook may replace itself
        let hook = self.hook.read().clone();
        match hook {
            Some(hook) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(error))) {
                    let hook_error = LoggerError::panic("error hook", payload.as_ref());
                    let _ = writeln!(io::stderr().lock(), "[LOGGER CRITICAL] {}", hook_error);
                    fallback(error);
                }
            }
            None => fallback(error),
        }
    }
}

fn fallback(error: &DispatchError) {
    let _ = writeln!(io::stderr().lock(), "[LOGGER ERROR] {}", error);
}

impl fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("has_hook", &self.has_hook())
            .field("reported", &self.reported_count())
            .finish()
    }
}
