//! The immutable log record passed through the dispatch pipeline

use super::context::LogContext;
use super::error::{LoggerError, Result};
use super::error_payload::ErrorPayload;
use super::level::Level;
use super::message::Message;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

// Thread-local caches for thread information to avoid repeated allocations
thread_local! {
    static THREAD_ID_CACHE: RefCell<Option<Arc<str>>> = const { RefCell::new(None) };
    static THREAD_NAME_CACHE: RefCell<Option<Option<Arc<str>>>> = const { RefCell::new(None) };
}

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// Instant the engine first observed; `{uptime}` is measured from here
pub fn process_start() -> Instant {
    *PROCESS_START.get_or_init(Instant::now)
}

fn current_thread_id() -> Arc<str> {
    THREAD_ID_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| format!("{:?}", std::thread::current().id()).into())
            .clone()
    })
}

fn current_thread_name() -> Option<Arc<str>> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(Arc::from))
            .clone()
    })
}

/// Call-site location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
    pub module_path: &'static str,
}

impl Location {
    pub const fn new(file: &'static str, line: u32, module_path: &'static str) -> Self {
        Self {
            file,
            line,
            module_path,
        }
    }
}

/// One log event.
///
/// Built once at the call site and then only read. The message is rendered
/// on first request and cached, so every binding of a dispatch sees the same
/// text and the work happens at most once.
#[derive(Debug)]
pub struct Record {
    timestamp: DateTime<Utc>,
    monotonic: Instant,
    level: Level,
    logger_name: Arc<str>,
    message: Message,
    rendered: OnceLock<std::result::Result<String, String>>,
    location: Option<Location>,
    thread_id: Arc<str>,
    thread_name: Option<Arc<str>>,
    process_id: u32,
    error: Option<ErrorPayload>,
    context: LogContext,
}

impl Record {
    pub fn new(level: Level, logger_name: impl Into<Arc<str>>, message: impl Into<Message>) -> Self {
        // Pin the process start before the first monotonic reading
        process_start();
        Self {
            timestamp: Utc::now(),
            monotonic: Instant::now(),
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            rendered: OnceLock::new(),
            location: None,
            thread_id: current_thread_id(),
            thread_name: current_thread_name(),
            process_id: std::process::id(),
            error: None,
            context: LogContext::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: LogContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: ErrorPayload) -> Self {
        self.error = Some(error);
        self
    }

    /// Override the wall-clock timestamp (replaying or testing)
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn monotonic(&self) -> Instant {
        self.monotonic
    }

    /// Time elapsed between process start and this record
    pub fn uptime(&self) -> Duration {
        self.monotonic.saturating_duration_since(process_start())
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn raw_message(&self) -> &Message {
        &self.message
    }

    /// The rendered message text.
    ///
    /// Rendering happens on the first call. Newlines, carriage returns and
    /// tabs are escaped so one record can never look like several lines.
    pub fn message(&self) -> Result<&str> {
        let rendered = self.rendered.get_or_init(|| {
            self.message
                .render()
                .map(|text| sanitize_message(&text))
        });
        match rendered {
            Ok(text) => Ok(text.as_str()),
            Err(reason) => Err(LoggerError::format("message", reason.clone())),
        }
    }

    /// Whether the message text has been rendered yet
    pub fn is_rendered(&self) -> bool {
        self.rendered.get().is_some()
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// Thread name if set, otherwise the thread id
    pub fn thread_label(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(&self.thread_id)
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn error(&self) -> Option<&ErrorPayload> {
        self.error.as_ref()
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }
}

/// Sanitize log message to prevent log injection attacks
fn sanitize_message(message: &str) -> String {
    message
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
