//! Logger façade: the call-site surface of the engine

use super::context::{FieldValue, LogContext};
use super::dispatcher::{DispatchSummary, Dispatcher};
use super::error_payload::ErrorPayload;
use super::level::Level;
use super::message::Message;
use super::record::{Location, Record};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Named handle for emitting records into a [`Dispatcher`]
///
/// Cheap to clone. Holds only its name, its bound context and the dispatcher
/// it reports to; any number of loggers may share one dispatcher.
///
/// # Example
///
/// ```
/// use rust_log_dispatch::prelude::*;
/// use rust_log_dispatch::sinks::MemorySink;
/// use std::sync::Arc;
///
/// let memory = MemorySink::new();
/// let dispatcher = Arc::new(Dispatcher::new());
/// dispatcher
///     .register(
///         Binding::builder(memory.clone())
///             .formatter(TemplateFormatter::new("{logger} {level} {message} {context}").unwrap())
///             .build(),
///     )
///     .unwrap();
///
/// let logger = Logger::new("app", Arc::clone(&dispatcher)).with_field("region", "eu");
/// logger.child("db").info("connected");
///
/// assert_eq!(memory.entries(), vec!["app.db INFO connected region=eu"]);
/// ```
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    context: Arc<LogContext>,
    dispatcher: Arc<Dispatcher>,
}

impl Logger {
    pub fn new(name: impl Into<Arc<str>>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            name: name.into(),
            context: Arc::new(LogContext::new()),
            dispatcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Logger named `self.name + "." + suffix`, inheriting this context
    #[must_use]
    pub fn child(&self, suffix: &str) -> Logger {
        let name: Arc<str> = if self.name.is_empty() {
            Arc::from(suffix)
        } else {
            Arc::from(format!("{}.{}", self.name, suffix))
        };
        Logger {
            name,
            context: Arc::clone(&self.context),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    /// Copy of this logger with one more bound field
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<FieldValue>) -> Logger {
        let mut context = (*self.context).clone();
        context.add_field(key, value);
        self.with_bound(context)
    }

    /// Copy of this logger with `context` merged over the bound one
    #[must_use]
    pub fn with_context(&self, context: &LogContext) -> Logger {
        self.with_bound(LogContext::merged(&self.context, context))
    }

    fn with_bound(&self, context: LogContext) -> Logger {
        Logger {
            name: Arc::clone(&self.name),
            context: Arc::new(context),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    /// Whether a record at `level` from this logger would be dispatched at all
    #[inline]
    pub fn is_enabled(&self, level: Level) -> bool {
        self.dispatcher.is_enabled(level, &self.name)
    }

    /// Fluent record builder for fields, location, errors and arguments
    pub fn at(&self, level: Level) -> RecordBuilder<'_> {
        RecordBuilder {
            logger: self,
            level,
            message: Message::Literal(Cow::Borrowed("")),
            fields: LogContext::new(),
            location: None,
            error: None,
        }
    }

    pub fn log(&self, level: Level, message: impl Into<Message>) {
        if self.is_enabled(level) {
            self.dispatcher.dispatch(&self.record(level, message.into()));
        }
    }

    /// Log a `{}` / `{N}` template with positional arguments, rendered lazily
    pub fn log_args<I, V>(&self, level: Level, template: impl Into<Cow<'static, str>>, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        if !self.is_enabled(level) {
            return;
        }
        let message = args
            .into_iter()
            .fold(Message::template(template), |message, arg| message.arg(arg));
        self.dispatcher.dispatch(&self.record(level, message));
    }

    #[inline]
    pub fn trace(&self, message: impl Into<Message>) {
        self.log(Level::TRACE, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<Message>) {
        self.log(Level::DEBUG, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<Message>) {
        self.log(Level::INFO, message);
    }

    #[inline]
    pub fn success(&self, message: impl Into<Message>) {
        self.log(Level::SUCCESS, message);
    }

    #[inline]
    pub fn warning(&self, message: impl Into<Message>) {
        self.log(Level::WARNING, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<Message>) {
        self.log(Level::ERROR, message);
    }

    #[inline]
    pub fn critical(&self, message: impl Into<Message>) {
        self.log(Level::CRITICAL, message);
    }

    /// Log `message` with `error` (and its cause chain) attached
    pub fn exception<E>(&self, level: Level, error: &E, message: impl Into<Message>)
    where
        E: StdError + ?Sized,
    {
        if self.is_enabled(level) {
            let payload = ErrorPayload::from_error(error).with_backtrace();
            let record = self.record(level, message.into()).with_error(payload);
            self.dispatcher.dispatch(&record);
        }
    }

    /// Log an `Err` at `level` and hand the result back unchanged
    ///
    /// ```
    /// # use rust_log_dispatch::prelude::*;
    /// # use std::sync::Arc;
    /// # let logger = Logger::new("app", Arc::new(Dispatcher::new()));
    /// let port = logger.catch(Level::ERROR, "80a".parse::<u16>());
    /// assert!(port.is_err());
    /// ```
    pub fn catch<T, E>(&self, level: Level, result: Result<T, E>) -> Result<T, E>
    where
        E: StdError,
    {
        if let Err(ref error) = result {
            self.exception(level, error, format!("Caught error: {}", error));
        }
        result
    }

    /// Run `f`, logging the call and the value it returned
    pub fn traced<T, F>(&self, level: Level, label: &str, f: F) -> T
    where
        T: fmt::Debug,
        F: FnOnce() -> T,
    {
        if self.is_enabled(level) {
            self.log(level, format!("Function '{}' called", label));
        }
        let value = f();
        if self.is_enabled(level) {
            self.log(level, format!("Function '{}' returned {:?}", label, value));
        }
        value
    }

    fn record(&self, level: Level, message: Message) -> Record {
        Record::new(level, Arc::clone(&self.name), message).with_context((*self.context).clone())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("context", &self.context)
            .finish()
    }
}

/// Builder returned by [`Logger::at`]
///
/// Nothing is built until [`emit`](RecordBuilder::emit), and `emit` checks
/// the enablement gate before constructing the record.
#[must_use = "records are only dispatched by emit()"]
pub struct RecordBuilder<'a> {
    logger: &'a Logger,
    level: Level,
    message: Message,
    fields: LogContext,
    location: Option<Location>,
    error: Option<ErrorPayload>,
}

impl RecordBuilder<'_> {
    pub fn message(mut self, message: impl Into<Message>) -> Self {
        self.message = message.into();
        self
    }

    /// Append a positional template argument
    pub fn arg(mut self, value: impl Into<FieldValue>) -> Self {
        self.message = self.message.arg(value);
        self
    }

    /// Add a named template argument
    pub fn named(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.message = self.message.named(key, value);
        self
    }

    /// Per-record context field; wins over the logger's bound context
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.add_field(key, value);
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn error<E: StdError + ?Sized>(mut self, error: &E) -> Self {
        self.error = Some(ErrorPayload::from_error(error));
        self
    }

    pub fn error_payload(mut self, payload: ErrorPayload) -> Self {
        self.error = Some(payload);
        self
    }

    /// Build and dispatch the record if the level is enabled
    pub fn emit(self) -> DispatchSummary {
        let logger = self.logger;
        if !logger.is_enabled(self.level) {
            return DispatchSummary::default();
        }

        let mut record = Record::new(self.level, Arc::clone(&logger.name), self.message)
            .with_context(LogContext::merged(&logger.context, &self.fields));
        if let Some(location) = self.location {
            record = record.with_location(location);
        }
        if let Some(error) = self.error {
            record = record.with_error(error);
        }
        logger.dispatcher.dispatch(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binding::Binding;
    use crate::formatters::TemplateFormatter;
    use crate::sinks::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(template: &str) -> (Logger, MemorySink) {
        let memory = MemorySink::new();
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.set_min_level(Level::TRACE);
        dispatcher
            .register(
                Binding::builder(memory.clone())
                    .formatter(TemplateFormatter::new(template).unwrap())
                    .build(),
            )
            .unwrap();
        (Logger::new("app", dispatcher), memory)
    }

    #[test]
    fn test_level_methods() {
        let (logger, memory) = setup("{level} {message}");
        logger.trace("t");
        logger.debug("d");
        logger.info("i");
        logger.success("s");
        logger.warning("w");
        logger.error("e");
        logger.critical("c");

        assert_eq!(
            memory.entries(),
            vec!["TRACE t", "DEBUG d", "INFO i", "SUCCESS s", "WARNING w", "ERROR e", "CRITICAL c"]
        );
    }

    #[test]
    fn test_log_args_renders_template() {
        let (logger, memory) = setup("{message}");
        logger.log_args(Level::INFO, "{} of {}", [3, 4]);
        assert_eq!(memory.entries(), vec!["3 of 4"]);
    }

    #[test]
    fn test_disabled_level_never_renders() {
        let (logger, memory) = setup("{message}");
        logger.dispatcher().set_min_level(Level::WARNING);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        logger.info(Message::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "expensive".to_string()
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_child_and_context_merging() {
        let (logger, memory) = setup("{logger} {context}");
        let parent = logger.with_field("user", "alice").with_field("tier", "gold");
        let child = parent.child("billing").with_field("tier", "platinum");

        child.at(Level::INFO).field("user", "bob").emit();
        parent.info("x");

        assert_eq!(
            memory.entries(),
            vec!["app.billing tier=platinum user=bob", "app tier=gold user=alice"]
        );
        assert_eq!(child.name(), "app.billing");
    }

    #[test]
    fn test_record_builder() {
        let (logger, memory) = setup("{message} @{line} {module}");
        let summary = logger
            .at(Level::WARNING)
            .message("{user} retried {} times")
            .arg(3)
            .named("user", "carol")
            .location(Location::new("src/main.rs", 42, "app::main"))
            .emit();

        assert_eq!(summary.delivered, 1);
        assert_eq!(memory.entries(), vec!["carol retried 3 times @42 app::main"]);
    }

    #[test]
    fn test_exception_and_catch() {
        let (logger, memory) = setup("{message}");
        let failure = "x".parse::<i32>().unwrap_err();
        logger.exception(Level::ERROR, &failure, "parse failed");

        let passed: Result<i32, std::num::ParseIntError> = logger.catch(Level::ERROR, Ok(5));
        assert_eq!(passed, Ok(5));
        let caught = logger.catch(Level::WARNING, "y".parse::<i32>());
        assert!(caught.is_err());

        let entries = memory.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("parse failed\nParseIntError: invalid digit"));
        assert!(entries[1].starts_with("Caught error: invalid digit"));
    }

    #[test]
    fn test_traced() {
        let (logger, memory) = setup("{message}");
        let value = logger.traced(Level::DEBUG, "answer", || 42);
        assert_eq!(value, 42);
        assert_eq!(
            memory.entries(),
            vec!["Function 'answer' called", "Function 'answer' returned 42"]
        );
    }

    #[test]
    fn test_muted_logger_name() {
        let (logger, memory) = setup("{message}");
        logger.dispatcher().disable("app");
        logger.child("db").error("hidden");
        assert!(!logger.is_enabled(Level::CRITICAL));
        assert!(memory.is_empty());
    }
}
