//! The record dispatch engine
//!
//! A [`Dispatcher`] owns an ordered set of bindings and a global minimum
//! level. Every record is offered to the bindings in registration order on
//! the caller's thread:
//!
//! 1. global minimum level and muted logger names (once per record)
//! 2. per binding: minimum level, filter, formatter, `Sink::write`
//!
//! A failure in one binding is reported through the [`ErrorChannel`] and the
//! loop moves on to the next binding. Panics in user code are caught and
//! reported the same way.
//!
//! The binding set is a copy-on-write snapshot: a dispatch clones one `Arc`
//! and iterates it without holding the registry lock, so registering or
//! deregistering never disturbs a dispatch in progress.

use super::binding::{Binding, BindingEntry, BindingHandle, Lifecycle};
use super::error::{LoggerError, Result};
use super::error_channel::{DispatchError, DispatchStage, ErrorChannel};
use super::filter::is_within;
use super::level::{Level, LevelRegistry};
use super::metrics::DispatchMetrics;
use super::record::Record;
use super::sink::SharedSink;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of one [`Dispatcher::dispatch`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Bindings whose level check passed
    pub attempted: usize,
    /// Bindings whose sink accepted the output
    pub delivered: usize,
    /// Bindings whose filter rejected the record
    pub filtered: usize,
    /// Bindings that failed in filter, formatter or sink
    pub failed: usize,
}

/// What `shutdown` did
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Bindings detached
    pub detached: usize,
    /// Distinct sinks closed
    pub closed: usize,
    /// Flush and close failures, in the order they happened
    pub errors: Vec<DispatchError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// Process-wide so a handle never matches a binding of another dispatcher
static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

enum Visit {
    Skipped,
    Filtered,
    Delivered,
    Failed,
}

/// Routes records to registered bindings
///
/// # Example
///
/// ```
/// use rust_log_dispatch::prelude::*;
/// use rust_log_dispatch::sinks::MemorySink;
///
/// let memory = MemorySink::new();
/// let dispatcher = Dispatcher::new();
/// dispatcher
///     .register(
///         Binding::builder(memory.clone())
///             .formatter(TemplateFormatter::new("{level} {message}").unwrap())
///             .build(),
///     )
///     .unwrap();
///
/// dispatcher.dispatch(&Record::new(Level::DEBUG, "app", "hidden"));
/// dispatcher.dispatch(&Record::new(Level::INFO, "app", "ready"));
///
/// assert_eq!(memory.entries(), vec!["INFO ready"]);
/// ```
pub struct Dispatcher {
    bindings: RwLock<Arc<[Arc<BindingEntry>]>>,
    // Rank mirrors `min_level` for the lock-free gate
    min_rank: AtomicU32,
    min_level: RwLock<Level>,
    levels: LevelRegistry,
    disabled: RwLock<BTreeSet<String>>,
    any_disabled: AtomicBool,
    errors: ErrorChannel,
    metrics: DispatchMetrics,
    shut_down: AtomicBool,
}

impl Dispatcher {
    /// Empty dispatcher with a global minimum of INFO
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Arc::from(Vec::new())),
            min_rank: AtomicU32::new(Level::INFO.rank()),
            min_level: RwLock::new(Level::INFO),
            levels: LevelRegistry::new(),
            disabled: RwLock::new(BTreeSet::new()),
            any_disabled: AtomicBool::new(false),
            errors: ErrorChannel::new(),
            metrics: DispatchMetrics::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    // ---- registration ----

    /// Append `binding` to the dispatch order
    ///
    /// Fails with a configuration error after shutdown or when the binding's
    /// sink has already been closed.
    pub fn register(&self, binding: Binding) -> Result<BindingHandle> {
        if self.is_shut_down() {
            return Err(LoggerError::config(
                "Dispatcher",
                "cannot register bindings after shutdown",
            ));
        }
        if binding.sink.is_closed() {
            return Err(LoggerError::config(
                "Dispatcher",
                format!(
                    "sink '{}' of binding '{}' is already closed",
                    binding.sink.name(),
                    binding.name
                ),
            ));
        }

        let id = NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(BindingEntry::new(id, binding));
        let handle = entry.handle.clone();

        let mut bindings = self.bindings.write();
        // Re-check under the lock so a concurrent shutdown cannot miss us
        if self.is_shut_down() {
            return Err(LoggerError::config(
                "Dispatcher",
                "cannot register bindings after shutdown",
            ));
        }
        entry.binding.sink.attach(&self.errors);
        let mut next: Vec<Arc<BindingEntry>> = bindings.iter().cloned().collect();
        next.push(entry);
        *bindings = Arc::from(next);

        Ok(handle)
    }

    /// Remove a binding. Returns false if it was not registered (anymore).
    ///
    /// Dispatches that already hold the binding finish first; the sink is
    /// closed once no other binding uses it. Must not be called from inside
    /// the binding's own filter, formatter or sink.
    pub fn deregister(&self, handle: &BindingHandle) -> bool {
        let removed = {
            let mut bindings = self.bindings.write();
            let Some(position) = bindings.iter().position(|e| e.handle.id() == handle.id()) else {
                return false;
            };
            let mut next: Vec<Arc<BindingEntry>> = bindings.iter().cloned().collect();
            let removed = next.remove(position);
            *bindings = Arc::from(next);
            removed
        };

        if removed.detach() && removed.binding.sink.detach() {
            self.close_sink(&removed.binding.sink, Some(&removed.binding.name));
        }
        true
    }

    pub fn set_enabled(&self, handle: &BindingHandle, enabled: bool) -> bool {
        match self.find(handle) {
            Some(entry) => {
                entry.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn is_binding_enabled(&self, handle: &BindingHandle) -> Option<bool> {
        self.find(handle).map(|entry| entry.is_enabled())
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Handles in dispatch order
    pub fn bindings(&self) -> Vec<BindingHandle> {
        self.snapshot().iter().map(|e| e.handle.clone()).collect()
    }

    fn find(&self, handle: &BindingHandle) -> Option<Arc<BindingEntry>> {
        self.snapshot()
            .iter()
            .find(|e| e.handle.id() == handle.id())
            .cloned()
    }

    #[inline]
    fn snapshot(&self) -> Arc<[Arc<BindingEntry>]> {
        Arc::clone(&self.bindings.read())
    }

    // ---- levels ----

    pub fn min_level(&self) -> Level {
        *self.min_level.read()
    }

    pub fn set_min_level(&self, level: Level) {
        let mut current = self.min_level.write();
        *current = level;
        self.min_rank.store(level.rank(), Ordering::Relaxed);
    }

    pub fn levels(&self) -> &LevelRegistry {
        &self.levels
    }

    pub fn register_level(&self, name: &str, rank: u32) -> Result<Level> {
        self.levels.register(name, rank)
    }

    pub fn level(&self, name: &str) -> Result<Level> {
        self.levels.resolve(name)
    }

    // ---- logger-name muting ----

    /// Mute `name` and every logger below it (`app` mutes `app.db`)
    pub fn disable(&self, name: impl Into<String>) {
        let mut disabled = self.disabled.write();
        disabled.insert(name.into());
        self.any_disabled.store(true, Ordering::Release);
    }

    /// Undo an earlier `disable` of exactly `name`
    pub fn enable(&self, name: &str) -> bool {
        let mut disabled = self.disabled.write();
        let removed = disabled.remove(name);
        self.any_disabled.store(!disabled.is_empty(), Ordering::Release);
        removed
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        if !self.any_disabled.load(Ordering::Acquire) {
            return false;
        }
        self.disabled
            .read()
            .iter()
            .any(|prefix| is_within(name, prefix))
    }

    /// Cheap gate checked before a record is even built
    #[inline]
    pub fn is_enabled(&self, level: Level, logger: &str) -> bool {
        !self.is_shut_down()
            && level.rank() >= self.min_rank.load(Ordering::Relaxed)
            && !self.is_disabled(logger)
    }

    // ---- errors and metrics ----

    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.errors.set_hook(hook);
    }

    pub fn clear_error_hook(&self) {
        self.errors.clear_hook();
    }

    pub fn error_channel(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    // ---- dispatch ----

    /// Offer `record` to every active binding, in registration order
    pub fn dispatch(&self, record: &Record) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if !self.is_enabled(record.level(), record.logger_name()) {
            if !self.is_shut_down() {
                self.metrics.record_suppressed();
            }
            return summary;
        }
        self.metrics.record_dispatched();

        let snapshot = self.snapshot();
        for entry in snapshot.iter() {
            match self.visit(entry, record) {
                Visit::Skipped => {}
                Visit::Filtered => {
                    summary.attempted += 1;
                    summary.filtered += 1;
                }
                Visit::Delivered => {
                    summary.attempted += 1;
                    summary.delivered += 1;
                }
                Visit::Failed => {
                    summary.attempted += 1;
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn visit(&self, entry: &BindingEntry, record: &Record) -> Visit {
        // Recursive so a sink that logs through this dispatcher cannot deadlock
        // against a waiting deregister
        let lifecycle = entry.lifecycle.read_recursive();
        if *lifecycle == Lifecycle::Detached || !entry.is_enabled() {
            return Visit::Skipped;
        }

        let binding = &entry.binding;
        if binding.min_level.is_some_and(|min| record.level() < min) {
            self.metrics.record_filtered();
            return Visit::Skipped;
        }

        if let Some(ref filter) = binding.filter {
            match isolate(filter.name(), || filter.evaluate(record)) {
                Ok(true) => {}
                Ok(false) => {
                    self.metrics.record_filtered();
                    return Visit::Filtered;
                }
                Err(e) => {
                    self.metrics.record_filter_failure();
                    self.report_visit(DispatchStage::Filter, entry, record, e);
                    return Visit::Failed;
                }
            }
        }

        let output = match isolate(binding.formatter.name(), || binding.formatter.format(record)) {
            Ok(output) => output,
            Err(e) => {
                self.metrics.record_format_failure();
                self.report_visit(DispatchStage::Format, entry, record, e);
                return Visit::Failed;
            }
        };

        match isolate(binding.sink.name(), || binding.sink.write(&output)) {
            Ok(()) => {
                self.metrics.record_delivered();
                Visit::Delivered
            }
            Err(e) => {
                self.metrics.record_write_failure();
                self.report_visit(DispatchStage::Write, entry, record, e);
                Visit::Failed
            }
        }
    }

    fn report_visit(&self, stage: DispatchStage, entry: &BindingEntry, record: &Record, error: LoggerError) {
        let error = DispatchError::new(stage, error)
            .with_binding(entry.binding.name.clone())
            .with_sink(entry.binding.sink.name())
            .with_record(record.level(), record.logger_name());
        self.errors.report(&error);
    }

    // ---- flush and shutdown ----

    /// Flush every distinct sink of every active binding.
    ///
    /// Returns true if all flushes succeeded; failures go to the error channel.
    pub fn flush(&self) -> bool {
        self.flush_collect(None)
    }

    fn flush_collect(&self, mut collected: Option<&mut Vec<DispatchError>>) -> bool {
        let mut ok = true;
        for (sink, binding) in distinct_sinks(&self.snapshot()) {
            if let Err(e) = isolate(sink.name(), || sink.flush()) {
                ok = false;
                self.metrics.record_flush_failure();
                let error = DispatchError::new(DispatchStage::Flush, e)
                    .with_binding(binding)
                    .with_sink(sink.name());
                self.errors.report(&error);
                if let Some(ref mut collected) = collected {
                    collected.push(error);
                }
            }
        }
        ok
    }

    /// Flush, then detach every binding and close every sink.
    ///
    /// Idempotent: later calls return an empty report. Afterwards `register`
    /// fails and `dispatch` does nothing.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return report;
        }

        self.flush_collect(Some(&mut report.errors));

        let entries = {
            let mut bindings = self.bindings.write();
            std::mem::replace(&mut *bindings, Arc::from(Vec::new()))
        };

        for entry in entries.iter() {
            if entry.detach() {
                report.detached += 1;
                entry.binding.sink.detach();
            }
        }
        for (sink, binding) in distinct_sinks(&entries) {
            if sink.is_closed() {
                continue;
            }
            match self.close_sink(&sink, Some(&binding)) {
                Some(error) => report.errors.push(error),
                None => report.closed += 1,
            }
        }
        report
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn close_sink(&self, sink: &SharedSink, binding: Option<&str>) -> Option<DispatchError> {
        let result = isolate(sink.name(), || sink.close());
        let e = result.err()?;
        self.metrics.record_close_failure();
        let mut error = DispatchError::new(DispatchStage::Close, e).with_sink(sink.name());
        if let Some(binding) = binding {
            error = error.with_binding(binding);
        }
        self.errors.report(&error);
        Some(error)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bindings", &self.bindings())
            .field("min_level", &self.min_level())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Sinks in first-use order, each with the first binding that uses it
fn distinct_sinks(entries: &[Arc<BindingEntry>]) -> Vec<(SharedSink, String)> {
    let mut sinks: Vec<(SharedSink, String)> = Vec::new();
    for entry in entries {
        let sink = &entry.binding.sink;
        if !sinks.iter().any(|(seen, _)| seen.ptr_eq(sink)) {
            sinks.push((sink.clone(), entry.binding.name.clone()));
        }
    }
    sinks
}

/// Run user code, turning a panic into `LoggerError::Panic`
fn isolate<T>(component: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|payload| Err(LoggerError::panic(component, payload.as_ref())))
}

/// Builder for a [`Dispatcher`] with its first bindings
#[derive(Default)]
#[must_use = "builder methods return a new value"]
pub struct DispatcherBuilder {
    min_level: Option<Level>,
    levels: Vec<(String, u32)>,
    bindings: Vec<Binding>,
    hook: Option<Box<dyn Fn(&DispatchError) + Send + Sync>>,
}

impl DispatcherBuilder {
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Register a custom level before any binding
    pub fn level(mut self, name: impl Into<String>, rank: u32) -> Self {
        self.levels.push((name.into(), rank));
        self
    }

    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let dispatcher = Dispatcher::new();
        if let Some(hook) = self.hook {
            dispatcher.set_error_hook(hook);
        }
        if let Some(level) = self.min_level {
            dispatcher.set_min_level(level);
        }
        for (name, rank) in &self.levels {
            dispatcher.register_level(name, *rank)?;
        }
        for binding in self.bindings {
            dispatcher.register(binding)?;
        }
        Ok(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{filter_fn, FnFilter};
    use crate::core::formatter::{Formatter, Rendered};
    use crate::core::sink::{Sink, Synchronization};
    use crate::formatters::TemplateFormatter;
    use crate::sinks::MemorySink;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn level_message() -> TemplateFormatter {
        TemplateFormatter::new("{level} {message}").unwrap()
    }

    fn memory_binding(memory: &MemorySink) -> Binding {
        Binding::builder(memory.clone())
            .formatter(level_message())
            .build()
    }

    fn collect_errors(dispatcher: &Dispatcher) -> Arc<Mutex<Vec<(DispatchStage, String)>>> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        dispatcher.set_error_hook(move |e| {
            sink.lock()
                .push((e.stage, e.binding.clone().unwrap_or_default()))
        });
        errors
    }

    #[derive(Default)]
    struct CountingFormatter {
        calls: Arc<AtomicUsize>,
    }

    impl Formatter for CountingFormatter {
        fn format(&self, record: &Record) -> Result<Rendered> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Rendered::from(record.message()?.to_string()))
        }
    }

    struct BrokenSink;

    impl Sink for BrokenSink {
        fn write(&self, _output: &Rendered) -> Result<()> {
            Err(LoggerError::sink_write("broken", "no space left on device"))
        }

        fn flush(&self) -> Result<()> {
            Err(LoggerError::sink_flush("broken", "no space left on device"))
        }

        fn close(&self) -> Result<()> {
            Err(LoggerError::sink_close("broken", "no space left on device"))
        }

        fn name(&self) -> &str {
            "broken"
        }

        fn synchronization(&self) -> Synchronization {
            Synchronization::SelfSynchronizing
        }
    }

    #[test]
    fn test_level_message_scenario() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        dispatcher.register(memory_binding(&memory)).unwrap();

        dispatcher.dispatch(&Record::new(Level::DEBUG, "app", "noise"));
        assert!(memory.is_empty());

        let summary = dispatcher.dispatch(&Record::new(Level::INFO, "app", "ready"));
        assert_eq!(memory.entries(), vec!["INFO ready"]);
        assert_eq!(summary.delivered, 1);
    }

    #[test]
    fn test_global_minimum_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::builder()
            .min_level(Level::WARNING)
            .binding(
                Binding::builder(MemorySink::new())
                    .formatter(CountingFormatter {
                        calls: Arc::clone(&calls),
                    })
                    .filter(filter_fn(|_| panic!("filter must not run")))
                    .build(),
            )
            .build()
            .unwrap();

        let summary = dispatcher.dispatch(&Record::new(Level::INFO, "app", "skipped"));
        assert_eq!(summary, DispatchSummary::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.metrics().suppressed(), 1);
    }

    #[test]
    fn test_binding_minimum_applies_below_global() {
        let quiet = MemorySink::new().named("quiet");
        let chatty = MemorySink::new().named("chatty");
        let dispatcher = Dispatcher::new();
        dispatcher.set_min_level(Level::TRACE);
        dispatcher
            .register(
                Binding::builder(quiet.clone())
                    .formatter(level_message())
                    .min_level(Level::ERROR)
                    .build(),
            )
            .unwrap();
        dispatcher.register(memory_binding(&chatty)).unwrap();

        dispatcher.dispatch(&Record::new(Level::WARNING, "app", "careful"));
        dispatcher.dispatch(&Record::new(Level::ERROR, "app", "broken"));

        assert_eq!(quiet.entries(), vec!["ERROR broken"]);
        assert_eq!(chatty.entries(), vec!["WARNING careful", "ERROR broken"]);
    }

    #[test]
    fn test_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            dispatcher
                .register(
                    Binding::builder(MemorySink::new())
                        .name(name)
                        .filter(FnFilter::new(name, move |_| {
                            order.lock().push(name);
                            Ok(true)
                        }))
                        .build(),
                )
                .unwrap();
        }

        dispatcher.dispatch(&Record::new(Level::INFO, "app", "go"));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);

        let names: Vec<String> = dispatcher
            .bindings()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failure_isolation() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let errors = collect_errors(&dispatcher);

        dispatcher
            .register(Binding::builder(BrokenSink).name("broken").build())
            .unwrap();
        dispatcher
            .register(
                Binding::builder(MemorySink::new())
                    .name("panicky")
                    .filter(filter_fn(|_| panic!("filter bug")))
                    .build(),
            )
            .unwrap();
        dispatcher.register(memory_binding(&memory)).unwrap();

        let summary = dispatcher.dispatch(&Record::new(Level::ERROR, "app", "still here"));

        assert_eq!(memory.entries(), vec!["ERROR still here"]);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(
            *errors.lock(),
            vec![
                (DispatchStage::Write, "broken".to_string()),
                (DispatchStage::Filter, "panicky".to_string()),
            ]
        );
        assert_eq!(dispatcher.metrics().write_failures(), 1);
        assert_eq!(dispatcher.metrics().filter_failures(), 1);
    }

    #[test]
    fn test_format_failure_skips_binding() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let errors = collect_errors(&dispatcher);
        dispatcher
            .register(
                Binding::builder(memory.clone())
                    .name("needs-user")
                    .formatter(TemplateFormatter::new("{ctx:user} {message}").unwrap())
                    .build(),
            )
            .unwrap();

        dispatcher.dispatch(&Record::new(Level::INFO, "app", "anonymous"));

        assert!(memory.is_empty());
        assert_eq!(errors.lock()[0].0, DispatchStage::Format);
    }

    #[test]
    fn test_filter_rejection_never_formats() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new();
        dispatcher
            .register(
                Binding::builder(MemorySink::new())
                    .filter(filter_fn(|r| r.logger_name() == "wanted"))
                    .formatter(CountingFormatter {
                        calls: Arc::clone(&calls),
                    })
                    .build(),
            )
            .unwrap();

        let summary = dispatcher.dispatch(&Record::new(Level::INFO, "other", "x"));
        assert_eq!(summary.filtered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.dispatch(&Record::new(Level::INFO, "wanted", "y"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deregister_is_idempotent_and_closes_sink() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.register(memory_binding(&memory)).unwrap();

        assert!(dispatcher.deregister(&handle));
        assert!(!dispatcher.deregister(&handle));
        assert!(memory.is_closed());
        assert_eq!(dispatcher.binding_count(), 0);

        dispatcher.dispatch(&Record::new(Level::INFO, "app", "after"));
        assert!(memory.is_empty());
    }

    #[test]
    fn test_shared_sink_closed_after_last_binding() {
        let memory = MemorySink::new();
        let shared = SharedSink::new(memory.clone());
        let dispatcher = Dispatcher::new();
        let first = dispatcher
            .register(Binding::builder(shared.clone()).name("a").build())
            .unwrap();
        let second = dispatcher
            .register(Binding::builder(shared.clone()).name("b").build())
            .unwrap();

        dispatcher.deregister(&first);
        assert!(!memory.is_closed());
        dispatcher.deregister(&second);
        assert!(memory.is_closed());

        assert!(dispatcher
            .register(Binding::builder(shared).build())
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_bindings_over_clones_share_one_sink() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let first = dispatcher
            .register(Binding::builder(memory.clone()).name("a").build())
            .unwrap();
        dispatcher
            .register(Binding::builder(memory.clone()).name("b").build())
            .unwrap();

        assert!(dispatcher.deregister(&first));
        assert!(!memory.is_closed());

        let summary = dispatcher.dispatch(&Record::new(Level::INFO, "app", "still open"));
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_handle_from_other_dispatcher_is_ignored() {
        let ours = MemorySink::new();
        let theirs = MemorySink::new();
        let a = Dispatcher::new();
        let b = Dispatcher::new();
        let handle_a = a.register(memory_binding(&theirs)).unwrap();
        let handle_b = b.register(memory_binding(&ours)).unwrap();
        assert_ne!(handle_a.id(), handle_b.id());

        assert!(!b.deregister(&handle_a));
        assert!(!b.set_enabled(&handle_a, false));
        assert_eq!(b.is_binding_enabled(&handle_a), None);
        assert_eq!(b.binding_count(), 1);
        assert!(!ours.is_closed());
        assert!(!theirs.is_closed());
    }

    #[test]
    fn test_set_enabled() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.register(memory_binding(&memory)).unwrap();

        assert!(dispatcher.set_enabled(&handle, false));
        dispatcher.dispatch(&Record::new(Level::INFO, "app", "muted"));
        assert_eq!(dispatcher.is_binding_enabled(&handle), Some(false));

        dispatcher.set_enabled(&handle, true);
        dispatcher.dispatch(&Record::new(Level::INFO, "app", "heard"));
        assert_eq!(memory.entries(), vec!["INFO heard"]);
    }

    #[test]
    fn test_disable_logger_names() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        dispatcher.register(memory_binding(&memory)).unwrap();

        dispatcher.disable("app.db");
        dispatcher.dispatch(&Record::new(Level::INFO, "app.db.pool", "hidden"));
        dispatcher.dispatch(&Record::new(Level::INFO, "app.dbx", "shown"));
        assert!(!dispatcher.is_enabled(Level::CRITICAL, "app.db"));

        assert!(dispatcher.enable("app.db"));
        assert!(!dispatcher.enable("app.db"));
        dispatcher.dispatch(&Record::new(Level::INFO, "app.db", "back"));

        assert_eq!(memory.entries(), vec!["INFO shown", "INFO back"]);
    }

    #[test]
    fn test_custom_level_between_info_and_warning() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let notice = dispatcher.register_level("NOTICE", 25 + 1).unwrap();
        dispatcher
            .register(
                Binding::builder(memory.clone())
                    .formatter(level_message())
                    .min_level(notice)
                    .build(),
            )
            .unwrap();

        dispatcher.dispatch(&Record::new(Level::INFO, "app", "info"));
        dispatcher.dispatch(&Record::new(notice, "app", "notice"));
        dispatcher.dispatch(&Record::new(Level::WARNING, "app", "warning"));

        assert_eq!(memory.entries(), vec!["NOTICE notice", "WARNING warning"]);
        assert_eq!(dispatcher.level("notice").unwrap(), notice);
    }

    #[test]
    fn test_shutdown_flushes_closes_and_is_idempotent() {
        let memory = MemorySink::new();
        let dispatcher = Dispatcher::new();
        let errors = collect_errors(&dispatcher);
        dispatcher.register(memory_binding(&memory)).unwrap();
        dispatcher
            .register(Binding::builder(BrokenSink).name("broken").build())
            .unwrap();

        let report = dispatcher.shutdown();
        assert_eq!(report.detached, 2);
        assert_eq!(report.closed, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].stage, DispatchStage::Flush);
        assert_eq!(report.errors[1].stage, DispatchStage::Close);
        assert_eq!(errors.lock().len(), 2);
        assert!(memory.flush_count() >= 1);
        assert!(memory.is_closed());

        let again = dispatcher.shutdown();
        assert!(again.is_clean());
        assert_eq!(again.closed, 0);

        assert!(dispatcher.register(memory_binding(&MemorySink::new())).is_err());
        assert_eq!(
            dispatcher.dispatch(&Record::new(Level::CRITICAL, "app", "late")),
            DispatchSummary::default()
        );
    }

    #[test]
    fn test_flush_reports_failures() {
        let dispatcher = Dispatcher::new();
        let errors = collect_errors(&dispatcher);
        dispatcher.register(Binding::builder(BrokenSink).build()).unwrap();

        assert!(!dispatcher.flush());
        assert_eq!(errors.lock()[0].0, DispatchStage::Flush);
        assert_eq!(dispatcher.metrics().flush_failures(), 1);
    }

    #[test]
    fn test_min_level_round_trip() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.min_level(), Level::INFO);
        dispatcher.set_min_level(Level::ERROR);
        assert_eq!(dispatcher.min_level(), Level::ERROR);
        assert!(!dispatcher.is_enabled(Level::WARNING, "app"));
        assert!(dispatcher.is_enabled(Level::ERROR, "app"));
    }
}
