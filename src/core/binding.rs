//! Bindings: one route from the dispatcher to a sink

use super::filter::Filter;
use super::formatter::Formatter;
use super::level::Level;
use super::sink::SharedSink;
use crate::formatters::TemplateFormatter;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Filter, formatter and sink registered together with an optional minimum
/// level. Built with [`Binding::builder`].
pub struct Binding {
    pub(crate) name: String,
    pub(crate) sink: SharedSink,
    pub(crate) filter: Option<Box<dyn Filter>>,
    pub(crate) formatter: Box<dyn Formatter>,
    pub(crate) min_level: Option<Level>,
    pub(crate) enabled: bool,
}

impl Binding {
    /// Start a binding for `sink`, named after the sink by default
    ///
    /// # Example
    ///
    /// ```
    /// use rust_log_dispatch::prelude::*;
    /// use rust_log_dispatch::sinks::MemorySink;
    ///
    /// let binding = Binding::builder(MemorySink::new())
    ///     .name("capture")
    ///     .formatter(TemplateFormatter::new("{level} {message}").unwrap())
    ///     .min_level(Level::WARNING)
    ///     .build();
    ///
    /// assert_eq!(binding.name(), "capture");
    /// ```
    pub fn builder(sink: impl Into<SharedSink>) -> BindingBuilder {
        let sink = sink.into();
        BindingBuilder {
            name: sink.name().to_string(),
            sink,
            filter: None,
            formatter: None,
            min_level: None,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn min_level(&self) -> Option<Level> {
        self.min_level
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn formatter_name(&self) -> &str {
        self.formatter.name()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("sink", &self.sink)
            .field("filter", &self.filter.as_ref().map(|filter| filter.name()))
            .field("formatter", &self.formatter.name())
            .field("min_level", &self.min_level)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[must_use = "builder methods return a new value"]
pub struct BindingBuilder {
    name: String,
    sink: SharedSink,
    filter: Option<Box<dyn Filter>>,
    formatter: Option<Box<dyn Formatter>>,
    min_level: Option<Level>,
    enabled: bool,
}

impl BindingBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Defaults to [`TemplateFormatter::default`]
    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    pub(crate) fn boxed_filter(mut self, filter: Option<Box<dyn Filter>>) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn boxed_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Records below `level` never reach this binding's filter or sink,
    /// whatever the dispatcher's global minimum
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    pub(crate) fn maybe_min_level(mut self, level: Option<Level>) -> Self {
        self.min_level = level;
        self
    }

    /// Register the binding switched off; see `Dispatcher::set_enabled`
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> Binding {
        Binding {
            name: self.name,
            sink: self.sink,
            filter: self.filter,
            formatter: self
                .formatter
                .unwrap_or_else(|| Box::new(TemplateFormatter::default())),
            min_level: self.min_level,
            enabled: self.enabled,
        }
    }
}

/// Returned by `Dispatcher::register`; identifies one registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingHandle {
    id: u64,
    name: Arc<str>,
}

impl BindingHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BindingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Detached,
}

/// A registered binding as the dispatcher stores it
pub(crate) struct BindingEntry {
    pub(crate) handle: BindingHandle,
    pub(crate) binding: Binding,
    pub(crate) enabled: AtomicBool,
    // Dispatch holds a read guard for the whole visit; deregister takes the
    // write guard to wait for in-flight visits
    pub(crate) lifecycle: RwLock<Lifecycle>,
}

impl BindingEntry {
    pub(crate) fn new(id: u64, binding: Binding) -> Self {
        let enabled = binding.enabled;
        Self {
            handle: BindingHandle {
                id,
                name: Arc::from(binding.name.as_str()),
            },
            binding,
            enabled: AtomicBool::new(enabled),
            lifecycle: RwLock::new(Lifecycle::Active),
        }
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Mark Detached once in-flight visits finish. Returns false if it
    /// already was.
    pub(crate) fn detach(&self) -> bool {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle == Lifecycle::Detached {
            return false;
        }
        *lifecycle = Lifecycle::Detached;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::LevelFilter;
    use crate::sinks::MemorySink;

    #[test]
    fn test_builder_defaults() {
        let binding = Binding::builder(MemorySink::new()).build();
        assert_eq!(binding.name(), "memory");
        assert_eq!(binding.min_level(), None);
        assert!(!binding.has_filter());
        assert_eq!(binding.formatter_name(), "template");
        assert!(binding.enabled);
    }

    #[test]
    fn test_builder_options() {
        let binding = Binding::builder(MemorySink::new())
            .name("audit")
            .filter(LevelFilter::at_least(Level::ERROR))
            .min_level(Level::WARNING)
            .enabled(false)
            .build();

        assert_eq!(binding.name(), "audit");
        assert_eq!(binding.min_level(), Some(Level::WARNING));
        assert!(binding.has_filter());
        assert!(!binding.enabled);
    }

    #[test]
    fn test_entry_detach_is_idempotent() {
        let entry = BindingEntry::new(7, Binding::builder(MemorySink::new()).build());
        assert_eq!(entry.handle.to_string(), "memory#7");
        assert!(entry.is_enabled());
        assert!(entry.detach());
        assert!(!entry.detach());
        assert_eq!(*entry.lifecycle.read(), Lifecycle::Detached);
    }
}
