//! Declarative dispatcher configuration
//!
//! The crate never reads files. A host deserializes a [`DispatchConfig`] from
//! whatever format it likes (JSON, TOML, ...) and hands it to
//! [`Dispatcher::configure`] together with the [`SinkRecipes`] that turn a
//! sink spec into a live sink.
//!
//! `configure` checks every spec before touching the dispatcher: an invalid
//! level, template, filter or sink recipe fails the whole call and no
//! binding is registered.
//!
//! ```
//! use rust_log_dispatch::config::{DispatchConfig, SinkRecipes};
//! use rust_log_dispatch::sinks::MemorySink;
//! use rust_log_dispatch::Dispatcher;
//!
//! let memory = MemorySink::new();
//! let mut recipes = SinkRecipes::new();
//! let capture = memory.clone();
//! recipes.register("capture", move |_params| Ok(Box::new(capture.clone())));
//!
//! let config: DispatchConfig = serde_json::from_str(r#"{
//!     "min_level": "debug",
//!     "levels": [{ "name": "NOTICE", "rank": 26 }],
//!     "bindings": [{
//!         "name": "main",
//!         "sink": { "kind": "capture" },
//!         "template": "{level} {message}",
//!         "min_level": "notice"
//!     }]
//! }"#).unwrap();
//!
//! let dispatcher = Dispatcher::new();
//! let handles = dispatcher.configure(&config, &recipes).unwrap();
//! assert_eq!(handles.len(), 1);
//! ```

use crate::core::binding::{Binding, BindingHandle};
use crate::core::context::FieldValue;
use crate::core::dispatcher::Dispatcher;
use crate::core::error::{LoggerError, Result};
use crate::core::filter::{AllOf, AnyOf, ContextFilter, Filter, LevelFilter, LoggerNameFilter, Not};
use crate::core::formatter::{ErrorPolicy, Formatter};
use crate::core::level::{Level, LevelRegistry};
use crate::core::overflow_policy::OverflowPolicy;
use crate::core::sampling::{RateLimitFilter, SamplingFilter};
use crate::core::sink::{SharedSink, Sink};
use crate::core::timestamp::{TimestampFormat, Timezone};
use crate::formatters::{JsonFormatter, LogfmtFormatter, TemplateFormatter};
use crate::sinks::{AsyncSink, ConsoleSink, ConsoleTarget, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Global minimum level name; unchanged when absent
    pub min_level: Option<String>,
    /// Custom levels, registered before anything refers to them
    pub levels: Vec<LevelSpec>,
    /// Bindings in dispatch order
    pub bindings: Vec<BindingSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelSpec {
    pub name: String,
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    #[default]
    Template,
    Json,
    Logfmt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingSpec {
    /// Defaults to the sink's name
    #[serde(default)]
    pub name: Option<String>,
    pub sink: SinkSpec,
    #[serde(default)]
    pub format: FormatKind,
    /// Only meaningful for the template format
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<TimestampFormat>,
    #[serde(default)]
    pub timezone: Option<Timezone>,
    #[serde(default)]
    pub error_policy: Option<ErrorPolicy>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    #[serde(default)]
    pub min_level: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Which recipe builds the sink, with recipe-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkSpec {
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Put the sink behind an [`AsyncSink`] queue
    #[serde(default)]
    pub queue: Option<QueueSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSpec {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Filter expression
///
/// ```
/// use rust_log_dispatch::config::FilterSpec;
///
/// let spec: FilterSpec = serde_json::from_str(r#"{
///     "type": "all",
///     "filters": [
///         { "type": "logger", "prefix": "app.db" },
///         { "type": "not", "filter": { "type": "context", "key": "noisy" } }
///     ]
/// }"#).unwrap();
/// assert!(matches!(spec, FilterSpec::All { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum FilterSpec {
    Level {
        min: String,
        #[serde(default)]
        max: Option<String>,
    },
    Logger {
        prefix: String,
        #[serde(default)]
        exclude: bool,
    },
    Context {
        key: String,
        #[serde(default)]
        equals: Option<FieldValue>,
    },
    Sample {
        rate: f64,
        /// Level that always passes; defaults to ERROR, `null` disables
        #[serde(default = "default_always")]
        always: Option<String>,
    },
    RateLimit {
        max: u32,
        window_ms: u64,
    },
    All {
        filters: Vec<FilterSpec>,
    },
    Any {
        filters: Vec<FilterSpec>,
    },
    Not {
        filter: Box<FilterSpec>,
    },
}

fn default_always() -> Option<String> {
    Some(Level::ERROR.name().to_string())
}

type Recipe = Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Sink>> + Send + Sync>;

/// Named sink constructors
///
/// Built in: `console` (`{"target": "stdout" | "stderr"}`) and `stderr`.
/// With the `file` feature, `file` (`{"path": ..., "buffer_size": ...}`).
/// With the `network` feature, `tcp` (`{"address": ..., "reconnect": bool,
/// "write_timeout_ms": ...}`).
#[derive(Clone)]
pub struct SinkRecipes {
    recipes: HashMap<String, Recipe>,
}

impl SinkRecipes {
    pub fn new() -> Self {
        let mut recipes = Self {
            recipes: HashMap::new(),
        };
        recipes.register("console", |params| {
            let target = match params.get("target") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => ConsoleTarget::Stdout,
            };
            Ok(Box::new(match target {
                ConsoleTarget::Stdout => ConsoleSink::stdout(),
                ConsoleTarget::Stderr => ConsoleSink::stderr(),
            }))
        });
        recipes.register("stderr", |_| Ok(Box::new(ConsoleSink::stderr())));
        #[cfg(feature = "file")]
        recipes.register("file", |params| {
            use crate::sinks::FileSink;

            let path: std::path::PathBuf = required(params, "path", "file")?;
            let sink = match params.get("buffer_size") {
                Some(size) => FileSink::with_capacity(path, serde_json::from_value(size.clone())?)?,
                None => FileSink::new(path)?,
            };
            Ok(Box::new(sink))
        });
        #[cfg(feature = "network")]
        recipes.register("tcp", |params| {
            let address: String = required(params, "address", "tcp")?;
            let mut sink = crate::sinks::NetworkSink::connect(address)?;
            if let Some(reconnect) = params.get("reconnect") {
                sink = sink.with_reconnect(serde_json::from_value(reconnect.clone())?);
            }
            if let Some(timeout) = params.get("write_timeout_ms") {
                let millis: u64 = serde_json::from_value(timeout.clone())?;
                sink = sink.with_write_timeout(Duration::from_millis(millis));
            }
            Ok(Box::new(sink))
        });
        recipes
    }

    /// Add or replace a recipe
    pub fn register<F>(&mut self, kind: impl Into<String>, recipe: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Sink>> + Send + Sync + 'static,
    {
        self.recipes.insert(kind.into(), Arc::new(recipe));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.recipes.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.recipes.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Run the recipe for `spec`, wrapping the result in a queue if asked
    pub fn build(&self, spec: &SinkSpec) -> Result<SharedSink> {
        let recipe = self.recipes.get(&spec.kind).ok_or_else(|| unknown_recipe(&spec.kind))?;
        let sink = recipe(&spec.params)?;
        match spec.queue {
            None => Ok(SharedSink::new(sink)),
            Some(ref queue) => {
                let queued = AsyncSink::builder(sink)
                    .capacity(queue.capacity)
                    .overflow_policy(queue.overflow_policy.clone())
                    .build()?;
                Ok(SharedSink::new(queued))
            }
        }
    }
}

impl Default for SinkRecipes {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SinkRecipes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkRecipes")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn unknown_recipe(kind: &str) -> LoggerError {
    LoggerError::config("sink", format!("no sink recipe named '{}'", kind))
}

fn required<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
    kind: &str,
) -> Result<T> {
    let value = params
        .get(key)
        .ok_or_else(|| LoggerError::config(kind, format!("missing parameter '{}'", key)))?;
    Ok(serde_json::from_value(value.clone())?)
}

/// Close a sink built for a failed `configure`, unless a live binding shares it
fn discard(sink: &SharedSink) {
    if sink.attachments() == 0 {
        let _ = sink.close();
    }
}

/// A binding spec that passed validation, waiting for its sink
struct Prepared<'a> {
    spec: &'a BindingSpec,
    name: Option<String>,
    formatter: Box<dyn Formatter>,
    filter: Option<Box<dyn Filter>>,
    min_level: Option<Level>,
}

impl Dispatcher {
    /// Apply `config`: custom levels, global minimum, then bindings in order
    ///
    /// Every spec is validated first. On error nothing is registered and any
    /// sink already built for this call is closed.
    pub fn configure(
        &self,
        config: &DispatchConfig,
        recipes: &SinkRecipes,
    ) -> Result<Vec<BindingHandle>> {
        // Resolve names against a scratch registry so validation changes nothing
        let scratch = LevelRegistry::new();
        for level in self.levels().levels().iter().filter(|l| !l.is_builtin()) {
            scratch.register(level.name(), level.rank())?;
        }
        for spec in &config.levels {
            scratch.register(&spec.name, spec.rank)?;
        }

        let min_level = config
            .min_level
            .as_deref()
            .map(|name| scratch.resolve(name))
            .transpose()
            .map_err(|e| LoggerError::config("min_level", e.to_string()))?;

        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(config.bindings.len());
        for (index, spec) in config.bindings.iter().enumerate() {
            let label = spec.name.clone().unwrap_or_else(|| format!("#{}", index));
            if let Some(ref name) = spec.name {
                if !seen.insert(name.as_str()) {
                    return Err(LoggerError::config(
                        "config",
                        format!("duplicate binding name '{}'", name),
                    ));
                }
            }
            prepared.push(prepare(spec, &scratch, recipes).map_err(|e| in_binding(&label, e))?);
        }

        let mut sinks = Vec::with_capacity(prepared.len());
        for item in &prepared {
            match recipes.build(&item.spec.sink) {
                Ok(sink) => sinks.push(sink),
                Err(e) => {
                    sinks.iter().for_each(discard);
                    let label = item.name.as_deref().unwrap_or(item.spec.sink.kind.as_str());
                    return Err(in_binding(label, e));
                }
            }
        }

        let previous_min = self.min_level();
        let mut added_levels = Vec::new();
        let mut handles = Vec::with_capacity(prepared.len());
        let mut pending = prepared.into_iter().zip(sinks);

        let committed = (|| -> Result<()> {
            for spec in &config.levels {
                let known = self.levels().get(&spec.name).is_some();
                self.register_level(&spec.name, spec.rank)?;
                if !known {
                    added_levels.push(spec.name.as_str());
                }
            }
            if let Some(level) = min_level {
                self.set_min_level(level);
            }
            for (item, sink) in pending.by_ref() {
                let mut builder = Binding::builder(sink.clone())
                    .boxed_formatter(item.formatter)
                    .boxed_filter(item.filter)
                    .maybe_min_level(item.min_level)
                    .enabled(item.spec.enabled);
                if let Some(name) = item.name {
                    builder = builder.name(name);
                }
                match self.register(builder.build()) {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        discard(&sink);
                        return Err(e);
                    }
                }
            }
            Ok(())
        })();

        if let Err(e) = committed {
            for handle in &handles {
                self.deregister(handle);
            }
            for (_, sink) in pending {
                discard(&sink);
            }
            for name in added_levels {
                let _ = self.levels().remove(name);
            }
            self.set_min_level(previous_min);
            return Err(e);
        }
        Ok(handles)
    }
}

fn in_binding(label: &str, error: LoggerError) -> LoggerError {
    match error {
        LoggerError::Configuration { .. } | LoggerError::DuplicateLevelName { .. } => error,
        other => LoggerError::config(format!("binding '{}'", label), other.to_string()),
    }
}

fn prepare<'a>(
    spec: &'a BindingSpec,
    levels: &LevelRegistry,
    recipes: &SinkRecipes,
) -> Result<Prepared<'a>> {
    if !recipes.contains(&spec.sink.kind) {
        return Err(unknown_recipe(&spec.sink.kind));
    }
    if let Some(ref queue) = spec.sink.queue {
        if queue.capacity == 0 {
            return Err(LoggerError::config("queue", "capacity must be at least 1"));
        }
    }
    if let Some(ref format) = spec.timestamp_format {
        format.validate()?;
    }

    Ok(Prepared {
        spec,
        name: spec.name.clone(),
        formatter: build_formatter(spec)?,
        filter: spec
            .filter
            .as_ref()
            .map(|filter| build_filter(filter, levels))
            .transpose()?,
        min_level: spec
            .min_level
            .as_deref()
            .map(|name| levels.resolve(name))
            .transpose()?,
    })
}

fn build_formatter(spec: &BindingSpec) -> Result<Box<dyn Formatter>> {
    let timestamp_format = spec.timestamp_format.clone().unwrap_or_default();
    let timezone = spec.timezone.unwrap_or_default();
    let error_policy = spec.error_policy.unwrap_or_default();

    if spec.template.is_some() && spec.format != FormatKind::Template {
        return Err(LoggerError::config(
            "formatter",
            "'template' only applies to the template format",
        ));
    }

    Ok(match spec.format {
        FormatKind::Template => {
            let formatter = match spec.template {
                Some(ref template) => TemplateFormatter::new(template.as_str())?,
                None => TemplateFormatter::default(),
            };
            Box::new(
                formatter
                    .with_timestamp_format(timestamp_format)
                    .with_timezone(timezone)
                    .with_error_policy(error_policy),
            )
        }
        FormatKind::Json => Box::new(
            JsonFormatter::new()
                .with_timestamp_format(timestamp_format)
                .with_timezone(timezone)
                .with_error_policy(error_policy),
        ),
        FormatKind::Logfmt => Box::new(
            LogfmtFormatter::new()
                .with_timestamp_format(timestamp_format)
                .with_timezone(timezone)
                .with_error_policy(error_policy),
        ),
    })
}

fn build_filter(spec: &FilterSpec, levels: &LevelRegistry) -> Result<Box<dyn Filter>> {
    Ok(match spec {
        FilterSpec::Level { min, max } => {
            let min = levels.resolve(min)?;
            match max {
                Some(max) => {
                    let max = levels.resolve(max)?;
                    if max < min {
                        return Err(LoggerError::config(
                            "filter",
                            format!("level range {}..{} is empty", min.name(), max.name()),
                        ));
                    }
                    Box::new(LevelFilter::between(min, max))
                }
                None => Box::new(LevelFilter::at_least(min)),
            }
        }
        FilterSpec::Logger { prefix, exclude } => {
            if *exclude {
                Box::new(LoggerNameFilter::exclude([prefix.as_str()]))
            } else {
                Box::new(LoggerNameFilter::include([prefix.as_str()]))
            }
        }
        FilterSpec::Context { key, equals } => match equals {
            Some(value) => Box::new(ContextFilter::equals(key.as_str(), value.clone())),
            None => Box::new(ContextFilter::has_key(key.as_str())),
        },
        FilterSpec::Sample { rate, always } => {
            if !(0.0..=1.0).contains(rate) {
                return Err(LoggerError::config(
                    "filter",
                    format!("sample rate {} is outside 0.0..=1.0", rate),
                ));
            }
            let filter = SamplingFilter::new(*rate);
            match always {
                Some(level) => Box::new(filter.with_always_sample(levels.resolve(level)?)),
                None => Box::new(filter.without_bypass()),
            }
        }
        FilterSpec::RateLimit { max, window_ms } => {
            if *window_ms == 0 {
                return Err(LoggerError::config("filter", "rate limit window must be positive"));
            }
            Box::new(RateLimitFilter::new(*max, Duration::from_millis(*window_ms)))
        }
        FilterSpec::All { filters } => Box::new(AllOf(
            filters
                .iter()
                .map(|f| build_filter(f, levels))
                .collect::<Result<Vec<_>>>()?,
        )),
        FilterSpec::Any { filters } => Box::new(AnyOf(
            filters
                .iter()
                .map(|f| build_filter(f, levels))
                .collect::<Result<Vec<_>>>()?,
        )),
        FilterSpec::Not { filter } => Box::new(Not(build_filter(filter, levels)?)),
    })
}
