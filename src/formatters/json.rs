//! One JSON object per record

use crate::core::error::Result;
use crate::core::formatter::{ErrorPolicy, Formatter, Rendered};
use crate::core::record::Record;
use crate::core::timestamp::{TimestampFormat, Timezone};
use serde_json::{Map, Value};

/// Machine-readable formatter for log aggregation pipelines.
///
/// Context fields are nested under `"context"` so they can never shadow the
/// record's own keys.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    timestamp_format: TimestampFormat,
    timezone: Timezone,
    error_policy: ErrorPolicy,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Multi-line indented output, mostly useful for debugging
    #[must_use = "builder methods return a new value"]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn to_value(&self, record: &Record) -> Result<Value> {
        let mut obj = Map::new();

        obj.insert(
            "timestamp".to_string(),
            self.timestamp_format
                .to_json_value(record.timestamp(), self.timezone),
        );
        obj.insert("level".to_string(), Value::String(record.level().name().to_string()));
        obj.insert("rank".to_string(), record.level().rank().into());
        obj.insert("logger".to_string(), Value::String(record.logger_name().to_string()));
        obj.insert("message".to_string(), Value::String(record.message()?.to_string()));
        obj.insert("thread_id".to_string(), Value::String(record.thread_id().to_string()));
        if let Some(name) = record.thread_name() {
            obj.insert("thread_name".to_string(), Value::String(name.to_string()));
        }
        obj.insert("pid".to_string(), record.process_id().into());

        if let Some(loc) = record.location() {
            obj.insert("file".to_string(), Value::String(loc.file.to_string()));
            obj.insert("line".to_string(), loc.line.into());
            obj.insert("module_path".to_string(), Value::String(loc.module_path.to_string()));
        }

        if !record.context().is_empty() {
            let context: Map<String, Value> = record
                .context()
                .fields()
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json_value()))
                .collect();
            obj.insert("context".to_string(), Value::Object(context));
        }

        if let Some(error) = record.error() {
            match self.error_policy {
                ErrorPolicy::Omit => {}
                ErrorPolicy::Summary => {
                    obj.insert("error".to_string(), Value::String(error.summary()));
                }
                ErrorPolicy::Full => {
                    obj.insert("error".to_string(), serde_json::to_value(error)?);
                }
            }
        }

        Ok(Value::Object(obj))
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record) -> Result<Rendered> {
        let value = self.to_value(record)?;
        let text = if self.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        Ok(Rendered::Text(text))
    }

    fn name(&self) -> &str {
        "json"
    }
}
