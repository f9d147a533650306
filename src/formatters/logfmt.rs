//! `key=value` output understood by Loki, Heroku and friends

use crate::core::context::FieldValue;
use crate::core::error::Result;
use crate::core::formatter::{ErrorPolicy, Formatter, Rendered};
use crate::core::record::Record;
use crate::core::timestamp::{TimestampFormat, Timezone};

#[derive(Debug, Clone, Default)]
pub struct LogfmtFormatter {
    timestamp_format: TimestampFormat,
    timezone: Timezone,
    error_policy: ErrorPolicy,
}

impl LogfmtFormatter {
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
}

impl Formatter for LogfmtFormatter {
    fn format(&self, record: &Record) -> Result<Rendered> {
        let mut parts = Vec::with_capacity(8 + record.context().len());

        let timestamp = self
            .timestamp_format
            .try_render(record.timestamp(), self.timezone)?;
        parts.push(format!("ts={}", escape_value(&timestamp)));
        parts.push(format!("level={}", record.level().name()));
        parts.push(format!("logger={}", escape_value(record.logger_name())));
        // Message is always quoted
        parts.push(format!("msg={}", quote_value(record.message()?)));
        parts.push(format!("thread={}", escape_value(record.thread_label())));

        if let Some(loc) = record.location() {
            parts.push(format!("file={}", escape_value(loc.file)));
            parts.push(format!("line={}", loc.line));
        }

        for (key, value) in record.context().fields() {
            let rendered = match value {
                FieldValue::String(s) => quote_value(s),
                other => other.to_string(),
            };
            parts.push(format!("{}={}", escape_key(key), rendered));
        }

        if let Some(error) = record.error() {
            let text = match self.error_policy {
                ErrorPolicy::Omit => None,
                ErrorPolicy::Summary => Some(error.summary()),
                ErrorPolicy::Full => Some(error.render_full()),
            };
            if let Some(text) = text {
                parts.push(format!("error={}", quote_value(&text)));
            }
        }

        Ok(Rendered::Text(parts.join(" ")))
    }

    fn name(&self) -> &str {
        "logfmt"
    }
}

/// Keys keep only alphanumerics, `_`, `-` and `.`
fn escape_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect()
}

fn escape_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '"', '=', '\n']) {
        quote_value(value)
    } else {
        value.to_string()
    }
}

fn quote_value(value: &str) -> String {
    format!(
        "\"{}\"",
        value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    )
}
