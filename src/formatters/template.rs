//! Placeholder-template text formatter
//!
//! The template is parsed once when the formatter is built:
//!
//! | Placeholder | Output |
//! |---|---|
//! | `{timestamp}` / `{timestamp:%H:%M}` | wall-clock time, configured format or strftime |
//! | `{level}` | level name |
//! | `{logger}` | logger name |
//! | `{message}` | rendered message |
//! | `{thread}` / `{thread_id}` | thread name (or id) / thread id |
//! | `{pid}` | process id |
//! | `{file}` `{line}` `{module}` | call-site location |
//! | `{location}` / `{location:bare}` / `{location:module}` | `file:line`, `basename:line`, `module:line` |
//! | `{uptime}` | seconds since process start |
//! | `{context}` | all context fields as `k=v` |
//! | `{ctx:KEY}` | a single context value |
//!
//! `{{` and `}}` produce literal braces.

use crate::core::error::{LoggerError, Result};
use crate::core::formatter::{ErrorPolicy, Formatter, Rendered};
use crate::core::record::Record;
use crate::core::timestamp::{validate_strftime, TimestampFormat, Timezone};
use std::fmt::Write;

pub const DEFAULT_TEMPLATE: &str = "[{timestamp}] [{level}] {logger} - {message}";

const UNKNOWN: &str = "?";

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocationStyle {
    Path,
    Bare,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Timestamp(Option<TimestampFormat>),
    Level,
    Logger,
    Message,
    Thread,
    ThreadId,
    Pid,
    File,
    Line,
    Module,
    Location(LocationStyle),
    Uptime,
    Context,
    Ctx(String),
}

/// Text formatter driven by a placeholder template
#[derive(Debug, Clone)]
pub struct TemplateFormatter {
    template: String,
    segments: Vec<Segment>,
    timestamp_format: TimestampFormat,
    timezone: Timezone,
    lowercase_level: bool,
    colorize: bool,
    error_policy: ErrorPolicy,
}

impl TemplateFormatter {
    /// Parse `template`; unknown placeholders and unbalanced braces are
    /// configuration errors.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let segments = parse(&template)?;
        Ok(Self {
            template,
            segments,
            timestamp_format: TimestampFormat::default(),
            timezone: Timezone::default(),
            lowercase_level: false,
            colorize: false,
            error_policy: ErrorPolicy::default(),
        })
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
    pub fn with_lowercase_level(mut self, lowercase: bool) -> Self {
        self.lowercase_level = lowercase;
        self
    }

    /// Wrap built-in level names in ANSI colours (feature `console`)
    #[must_use = "builder methods return a new value"]
    pub fn with_color(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn push_level(&self, out: &mut String, record: &Record) {
        let level = record.level();
        let name = if self.lowercase_level {
            level.name().to_ascii_lowercase()
        } else {
            level.name().to_string()
        };

        #[cfg(feature = "console")]
        if self.colorize {
            if let Some(color) = level.color_code() {
                use colored::Colorize;
                out.push_str(&name.color(color).to_string());
                return;
            }
        }

        out.push_str(&name);
    }
}

impl Default for TemplateFormatter {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            segments: vec![
                Segment::Literal("[".to_string()),
                Segment::Timestamp(None),
                Segment::Literal("] [".to_string()),
                Segment::Level,
                Segment::Literal("] ".to_string()),
                Segment::Logger,
                Segment::Literal(" - ".to_string()),
                Segment::Message,
            ],
            timestamp_format: TimestampFormat::default(),
            timezone: Timezone::default(),
            lowercase_level: false,
            colorize: false,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl Formatter for TemplateFormatter {
    fn format(&self, record: &Record) -> Result<Rendered> {
        let mut out = String::with_capacity(self.template.len() + 64);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Timestamp(None) => out.push_str(
                    &self
                        .timestamp_format
                        .try_render(record.timestamp(), self.timezone)?,
                ),
                Segment::Timestamp(Some(format)) => {
                    out.push_str(&format.try_render(record.timestamp(), self.timezone)?)
                }
                Segment::Level => self.push_level(&mut out, record),
                Segment::Logger => out.push_str(record.logger_name()),
                Segment::Message => out.push_str(record.message()?),
                Segment::Thread => out.push_str(record.thread_label()),
                Segment::ThreadId => out.push_str(record.thread_id()),
                Segment::Pid => {
                    let _ = write!(out, "{}", record.process_id());
                }
                Segment::File => {
                    out.push_str(record.location().map_or(UNKNOWN, |loc| loc.file));
                }
                Segment::Line => match record.location() {
                    Some(loc) => {
                        let _ = write!(out, "{}", loc.line);
                    }
                    None => out.push_str(UNKNOWN),
                },
                Segment::Module => {
                    out.push_str(record.location().map_or(UNKNOWN, |loc| loc.module_path));
                }
                Segment::Location(style) => match record.location() {
                    Some(loc) => {
                        let origin = match style {
                            LocationStyle::Path => loc.file,
                            LocationStyle::Bare => basename(loc.file),
                            LocationStyle::Module => loc.module_path,
                        };
                        let _ = write!(out, "{}:{}", origin, loc.line);
                    }
                    None => out.push_str(UNKNOWN),
                },
                Segment::Uptime => {
                    let _ = write!(out, "{:.3}", record.uptime().as_secs_f64());
                }
                Segment::Context => out.push_str(&record.context().format_fields()),
                Segment::Ctx(key) => match record.context().get(key) {
                    Some(value) => {
                        let _ = write!(out, "{}", value);
                    }
                    None => {
                        return Err(LoggerError::format(
                            "template",
                            format!("context key '{}' is not set", key),
                        ))
                    }
                },
            }
        }

        if let Some(error) = record.error() {
            match self.error_policy {
                ErrorPolicy::Omit => {}
                ErrorPolicy::Summary => {
                    out.push('\n');
                    out.push_str(&error.summary());
                }
                ErrorPolicy::Full => {
                    out.push('\n');
                    out.push_str(&error.render_full());
                }
            }
        }

        Ok(Rendered::Text(out))
    }

    fn name(&self) -> &str {
        "template"
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(LoggerError::config(
                        "template",
                        format!("unclosed placeholder starting at byte {}", pos),
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(placeholder(&key)?);
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(LoggerError::config(
                    "template",
                    format!("unmatched '}}' at byte {}", pos),
                ))
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn placeholder(key: &str) -> Result<Segment> {
    let (name, arg) = match key.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (key, None),
    };

    let segment = match (name, arg) {
        ("timestamp" | "time", None) => Segment::Timestamp(None),
        ("timestamp" | "time", Some(pattern)) => {
            validate_strftime(pattern)?;
            Segment::Timestamp(Some(TimestampFormat::Custom(pattern.to_string())))
        }
        ("level" | "lvl", None) => Segment::Level,
        ("logger" | "name", None) => Segment::Logger,
        ("message" | "msg", None) => Segment::Message,
        ("thread", None) => Segment::Thread,
        ("thread_id", None) => Segment::ThreadId,
        ("pid", None) => Segment::Pid,
        ("file", None) => Segment::File,
        ("line", None) => Segment::Line,
        ("module", None) => Segment::Module,
        ("location", None | Some("path")) => Segment::Location(LocationStyle::Path),
        ("location", Some("bare")) => Segment::Location(LocationStyle::Bare),
        ("location", Some("module")) => Segment::Location(LocationStyle::Module),
        ("uptime", None) => Segment::Uptime,
        ("context", None) => Segment::Context,
        ("ctx", Some(field)) if !field.is_empty() => Segment::Ctx(field.to_string()),
        _ => {
            return Err(LoggerError::config(
                "template",
                format!("unknown placeholder '{{{}}}'", key),
            ))
        }
    };
    Ok(segment)
}
