//! Structured error values attached to records

use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;

/// An error captured at the call site: kind, message and cause chain.
///
/// Formatters render this uniformly instead of depending on concrete error
/// types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<ErrorPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
}

impl ErrorPayload {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
            backtrace: None,
        }
    }

    /// Capture an error and its `source()` chain.
    ///
    /// The outer kind is the Rust type name; causes are reached through
    /// `&dyn Error` and are labelled `"cause"`.
    pub fn from_error<E: StdError + ?Sized>(error: &E) -> Self {
        let mut payload = Self::new(short_type_name::<E>(), error.to_string());
        let mut source = error.source();
        while let Some(cause) = source {
            payload.causes.push(Self::new("cause", cause.to_string()));
            source = cause.source();
        }
        payload
    }

    /// Add a cause to the end of the chain
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorPayload) -> Self {
        self.causes.push(cause);
        self
    }

    /// Capture the current backtrace, honouring `RUST_BACKTRACE`
    #[must_use]
    pub fn with_backtrace(mut self) -> Self {
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            self.backtrace = Some(backtrace.to_string());
        }
        self
    }

    /// One line: `kind: message`
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }

    /// Multi-line rendering with the cause chain and the backtrace if present
    pub fn render_full(&self) -> String {
        let mut out = self.summary();
        for cause in &self.causes {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.summary());
        }
        if let Some(ref backtrace) = self.backtrace {
            out.push_str("\nbacktrace:\n");
            out.push_str(backtrace.trim_end());
        }
        out
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

fn short_type_name<E: ?Sized>() -> String {
    let full = std::any::type_name::<E>();
    if full.starts_with("dyn ") {
        return "Error".to_string();
    }
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head).to_string()
}
