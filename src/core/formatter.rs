//! Formatter contract and its output type

use super::error::Result;
use super::record::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output produced for one record by one binding.
///
/// Text output carries no trailing newline; line-oriented sinks add their own
/// terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Binary(Vec<u8>),
}

impl Rendered {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Rendered::Text(text) => text.as_bytes(),
            Rendered::Binary(bytes) => bytes,
        }
    }

    /// The text, if this is textual output
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Rendered::Text(text) => Some(text),
            Rendered::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Rendered::Text(text) => text.into_bytes(),
            Rendered::Binary(bytes) => bytes,
        }
    }

    /// Lossy text view used for diagnostics and in-memory capture
    pub fn to_text_lossy(&self) -> String {
        match self {
            Rendered::Text(text) => text.clone(),
            Rendered::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<String> for Rendered {
    fn from(text: String) -> Self {
        Rendered::Text(text)
    }
}

impl From<&str> for Rendered {
    fn from(text: &str) -> Self {
        Rendered::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Rendered {
    fn from(bytes: Vec<u8>) -> Self {
        Rendered::Binary(bytes)
    }
}

/// Turns a record into output bytes.
///
/// Implementations must be deterministic for the same record and options and
/// must not perform I/O. They are shared across threads.
pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record) -> Result<Rendered>;

    fn name(&self) -> &str {
        "formatter"
    }
}

impl<F: Formatter + ?Sized> Formatter for Box<F> {
    fn format(&self, record: &Record) -> Result<Rendered> {
        (**self).format(record)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<F: Formatter + ?Sized> Formatter for Arc<F> {
    fn format(&self, record: &Record) -> Result<Rendered> {
        (**self).format(record)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// How an attached error payload is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Leave the payload out
    Omit,
    /// `kind: message` on one line
    #[default]
    Summary,
    /// Cause chain and backtrace if one was captured
    Full,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_views() {
        let text = Rendered::from("INFO ready");
        assert_eq!(text.as_str(), Some("INFO ready"));
        assert_eq!(text.as_bytes(), b"INFO ready");
        assert_eq!(text.len(), 10);

        let binary = Rendered::from(vec![0xff, b'a']);
        assert!(binary.as_str().is_none());
        assert_eq!(binary.to_text_lossy(), "\u{fffd}a");
        assert_eq!(binary.into_bytes(), vec![0xff, b'a']);
    }

    #[test]
    fn test_error_policy_serde() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Summary);
        let policy: ErrorPolicy = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(policy, ErrorPolicy::Full);
    }
}
