//! Lazily rendered log messages
//!
//! A [`Message`] captures the template and its arguments at the call site and
//! renders only when a formatter asks for the text. Records that are filtered
//! out never pay for string rendering.

use super::context::FieldValue;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Closure producing the message text on demand
pub type DeferredFn = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub enum Message {
    /// Text used as-is
    Literal(Cow<'static, str>),

    /// `{}` / `{0}` / `{name}` template with captured arguments
    Template {
        template: Cow<'static, str>,
        positional: Vec<FieldValue>,
        named: Vec<(String, FieldValue)>,
    },

    /// Arbitrary deferred computation
    Deferred(DeferredFn),
}

impl Message {
    pub fn literal(text: impl Into<Cow<'static, str>>) -> Self {
        Message::Literal(text.into())
    }

    pub fn template(template: impl Into<Cow<'static, str>>) -> Self {
        Message::Template {
            template: template.into(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Message::Deferred(Arc::new(f))
    }

    /// Append a positional argument. A literal message becomes a template.
    #[must_use]
    pub fn arg(self, value: impl Into<FieldValue>) -> Self {
        match self.into_template() {
            Message::Template {
                template,
                mut positional,
                named,
            } => {
                positional.push(value.into());
                Message::Template {
                    template,
                    positional,
                    named,
                }
            }
            other => other,
        }
    }

    /// Add a named argument. A literal message becomes a template.
    #[must_use]
    pub fn named(self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        match self.into_template() {
            Message::Template {
                template,
                positional,
                mut named,
            } => {
                named.push((key.into(), value.into()));
                Message::Template {
                    template,
                    positional,
                    named,
                }
            }
            other => other,
        }
    }

    fn into_template(self) -> Self {
        match self {
            Message::Literal(text) => Message::Template {
                template: text,
                positional: Vec::new(),
                named: Vec::new(),
            },
            other => other,
        }
    }

    /// Render the message text.
    ///
    /// The error string describes a template that references a missing
    /// argument or has unbalanced braces.
    pub fn render(&self) -> std::result::Result<String, String> {
        match self {
            Message::Literal(text) => Ok(text.to_string()),
            Message::Template {
                template,
                positional,
                named,
            } => render_template(template, positional, named),
            Message::Deferred(f) => Ok(f()),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Message::Template {
                template,
                positional,
                named,
            } => f
                .debug_struct("Template")
                .field("template", template)
                .field("positional", positional)
                .field("named", named)
                .finish(),
            Message::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&'static str> for Message {
    fn from(text: &'static str) -> Self {
        Message::Literal(Cow::Borrowed(text))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Literal(Cow::Owned(text))
    }
}

impl From<Cow<'static, str>> for Message {
    fn from(text: Cow<'static, str>) -> Self {
        Message::Literal(text)
    }
}

/// Expand `{}`, `{N}` and `{name}` placeholders; `{{` and `}}` are literal braces.
pub fn render_template(
    template: &str,
    positional: &[FieldValue],
    named: &[(String, FieldValue)],
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len() + 16 * positional.len());
    let mut chars = template.char_indices().peekable();
    let mut next_index = 0usize;

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
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
                    return Err(format!("unclosed '{{' at byte {}", pos));
                }

                let key = key.trim();
                let value = if key.is_empty() {
                    let value = positional
                        .get(next_index)
                        .ok_or_else(|| format!("missing positional argument {}", next_index))?;
                    next_index += 1;
                    value
                } else if let Ok(index) = key.parse::<usize>() {
                    positional
                        .get(index)
                        .ok_or_else(|| format!("missing positional argument {}", index))?
                } else {
                    named
                        .iter()
                        .rev()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v)
                        .ok_or_else(|| format!("missing named argument '{}'", key))?
                };
                out.push_str(&value.to_string());
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(format!("unmatched '}}' at byte {}", pos));
                }
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}
