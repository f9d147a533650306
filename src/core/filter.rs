//! Record filters and their combinators

use super::context::FieldValue;
use super::error::Result;
use super::level::Level;
use super::record::Record;

/// Predicate deciding whether a binding processes a record.
///
/// Filters are called concurrently from every thread that logs. Stateful
/// filters must synchronize internally. Returning `Err` skips the binding for
/// this record and reports the error; it never reaches the log call site.
pub trait Filter: Send + Sync {
    fn evaluate(&self, record: &Record) -> Result<bool>;

    fn name(&self) -> &str {
        "filter"
    }
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        (**self).evaluate(record)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Composition operators available on every filter
pub trait FilterExt: Filter + Sized {
    fn and<F: Filter>(self, other: F) -> And<Self, F> {
        And(self, other)
    }

    fn or<F: Filter>(self, other: F) -> Or<Self, F> {
        Or(self, other)
    }

    fn not(self) -> Not<Self> {
        Not(self)
    }

    fn boxed(self) -> Box<dyn Filter>
    where
        Self: 'static,
    {
        Box::new(self)
    }
}

impl<T: Filter> FilterExt for T {}

/// Accepts when both filters accept; the right side is skipped when the left rejects
pub struct And<A, B>(pub A, pub B);

impl<A: Filter, B: Filter> Filter for And<A, B> {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        Ok(self.0.evaluate(record)? && self.1.evaluate(record)?)
    }

    fn name(&self) -> &str {
        "and"
    }
}

/// Accepts when either filter accepts; the right side is skipped when the left accepts
pub struct Or<A, B>(pub A, pub B);

impl<A: Filter, B: Filter> Filter for Or<A, B> {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        Ok(self.0.evaluate(record)? || self.1.evaluate(record)?)
    }

    fn name(&self) -> &str {
        "or"
    }
}

pub struct Not<A>(pub A);

impl<A: Filter> Filter for Not<A> {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        Ok(!self.0.evaluate(record)?)
    }

    fn name(&self) -> &str {
        "not"
    }
}

/// Accepts every record of all the inner filters (empty list accepts all)
pub struct AllOf(pub Vec<Box<dyn Filter>>);

impl Filter for AllOf {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        for filter in &self.0 {
            if !filter.evaluate(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn name(&self) -> &str {
        "all"
    }
}

/// Accepts when any inner filter accepts (empty list rejects all)
pub struct AnyOf(pub Vec<Box<dyn Filter>>);

impl Filter for AnyOf {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        for filter in &self.0 {
            if filter.evaluate(record)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn name(&self) -> &str {
        "any"
    }
}

/// Level band filter: `min <= level` and optionally `level <= max`
#[derive(Debug, Clone, Copy)]
pub struct LevelFilter {
    min: Level,
    max: Option<Level>,
}

impl LevelFilter {
    pub fn at_least(min: Level) -> Self {
        Self { min, max: None }
    }

    pub fn between(min: Level, max: Level) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }
}

impl Filter for LevelFilter {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        let level = record.level();
        Ok(level >= self.min && self.max.map_or(true, |max| level <= max))
    }

    fn name(&self) -> &str {
        "level"
    }
}

/// Whether `name` equals `prefix` or is a dotted descendant of it
pub fn is_within(name: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || name == prefix
        || (name.len() > prefix.len()
            && name.starts_with(prefix)
            && name.as_bytes()[prefix.len()] == b'.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Include,
    Exclude,
}

/// Selects records by hierarchical logger name (`app.db` covers `app.db.pool`)
#[derive(Debug, Clone)]
pub struct LoggerNameFilter {
    prefixes: Vec<String>,
    mode: NameMatch,
}

impl LoggerNameFilter {
    pub fn include<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            mode: NameMatch::Include,
        }
    }

    pub fn exclude<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            mode: NameMatch::Exclude,
        }
    }
}

impl Filter for LoggerNameFilter {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        let name = record.logger_name();
        let matched = self.prefixes.iter().any(|p| is_within(name, p));
        Ok(match self.mode {
            NameMatch::Include => matched,
            NameMatch::Exclude => !matched,
        })
    }

    fn name(&self) -> &str {
        "logger_name"
    }
}

/// Matches on a context key, optionally requiring a specific value
#[derive(Debug, Clone)]
pub struct ContextFilter {
    key: String,
    expected: Option<FieldValue>,
}

impl ContextFilter {
    pub fn has_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            expected: None,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            expected: Some(value.into()),
        }
    }
}

impl Filter for ContextFilter {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        Ok(match (record.context().get(&self.key), &self.expected) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        })
    }

    fn name(&self) -> &str {
        "context"
    }
}

/// Closure-backed filter
pub struct FnFilter<F> {
    f: F,
    name: String,
}

impl<F> FnFilter<F>
where
    F: Fn(&Record) -> Result<bool> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            f,
            name: name.into(),
        }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Record) -> Result<bool> + Send + Sync,
{
    fn evaluate(&self, record: &Record) -> Result<bool> {
        (self.f)(record)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shorthand for an infallible closure filter
pub fn filter_fn<F>(f: F) -> FnFilter<impl Fn(&Record) -> Result<bool> + Send + Sync>
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    FnFilter::new("fn", move |record: &Record| Ok(f(record)))
}
