//! Timestamp rendering for formatters

use super::error::{LoggerError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How a record's wall-clock time is written
///
/// ```
/// use rust_log_dispatch::core::{TimestampFormat, Timezone};
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45).unwrap();
/// assert_eq!(TimestampFormat::Unix.render(&at, Timezone::Utc), "1736332245");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2025-01-08T10:30:45.123Z`
    #[default]
    Iso8601,

    /// `2025-01-08T10:30:45.123456Z`
    Iso8601Micros,

    /// `2025-01-08T10:30:45+00:00`
    Rfc3339,

    /// Seconds since the epoch
    Unix,

    UnixMillis,

    UnixMicros,

    /// Any strftime pattern, e.g. `%d/%b/%Y:%H:%M:%S %z`
    Custom(String),
}

const ISO_UTC: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.3fZ", "%Y-%m-%dT%H:%M:%S%.6fZ"];
const ISO_OFFSET: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.3f%:z", "%Y-%m-%dT%H:%M:%S%.6f%:z"];

/// Zone the timestamp is converted to before rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timezone {
    #[default]
    Utc,
    Local,
}

impl TimestampFormat {
    /// Render in UTC
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        self.render(datetime, Timezone::Utc)
    }

    /// Render in the given zone. Numeric formats ignore the zone.
    ///
    /// An invalid custom pattern renders as the pattern itself; use
    /// [`TimestampFormat::try_render`] to observe the failure.
    #[must_use]
    pub fn render(&self, datetime: &DateTime<Utc>, timezone: Timezone) -> String {
        self.try_render(datetime, timezone).unwrap_or_else(|_| match self {
            TimestampFormat::Custom(pattern) => pattern.clone(),
            _ => datetime.to_rfc3339(),
        })
    }

    pub fn try_render(&self, datetime: &DateTime<Utc>, timezone: Timezone) -> Result<String> {
        match self {
            TimestampFormat::Unix => return Ok(datetime.timestamp().to_string()),
            TimestampFormat::UnixMillis => return Ok(datetime.timestamp_millis().to_string()),
            TimestampFormat::UnixMicros => return Ok(datetime.timestamp_micros().to_string()),
            _ => {}
        }

        let rendered = match timezone {
            Timezone::Utc => self.render_textual(datetime, ISO_UTC),
            Timezone::Local => self.render_textual(&datetime.with_timezone(&Local), ISO_OFFSET),
        };
        rendered.ok_or_else(|| {
            LoggerError::format("timestamp", format!("cannot render pattern {:?}", self))
        })
    }

    fn render_textual<Tz>(&self, datetime: &DateTime<Tz>, iso: [&str; 2]) -> Option<String>
    where
        Tz: chrono::TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let pattern = match self {
            TimestampFormat::Iso8601 => iso[0],
            TimestampFormat::Iso8601Micros => iso[1],
            TimestampFormat::Rfc3339 => "%Y-%m-%dT%H:%M:%S%:z",
            TimestampFormat::Custom(pattern) => pattern.as_str(),
            TimestampFormat::Unix | TimestampFormat::UnixMillis | TimestampFormat::UnixMicros => {
                "%s"
            }
        };
        // DelayedFormat reports bad specifiers as fmt::Error; to_string() would panic
        let mut out = String::with_capacity(32);
        write!(out, "{}", datetime.format(pattern)).ok()?;
        Some(out)
    }

    /// Reject custom patterns chrono cannot render
    pub fn validate(&self) -> Result<()> {
        match self {
            TimestampFormat::Custom(pattern) => validate_strftime(pattern),
            _ => Ok(()),
        }
    }

    /// Numeric formats are emitted as JSON numbers
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TimestampFormat::Unix | TimestampFormat::UnixMillis | TimestampFormat::UnixMicros
        )
    }

    /// Typed JSON value for structured formatters
    pub fn to_json_value(&self, datetime: &DateTime<Utc>, timezone: Timezone) -> serde_json::Value {
        match self {
            TimestampFormat::Unix => datetime.timestamp().into(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().into(),
            TimestampFormat::UnixMicros => datetime.timestamp_micros().into(),
            _ => serde_json::Value::String(self.render(datetime, timezone)),
        }
    }
}

/// Check a strftime pattern without rendering it
pub fn validate_strftime(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(LoggerError::config(
            "timestamp",
            format!("invalid strftime pattern '{}'", pattern),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_datetime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    #[test]
    fn test_iso8601() {
        let at = fixed_datetime();
        assert_eq!(TimestampFormat::Iso8601.format(&at), "2025-01-08T10:30:45.123Z");
        assert_eq!(
            TimestampFormat::Iso8601Micros.format(&at),
            "2025-01-08T10:30:45.123456Z"
        );
    }

    #[test]
    fn test_rfc3339() {
        let rendered = TimestampFormat::Rfc3339.format(&fixed_datetime());
        assert_eq!(rendered, "2025-01-08T10:30:45+00:00");
    }

    #[test]
    fn test_numeric_formats() {
        let at = fixed_datetime();
        assert_eq!(TimestampFormat::Unix.format(&at), "1736332245");
        assert_eq!(TimestampFormat::UnixMillis.format(&at), "1736332245123");
        assert_eq!(TimestampFormat::UnixMicros.format(&at), "1736332245123456");
        assert_eq!(
            TimestampFormat::Unix.render(&at, Timezone::Local),
            TimestampFormat::Unix.render(&at, Timezone::Utc)
        );
    }

    #[test]
    fn test_custom_pattern() {
        let format = TimestampFormat::Custom("%d/%b/%Y:%H:%M:%S".to_string());
        assert_eq!(format.format(&fixed_datetime()), "08/Jan/2025:10:30:45");
    }

    #[test]
    fn test_invalid_custom_pattern() {
        let format = TimestampFormat::Custom("%Y-%".to_string());
        assert!(format.validate().is_err());
        assert!(format.try_render(&fixed_datetime(), Timezone::Utc).is_err());
        assert_eq!(format.format(&fixed_datetime()), "%Y-%");
        assert!(TimestampFormat::Custom("%Y-%m".to_string()).validate().is_ok());
    }

    #[test]
    fn test_local_zone_keeps_instant() {
        let at = fixed_datetime();
        let local = TimestampFormat::Rfc3339.render(&at, Timezone::Local);
        let parsed = DateTime::parse_from_rfc3339(&local).expect("rfc3339");
        assert_eq!(parsed.timestamp(), at.timestamp());
    }

    #[test]
    fn test_json_values() {
        let at = fixed_datetime();
        assert!(TimestampFormat::UnixMillis.is_numeric());
        assert_eq!(
            TimestampFormat::UnixMillis.to_json_value(&at, Timezone::Utc),
            serde_json::json!(1736332245123i64)
        );
        assert!(TimestampFormat::Iso8601
            .to_json_value(&at, Timezone::Utc)
            .is_string());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&TimestampFormat::UnixMillis).unwrap(),
            "\"unix_millis\""
        );
        let custom: TimestampFormat = serde_json::from_str(r#"{"custom":"%Y"}"#).unwrap();
        assert_eq!(custom, TimestampFormat::Custom("%Y".to_string()));
        let tz: Timezone = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(tz, Timezone::Local);
    }
}
