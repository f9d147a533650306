//! What a queued sink does when its queue is full

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Policy for handling a full [`AsyncSink`](crate::sinks::AsyncSink) queue
///
/// # Example
///
/// ```
/// use rust_log_dispatch::OverflowPolicy;
/// use std::time::Duration;
///
/// // Default behavior: alert and drop
/// let policy = OverflowPolicy::default();
///
/// // Block with timeout
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(100));
///
/// let parsed: OverflowPolicy =
///     serde_json::from_str(r#"{"block_with_timeout": 250}"#).unwrap();
/// assert_eq!(parsed, OverflowPolicy::BlockWithTimeout(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the output being written; only metrics record the loss
    DropNewest,

    /// Evict the oldest queued output to make room
    DropOldest,

    /// Wait until space is available
    ///
    /// Backpressure reaches the logging thread. Only use when losing output
    /// is worse than stalling the caller.
    Block,

    /// Wait up to the timeout (milliseconds in config), then alert and drop
    BlockWithTimeout(#[serde(with = "millis")] Duration),

    /// Drop, and alert through the overflow callback and the error channel
    #[default]
    AlertAndDrop,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "DropNewest"),
            OverflowPolicy::DropOldest => write!(f, "DropOldest"),
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
            OverflowPolicy::AlertAndDrop => write!(f, "AlertAndDrop"),
        }
    }
}

/// Called when output is dropped due to queue overflow.
/// The parameter is the total count of dropped outputs so far.
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
