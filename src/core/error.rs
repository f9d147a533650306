//! Error types for the dispatch engine

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Invalid configuration with details
    #[error("Invalid configuration for {component}: {message}")]
    Configuration { component: String, message: String },

    /// A level name was registered twice with different ranks
    #[error("Level '{name}' is already registered with rank {existing_rank} (requested {requested_rank})")]
    DuplicateLevelName {
        name: String,
        existing_rank: u32,
        requested_rank: u32,
    },

    /// A level name could not be resolved
    #[error("Level '{0}' does not exist")]
    UnknownLevel(String),

    /// Filter evaluation failed
    #[error("Filter error ({filter}): {message}")]
    Filter { filter: String, message: String },

    /// Formatter error with format type
    #[error("Formatter error ({format_type}): {message}")]
    Format {
        format_type: String,
        message: String,
    },

    /// Sink rejected a write
    #[error("Sink '{sink}' write failed: {message}")]
    SinkWrite { sink: String, message: String },

    /// Sink failed to flush buffered output
    #[error("Sink '{sink}' flush failed: {message}")]
    SinkFlush { sink: String, message: String },

    /// Sink failed to release its resource
    #[error("Sink '{sink}' close failed: {message}")]
    SinkClose { sink: String, message: String },

    /// Sink was already closed
    #[error("Sink '{0}' is closed")]
    SinkClosed(String),

    /// Queue full with buffer details
    #[error("Sink queue full: {current}/{max} entries buffered")]
    QueueFull { current: usize, max: usize },

    /// Channel send error
    #[error("Failed to send rendered output to sink worker")]
    ChannelSend,

    /// IO error with context
    #[error("IO error while {operation}: {source}")]
    IoOperation {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A filter, formatter, sink or hook panicked
    #[error("{component} panicked: {message}")]
    Panic { component: String, message: String },
}

impl LoggerError {
    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a filter error
    pub fn filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Filter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Create a formatter error
    pub fn format(format_type: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Format {
            format_type: format_type.into(),
            message: message.into(),
        }
    }

    pub fn sink_write(sink: impl Into<String>, message: impl ToString) -> Self {
        LoggerError::SinkWrite {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    pub fn sink_flush(sink: impl Into<String>, message: impl ToString) -> Self {
        LoggerError::SinkFlush {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    pub fn sink_close(sink: impl Into<String>, message: impl ToString) -> Self {
        LoggerError::SinkClose {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    /// Create an IO operation error with context
    pub fn io_operation(operation: impl Into<String>, source: std::io::Error) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            source,
        }
    }

    /// Create a queue full error with buffer details
    pub fn queue_full(current: usize, max: usize) -> Self {
        LoggerError::QueueFull { current, max }
    }

    /// Build a panic error from a `catch_unwind` payload
    pub fn panic(component: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        LoggerError::Panic {
            component: component.into(),
            message,
        }
    }

    /// Whether this error belongs to the registration-time class
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LoggerError::Configuration { .. }
                | LoggerError::DuplicateLevelName { .. }
                | LoggerError::UnknownLevel(_)
        )
    }
}
