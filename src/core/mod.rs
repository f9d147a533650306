//! Core dispatch types and traits

pub mod binding;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod error_channel;
pub mod error_payload;
pub mod filter;
pub mod formatter;
pub mod level;
pub mod logger;
pub mod message;
pub mod metrics;
pub mod overflow_policy;
pub mod record;
pub mod sampling;
pub mod sink;
pub mod timestamp;

pub use binding::{Binding, BindingBuilder, BindingHandle};
pub use context::{FieldValue, LogContext};
pub use dispatcher::{DispatchSummary, Dispatcher, DispatcherBuilder, ShutdownReport};
pub use error::{LoggerError, Result};
pub use error_channel::{DispatchError, DispatchStage, ErrorChannel, ErrorHook};
pub use error_payload::ErrorPayload;
pub use filter::{
    filter_fn, AllOf, And, AnyOf, ContextFilter, Filter, FilterExt, FnFilter, LevelFilter,
    LoggerNameFilter, Not, Or,
};
pub use formatter::{ErrorPolicy, Formatter, Rendered};
pub use level::{Level, LevelRegistry};
pub use logger::{Logger, RecordBuilder};
pub use message::Message;
pub use metrics::{DispatchMetrics, QueueMetrics};
pub use overflow_policy::{OverflowCallback, OverflowPolicy};
pub use record::{Location, Record};
pub use sampling::{RateLimitFilter, SamplerMetrics, SamplingFilter};
pub use sink::{SharedSink, Sink, Synchronization};
pub use timestamp::{TimestampFormat, Timezone};
