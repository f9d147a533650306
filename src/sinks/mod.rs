//! Bundled sinks

pub mod async_sink;
pub mod console;
#[cfg(feature = "file")]
pub mod file;
pub mod memory;
#[cfg(feature = "network")]
pub mod network;

pub use async_sink::{AsyncSink, AsyncSinkBuilder, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT};
pub use console::{ConsoleSink, ConsoleTarget};
#[cfg(feature = "file")]
pub use file::FileSink;
pub use memory::{MemoryMode, MemorySink, DEFAULT_MEMORY_CAPACITY};
#[cfg(feature = "network")]
pub use network::NetworkSink;
