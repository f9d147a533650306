//! Bounded in-memory sink for tests and diagnostics

use crate::core::error::{LoggerError, Result};
use crate::core::formatter::Rendered;
use crate::core::sink::{Sink, Synchronization};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// Each record is stored whole; safe under concurrent writes
    Lines,
    /// Records are appended to one byte stream in `chunk`-sized pieces, each
    /// under its own lock acquisition. Unsynchronized concurrent writers
    /// would interleave, so the sink asks the dispatcher to serialize it.
    FragmentedStream { chunk: usize },
}

#[derive(Debug, Default)]
struct Stream {
    bytes: Vec<u8>,
    lines: usize,
}

#[derive(Debug)]
struct MemoryInner {
    name: String,
    capacity: usize,
    mode: MemoryMode,
    lines: Mutex<VecDeque<String>>,
    stream: Mutex<Stream>,
    dropped: AtomicU64,
    flushes: AtomicU64,
    closed: AtomicBool,
}

/// Keeps the most recent `capacity` records in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a binding
/// and inspect the other. Every clone is the same sink instance to the
/// dispatcher: bindings built from different clones share one serialization
/// gate, and the buffer is closed only after the last of them is removed.
#[derive(Debug, Clone)]
pub struct MemorySink {
    inner: Arc<MemoryInner>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::build("memory".to_string(), DEFAULT_MEMORY_CAPACITY, MemoryMode::Lines)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::build("memory".to_string(), capacity.max(1), MemoryMode::Lines)
    }

    /// Stream mode with the given fragment size (at least one byte)
    pub fn fragmenting(chunk: usize) -> Self {
        Self::build(
            "memory".to_string(),
            DEFAULT_MEMORY_CAPACITY,
            MemoryMode::FragmentedStream {
                chunk: chunk.max(1),
            },
        )
    }

    fn build(name: String, capacity: usize, mode: MemoryMode) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name,
                capacity,
                mode,
                lines: Mutex::new(VecDeque::new()),
                stream: Mutex::new(Stream::default()),
                dropped: AtomicU64::new(0),
                flushes: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A fresh, empty sink with the same settings and a new name
    #[must_use = "builder methods return a new value"]
    pub fn named(self, name: impl Into<String>) -> Self {
        Self::build(name.into(), self.inner.capacity, self.inner.mode)
    }

    pub fn mode(&self) -> MemoryMode {
        self.inner.mode
    }

    /// Stored records, oldest first
    pub fn entries(&self) -> Vec<String> {
        match self.inner.mode {
            MemoryMode::Lines => self.inner.lines.lock().iter().cloned().collect(),
            MemoryMode::FragmentedStream { .. } => {
                let stream = self.inner.stream.lock();
                String::from_utf8_lossy(&stream.bytes)
                    .split_terminator('\n')
                    .map(str::to_string)
                    .collect()
            }
        }
    }

    /// Stored records joined with newlines
    pub fn contents(&self) -> String {
        self.entries().join("\n")
    }

    pub fn len(&self) -> usize {
        match self.inner.mode {
            MemoryMode::Lines => self.inner.lines.lock().len(),
            MemoryMode::FragmentedStream { .. } => self.inner.stream.lock().lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lines.lock().clear();
        *self.inner.stream.lock() = Stream::default();
    }

    /// Records evicted because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn push_line(&self, output: &Rendered) {
        let mut lines = self.inner.lines.lock();
        if lines.len() >= self.inner.capacity {
            lines.pop_front();
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        lines.push_back(output.to_text_lossy());
    }

    fn push_fragments(&self, output: &Rendered, chunk: usize) {
        for piece in output.as_bytes().chunks(chunk) {
            self.inner.stream.lock().bytes.extend_from_slice(piece);
            std::thread::yield_now();
        }

        let mut stream = self.inner.stream.lock();
        stream.bytes.push(b'\n');
        stream.lines += 1;
        if stream.lines > self.inner.capacity {
            if let Some(end) = stream.bytes.iter().position(|&b| b == b'\n') {
                stream.bytes.drain(..=end);
                stream.lines -= 1;
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MemorySink {
    fn write(&self, output: &Rendered) -> Result<()> {
        if self.is_closed() {
            return Err(LoggerError::SinkClosed(self.inner.name.clone()));
        }
        match self.inner.mode {
            MemoryMode::Lines => self.push_line(output),
            MemoryMode::FragmentedStream { chunk } => self.push_fragments(output, chunk),
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn synchronization(&self) -> Synchronization {
        match self.inner.mode {
            MemoryMode::Lines => Synchronization::SelfSynchronizing,
            MemoryMode::FragmentedStream { .. } => Synchronization::NeedsSerialization,
        }
    }

    fn instance_key(&self) -> Option<usize> {
        Some(Arc::as_ptr(&self.inner) as usize)
    }
}
