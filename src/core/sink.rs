//! Sink contract and the engine-side shared handle

use super::error::{LoggerError, Result};
use super::error_channel::ErrorChannel;
use super::formatter::Rendered;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Whether a sink tolerates concurrent calls on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synchronization {
    /// Concurrent `write` calls are safe and each write lands atomically
    SelfSynchronizing,
    /// The dispatcher must serialize every call into this sink
    NeedsSerialization,
}

/// Destination for rendered output.
///
/// Writes to one sink are applied in the order the dispatcher attempts them.
/// `close` must flush buffered output and be safe to call more than once.
pub trait Sink: Send + Sync {
    fn write(&self, output: &Rendered) -> Result<()>;

    fn flush(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn name(&self) -> &str;

    /// Declared up front so the dispatcher never has to guess
    fn synchronization(&self) -> Synchronization;

    /// Called when the sink is bound to a dispatcher. Sinks that fail away
    /// from the caller's thread keep the channel to report through it.
    fn attach_error_channel(&self, _channel: &ErrorChannel) {}

    /// Identity of the state behind this value. Sinks whose clones write to
    /// the same destination return the same key from every clone, so all
    /// bindings over that destination share one gate and one attachment
    /// count. `None` means every value is its own instance.
    fn instance_key(&self) -> Option<usize> {
        None
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn write(&self, output: &Rendered) -> Result<()> {
        (**self).write(output)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn synchronization(&self) -> Synchronization {
        (**self).synchronization()
    }

    fn attach_error_channel(&self, channel: &ErrorChannel) {
        (**self).attach_error_channel(channel)
    }

    fn instance_key(&self) -> Option<usize> {
        (**self)
            .instance_key()
            .or(Some(Arc::as_ptr(self) as *const () as usize))
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&self, output: &Rendered) -> Result<()> {
        (**self).write(output)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn synchronization(&self) -> Synchronization {
        (**self).synchronization()
    }

    fn attach_error_channel(&self, channel: &ErrorChannel) {
        (**self).attach_error_channel(channel)
    }

    fn instance_key(&self) -> Option<usize> {
        (**self).instance_key()
    }
}

// Live cells by instance key. Entries are weak so a cell dies with its last
// handle; a dead entry is replaced on the next lookup.
static INSTANCES: OnceLock<Mutex<HashMap<usize, Weak<SinkCell>>>> = OnceLock::new();

struct SinkCell {
    sink: Box<dyn Sink>,
    name: String,
    // Present only for NeedsSerialization sinks; shared by every binding
    gate: Option<Mutex<()>>,
    closed: AtomicBool,
    attachments: AtomicUsize,
}

impl SinkCell {
    fn new(sink: Box<dyn Sink>) -> Self {
        let gate = match sink.synchronization() {
            Synchronization::SelfSynchronizing => None,
            Synchronization::NeedsSerialization => Some(Mutex::new(())),
        };
        Self {
            name: sink.name().to_string(),
            sink,
            gate,
            closed: AtomicBool::new(false),
            attachments: AtomicUsize::new(0),
        }
    }
}

/// Cloneable handle to one sink instance.
///
/// Several bindings may hold clones of the same handle. The handle carries
/// the serialization gate, the closed flag and the count of bindings that
/// currently use the sink, so the sink is closed exactly once, after the last
/// binding lets go of it.
///
/// Wrapping two values that report the same [`Sink::instance_key`] (two
/// clones of a `MemorySink`, two clones of one `Arc`) yields the same handle.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<SinkCell>,
}

impl SharedSink {
    pub fn new<S: Sink + 'static>(sink: S) -> Self {
        let Some(key) = sink.instance_key() else {
            return Self {
                inner: Arc::new(SinkCell::new(Box::new(sink))),
            };
        };

        let mut instances = INSTANCES.get_or_init(Default::default).lock();
        if let Some(inner) = instances.get(&key).and_then(Weak::upgrade) {
            drop(instances);
            return Self { inner };
        }
        instances.retain(|_, cell| cell.strong_count() > 0);
        let inner = Arc::new(SinkCell::new(Box::new(sink)));
        instances.insert(key, Arc::downgrade(&inner));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn synchronization(&self) -> Synchronization {
        if self.inner.gate.is_some() {
            Synchronization::NeedsSerialization
        } else {
            Synchronization::SelfSynchronizing
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of bindings currently attached
    pub fn attachments(&self) -> usize {
        self.inner.attachments.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same sink instance
    pub fn ptr_eq(&self, other: &SharedSink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn write(&self, output: &Rendered) -> Result<()> {
        self.serialized(|sink| sink.write(output))
    }

    pub fn flush(&self) -> Result<()> {
        self.serialized(|sink| sink.flush())
    }

    /// Close the sink. Only the first call reaches the sink.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _guard = self.inner.gate.as_ref().map(|gate| gate.lock());
        self.inner.sink.close()
    }

    fn serialized<T>(&self, op: impl FnOnce(&dyn Sink) -> Result<T>) -> Result<T> {
        if self.is_closed() {
            return Err(LoggerError::SinkClosed(self.inner.name.clone()));
        }
        match self.inner.gate {
            Some(ref gate) => {
                let _guard = gate.lock();
                // Re-check under the gate so a concurrent close wins cleanly
                if self.is_closed() {
                    return Err(LoggerError::SinkClosed(self.inner.name.clone()));
                }
                op(self.inner.sink.as_ref())
            }
            None => op(self.inner.sink.as_ref()),
        }
    }

    pub(crate) fn attach(&self, channel: &ErrorChannel) {
        if self.inner.attachments.fetch_add(1, Ordering::AcqRel) == 0 {
            self.inner.sink.attach_error_channel(channel);
        }
    }

    /// Returns true when this was the last attached binding
    pub(crate) fn detach(&self) -> bool {
        self.inner
            .attachments
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous == 1)
            .unwrap_or(false)
    }
}

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSink")
            .field("name", &self.inner.name)
            .field("synchronization", &self.synchronization())
            .field("closed", &self.is_closed())
            .field("attachments", &self.attachments())
            .finish()
    }
}

impl<S: Sink + 'static> From<S> for SharedSink {
    fn from(sink: S) -> Self {
        SharedSink::new(sink)
    }
}
