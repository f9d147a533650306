//! Queued sink with a background writer thread
//!
//! `AsyncSink` moves slow I/O off the dispatching thread. Outputs go into a
//! bounded channel; one worker thread drains it in batches into the wrapped
//! sink and flushes after every batch. When the queue is full the configured
//! [`OverflowPolicy`] decides what happens.
//!
//! Failures in the worker cannot be returned to anyone, so they are reported
//! through the error channel of the dispatcher the sink is bound to, or to
//! stderr before it is bound.

use crate::core::error::{LoggerError, Result};
use crate::core::error_channel::{DispatchError, DispatchStage, ErrorChannel};
use crate::core::formatter::Rendered;
use crate::core::metrics::QueueMetrics;
use crate::core::overflow_policy::{OverflowCallback, OverflowPolicy};
use crate::core::sink::{Sink, Synchronization};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default time `close` waits for the worker to drain the queue
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const BATCH_SIZE: usize = 50;

/// Alert on the first drop and then every this many drops
const ALERT_INTERVAL: u64 = 1000;

enum Command {
    Write(Rendered),
    Flush(Sender<Result<()>>),
}

struct Shared {
    inner: Box<dyn Sink>,
    name: String,
    metrics: QueueMetrics,
    errors: RwLock<Option<ErrorChannel>>,
}

impl Shared {
    fn report(&self, stage: DispatchStage, error: LoggerError) {
        let error = DispatchError::new(stage, error).with_sink(self.name.clone());
        let channel = self.errors.read().clone();
        match channel {
            Some(channel) => channel.report(&error),
            None => {
                let _ = writeln!(io::stderr().lock(), "[LOGGER ERROR] {}", error);
            }
        }
    }

    fn isolated(&self, op: impl FnOnce(&dyn Sink) -> Result<()>) -> Result<()> {
        catch_unwind(AssertUnwindSafe(|| op(self.inner.as_ref())))
            .unwrap_or_else(|payload| Err(LoggerError::panic(self.name.clone(), payload.as_ref())))
    }

    fn write(&self, output: &Rendered) {
        match self.isolated(|sink| sink.write(output)) {
            Ok(()) => {
                self.metrics.record_written();
            }
            Err(e) => {
                self.metrics.record_write_failure();
                self.report(DispatchStage::Write, e);
            }
        }
    }

    fn flush(&self) -> Result<()> {
        self.isolated(|sink| sink.flush())
    }
}

/// Wraps another sink behind a bounded queue and a worker thread
///
/// # Example
///
/// ```
/// use rust_log_dispatch::sinks::{AsyncSink, MemorySink};
/// use rust_log_dispatch::{OverflowPolicy, Rendered, Sink};
///
/// let memory = MemorySink::new();
/// let sink = AsyncSink::builder(memory.clone())
///     .capacity(256)
///     .overflow_policy(OverflowPolicy::Block)
///     .build()
///     .unwrap();
///
/// sink.write(&Rendered::from("queued")).unwrap();
/// sink.flush().unwrap();
/// assert_eq!(memory.entries(), vec!["queued"]);
/// ```
pub struct AsyncSink {
    shared: Arc<Shared>,
    sender: RwLock<Option<Sender<Command>>>,
    // Second receiver handle, used to evict under DropOldest
    receiver: Receiver<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
    shutdown_timeout: Duration,
}

impl AsyncSink {
    /// Wrap `inner` with the default capacity and policy
    pub fn new<S: Sink + 'static>(inner: S) -> Result<Self> {
        Self::builder(inner).build()
    }

    pub fn builder<S: Sink + 'static>(inner: S) -> AsyncSinkBuilder {
        AsyncSinkBuilder::new(Box::new(inner))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_policy(&self) -> &OverflowPolicy {
        &self.policy
    }

    /// Outputs waiting for the worker
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.shared.metrics
    }

    fn handle_overflow(&self, sender: &Sender<Command>, command: Command) -> Result<()> {
        self.shared.metrics.record_queue_full();

        match self.policy {
            OverflowPolicy::DropNewest => {
                self.shared.metrics.record_dropped();
                Ok(())
            }

            OverflowPolicy::DropOldest => {
                if let Ok(evicted) = self.receiver.try_recv() {
                    self.discard(evicted);
                }
                match sender.try_send(command) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => {
                        // Writers raced us for the freed slot
                        self.shared.metrics.record_dropped();
                        Ok(())
                    }
                    Err(TrySendError::Disconnected(_)) => Err(self.closed_error()),
                }
            }

            OverflowPolicy::Block => {
                self.shared.metrics.record_block();
                sender.send(command).map_err(|_| self.closed_error())
            }

            OverflowPolicy::BlockWithTimeout(timeout) => {
                self.shared.metrics.record_block();
                match sender.send_timeout(command, timeout) {
                    Ok(()) => Ok(()),
                    Err(SendTimeoutError::Timeout(_)) => self.alert_and_drop(sender),
                    Err(SendTimeoutError::Disconnected(_)) => Err(self.closed_error()),
                }
            }

            OverflowPolicy::AlertAndDrop => self.alert_and_drop(sender),
        }
    }

    fn discard(&self, evicted: Command) {
        match evicted {
            Command::Write(_) => {
                self.shared.metrics.record_dropped();
            }
            Command::Flush(ack) => {
                let _ = ack.send(Err(LoggerError::sink_flush(
                    self.shared.name.clone(),
                    "flush request evicted by queue overflow",
                )));
            }
        }
    }

    fn alert_and_drop(&self, sender: &Sender<Command>) -> Result<()> {
        let dropped = self.shared.metrics.record_dropped() + 1;
        if dropped == 1 || dropped % ALERT_INTERVAL == 0 {
            if let Some(ref callback) = self.on_overflow {
                callback(dropped);
            }
            return Err(LoggerError::queue_full(sender.len(), self.capacity));
        }
        Ok(())
    }

    fn closed_error(&self) -> LoggerError {
        LoggerError::SinkClosed(self.shared.name.clone())
    }

    fn join_worker(&self, handle: JoinHandle<()>) -> Result<()> {
        let start = Instant::now();
        loop {
            if handle.is_finished() {
                return handle
                    .join()
                    .map_err(|payload| LoggerError::panic("async sink worker", payload.as_ref()));
            }
            if start.elapsed() >= self.shutdown_timeout {
                return Err(LoggerError::sink_close(
                    self.shared.name.clone(),
                    format!(
                        "worker did not drain the queue within {:?}; queued output may be lost",
                        self.shutdown_timeout
                    ),
                ));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Sink for AsyncSink {
    fn write(&self, output: &Rendered) -> Result<()> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or_else(|| self.closed_error())?;

        match sender.try_send(Command::Write(output.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => self.handle_overflow(sender, command),
            Err(TrySendError::Disconnected(_)) => Err(self.closed_error()),
        }
    }

    /// Wait until everything queued before this call is written and flushed
    fn flush(&self) -> Result<()> {
        let (ack, done) = bounded(1);
        {
            let guard = self.sender.read();
            let sender = guard.as_ref().ok_or_else(|| self.closed_error())?;
            sender
                .send_timeout(Command::Flush(ack), self.shutdown_timeout)
                .map_err(|_| {
                    LoggerError::sink_flush(self.shared.name.clone(), "queue did not accept flush")
                })?;
        }

        done.recv_timeout(self.shutdown_timeout).unwrap_or_else(|_| {
            Err(LoggerError::sink_flush(
                self.shared.name.clone(),
                "timed out waiting for queued writes",
            ))
        })
    }

    /// Drain the queue, stop the worker and close the wrapped sink
    fn close(&self) -> Result<()> {
        // Dropping the only sender lets the worker drain and exit
        let Some(sender) = self.sender.write().take() else {
            return Ok(());
        };
        drop(sender);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.join_worker(handle)?;
        }
        self.shared.isolated(|sink| sink.close())
    }

    fn name(&self) -> &str {
        &self.shared.name
    }

    fn synchronization(&self) -> Synchronization {
        // Only the worker touches the wrapped sink
        Synchronization::SelfSynchronizing
    }

    fn attach_error_channel(&self, channel: &ErrorChannel) {
        *self.shared.errors.write() = Some(channel.clone());
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            let _ = writeln!(io::stderr().lock(), "[LOGGER WARNING] {}", e);
        }
    }
}

fn run_worker(shared: Arc<Shared>, receiver: Receiver<Command>) {
    let mut unflushed = false;

    // recv fails only once every sender is gone and the queue is empty
    while let Ok(first) = receiver.recv() {
        let mut next = Some(first);
        let mut taken = 0;
        while let Some(command) = next.take() {
            match command {
                Command::Write(output) => {
                    shared.write(&output);
                    unflushed = true;
                }
                Command::Flush(ack) => {
                    let result = shared.flush();
                    unflushed = false;
                    let _ = ack.send(result);
                }
            }
            taken += 1;
            if taken < BATCH_SIZE {
                next = receiver.try_recv().ok();
            }
        }

        // Flush after each batch to ensure timely writes
        if unflushed {
            if let Err(e) = shared.flush() {
                shared.report(DispatchStage::Flush, e);
            }
            unflushed = false;
        }
    }
}

/// Builder for [`AsyncSink`]
#[must_use = "builder methods return a new value"]
pub struct AsyncSinkBuilder {
    inner: Box<dyn Sink>,
    capacity: usize,
    policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback>,
    shutdown_timeout: Duration,
}

impl AsyncSinkBuilder {
    fn new(inner: Box<dyn Sink>) -> Self {
        Self {
            inner,
            capacity: DEFAULT_QUEUE_CAPACITY,
            policy: OverflowPolicy::default(),
            on_overflow: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Queue capacity (at least 1)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Called with the running drop count on the first drop and periodically after
    pub fn on_overflow<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.on_overflow = Some(Arc::new(callback));
        self
    }

    /// Upper bound for `flush` and `close` waits
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<AsyncSink> {
        let name = self.inner.name().to_string();
        let (sender, receiver) = bounded(self.capacity);
        let shared = Arc::new(Shared {
            inner: self.inner,
            name,
            metrics: QueueMetrics::new(),
            errors: RwLock::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_receiver = receiver.clone();
        let handle = thread::Builder::new()
            .name(format!("async-sink-{}", shared.name))
            .spawn(move || run_worker(worker_shared, worker_receiver))
            .map_err(|e| LoggerError::io_operation("spawning async sink worker", e))?;

        Ok(AsyncSink {
            shared,
            sender: RwLock::new(Some(sender)),
            receiver,
            worker: Mutex::new(Some(handle)),
            capacity: self.capacity,
            policy: self.policy,
            on_overflow: self.on_overflow,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}
