//! Buffered append-only file sink

use crate::core::error::{LoggerError, Result};
use crate::core::formatter::Rendered;
use crate::core::sink::{Sink, Synchronization};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Appends one line per record to a file.
///
/// Output is buffered; it reaches the file on `flush`, on `close`, when the
/// buffer fills, or when the sink is dropped.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(format!("creating {}", parent.display()), e)
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LoggerError::io_operation(format!("opening {}", path.display()), e))?;

        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::with_capacity(capacity, file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn write(&self, output: &Rendered) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| LoggerError::SinkClosed(self.name().to_string()))?;

        writer
            .write_all(output.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| LoggerError::sink_write(self.name(), e))
    }

    fn flush(&self) -> Result<()> {
        if let Some(ref mut writer) = *self.writer.lock() {
            writer
                .flush()
                .map_err(|e| LoggerError::sink_flush(self.name(), e))?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let Some(mut writer) = self.writer.lock().take() else {
            return Ok(());
        };
        writer
            .flush()
            .and_then(|_| writer.get_ref().sync_all())
            .map_err(|e| LoggerError::sink_close(self.name(), e))
    }

    fn name(&self) -> &str {
        "file"
    }

    fn synchronization(&self) -> Synchronization {
        Synchronization::SelfSynchronizing
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Ensure all buffered data is flushed to disk
        let _ = self.flush();
    }
}
