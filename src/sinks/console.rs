//! Standard output / standard error sink

use crate::core::error::{LoggerError, Result};
use crate::core::formatter::Rendered;
use crate::core::sink::{Sink, Synchronization};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Writes each record as one line.
///
/// The std handle lock is held for the whole line, so concurrent writers
/// never interleave inside a record.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    target: ConsoleTarget,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout() -> Self {
        Self {
            target: ConsoleTarget::Stdout,
        }
    }

    pub fn stderr() -> Self {
        Self {
            target: ConsoleTarget::Stderr,
        }
    }

    pub fn target(&self) -> ConsoleTarget {
        self.target
    }

    fn write_line(out: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
        let mut line = Vec::with_capacity(bytes.len() + 1);
        line.extend_from_slice(bytes);
        line.push(b'\n');
        out.write_all(&line)
    }
}

impl Sink for ConsoleSink {
    fn write(&self, output: &Rendered) -> Result<()> {
        let result = match self.target {
            ConsoleTarget::Stdout => Self::write_line(&mut io::stdout().lock(), output.as_bytes()),
            ConsoleTarget::Stderr => Self::write_line(&mut io::stderr().lock(), output.as_bytes()),
        };
        result.map_err(|e| LoggerError::sink_write(self.name(), e))
    }

    fn flush(&self) -> Result<()> {
        let result = match self.target {
            ConsoleTarget::Stdout => io::stdout().flush(),
            ConsoleTarget::Stderr => io::stderr().flush(),
        };
        result.map_err(|e| LoggerError::sink_flush(self.name(), e))
    }

    fn close(&self) -> Result<()> {
        // The process owns the std handles; closing only flushes
        self.flush()
    }

    fn name(&self) -> &str {
        match self.target {
            ConsoleTarget::Stdout => "stdout",
            ConsoleTarget::Stderr => "stderr",
        }
    }

    fn synchronization(&self) -> Synchronization {
        Synchronization::SelfSynchronizing
    }
}
