use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::DernError;

/// Byte stream backing a port.
pub trait PortStream: Read + Write + Seek {}

impl<T: Read + Write + Seek> PortStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
    InputOutput,
}

/// An octet stream with open/closed state. A port whose backing file could
/// not be opened stays in the not-open state instead of failing.
pub struct Port {
    name: String,
    kind: PortKind,
    stream: Option<Box<dyn PortStream>>,
    length: i64,
    position: u64,
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("length", &self.length)
            .finish()
    }
}

impl Port {
    pub fn open_file(path: &Path, kind: PortKind) -> Port {
        let name = path.display().to_string();
        let mut options = OpenOptions::new();
        match kind {
            PortKind::Input => options.read(true),
            PortKind::Output => options.append(true).create(true),
            PortKind::InputOutput => options.read(true).append(true).create(true),
        };
        match options.open(path) {
            Ok(file) => {
                let length = file.metadata().map(|m| m.len() as i64).unwrap_or(0);
                tracing::debug!(port = %name, length, "opened file port");
                Port {
                    name,
                    kind,
                    stream: Some(Box::new(file)),
                    length,
                    position: 0,
                }
            }
            Err(e) => {
                tracing::debug!(port = %name, error = %e, "file port failed to open");
                Port::not_open(name, kind)
            }
        }
    }

    /// Wrap an arbitrary stream, e.g. an in-memory cursor.
    pub fn from_stream(name: impl Into<String>, kind: PortKind, stream: Box<dyn PortStream>, length: i64) -> Port {
        Port {
            name: name.into(),
            kind,
            stream: Some(stream),
            length,
            position: 0,
        }
    }

    fn not_open(name: String, kind: PortKind) -> Port {
        Port {
            name,
            kind,
            stream: None,
            length: -1,
            position: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn supports_input(&self) -> bool {
        self.is_open() && matches!(self.kind, PortKind::Input | PortKind::InputOutput)
    }

    pub fn supports_output(&self) -> bool {
        self.is_open() && matches!(self.kind, PortKind::Output | PortKind::InputOutput)
    }

    /// Length in octets, or -1 when not open.
    pub fn length(&self) -> i64 {
        if self.is_open() {
            self.length
        } else {
            -1
        }
    }

    /// Current distance from the start, or -1 when not open.
    pub fn dist(&self) -> i64 {
        if self.is_open() {
            self.position as i64
        } else {
            -1
        }
    }

    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(mut s) => {
                let flushed = s.flush().is_ok();
                self.length = -1;
                flushed
            }
            None => false,
        }
    }

    pub fn read(&mut self, max: usize) -> Result<Vec<u8>, DernError> {
        if !self.supports_input() {
            return Err(DernError::io(format!(
                "Port '{}' does not support input.",
                self.name
            )));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = Vec::with_capacity(max);
        stream.take(max as u64).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        Ok(buf)
    }

    pub fn write(&mut self, octets: &[u8]) -> Result<usize, DernError> {
        if !self.supports_output() {
            return Err(DernError::io(format!(
                "Port '{}' does not support output.",
                self.name
            )));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        stream.write_all(octets)?;
        let end = stream.stream_position()?;
        self.position = end;
        self.length = self.length.max(end as i64);
        Ok(octets.len())
    }

    /// A negative `amount` seeks back from the end (-1 is the end itself)
    /// unless `from_current` is set.
    pub fn seek(&mut self, amount: i64, from_current: bool) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        let target = match (amount < 0, from_current) {
            (_, true) => SeekFrom::Current(amount),
            (true, false) => SeekFrom::End(amount + 1),
            (false, false) => SeekFrom::Start(amount as u64),
        };
        match stream.seek(target) {
            Ok(pos) => {
                self.position = pos;
                true
            }
            Err(_) => false,
        }
    }

    pub fn flush(&mut self) -> bool {
        match self.stream.as_mut() {
            Some(s) => s.flush().is_ok(),
            None => false,
        }
    }

    pub fn render(&self) -> String {
        let prefix = match (self.is_open(), self.kind) {
            (false, _) => "NOT-OPEN",
            (true, PortKind::Input) => "input",
            (true, PortKind::Output) => "output",
            (true, PortKind::InputOutput) => "input-output",
        };
        format!("<{prefix}-port:{} ({} octets)>", self.name, self.length())
    }
}
