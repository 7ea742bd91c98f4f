//! DAP protocol framing IO.
//! - read_message: parse Content-Length payload
//! - write_message: emit payload
//! - ProtocolWriter: shared output shared by the loop and background threads
//! - write_protocol_log: optional transcript logging

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::protocol::{Event, MessageType, OutputEventBody};

const CONTENT_LENGTH: &str = "Content-Length";

pub(super) fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut content_length = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let length = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    let payload = String::from_utf8(buffer)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid utf-8 payload"))?;
    Ok(Some(payload))
}

pub(super) fn write_message<W: Write + ?Sized>(writer: &mut W, payload: &str) -> io::Result<()> {
    let length = payload.len();
    write!(writer, "Content-Length: {length}\r\n\r\n")?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()
}

pub(super) type ProtocolLog = Arc<Mutex<BufWriter<File>>>;

pub(super) fn open_protocol_log(path: &str) -> Option<ProtocolLog> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
        .map(BufWriter::new)
        .map(|writer| Arc::new(Mutex::new(writer)))
}

pub(super) fn write_protocol_log(
    logger: &ProtocolLog,
    direction: &str,
    payload: &str,
) -> io::Result<()> {
    let mut logger = logger.lock();
    writeln!(logger, "{direction} {payload}")?;
    logger.flush()
}

/// Framed output shared by the request loop, the pause watcher, the
/// breakpoint listener and engine output forwarding. Clones write to the
/// same stream and draw from the same sequence counter.
#[derive(Clone)]
pub(super) struct ProtocolWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    logger: Arc<Mutex<Option<ProtocolLog>>>,
    seq: Arc<AtomicU32>,
}

impl ProtocolWriter {
    pub(super) fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            logger: Arc::new(Mutex::new(None)),
            seq: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Redirects every clone to `out`.
    pub(super) fn set_output(&self, out: Box<dyn Write + Send>) {
        *self.out.lock() = out;
    }

    pub(super) fn set_logger(&self, logger: Option<ProtocolLog>) {
        *self.logger.lock() = logger;
    }

    pub(super) fn log_inbound(&self, payload: &str) {
        if let Some(logger) = self.logger.lock().as_ref() {
            let _ = write_protocol_log(logger, "<-", payload);
        }
    }

    pub(super) fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn event<T>(&self, name: &str, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        let body = body
            .map(|payload| serde_json::to_value(payload))
            .transpose()
            .unwrap_or(None);
        let event = Event {
            seq: self.next_seq(),
            message_type: MessageType::Event,
            event: name.to_string(),
            body,
        };
        serde_json::to_value(event).unwrap_or(Value::Null)
    }

    pub(super) fn output_event(&self, output: String, category: &str) -> Value {
        let output = if output.ends_with('\n') {
            output
        } else {
            format!("{output}\n")
        };
        self.event(
            "output",
            Some(OutputEventBody {
                output,
                category: Some(category.to_string()),
            }),
        )
    }

    pub(super) fn send(&self, message: &Value) -> io::Result<()> {
        let serialized = serde_json::to_string(message)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if let Some(logger) = self.logger.lock().as_ref() {
            let _ = write_protocol_log(logger, "->", &serialized);
        }
        let mut out = self.out.lock();
        write_message(&mut **out, &serialized)
    }

    pub(super) fn send_event<T>(&self, name: &str, body: Option<T>) -> io::Result<()>
    where
        T: Serialize,
    {
        let event = self.event(name, body);
        self.send(&event)
    }

    pub(super) fn send_output(&self, output: impl Into<String>, category: &str) -> io::Result<()> {
        let event = self.output_event(output.into(), category);
        self.send(&event)
    }

    /// [`Self::send_event`] for notifications no request waits on; a failed
    /// write is logged and dropped.
    pub(super) fn notify_event<T>(&self, name: &str, body: Option<T>)
    where
        T: Serialize,
    {
        if let Err(err) = self.send_event(name, body) {
            debug!(event = name, error = %err, "failed to write event to client");
        }
    }

    /// [`Self::send_output`] counterpart of [`Self::notify_event`].
    pub(super) fn notify_output(&self, output: impl Into<String>, category: &str) {
        if let Err(err) = self.send_output(output, category) {
            debug!(category, error = %err, "failed to write output to client");
        }
    }
}
