//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder::feed`] buffers partial
//! lines and returns every message completed by the chunk. Line endings may
//! be CRLF, LF or CR, and a CR at the end of one chunk followed by LF at the
//! start of the next counts as a single line break.

use std::time::Duration;

/// Event name used when a frame has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// A dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
    /// The stream's last event id at dispatch time.
    pub last_event_id: Option<String>,
}

/// Result of processing a single line.
enum LineResult {
    Skip,
    Dispatch,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    started: bool,
    pending_cr: bool,
    event: String,
    data: String,
    last_event_id: String,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder for a reconnected stream, keeping the previous last event id.
    pub fn resume(last_event_id: Option<String>) -> Self {
        Self {
            last_event_id: last_event_id.unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn last_event_id(&self) -> Option<&str> {
        Some(self.last_event_id.as_str()).filter(|id| !id.is_empty())
    }

    /// Reconnection delay requested by the server since the last call.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        let mut out = Vec::new();
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    self.pending_cr = true;
                },
                _ => self.line.push(byte),
            }
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseMessage>) {
        let mut raw = std::mem::take(&mut self.line);
        if !self.started {
            self.started = true;
            if raw.starts_with(&[0xEF, 0xBB, 0xBF]) {
                raw.drain(..3);
            }
        }
        let line = String::from_utf8_lossy(&raw);
        if let LineResult::Dispatch = self.process_line(&line)
            && let Some(message) = self.dispatch()
        {
            out.push(message);
        }
    }

    fn process_line(&mut self, line: &str) -> LineResult {
        if line.is_empty() {
            return LineResult::Dispatch;
        }
        if line.starts_with(':') {
            return LineResult::Skip;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            },
            "id" if !value.contains('\0') => self.last_event_id = value.to_string(),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            },
            _ => {},
        }
        LineResult::Skip
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = std::mem::take(&mut self.event);
        let mut data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return None;
        }
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseMessage {
            event: if event.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data,
            last_event_id: self.last_event_id().map(str::to_string),
        })
    }
}
