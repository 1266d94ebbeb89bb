//! Server-sent-event line reassembly.
//!
//! Network reads split frames at arbitrary byte offsets. [`SseBuffer`] keeps
//! the unterminated tail of each read and only interprets complete lines, so
//! feeding a payload in any number of pieces yields the same frames as
//! feeding it whole.

/// One dispatched frame: an optional `event:` header and its joined data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseBuffer {
    remainder: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.remainder.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.remainder.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.remainder.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush state at end of input.
    ///
    /// A final line without a trailing newline is interpreted, and a frame
    /// missing its blank-line terminator is dispatched.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.remainder.is_empty() {
            let tail = std::mem::take(&mut self.remainder);
            let line = String::from_utf8_lossy(&tail).into_owned();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|e| !e.is_empty());
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: data.join("\n"),
        })
    }
}
