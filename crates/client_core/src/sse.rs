//! Incremental decoder for `text/event-stream` bodies.

const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStreamEvent {
    pub event: String,
    pub data: String,
    /// Set when a field line of this event was not valid UTF-8; `data` then
    /// holds a lossy copy.
    pub invalid_utf8: bool,
}

impl RawStreamEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            invalid_utf8: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    invalid_utf8: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one body chunk and returns every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RawStreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let (line, invalid) = match String::from_utf8(line) {
                Ok(line) => (line, false),
                Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), true),
            };
            if let Some(event) = self.process_line(&line, invalid) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str, invalid: bool) -> Option<RawStreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        self.invalid_utf8 |= invalid;

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RawStreamEvent> {
        let event = self.event.take().filter(|name| !name.is_empty());
        let invalid_utf8 = std::mem::take(&mut self.invalid_utf8);
        if event.is_none() && self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(RawStreamEvent {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            invalid_utf8,
        })
    }
}
