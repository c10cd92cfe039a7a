//! Line-delimited JSON event fixtures.
//!
//! Each line holds one event: `{"at": 1.25, "payload": "41414141"}` where `at`
//! is seconds from the recording origin and `payload` is lowercase hex. Blank
//! lines and lines starting with `#` are ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::source::{Event, EventSource, Next, SourceError};

#[derive(Serialize, Deserialize)]
struct FixtureLine {
    at: f64,
    payload: String,
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err(format!("odd number of hex digits ({})", s.len()));
    }
    if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("invalid hex digit {c:?}"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

/// Plays back a fixed sequence of events, then reports `Exhausted`.
pub struct ReplaySource {
    events: std::vec::IntoIter<Event>,
}

impl ReplaySource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events: events.into_iter() }
    }

    pub fn open(path: &Path, capacity: usize) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::FixtureIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), capacity)
    }

    /// Parses a fixture, truncating payloads to `capacity` bytes like the socket would.
    pub fn from_reader<R: BufRead>(reader: R, capacity: usize) -> Result<Self, SourceError> {
        let mut events = Vec::new();
        let mut last = Duration::ZERO;
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let fail = |reason: String| SourceError::Fixture { line: line_no, reason };
            let line = line.map_err(|e| fail(e.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: FixtureLine = serde_json::from_str(trimmed).map_err(|e| fail(e.to_string()))?;
            let received_at = Duration::try_from_secs_f64(parsed.at)
                .map_err(|_| fail(format!("timestamp {} is not a valid offset", parsed.at)))?;
            if received_at < last {
                return Err(fail(format!(
                    "timestamp {} goes backwards (previous {})",
                    parsed.at,
                    last.as_secs_f64()
                )));
            }
            last = received_at;
            let mut payload = decode_hex(&parsed.payload).map_err(fail)?;
            payload.truncate(capacity);
            events.push(Event { payload: Bytes::from(payload), received_at });
        }
        Ok(Self::new(events))
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ReplaySource {
    fn next_event(&mut self) -> Result<Next, SourceError> {
        Ok(self.events.next().map_or(Next::Exhausted, Next::Event))
    }
}

pub struct Recorder<W: Write> {
    out: W,
}

impl<W: Write> Recorder<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn record(&mut self, event: &Event) -> io::Result<()> {
        let line = FixtureLine {
            at: event.received_at.as_secs_f64(),
            payload: encode_hex(&event.payload),
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Wraps a source and writes every event it yields to a `Recorder`.
pub struct Recording<S, W: Write> {
    inner: S,
    recorder: Recorder<W>,
}

impl<S: EventSource, W: Write> Recording<S, W> {
    pub fn new(inner: S, recorder: Recorder<W>) -> Self {
        Self { inner, recorder }
    }
}

impl<S: EventSource, W: Write> EventSource for Recording<S, W> {
    fn next_event(&mut self) -> Result<Next, SourceError> {
        let next = self.inner.next_event()?;
        if let Next::Event(event) = &next {
            self.recorder.record(event).map_err(SourceError::Record)?;
        }
        Ok(next)
    }
}
