use std::io::{self, Write};

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::fixture::encode_hex;
use crate::metrics::{PayloadChange, RateEstimator, Status, Update};

pub trait Reporter {
    fn report(&mut self, update: &Update, estimator: &RateEstimator) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Renders bytes as an escaped byte-string literal, e.g. `b"AB\x00\n"`.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() + 3);
    s.push_str("b\"");
    for &b in bytes {
        match b {
            b'"' => s.push_str("\\\""),
            b'\\' => s.push_str("\\\\"),
            b'\n' => s.push_str("\\n"),
            b'\r' => s.push_str("\\r"),
            b'\t' => s.push_str("\\t"),
            b if b.is_ascii_graphic() || b == b' ' => s.push(b as char),
            b => s.push_str(&format!("\\x{b:02x}")),
        }
    }
    s.push('"');
    s
}

pub fn status_line(status: &Status) -> String {
    format!(
        "receive count: {} sec={} pkt/s={} bytes/s={} utilization={}%",
        status.total_count, status.elapsed, status.packet_rate, status.byte_rate, status.utilization
    )
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonLine {
    Payload { payload: String, hex: String, len: usize },
    Status(Status),
}

/// Writes reports to a terminal or pipe.
///
/// In text mode the status line ends with `\r` so the next one overwrites it;
/// a payload line first moves past any open status line.
pub struct ConsoleReporter<W: Write> {
    out: W,
    format: OutputFormat,
    line_open: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format, line_open: false }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn text(&mut self, update: &Update) -> io::Result<()> {
        if let Some(change) = &update.change {
            if self.line_open {
                self.out.write_all(b"\n")?;
            }
            writeln!(self.out, "received message: {} ({} bytes)", escape_bytes(&change.payload), change.len)?;
        }
        write!(self.out, "{}  \r", status_line(&update.status))?;
        self.line_open = true;
        Ok(())
    }

    fn json(&mut self, update: &Update) -> io::Result<()> {
        if let Some(change) = &update.change {
            self.json_line(&JsonLine::Payload {
                payload: escape_bytes(&change.payload),
                hex: encode_hex(&change.payload),
                len: change.len,
            })?;
        }
        self.json_line(&JsonLine::Status(update.status))
    }

    fn json_line(&mut self, line: &JsonLine) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, update: &Update, _estimator: &RateEstimator) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => self.text(update)?,
            OutputFormat::Json => self.json(update)?,
        }
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.line_open {
            self.out.write_all(b"\n")?;
            self.line_open = false;
        }
        self.out.flush()
    }
}

/// What the dashboard receives from the receive loop.
#[derive(Clone, Debug)]
pub enum Report {
    Payload(PayloadChange),
    Status {
        status: Status,
        histogram: Vec<u64>,
        current_slot: usize,
    },
}

pub struct ChannelReporter {
    tx: Sender<Report>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<Report>) -> Self {
        Self { tx }
    }

    fn send(&self, report: Report) -> io::Result<()> {
        self.tx
            .send(report)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "dashboard closed"))
    }
}

impl Reporter for ChannelReporter {
    fn report(&mut self, update: &Update, estimator: &RateEstimator) -> io::Result<()> {
        if let Some(change) = &update.change {
            self.send(Report::Payload(change.clone()))?;
        }
        self.send(Report::Status {
            status: update.status,
            histogram: estimator.histogram().to_vec(),
            current_slot: estimator.current_slot(),
        })
    }
}
