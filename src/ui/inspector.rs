use std::collections::VecDeque;

use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};

use crate::metrics::PayloadChange;

const LOG_CAPACITY: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DumpFormat { Hex, Ascii, Dec }

impl DumpFormat {
    pub fn next(self) -> Self {
        match self {
            DumpFormat::Hex => DumpFormat::Ascii,
            DumpFormat::Ascii => DumpFormat::Dec,
            DumpFormat::Dec => DumpFormat::Hex,
        }
    }
}

pub fn dump_bytes(buf: &[u8], fmt: DumpFormat, max: usize) -> String {
    let slice = &buf[..buf.len().min(max)];
    match fmt {
        DumpFormat::Hex => slice.iter().map(|b| format!("{b:02x} ")).collect::<String>().trim_end().to_string(),
        DumpFormat::Ascii => slice
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect(),
        DumpFormat::Dec => slice.iter().map(|b| format!("{b:03} ")).collect::<String>().trim_end().to_string(),
    }
}

/// Distinct payloads in arrival order, newest last.
pub struct PayloadLog {
    pub format: DumpFormat,
    pub paused: bool,
    pub scroll: usize,
    seen: u64,
    entries: VecDeque<(u64, PayloadChange)>,
}

impl PayloadLog {
    pub fn new() -> Self {
        Self {
            format: DumpFormat::Hex,
            paused: false,
            scroll: 0,
            seen: 0,
            entries: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    /// Numbers every change, even while paused, so gaps stay visible.
    pub fn push(&mut self, change: PayloadChange) {
        self.seen += 1;
        if self.paused {
            return;
        }
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((self.seen, change));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(n, c)| format!("#{n:<4} {:>3} B  {}", c.len, dump_bytes(&c.payload, self.format, 4096)))
            .collect()
    }

    pub fn paragraph(&self, area: Rect) -> Paragraph<'static> {
        let lines = self.lines();
        let viewport = area.height.saturating_sub(2) as usize;
        let start = lines.len().saturating_sub(viewport + self.scroll);
        let text_lines: Vec<Line> = lines.into_iter().skip(start).map(|s| Line::from(Span::raw(s))).collect();
        Paragraph::new(text_lines).wrap(Wrap { trim: false })
    }
}
