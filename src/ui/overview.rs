use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};
use crossterm::{
    cursor::Show,
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::{BarChart, Block, Borders, Paragraph},
    Terminal,
};

use crate::metrics::Status;
use crate::report::{status_line, Report};
use crate::ui::inspector::PayloadLog;

pub struct Dashboard {
    pub status: Status,
    pub histogram: Vec<u64>,
    pub current_slot: usize,
    pub payloads: PayloadLog,
}

impl Dashboard {
    pub fn new(window_seconds: usize) -> Self {
        Self {
            status: Status::default(),
            histogram: vec![0; window_seconds.max(1)],
            current_slot: 0,
            payloads: PayloadLog::new(),
        }
    }

    pub fn apply(&mut self, report: Report) {
        match report {
            Report::Payload(change) => self.payloads.push(change),
            Report::Status { status, histogram, current_slot } => {
                self.status = status;
                self.histogram = histogram;
                self.current_slot = current_slot;
            }
        }
    }

    /// Bar labels are slot indices; the slot being filled is marked with `*`.
    pub fn bars(&self) -> Vec<(String, u64)> {
        self.histogram
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let label = if i == self.current_slot { format!("*{i}") } else { i.to_string() };
                (label, count)
            })
            .collect()
    }
}

/// Puts the terminal back into cooked mode on every exit path, including `?`.
struct TerminalGuard<W: Write> {
    out: W,
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.out, LeaveAlternateScreen, Show);
    }
}

pub fn run_tui(reports: &Receiver<Report>, header: String, window_seconds: usize, stop: Arc<AtomicBool>) -> Result<()> {
    enable_raw_mode()?;
    let _guard = TerminalGuard { out: std::io::stdout() };
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut dash = Dashboard::new(window_seconds);

    while !stop.load(Ordering::Relaxed) {
        let mut closed = false;
        loop {
            match reports.try_recv() {
                Ok(report) => dash.apply(report),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            // receive loop ended; let the caller report why
            break;
        }

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),  // Header
                    Constraint::Length(3),  // Status
                    Constraint::Length(12), // Histogram
                    Constraint::Min(0),     // Payloads
                    Constraint::Length(1),  // Footer
                ].as_ref())
                .split(f.size());

            f.render_widget(Paragraph::new(header.as_str()), outer[0]);

            let status = Paragraph::new(status_line(&dash.status))
                .block(Block::default().title("Rate").borders(Borders::ALL));
            f.render_widget(status, outer[1]);

            let bars = dash.bars();
            let data: Vec<(&str, u64)> = bars.iter().map(|(l, v)| (l.as_str(), *v)).collect();
            let chart = BarChart::default()
                .block(Block::default().title("Packets per slot").borders(Borders::ALL))
                .data(data.as_slice())
                .bar_width(4)
                .bar_gap(1);
            f.render_widget(chart, outer[2]);

            let title = format!(
                "Payloads: {} ({:?}{})",
                dash.payloads.len(),
                dash.payloads.format,
                if dash.payloads.paused { ", paused" } else { "" }
            );
            let para = dash.payloads.paragraph(outer[3]);
            f.render_widget(para.block(Block::default().title(title).borders(Borders::ALL)), outer[3]);

            let footer = Paragraph::new("q: quit | t: toggle format | p: pause/resume | ↑/↓/Home: scroll | c: clear");
            f.render_widget(footer, outer[4]);
        })?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                } else {
                    match key.code {
                        KeyCode::Char('t') => dash.payloads.format = dash.payloads.format.next(),
                        KeyCode::Char('p') => dash.payloads.paused = !dash.payloads.paused,
                        KeyCode::Char('c') => dash.payloads.clear(),
                        KeyCode::Up => dash.payloads.scroll = dash.payloads.scroll.saturating_add(1),
                        KeyCode::Down => dash.payloads.scroll = dash.payloads.scroll.saturating_sub(1),
                        KeyCode::Home => dash.payloads.scroll = 0,
                        _ => {}
                    }
                }
            }
        }
    }

    Ok(())
}
