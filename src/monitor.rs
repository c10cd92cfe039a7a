use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use crate::cli::{Listen, Replay};
use crate::config::MonitorConfig;
use crate::fixture::{Recorder, Recording, ReplaySource};
use crate::metrics::RateEstimator;
use crate::report::{escape_bytes, ChannelReporter, ConsoleReporter, Report, Reporter};
use crate::source::{EventSource, Next, SourceError, UdpSource};
use crate::ui::overview::run_tui;

/// Receive wait used by the dashboard when no `--timeout-ms` is given.
const DASHBOARD_POLL: Duration = Duration::from_millis(200);

pub fn run_listen(listen: Listen) -> Result<()> {
    let mut config = MonitorConfig::from_listen(&listen)?;
    if listen.ui && config.receive_timeout.is_none() {
        config.receive_timeout = Some(DASHBOARD_POLL);
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    // Without a receive timeout the loop never wakes to check the flag, so
    // leave SIGINT at its default and let it end the process.
    if config.receive_timeout.is_some() && !listen.ui {
        let stop = stop_flag.clone();
        let _ = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        });
    }

    let addr = config.socket_addr();
    let source = UdpSource::bind(addr, config.buffer_capacity_bytes, config.receive_timeout)
        .with_context(|| format!("Binding UDP socket at {addr}"))?;
    let bound = source.local_addr().unwrap_or(addr);
    info!(
        addr = %bound,
        window = config.window_seconds,
        buffer = config.buffer_capacity_bytes,
        link_capacity = config.link_capacity_bps,
        "Starting udpwatch"
    );

    match &listen.record {
        Some(path) => {
            let file = open_record_file(path)?;
            info!(path = %path.display(), "Recording events");
            let source = Recording::new(source, Recorder::new(file));
            observe(source, &config, listen.ui, stop_flag)
        }
        None => observe(source, &config, listen.ui, stop_flag),
    }
}

/// Timestamps restart at zero with every socket, so each recording replaces
/// the previous one rather than extending it.
fn open_record_file(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Opening record file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn run_replay(replay: Replay) -> Result<()> {
    let config = MonitorConfig::from_replay(&replay)?;
    let mut source = ReplaySource::open(&replay.fixture, config.buffer_capacity_bytes)
        .with_context(|| format!("Loading fixture {}", replay.fixture.display()))?;
    info!(fixture = %replay.fixture.display(), events = source.remaining(), "Replaying");

    let mut estimator = RateEstimator::new(config.rate_config());
    let stdout = io::stdout();
    let mut reporter = ConsoleReporter::new(stdout.lock(), config.format);
    let stop = AtomicBool::new(false);
    let handled = pump(&mut source, &mut estimator, &mut reporter, &stop)?;
    info!(events = handled, "Replay finished");
    Ok(())
}

fn observe<S>(mut source: S, config: &MonitorConfig, ui: bool, stop: Arc<AtomicBool>) -> Result<()>
where
    S: EventSource + Send + 'static,
{
    let mut estimator = RateEstimator::new(config.rate_config());
    if ui {
        return run_dashboard(source, estimator, config, stop);
    }

    let stdout = io::stdout();
    let mut reporter = ConsoleReporter::new(stdout.lock(), config.format);
    let handled = pump(&mut source, &mut estimator, &mut reporter, &stop)?;
    info!(events = handled, "Shutting down");
    Ok(())
}

fn run_dashboard<S>(mut source: S, mut estimator: RateEstimator, config: &MonitorConfig, stop: Arc<AtomicBool>) -> Result<()>
where
    S: EventSource + Send + 'static,
{
    let (report_tx, report_rx) = channel::unbounded::<Report>();
    let stop_worker = stop.clone();
    let worker = thread::spawn(move || -> Result<u64> {
        let mut reporter = ChannelReporter::new(report_tx);
        pump(&mut source, &mut estimator, &mut reporter, &stop_worker)
    });

    let header = format!(
        "udpwatch | {} | window {}s | link {} bit/s",
        config.socket_addr(),
        config.window_seconds,
        config.link_capacity_bps
    );
    let ui_result = run_tui(&report_rx, header, config.window_seconds, stop.clone());
    // Stop the worker before the receiver goes away so it never sees a closed channel.
    stop.store(true, Ordering::Relaxed);
    let worker_result = match worker.join() {
        Ok(result) => result,
        Err(_) => bail!("Receive loop panicked"),
    };
    drop(report_rx);

    let handled = worker_result?;
    ui_result?;
    info!(events = handled, "Shutting down");
    Ok(())
}

/// Feeds events from `source` through `estimator` into `reporter` until the
/// source is exhausted or `stop` is set. A failed receive is retried once;
/// a second consecutive failure ends the loop with an error.
pub(crate) fn pump<S, R>(source: &mut S, estimator: &mut RateEstimator, reporter: &mut R, stop: &AtomicBool) -> Result<u64>
where
    S: EventSource + ?Sized,
    R: Reporter + ?Sized,
{
    let mut handled = 0u64;
    let mut retried = false;
    while !stop.load(Ordering::Relaxed) {
        let next = match source.next_event() {
            Ok(next) => {
                retried = false;
                next
            }
            Err(SourceError::Receive(e)) if !retried => {
                warn!(error = %e, "Receive failed, retrying");
                retried = true;
                continue;
            }
            Err(e) => return Err(e).context("Receiving datagram"),
        };

        match next {
            Next::Event(event) => {
                let update = estimator.on_event(event.payload, event.received_at);
                if let Some(change) = &update.change {
                    debug!(len = change.len, payload = %escape_bytes(&change.payload), "New payload");
                }
                reporter.report(&update, estimator).context("Writing report")?;
                handled += 1;
            }
            Next::Idle => {}
            Next::Exhausted => break,
        }
    }
    reporter.finish().context("Writing report")?;
    Ok(handled)
}


#[cfg(all(test, target_os = "linux"))]
mod itests {
    use super::*;
    use std::net::UdpSocket;

    use bytes::Bytes;

    use crate::metrics::RateConfig;

    #[test]
    fn socket_to_reports() {
        let source = UdpSource::bind("127.0.0.1:0".parse().unwrap(), 26, Some(Duration::from_millis(50))).unwrap();
        let target = source.local_addr().unwrap();
        let (tx, rx) = channel::unbounded::<Report>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_worker = stop.clone();
        let handle = thread::spawn(move || {
            let mut source = source;
            let mut estimator = RateEstimator::new(RateConfig::default());
            let mut reporter = ChannelReporter::new(tx);
            pump(&mut source, &mut estimator, &mut reporter, &stop_worker)
        });

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        for payload in [b"AAAA", b"AAAA", b"AAAA", b"BBBB"] {
            sender.send_to(payload, target).unwrap();
        }

        let mut payloads = Vec::new();
        let mut statuses = 0;
        while statuses < 4 {
            match rx.recv_timeout(Duration::from_secs(5)).expect("report") {
                Report::Payload(change) => payloads.push(change.payload),
                Report::Status { status, .. } => {
                    statuses += 1;
                    assert_eq!(status.total_count, statuses);
                }
            }
        }
        assert_eq!(payloads, vec![Bytes::from_static(b"AAAA"), Bytes::from_static(b"BBBB")]);

        stop.store(true, Ordering::Relaxed);
        assert_eq!(handle.join().unwrap().unwrap(), 4);
    }

    #[test]
    fn listen_reports_bind_failure() {
        use clap::Parser;
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port().to_string();
        let argv = ["udpwatch", "listen", "--address", "127.0.0.1", "--port", port.as_str()];
        let listen = match crate::cli::Cli::try_parse_from(argv).unwrap().command {
            Some(crate::cli::Commands::Listen(l)) => l,
            _ => panic!("expected listen"),
        };
        let err = run_listen(listen).unwrap_err();
        assert_eq!(crate::exit_code_for_error(&err), 4);
    }
}
