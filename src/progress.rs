//! Progress reporting for the match loop.
//!
//! The exporter reports through [`ProgressListener`]; listeners only observe,
//! so swapping or dropping one never changes a run's output. Bars and
//! spinners are hidden in log-only mode, where structured `tracing` lines
//! are emitted every [`LOG_INTERVAL`] tracks instead.

use crossbeam_channel::Sender;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Set once from `--log-only`; bars and spinners are hidden while it is on
static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Tracks between two progress lines in log-only mode
pub const LOG_INTERVAL: usize = 25;

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time for summaries: "850ms", "12.3s", "2m 05s"
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

fn styled(pb: ProgressBar, style: ProgressStyle, msg: &str) -> ProgressBar {
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb
}

/// Bar counting tracks against a known total
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{msg:<28} [{bar:40.cyan/blue}] {pos}/{len} tracks {percent:>3}% (ETA {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    styled(ProgressBar::new(len), style, msg)
}

/// Spinner for the library load, where the row count is not known up front
pub fn create_spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{spinner} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = styled(ProgressBar::new_spinner(), style, msg);
    if !is_log_only() {
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb
}

/// Whether a log-only progress line is due after `event`
pub fn progress_line_due(event: &ProgressEvent) -> bool {
    event.total > 0 && (event.processed % LOG_INTERVAL == 0 || event.processed == event.total)
}

/// Structured progress line for log-only runs
pub fn log_progress(phase: &str, event: &ProgressEvent) {
    if is_log_only() && progress_line_due(event) {
        tracing::info!(
            phase,
            processed = event.processed,
            total = event.total,
            matched = event.matched,
            "{}% of tracks processed",
            event.percent()
        );
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Counts after each processed track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    pub matched: usize,
}

impl ProgressEvent {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (self.processed * 100 / self.total) as u32
        }
    }
}

/// Optional observer of the match loop.
pub trait ProgressListener {
    fn on_start(&self, _total: usize) {}
    fn on_progress(&self, event: ProgressEvent);
    fn on_finish(&self, _event: ProgressEvent) {}
}

/// Listener that ignores everything
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Terminal progress bar (or periodic log lines in log-only mode)
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize) -> Self {
        Self {
            bar: create_progress_bar(total as u64, "Matching tracks"),
        }
    }
}

impl ProgressListener for BarProgress {
    fn on_progress(&self, event: ProgressEvent) {
        self.bar.set_position(event.processed as u64);
        self.bar.set_message(format!("Matching tracks (matched {})", event.matched));
        log_progress("match", &event);
    }

    fn on_finish(&self, event: ProgressEvent) {
        self.bar.finish_with_message(format!(
            "Matched {} of {} tracks",
            event.matched, event.total
        ));
    }
}

/// Events published by a background pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started { total: usize },
    Progress(ProgressEvent),
    Finished(crate::models::RunSummary),
    Failed(String),
}

/// Forwards progress into a channel; a disconnected receiver is ignored
pub struct ChannelProgress {
    tx: Sender<PipelineEvent>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressListener for ChannelProgress {
    fn on_start(&self, total: usize) {
        let _ = self.tx.send(PipelineEvent::Started { total });
    }

    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(PipelineEvent::Progress(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
    }

    #[test]
    fn test_progress_line_due() {
        let at = |processed, total| ProgressEvent {
            processed,
            total,
            matched: 0,
        };
        assert!(progress_line_due(&at(LOG_INTERVAL, 100)));
        assert!(!progress_line_due(&at(LOG_INTERVAL + 1, 100)));
        assert!(progress_line_due(&at(7, 7)));
        assert!(!progress_line_due(&at(0, 0)));
    }

    #[test]
    fn test_percent() {
        let event = ProgressEvent {
            processed: 1,
            total: 3,
            matched: 1,
        };
        assert_eq!(event.percent(), 33);
        let empty = ProgressEvent {
            processed: 0,
            total: 0,
            matched: 0,
        };
        assert_eq!(empty.percent(), 100);
    }

    #[test]
    fn test_channel_progress_survives_dropped_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = ChannelProgress::new(tx);
        listener.on_start(2);
        drop(rx);
        listener.on_progress(ProgressEvent {
            processed: 1,
            total: 2,
            matched: 0,
        });
    }

    #[test]
    fn test_channel_progress_forwards_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = ChannelProgress::new(tx);
        listener.on_start(1);
        let event = ProgressEvent {
            processed: 1,
            total: 1,
            matched: 1,
        };
        listener.on_progress(event);
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Started { total: 1 });
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Progress(event));
    }
}
