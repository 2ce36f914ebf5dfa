use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Pipeline states, in the order a conversion walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Idle,
    FetchingMetadata,
    FetchingChapters,
    FetchingCover,
    BuildingChapters,
    BuildingPages,
    ScanningIcons,
    FetchingRemoteResources,
    ReadyToAssemble,
    Assembling,
    Done,
}

impl Phase {
    /// `(start, weight)` of this phase on the overall 0..=1 scale.
    fn span(self) -> (f64, f64) {
        match self {
            Phase::Idle => (0.0, 0.0),
            Phase::FetchingMetadata => (0.0, 0.05),
            Phase::FetchingChapters => (0.05, 0.30),
            Phase::FetchingCover => (0.35, 0.05),
            Phase::BuildingChapters => (0.40, 0.15),
            Phase::BuildingPages => (0.55, 0.05),
            Phase::ScanningIcons => (0.60, 0.02),
            Phase::FetchingRemoteResources => (0.62, 0.28),
            Phase::ReadyToAssemble => (0.90, 0.0),
            Phase::Assembling => (0.90, 0.10),
            Phase::Done => (1.0, 0.0),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::FetchingMetadata => "fetching-metadata",
            Phase::FetchingChapters => "fetching-chapters",
            Phase::FetchingCover => "fetching-cover",
            Phase::BuildingChapters => "building-chapters",
            Phase::BuildingPages => "building-pages",
            Phase::ScanningIcons => "scanning-icons",
            Phase::FetchingRemoteResources => "fetching-remote-resources",
            Phase::ReadyToAssemble => "ready-to-assemble",
            Phase::Assembling => "assembling",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub percent: f64,
    pub message: String,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Default observer: progress goes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        tracing::info!(
            percent = format_args!("{:.0}", event.percent * 100.0),
            "{}",
            event.message
        );
    }
}

/// Forwards events to a channel; handy for UIs and tests.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub tokio::sync::mpsc::UnboundedSender<ProgressEvent>);

impl ProgressObserver for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Maps `(phase, fraction, message)` onto the overall scale and never goes backwards.
pub struct ProgressTracker {
    observer: Arc<dyn ProgressObserver>,
    last: Mutex<f64>,
}

impl ProgressTracker {
    pub fn new(observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            observer,
            last: Mutex::new(0.0),
        }
    }

    pub fn report(&self, phase: Phase, fraction: f64, message: impl Into<String>) {
        let (start, weight) = phase.span();
        let raw = (start + weight * fraction.clamp(0.0, 1.0)).clamp(0.0, 1.0);

        let percent = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            *last = last.max(raw);
            *last
        };

        self.observer.on_progress(&ProgressEvent {
            percent,
            message: message.into(),
        });
    }
}
