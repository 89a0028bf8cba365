use super::Track;
use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
};

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TrackLabel {
    pub track: Track,
}

impl From<Track> for TrackLabel {
    fn from(track: Track) -> Self {
        Self { track }
    }
}

/// Metrics for the [super::Coordinator].
#[derive(Default)]
pub struct Metrics {
    /// Number of proof tasks launched
    pub dispatched: Family<TrackLabel, Counter>,
    /// Number of polls that found a proof window already closed
    pub expired: Family<TrackLabel, Counter>,
    /// Number of dispatches skipped because a task was still running
    pub busy: Family<TrackLabel, Counter>,
    /// Number of polls that found verification still pending
    pub pending: Family<TrackLabel, Counter>,
    /// Number of proof tasks currently running
    pub inflight: Family<TrackLabel, Gauge>,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "dispatched",
            "Number of proof tasks launched",
            metrics.dispatched.clone(),
        );
        context.register(
            "expired",
            "Number of polls that found a proof window already closed",
            metrics.expired.clone(),
        );
        context.register(
            "busy",
            "Number of dispatches skipped because a task was still running",
            metrics.busy.clone(),
        );
        context.register(
            "pending",
            "Number of polls that found verification still pending",
            metrics.pending.clone(),
        );
        context.register(
            "inflight",
            "Number of proof tasks currently running",
            metrics.inflight.clone(),
        );
        metrics
    }
}
