use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
};

/// How a missing fragment was restored.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Method {
    Copy,
    Reconstruct,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MethodLabel {
    pub method: Method,
}

/// Metrics for the [super::Engine].
#[derive(Clone, Default)]
pub struct Metrics {
    /// Number of missing fragments found
    pub missing: Counter,
    /// Number of fragments restored by method
    pub restored: Family<MethodLabel, Counter>,
    /// Number of failed restoration attempts
    pub failed: Counter,
    /// Number of restoral orders filed
    pub ordered: Counter,
    /// Number of files removed because the ledger no longer tracks them
    pub removed: Counter,
    /// Number of restoral orders claimed
    pub claimed: Counter,
    /// Number of claimed restoral orders completed
    pub completed: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register(
            "missing",
            "Number of missing fragments found",
            metrics.missing.clone(),
        );
        context.register(
            "restored",
            "Number of fragments restored by method",
            metrics.restored.clone(),
        );
        context.register(
            "failed",
            "Number of failed restoration attempts",
            metrics.failed.clone(),
        );
        context.register(
            "ordered",
            "Number of restoral orders filed",
            metrics.ordered.clone(),
        );
        context.register(
            "removed",
            "Number of files removed because the ledger no longer tracks them",
            metrics.removed.clone(),
        );
        context.register(
            "claimed",
            "Number of restoral orders claimed",
            metrics.claimed.clone(),
        );
        context.register(
            "completed",
            "Number of claimed restoral orders completed",
            metrics.completed.clone(),
        );
        metrics
    }
}
