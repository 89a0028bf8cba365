//! Run a unit of periodic work forever, containing failures at the loop boundary.
//!
//! A [Poller] performs one cycle of work per call to [Poller::poll]. [supervise] calls it once
//! per interval: an error is logged and the cycle is retried on the next interval, and a panic is
//! caught, logged, and counted before the loop continues. Neither ever escapes the task.

use commonware_runtime::{Clock, Metrics};
use futures::FutureExt as _;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
};
use std::{fmt::Display, future::Future, panic::AssertUnwindSafe, time::Duration};
use tracing::{debug, error, warn};

/// Result of a single call to [Poller::poll].
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Status {
    Success,
    Failure,
    Panic,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Label {
    pub status: Status,
}

/// A unit of work repeated on every interval.
pub trait Poller: Send + 'static {
    type Error: Display + Send;

    /// Perform one cycle of work.
    fn poll(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Call `poller` every `interval`, forever.
pub async fn supervise<E: Clock + Metrics, P: Poller>(context: E, interval: Duration, mut poller: P) {
    let polls = Family::<Label, Counter>::default();
    context.register("polls", "Number of polls by status", polls.clone());

    loop {
        let status = match AssertUnwindSafe(poller.poll()).catch_unwind().await {
            Ok(Ok(())) => Status::Success,
            Ok(Err(err)) => {
                warn!(%err, "poll failed");
                Status::Failure
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                error!(%message, "poll panicked: restarting");
                Status::Panic
            }
        };
        debug!(?status, "poll complete");
        polls.get_or_create(&Label { status }).inc();
        context.sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner, Spawner};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Panics on the first poll, fails on the second, and succeeds afterwards.
    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    impl Poller for Flaky {
        type Error = String;

        async fn poll(&mut self) -> Result<(), Self::Error> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("boom"),
                1 => Err("unavailable".to_string()),
                _ => Ok(()),
            }
        }
    }

    #[test_traced]
    fn test_survives_panic_and_failure() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let calls = Arc::new(AtomicUsize::new(0));
            let poller = Flaky {
                calls: calls.clone(),
            };
            let interval = Duration::from_secs(6);
            context
                .with_label("flaky")
                .spawn(move |context| supervise(context, interval, poller));

            // One poll per interval, starting immediately
            context.sleep(Duration::from_secs(15)).await;
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        });
    }
}
