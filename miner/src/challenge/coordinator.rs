use super::{
    evaluate,
    metrics::{Metrics, TrackLabel},
    Action, Config, IdleRequest, Prover, ServiceRequest, Slot, Track,
};
use crate::{
    poller::{supervise, Poller},
    Challenge, Error, Height, IdleProof, Ledger, PublicKey, Receipt, ServiceProof,
};
use commonware_runtime::{Clock, Handle, Metrics as RuntimeMetrics, Spawner};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The decisions reached for both tracks of the active challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub idle: Action,
    pub service: Action,
}

/// A proof to compute and submit for one track.
enum Request {
    Idle(IdleRequest),
    Service(ServiceRequest),
}

impl Request {
    /// Compute the proof and submit it to the ledger.
    async fn run<P: Prover, L: Ledger>(
        self,
        mut prover: P,
        mut ledger: L,
    ) -> Result<Receipt, Error> {
        match self {
            Request::Idle(request) => {
                let window_start = request.window_start;
                let proof = prover.prove_idle(request).await?;
                ledger
                    .submit_idle_proof(IdleProof {
                        window_start,
                        proof,
                    })
                    .await
            }
            Request::Service(request) => {
                let window_start = request.window_start;
                let proof = prover.prove_service(request).await?;
                ledger
                    .submit_service_proof(ServiceProof {
                        window_start,
                        proof,
                    })
                    .await
            }
        }
    }
}

/// Polls for the active challenge and dispatches proof tasks.
pub struct Coordinator<E: Clock + Spawner + RuntimeMetrics, L: Ledger, P: Prover> {
    context: E,
    ledger: L,
    prover: P,

    public_key: PublicKey,
    poll_interval: Duration,

    idle: Slot,
    service: Slot,

    metrics: Metrics,
}

impl<E: Clock + Spawner + RuntimeMetrics, L: Ledger, P: Prover> Coordinator<E, L, P> {
    /// Create a new coordinator.
    pub fn new(context: E, ledger: L, prover: P, cfg: Config) -> Self {
        let metrics = Metrics::init(context.clone());
        Self {
            context,
            ledger,
            prover,
            public_key: cfg.public_key,
            poll_interval: cfg.poll_interval,
            idle: Slot::default(),
            service: Slot::default(),
            metrics,
        }
    }

    /// Poll for challenges every `poll_interval`, forever.
    pub fn start(self) -> Handle<()> {
        let interval = self.poll_interval;
        self.context
            .with_label("poller")
            .spawn(move |context| supervise(context, interval, self))
    }

    /// Evaluate the active challenge once, dispatching any proof tasks it calls for.
    ///
    /// Returns `None` if there is no active challenge.
    pub async fn check(&mut self) -> Result<Option<Outcome>, Error> {
        let challenge = match self.ledger.challenge(&self.public_key).await {
            Ok(challenge) => challenge,
            Err(Error::NotFound) => {
                debug!("no active challenge");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let height = self.ledger.height().await?;
        debug!(
            window_start = challenge.window_start,
            height, "evaluating challenge"
        );

        // The tracks are independent, so the order does not matter
        let idle = self.idle(&challenge, height);
        let service = self.service(&challenge, height);
        Ok(Some(Outcome { idle, service }))
    }

    fn idle(&mut self, challenge: &Challenge, height: Height) -> Action {
        let action = evaluate(
            height,
            challenge.idle_deadline,
            challenge.verify_deadline,
            challenge.idle_proof.as_ref(),
        );
        self.dispatch(Track::Idle, action, challenge, height, |retry| {
            Request::Idle(IdleRequest {
                retry,
                height,
                verify_deadline: challenge.verify_deadline,
                window_start: challenge.window_start,
                front: challenge.snapshot.front,
                rear: challenge.snapshot.rear,
                space_param: challenge.space_param.clone(),
                accumulator: challenge.snapshot.accumulator.clone(),
                tee_signature: challenge.tee_signature.clone(),
            })
        })
    }

    fn service(&mut self, challenge: &Challenge, height: Height) -> Action {
        let action = evaluate(
            height,
            challenge.service_deadline,
            challenge.verify_deadline,
            challenge.service_proof.as_ref(),
        );
        self.dispatch(Track::Service, action, challenge, height, |retry| {
            Request::Service(ServiceRequest {
                retry,
                height,
                verify_deadline: challenge.verify_deadline,
                window_start: challenge.window_start,
                index: challenge.service_param.index.clone(),
                value: challenge.service_param.value.clone(),
            })
        })
    }

    /// Spawn the proof task for `track` if `action` calls for one and the track is free.
    ///
    /// The task holds the track's permit until its proof is submitted (or fails).
    fn dispatch(
        &mut self,
        track: Track,
        action: Action,
        challenge: &Challenge,
        height: Height,
        request: impl FnOnce(bool) -> Request,
    ) -> Action {
        let Action::Dispatch { retry } = action else {
            self.record(track, action, challenge, height);
            return action;
        };
        let slot = match track {
            Track::Idle => &self.idle,
            Track::Service => &self.service,
        };
        let Some(permit) = slot.try_acquire() else {
            self.record(track, Action::Busy, challenge, height);
            return Action::Busy;
        };
        let request = request(retry);
        self.record(track, action, challenge, height);

        let prover = self.prover.clone();
        let ledger = self.ledger.clone();
        let inflight = self.inflight(track);
        let window_start = challenge.window_start;
        let label = match track {
            Track::Idle => "idle_proof",
            Track::Service => "service_proof",
        };
        self.context.with_label(label).spawn(move |_| async move {
            match request.run(prover, ledger).await {
                Ok(receipt) => info!(?track, window_start, retry, %receipt, "submitted proof"),
                Err(err) => warn!(?err, ?track, window_start, "failed to prove challenge"),
            }
            inflight.dec();
            drop(permit);
        });
        action
    }

    /// Increment and return the in-flight gauge for `track`.
    fn inflight(&self, track: Track) -> prometheus_client::metrics::gauge::Gauge {
        let gauge = self
            .metrics
            .inflight
            .get_or_create(&TrackLabel::from(track))
            .clone();
        gauge.inc();
        gauge
    }

    fn record(&self, track: Track, action: Action, challenge: &Challenge, height: Height) {
        let label = TrackLabel::from(track);
        let window_start = challenge.window_start;
        match action {
            Action::Dispatch { retry } => {
                self.metrics.dispatched.get_or_create(&label).inc();
                info!(?track, window_start, height, retry, "dispatched proof task");
            }
            Action::Busy => {
                self.metrics.busy.get_or_create(&label).inc();
                debug!(?track, window_start, "proof task still running");
            }
            Action::Expired => {
                self.metrics.expired.get_or_create(&label).inc();
                let deadline = match track {
                    Track::Idle => challenge.idle_deadline,
                    Track::Service => challenge.service_deadline,
                };
                warn!(?track, window_start, deadline, height, "challenge expired");
            }
            Action::VerifyExpired => {
                self.metrics.expired.get_or_create(&label).inc();
                warn!(
                    ?track,
                    window_start,
                    deadline = challenge.verify_deadline,
                    height,
                    "challenge verification expired"
                );
            }
            Action::Pending => {
                self.metrics.pending.get_or_create(&label).inc();
                info!(?track, window_start, "proof verification pending");
            }
            Action::Satisfied => debug!(?track, window_start, "proof accepted"),
        }
    }
}

impl<E: Clock + Spawner + RuntimeMetrics, L: Ledger, P: Prover> Poller for Coordinator<E, L, P> {
    type Error = Error;

    async fn poll(&mut self) -> Result<(), Error> {
        self.check().await.map(|_| ())
    }
}
