//! Conversion dispatcher
//!
//! A single loop drains the job queue. Every dequeued job first takes a slot
//! from a semaphore sized to `max_concurrency`, then runs as its own task:
//! the [`Pipeline`] wrapped in the [`RetryPolicy`] tower middleware. The slot
//! is an owned permit moved into that task, so it is released however the
//! task ends.

pub mod pipeline;
pub mod retry;

pub use pipeline::{JobError, Pipeline, RemoteArtifact};
pub use retry::{Backoff, ExponentialBackoff, RetryPolicy};

use crate::config::DispatchConfig;
use crate::observability::Metrics;
use crate::queue::{ConversionJob, JobEnvelope, JobReceiver};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{error, info, warn};

pub struct Dispatcher<B = ExponentialBackoff> {
    pipeline: Arc<Pipeline>,
    slots: Arc<Semaphore>,
    max_concurrency: usize,
    retry: RetryPolicy<B>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn from_config(pipeline: Pipeline, config: &DispatchConfig, metrics: Arc<Metrics>) -> Self {
        let retry = RetryPolicy::new(
            config.max_attempts,
            ExponentialBackoff::new(config.backoff_base()),
        );
        Self::new(pipeline, config.max_concurrency, retry, metrics)
    }
}

impl<B: Backoff + 'static> Dispatcher<B> {
    pub fn new(
        pipeline: Pipeline,
        max_concurrency: usize,
        retry: RetryPolicy<B>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            slots: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            retry,
            metrics,
        }
    }

    /// Slots not currently held by a running job
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Drain `queue` until it closes or `shutdown` is cancelled
    ///
    /// Jobs already running are awaited before returning; they are never
    /// aborted.
    pub async fn run(self, mut queue: JobReceiver, shutdown: CancellationToken) {
        info!(
            max_concurrency = self.max_concurrency,
            max_attempts = self.retry.max_attempts(),
            "Dispatcher started"
        );

        let mut in_flight = JoinSet::new();

        loop {
            let envelope = match queue.dequeue(&shutdown).await {
                Ok(envelope) => envelope,
                Err(_closed) => break,
            };

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!(
                        seq = envelope.seq,
                        job = %envelope.job,
                        "Shutdown while waiting for a slot, job abandoned"
                    );
                    break;
                }
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            in_flight.spawn(convert(
                self.pipeline.clone(),
                self.retry.clone(),
                self.metrics.clone(),
                envelope,
                permit,
            ));

            while let Some(result) = in_flight.try_join_next() {
                report_join(result);
            }
        }

        drop(queue);

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Dispatcher draining in-flight jobs");
        }
        while let Some(result) = in_flight.join_next().await {
            report_join(result);
        }

        info!("Dispatcher stopped");
    }
}

/// Run one job to completion under the retry policy, holding its slot
async fn convert<B: Backoff + 'static>(
    pipeline: Arc<Pipeline>,
    retry: RetryPolicy<B>,
    metrics: Arc<Metrics>,
    envelope: JobEnvelope,
    _permit: OwnedSemaphorePermit,
) {
    let JobEnvelope { seq, job } = envelope;
    let max_attempts = retry.max_attempts();

    let service = {
        let metrics = metrics.clone();
        ServiceBuilder::new()
            .retry(retry)
            .service_fn(move |job: ConversionJob| {
                let pipeline = pipeline.clone();
                let metrics = metrics.clone();
                async move {
                    let result = pipeline.run(&job).await;
                    if result.is_err() {
                        metrics.attempt_failed();
                    }
                    result
                }
            })
    };

    match service.oneshot(job.clone()).await {
        Ok(size) => {
            metrics.job_converted();
            info!(seq, job = %job, size, "Conversion succeeded");
        }
        Err(e) => {
            metrics.job_failed();
            error!(
                seq,
                job = %job,
                attempts = max_attempts,
                error = %e,
                "Conversion failed, job dropped"
            );
        }
    }
}

fn report_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Conversion task panicked");
        }
    }
}
