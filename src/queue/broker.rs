use super::job::{ConversionJob, JobEnvelope};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue closed")]
    Closed,
}

/// Create an unbounded FIFO job queue
///
/// Architecture:
/// 1. Producers (the watcher) call `sender.enqueue(job)` from any thread
/// 2. Each job gets the next sequence number and is pushed on an mpsc channel
/// 3. The single dispatcher loop calls `receiver.dequeue(&shutdown)`
///
/// The queue holds nothing beyond the channel buffer; jobs are lost on restart.
pub fn channel() -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();

    let sender = JobSender {
        tx,
        next_seq: Arc::new(AtomicU64::new(0)),
    };

    (sender, JobReceiver { rx })
}

/// Producer half of the job queue
#[derive(Clone, Debug)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<JobEnvelope>,
    next_seq: Arc<AtomicU64>,
}

impl JobSender {
    /// Enqueue a job and return its sequence number
    ///
    /// Never blocks and never fails. If the dispatcher has already shut down
    /// the job is dropped.
    ///
    /// Sequence numbers are unique, and match dequeue order for calls made
    /// from one task (the watcher's translator is the only producer). Clones
    /// enqueueing concurrently may see their jobs dequeued out of `seq` order.
    pub fn enqueue(&self, job: ConversionJob) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        if let Err(mpsc::error::SendError(envelope)) = self.tx.send(JobEnvelope { seq, job }) {
            debug!(seq, job = %envelope.job, "Dispatcher gone, job dropped");
        }

        seq
    }

    /// Whether the consuming side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the job queue
#[derive(Debug)]
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<JobEnvelope>,
}

impl JobReceiver {
    /// Wait for the next job
    ///
    /// Returns `QueueError::Closed` once `shutdown` is cancelled (even if jobs
    /// are still buffered) or when every sender is dropped and the buffer is
    /// empty.
    pub async fn dequeue(&mut self, shutdown: &CancellationToken) -> Result<JobEnvelope, QueueError> {
        if shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(QueueError::Closed),
            envelope = self.rx.recv() => envelope.ok_or(QueueError::Closed),
        }
    }

    /// Number of jobs waiting in the buffer
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(name: &str) -> ConversionJob {
        ConversionJob::new(format!("input/{name}.docx"), format!("output/{name}.pdf"))
    }

    #[tokio::test]
    async fn test_fifo_order_and_sequence() {
        let (sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        assert_eq!(sender.enqueue(job("a")), 0);
        assert_eq!(sender.enqueue(job("b")), 1);
        assert_eq!(sender.enqueue(job("c")), 2);
        assert_eq!(receiver.len(), 3);

        for (expected_seq, name) in ["a", "b", "c"].iter().enumerate() {
            let envelope = receiver.dequeue(&shutdown).await.unwrap();
            assert_eq!(envelope.seq, expected_seq as u64);
            assert_eq!(envelope.job, job(name));
        }
        assert!(receiver.is_empty());
    }

    #[tokio::test]
    async fn test_no_deduplication() {
        let (sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        sender.enqueue(job("same"));
        sender.enqueue(job("same"));

        let first = receiver.dequeue(&shutdown).await.unwrap();
        let second = receiver.dequeue(&shutdown).await.unwrap();
        assert_eq!(first.job, second.job);
        assert_ne!(first.seq, second.seq);
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_dequeue() {
        let (_sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { receiver.dequeue(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dequeue did not observe cancellation")
            .unwrap();
        assert_eq!(result.unwrap_err(), QueueError::Closed);
    }

    #[tokio::test]
    async fn test_cancel_stops_handing_out_buffered_jobs() {
        let (sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        sender.enqueue(job("late"));
        shutdown.cancel();

        assert_eq!(receiver.dequeue(&shutdown).await.unwrap_err(), QueueError::Closed);
    }

    #[tokio::test]
    async fn test_closed_after_senders_dropped() {
        let (sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        sender.enqueue(job("last"));
        drop(sender);

        assert_eq!(receiver.dequeue(&shutdown).await.unwrap().seq, 0);
        assert_eq!(receiver.dequeue(&shutdown).await.unwrap_err(), QueueError::Closed);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let (sender, receiver) = channel();
        drop(receiver);

        assert!(sender.is_closed());
        // Still returns a sequence number instead of failing
        assert_eq!(sender.enqueue(job("orphan")), 0);
        assert_eq!(sender.enqueue(job("orphan")), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_get_unique_sequences() {
        let (sender, mut receiver) = channel();
        let shutdown = CancellationToken::new();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sender = sender.clone();
                tokio::spawn(async move {
                    for i in 0..50 {
                        sender.enqueue(job(&format!("p{p}-{i}")));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        drop(sender);

        let mut seqs = Vec::new();
        while let Ok(envelope) = receiver.dequeue(&shutdown).await {
            seqs.push(envelope.seq);
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (0..200).collect::<Vec<u64>>());
    }
}
