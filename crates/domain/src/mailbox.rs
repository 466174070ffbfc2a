//! Per-aggregate command serialization.
//!
//! Commands addressed to the same order must never interleave, while
//! commands for different orders run in parallel. The mailbox keeps one
//! logical worker per aggregate id, fed by an unbounded mpsc queue; each
//! worker runs its jobs to completion in arrival order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::AggregateId;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::DomainError;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Serialized executor keyed by aggregate identity.
///
/// Workers are spawned lazily on the first command for an order and live
/// until [`CommandMailbox::shutdown`] drops their senders.
#[derive(Clone, Default)]
pub struct CommandMailbox {
    workers: Arc<DashMap<AggregateId, mpsc::UnboundedSender<Job>>>,
}

impl CommandMailbox {
    pub fn new() -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Runs `fut` on the worker owning `aggregate_id`, waiting for its
    /// result. Jobs enqueued for the same id complete in submission order.
    pub async fn run<T, F>(&self, aggregate_id: AggregateId, fut: F) -> Result<T, DomainError>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut job: Job = Box::pin(async move {
            let _ = reply_tx.send(fut.await);
        });

        loop {
            let sender = self
                .workers
                .entry(aggregate_id)
                .or_insert_with(|| self.spawn_worker(aggregate_id))
                .clone();

            match sender.send(job) {
                Ok(()) => break,
                Err(mpsc::error::SendError(rejected)) => {
                    // The worker exited between lookup and send. Drop the
                    // stale sender and retry against a fresh worker.
                    self.workers
                        .remove_if(&aggregate_id, |_, s| s.same_channel(&sender));
                    job = rejected;
                }
            }
        }

        reply_rx
            .await
            .map_err(|_| DomainError::WorkerStopped(aggregate_id))
    }

    /// Number of live per-order workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Drops all worker senders. In-flight jobs drain; new commands spawn
    /// fresh workers.
    pub fn shutdown(&self) {
        self.workers.clear();
    }

    fn spawn_worker(&self, aggregate_id: AggregateId) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            tracing::debug!(aggregate_id = %aggregate_id, "command worker started");
            while let Some(job) = rx.recv().await {
                job.await;
            }
            tracing::debug!(aggregate_id = %aggregate_id, "command worker stopped");
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn returns_job_result() {
        let mailbox = CommandMailbox::new();
        let result = mailbox.run(AggregateId::new(), async { 41 + 1 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn same_aggregate_jobs_run_in_order() {
        let mailbox = CommandMailbox::new();
        let aggregate_id = AggregateId::new();
        let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let mailbox = mailbox.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                mailbox
                    .run(aggregate_id, async move {
                        // A slow early job must still finish before later ones.
                        if i == 0 {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                        }
                        log.lock().await.push(i);
                    })
                    .await
                    .unwrap();
            }));
            // Submission order is deterministic per handle.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().await;
        assert_eq!(*log, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn different_aggregates_run_in_parallel() {
        let mailbox = CommandMailbox::new();
        let started = Arc::new(AtomicUsize::new(0));

        let a = AggregateId::new();
        let b = AggregateId::new();

        let started_a = started.clone();
        let fut_a = mailbox.run(a, async move {
            started_a.fetch_add(1, Ordering::SeqCst);
            while started_a.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        });
        let started_b = started.clone();
        let fut_b = mailbox.run(b, async move {
            started_b.fetch_add(1, Ordering::SeqCst);
            while started_b.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        });

        // Both complete only if they overlap; a serialized mailbox would
        // deadlock here, so guard with a timeout.
        tokio::time::timeout(Duration::from_secs(5), async {
            let (ra, rb) = tokio::join!(fut_a, fut_b);
            ra.unwrap();
            rb.unwrap();
        })
        .await
        .unwrap();

        assert_eq!(mailbox.worker_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_then_new_command_respawns_worker() {
        let mailbox = CommandMailbox::new();
        let aggregate_id = AggregateId::new();

        mailbox.run(aggregate_id, async {}).await.unwrap();
        assert_eq!(mailbox.worker_count(), 1);

        mailbox.shutdown();
        assert_eq!(mailbox.worker_count(), 0);

        let result = mailbox.run(aggregate_id, async { 7 }).await.unwrap();
        assert_eq!(result, 7);
        assert_eq!(mailbox.worker_count(), 1);
    }
}
