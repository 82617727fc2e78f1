//! Requeue scheduler: the work-queue loop that drives the reconciler.
//!
//! Keys arrive from the store's change stream, from the initial resync list
//! and from delayed requeues. A key is queued at most once, and never runs
//! two cycles at the same time: a key notified while its cycle is in flight
//! is marked dirty and queued again when the cycle ends.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use legion_state::{ObjectKey, ResourceEvent, ResourceKind};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::Result;
use crate::reconciler::{Reconcile, ReconcileOutcome};

/// Deployment key a change notification should wake, if any.
///
/// Dependents share their owner's name, so their events map to the owner's
/// key directly. Workload changes are picked up by the fixed requeue.
pub fn key_for_event(event: &ResourceEvent) -> Option<ObjectKey> {
    match event.kind {
        ResourceKind::ModelDeployment
        | ResourceKind::ServingConfiguration
        | ResourceKind::ModelRoute
        | ResourceKind::AuthPolicy => Some(event.key.clone()),
        ResourceKind::Workload => None,
    }
}

/// Pending, running and dirty keys.
#[derive(Debug, Default)]
struct WorkQueue {
    pending: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    /// Consecutive failed cycles per key
    failures: HashMap<ObjectKey, u32>,
    /// Earliest outstanding delayed requeue per key
    delayed: HashMap<ObjectKey, Instant>,
}

impl WorkQueue {
    fn enqueue(&mut self, key: ObjectKey) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.pending.push_back(key);
        }
    }

    fn next(&mut self) -> Option<ObjectKey> {
        let key = self.pending.pop_front()?;
        self.queued.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }

    /// Mark `key` finished; returns whether it was re-queued as dirty.
    fn finish(&mut self, key: &ObjectKey) -> bool {
        self.in_flight.remove(key);
        if self.dirty.remove(key) {
            self.enqueue(key.clone());
            true
        } else {
            false
        }
    }

    /// Record a delayed requeue; false if an earlier one is outstanding.
    fn defer(&mut self, key: &ObjectKey, deadline: Instant) -> bool {
        match self.delayed.get(key) {
            Some(existing) if *existing <= deadline => false,
            _ => {
                self.delayed.insert(key.clone(), deadline);
                true
            }
        }
    }

    /// A timer fired; true if it is the one currently on record.
    fn expire(&mut self, key: &ObjectKey, deadline: Instant) -> bool {
        if self.delayed.get(key) == Some(&deadline) {
            self.delayed.remove(key);
            true
        } else {
            false
        }
    }
}

type CycleResult = (ObjectKey, std::result::Result<Result<ReconcileOutcome>, JoinError>);

/// Drives a [`Reconcile`] implementation from change notifications.
pub struct RequeueScheduler<R> {
    reconciler: Arc<R>,
    config: SchedulerConfig,
}

impl<R: Reconcile> RequeueScheduler<R> {
    pub fn new(reconciler: Arc<R>, config: SchedulerConfig) -> Self {
        Self { reconciler, config }
    }

    /// Run until `shutdown` resolves, then wait for in-flight cycles.
    ///
    /// `initial` seeds the queue (startup resync). The loop keeps running
    /// after `events` ends so delayed requeues still fire.
    pub async fn run<E, F>(self, initial: Vec<ObjectKey>, events: E, shutdown: F)
    where
        E: Stream<Item = ResourceEvent> + Send + Unpin,
        F: Future<Output = ()>,
    {
        let mut queue = WorkQueue::default();
        for key in initial {
            queue.enqueue(key);
        }

        let (delay_tx, mut delay_rx) = mpsc::unbounded_channel::<(ObjectKey, Instant)>();
        let mut running = FuturesUnordered::new();
        let mut events = events;
        let mut events_open = true;
        tokio::pin!(shutdown);

        info!(
            max_concurrent = self.config.max_concurrent_reconciles,
            "scheduler started"
        );
        loop {
            while running.len() < self.config.max_concurrent_reconciles.max(1) {
                let Some(key) = queue.next() else { break };
                running.push(self.spawn_cycle(key));
            }

            tokio::select! {
                _ = &mut shutdown => break,
                event = events.next(), if events_open => match event {
                    Some(event) => {
                        if let Some(key) = key_for_event(&event) {
                            debug!(kind = %event.kind, key = %key, "change notification");
                            queue.enqueue(key);
                        }
                    }
                    None => {
                        debug!("change stream closed");
                        events_open = false;
                    }
                },
                Some((key, deadline)) = delay_rx.recv() => {
                    if queue.expire(&key, deadline) {
                        queue.enqueue(key);
                    }
                }
                Some((key, joined)) = running.next(), if !running.is_empty() => {
                    self.complete(&mut queue, key, joined, &delay_tx);
                }
            }
        }

        info!(in_flight = running.len(), "scheduler stopping");
        while let Some((key, joined)) = running.next().await {
            if let Err(err) = flatten(joined) {
                warn!(key = %key, error = %err, "cycle failed during shutdown");
            }
        }
    }

    fn spawn_cycle(&self, key: ObjectKey) -> impl Future<Output = CycleResult> {
        let reconciler = Arc::clone(&self.reconciler);
        let task_key = key.clone();
        let handle = tokio::spawn(async move { reconciler.reconcile(&task_key).await });
        async move { (key, handle.await) }
    }

    fn complete(
        &self,
        queue: &mut WorkQueue,
        key: ObjectKey,
        joined: std::result::Result<Result<ReconcileOutcome>, JoinError>,
        delay_tx: &mpsc::UnboundedSender<(ObjectKey, Instant)>,
    ) {
        let retry_after = match joined {
            Ok(Ok(outcome)) => {
                queue.failures.remove(&key);
                outcome.requeue_after
            }
            Ok(Err(err)) if err.is_conflict() => {
                debug!(key = %key, "stale write, retrying cycle");
                Some(self.config.conflict_retry())
            }
            Ok(Err(err)) => Some(self.back_off(queue, &key, &err)),
            Err(panicked) => Some(self.back_off(queue, &key, &panicked)),
        };

        if queue.finish(&key) {
            return;
        }
        if let Some(delay) = retry_after {
            let deadline = Instant::now() + delay;
            if queue.defer(&key, deadline) {
                let tx = delay_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    let _ = tx.send((key, deadline));
                });
            }
        }
    }

    fn back_off(
        &self,
        queue: &mut WorkQueue,
        key: &ObjectKey,
        err: &dyn std::fmt::Display,
    ) -> Duration {
        let failures = queue.failures.entry(key.clone()).or_insert(0);
        *failures += 1;
        let delay = self.config.error_backoff(*failures);
        warn!(
            key = %key,
            failures = *failures,
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "cycle failed"
        );
        delay
    }
}

fn flatten(
    joined: std::result::Result<Result<ReconcileOutcome>, JoinError>,
) -> std::result::Result<ReconcileOutcome, String> {
    match joined {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(err.to_string()),
    }
}
