//! Bounded-concurrency batch execution
//!
//! Every job of a batch is spawned onto a [`JoinSet`] up front and waits for
//! a permit from a semaphore sized to the batch's concurrency, so at most
//! `max_concurrency` runners are active at once. Outcomes land in a slot
//! indexed by submission position. When the batch deadline fires the
//! remaining tasks are aborted, which also hands back their permits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, instrument, warn};

use crate::{BatchSummary, FetchError, FetchJob, FetchOutcome, JobRunner};

/// Runs batches of fetch jobs through one [`JobRunner`]
#[derive(Clone)]
pub struct FetchCoordinator {
    runner: Arc<dyn JobRunner>,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator").finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self { runner }
    }

    /// Run `jobs` with at most `max_concurrency` in flight and return one
    /// outcome per job, in submission order
    ///
    /// A job that exceeds its own timeout fails alone with
    /// [`FetchError::Timeout`]. Jobs still queued or running at `deadline`
    /// are cancelled and recorded as [`FetchError::BatchDeadlineExceeded`].
    /// A batch in which every job failed is still returned normally.
    /// A `max_concurrency` of zero is treated as one.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn run_batch(
        &self,
        jobs: Vec<FetchJob>,
        max_concurrency: usize,
        deadline: Instant,
    ) -> Vec<FetchOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let batch_started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut slots = Slots::new(&jobs, batch_started);
        let mut set = JoinSet::new();

        for (index, job) in jobs.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let runner = Arc::clone(&self.runner);
            let handle = set.spawn(async move {
                // The semaphore is never closed, so the permit is always granted.
                let _permit = semaphore.acquire_owned().await;
                let outcome = run_job(runner.as_ref(), job).await;
                (index, outcome)
            });
            slots.task_index.insert(handle.id(), index);
        }

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let mut deadline_hit = false;
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(joined) => slots.settle(joined),
                    None => break,
                },
                () = &mut sleep => {
                    warn!(pending = set.len(), "Batch deadline exceeded, cancelling pending jobs");
                    deadline_hit = true;
                    set.abort_all();
                    break;
                }
            }
        }

        if deadline_hit {
            // Wait for the aborts to land so every permit is back before returning.
            while let Some(joined) = set.join_next().await {
                slots.settle(joined);
            }
        }

        let filled = slots.outcomes;
        let cancelled_latency = batch_started.elapsed();
        let outcomes: Vec<FetchOutcome> = filled
            .into_iter()
            .zip(jobs)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| FetchOutcome {
                    job,
                    result: Err(FetchError::BatchDeadlineExceeded),
                    latency: cancelled_latency,
                })
            })
            .collect();

        let summary = BatchSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            cancelled = summary.cancelled,
            elapsed_ms = batch_started.elapsed().as_millis() as u64,
            "Fetch batch finished"
        );
        outcomes
    }

    /// [`run_batch`](Self::run_batch) with a deadline relative to now
    pub async fn run_batch_within(
        &self,
        jobs: Vec<FetchJob>,
        max_concurrency: usize,
        batch_timeout: Duration,
    ) -> Vec<FetchOutcome> {
        let now = Instant::now();
        let deadline = now
            .checked_add(batch_timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.run_batch(jobs, max_concurrency, deadline).await
    }
}

/// Deadline used when the requested batch timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Outcome slots of one batch, indexed by submission position
struct Slots<'a> {
    jobs: &'a [FetchJob],
    outcomes: Vec<Option<FetchOutcome>>,
    task_index: HashMap<Id, usize>,
    started: Instant,
}

impl<'a> Slots<'a> {
    fn new(jobs: &'a [FetchJob], started: Instant) -> Self {
        Self {
            jobs,
            outcomes: vec![None; jobs.len()],
            task_index: HashMap::with_capacity(jobs.len()),
            started,
        }
    }

    /// Store a joined task's outcome; a panic fails only its own job
    fn settle(&mut self, joined: std::result::Result<(usize, FetchOutcome), JoinError>) {
        match joined {
            Ok((index, outcome)) => self.outcomes[index] = Some(outcome),
            Err(err) if err.is_panic() => {
                if let Some(&index) = self.task_index.get(&err.id()) {
                    warn!(job = %self.jobs[index].target, error = %err, "Fetch job panicked");
                    self.outcomes[index] = Some(FetchOutcome {
                        job: self.jobs[index].clone(),
                        result: Err(FetchError::Failed(format!("job panicked: {err}"))),
                        latency: self.started.elapsed(),
                    });
                }
            }
            // Aborted at the deadline; left empty and reported as cancelled
            Err(_) => {}
        }
    }
}

async fn run_job(runner: &dyn JobRunner, job: FetchJob) -> FetchOutcome {
    let started = Instant::now();
    let result = match timeout(job.per_job_timeout, runner.run(&job.target, job.per_job_timeout)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(job.per_job_timeout)),
    };
    let latency = started.elapsed();

    match &result {
        Ok(payload) => debug!(job = %job.target, bytes = payload.len(), ?latency, "Fetch job succeeded"),
        Err(err) => debug!(job = %job.target, error = %err, ?latency, "Fetch job failed"),
    }

    FetchOutcome {
        job,
        result,
        latency,
    }
}
