//! Fixed-size worker pool running one tick's jobs in parallel
//!
//! `run_tick` is the only synchronization barrier of a tick: it returns once
//! every job has either finished or faulted. Jobs share nothing but the
//! previous snapshot, which is immutable, so no locking is needed while they
//! run. Results come back in job order regardless of which worker ran what,
//! so the merged snapshot does not depend on the number of workers.

use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use shared::{EntityKey, TickSnapshot};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{JobFault, ServerError};
use crate::simulation::{Job, JobOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub key: EntityKey,
    pub outcome: Result<JobOutput, JobFault>,
}

pub struct JobScheduler {
    pool: ThreadPool,
    workers: usize,
}

impl JobScheduler {
    /// Builds the worker pool. Failure here is the one fatal startup error.
    pub fn new(workers: usize) -> Result<Self, ServerError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("tick-worker-{}", index))
            .build()?;
        debug!("Job scheduler started with {} workers", workers);
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs every job for `tick` against the previous snapshot and waits for all of them.
    pub fn run_tick(
        &self,
        jobs: &[Job],
        previous: &TickSnapshot,
        tick: u32,
        dt: f32,
    ) -> Vec<JobResult> {
        self.run_batch(jobs, |job| job.run(previous, tick, dt))
    }

    /// Runs `work` for each job on the pool, capturing faults and panics per job.
    pub fn run_batch<F>(&self, jobs: &[Job], work: F) -> Vec<JobResult>
    where
        F: Fn(&Job) -> Result<JobOutput, JobFault> + Sync,
    {
        let results: Vec<JobResult> = self.pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let key = job.key();
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(job))) {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(JobFault::Panicked {
                            key,
                            message: panic_message(payload),
                        }),
                    };
                    JobResult { key, outcome }
                })
                .collect()
        });

        for fault in results.iter().filter_map(|r| r.outcome.as_ref().err()) {
            warn!("Job fault: {}", fault);
        }
        results
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
