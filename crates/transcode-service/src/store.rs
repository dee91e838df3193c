//! In-memory job table.
//!
//! Jobs are keyed by id behind one `RwLock`. The lock is only held for
//! map operations, never across a transform stage.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::{Job, JobState, JobUpdate, RejectedUpdate};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

/// Outcome of [`JobStore::update`].
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Rejected(RejectedUpdate),
    /// The job was reclaimed (download, delete, or TTL) meanwhile.
    Gone,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    /// A snapshot of the job.
    pub async fn get(&self, id: &str) -> LoopcastResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| LoopcastError::job_not_found(id))
    }

    pub async fn update(&self, id: &str, update: JobUpdate) -> UpdateOutcome {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            None => UpdateOutcome::Gone,
            Some(job) => match job.apply(update) {
                Ok(()) => UpdateOutcome::Applied,
                Err(rejected) => UpdateOutcome::Rejected(rejected),
            },
        }
    }

    /// Remove and return a completed job in one step, so two concurrent
    /// downloads cannot both succeed.
    pub async fn take_completed(&self, id: &str) -> LoopcastResult<Job> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id).map(|job| job.state) {
            None => Err(LoopcastError::job_not_found(id)),
            Some(JobState::Completed) => jobs
                .remove(id)
                .ok_or_else(|| LoopcastError::job_not_found(id)),
            Some(_) => Err(LoopcastError::not_ready(id)),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.write().await.remove(id)
    }

    /// Remove every job older than `ttl` at `now`, whatever its state.
    pub async fn drain_expired(&self, now: Instant, ttl: Duration) -> Vec<Job> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<String> = jobs
            .values()
            .filter(|job| job.is_expired(now, ttl))
            .map(|job| job.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| jobs.remove(id))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
