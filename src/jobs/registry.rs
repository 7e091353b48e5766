//! Per-session job registry
//!
//! The only job state shared across tasks. Registration and lookup go
//! through an internal lock; each job mutates its own fields.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::job::BackgroundJob;
use super::report::JobSummary;
use crate::core::{GuardError, GuardResult};

/// Table of in-flight and completed jobs for one session
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Arc<BackgroundJob>>>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, returning the shared handle
    pub async fn register(&self, job: BackgroundJob) -> Arc<BackgroundJob> {
        let job = Arc::new(job);
        tracing::debug!("[JobRegistry] Registered job {} ({})", job.id(), job.kind());
        self.jobs
            .write()
            .await
            .insert(job.id().to_string(), job.clone());
        job
    }

    /// Look up a job by ID
    pub async fn get(&self, job_id: &str) -> GuardResult<Arc<BackgroundJob>> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| GuardError::JobNotFound(job_id.to_string()))
    }

    /// Every job, oldest first
    pub async fn list(&self) -> Vec<Arc<BackgroundJob>> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.start_time()
                .cmp(&b.start_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        jobs
    }

    /// Summaries of every job, oldest first
    pub async fn summaries(&self) -> Vec<JobSummary> {
        self.list().await.iter().map(|job| job.summary()).collect()
    }

    /// Jobs that have not completed
    pub async fn running(&self) -> Vec<Arc<BackgroundJob>> {
        self.list()
            .await
            .into_iter()
            .filter(|job| !job.is_completed())
            .collect()
    }

    /// Remove completed jobs, returning how many were removed
    pub async fn prune_completed(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_completed());
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobKind;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = JobRegistry::new();
        let job = registry
            .register(BackgroundJob::new(JobKind::Shell, "ls", "/tmp", 10))
            .await;

        let found = registry.get(job.id()).await.unwrap();
        assert!(Arc::ptr_eq(&job, &found));
        assert_eq!(registry.len().await, 1);

        let err = registry.get("nope").await.unwrap_err();
        assert!(matches!(err, GuardError::JobNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_list_sorted_and_prune() {
        let registry = JobRegistry::new();
        let first = registry
            .register(BackgroundJob::new(JobKind::Shell, "a", "/", 10))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = registry
            .register(BackgroundJob::new(JobKind::Sandbox, "b", "/", 10))
            .await;

        let ids: Vec<_> = registry.list().await.iter().map(|j| j.id().to_string()).collect();
        assert_eq!(ids, vec![first.id().to_string(), second.id().to_string()]);

        first.complete(0);
        assert_eq!(registry.running().await.len(), 1);
        assert_eq!(registry.prune_completed().await, 1);
        assert_eq!(registry.len().await, 1);
    }
}
