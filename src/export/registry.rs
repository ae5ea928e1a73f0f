//! Registry of running export jobs
//!
//! At most one job exists per [`SourceKey`]. The owning invocation holds a
//! [`RegistryLease`] that removes the entry when dropped, so the key becomes
//! free again however the export ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::source::SourceKey;

use super::job::{ExportJob, ExportJobStatus};

/// Map of source keys to their single active job
#[derive(Debug, Default)]
pub struct ExportJobRegistry {
    jobs: Mutex<HashMap<SourceKey, ExportJob>>,
}

impl ExportJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<SourceKey, ExportJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the job registered for `key`, starting a new one if none exists
    ///
    /// # Returns
    /// * `(ExportJob, bool)` - The job and whether it was created by this call
    pub fn get_or_start(&self, key: &SourceKey) -> (ExportJob, bool) {
        let mut jobs = self.jobs();
        if let Some(job) = jobs.get(key) {
            return (job.clone(), false);
        }

        let job = ExportJob::new(key.clone());
        jobs.insert(key.clone(), job.clone());
        debug!("Registered export job for {}", key);
        (job, true)
    }

    /// Remove the entry for `key`
    pub fn remove(&self, key: &SourceKey) {
        if self.jobs().remove(key).is_some() {
            debug!("Removed export job for {}", key);
        }
    }

    /// Look up the job registered for `key`
    pub fn try_get(&self, key: &SourceKey) -> Option<ExportJob> {
        self.jobs().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Start a job and tie its registry entry to the returned lease
    ///
    /// Returns the existing job as the error when `key` is already taken.
    pub(crate) fn start(self: &Arc<Self>, key: &SourceKey) -> Result<RegistryLease, ExportJob> {
        let (job, is_new) = self.get_or_start(key);
        if !is_new {
            return Err(job);
        }
        Ok(RegistryLease {
            registry: Arc::clone(self),
            key: key.clone(),
            job,
        })
    }
}

/// Ownership of a registry entry, released on drop
#[derive(Debug)]
pub(crate) struct RegistryLease {
    registry: Arc<ExportJobRegistry>,
    key: SourceKey,
    job: ExportJob,
}

impl RegistryLease {
    pub(crate) fn job(&self) -> &ExportJob {
        &self.job
    }
}

impl Drop for RegistryLease {
    fn drop(&mut self) {
        // An owner that never reached a terminal status was dropped or panicked
        if self.job.status() == ExportJobStatus::Running {
            if std::thread::panicking() {
                self.job.set_failed();
            } else {
                self.job.set_canceled();
            }
        }
        self.registry.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> SourceKey {
        SourceKey::Report(id.to_string())
    }

    #[test]
    fn test_get_or_start_returns_existing_job() {
        let registry = ExportJobRegistry::new();
        let (first, is_new) = registry.get_or_start(&key("a"));
        assert!(is_new);

        let (second, is_new) = registry.get_or_start(&key("a"));
        assert!(!is_new);
        assert!(first.same_job(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_report_and_dataset_keys_do_not_collide() {
        let registry = ExportJobRegistry::new();
        registry.get_or_start(&SourceKey::Report("x".into()));
        let (_, is_new) = registry.get_or_start(&SourceKey::Dataset("x".into()));
        assert!(is_new);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_and_try_get() {
        let registry = ExportJobRegistry::new();
        assert!(registry.try_get(&key("a")).is_none());

        registry.get_or_start(&key("a"));
        assert!(registry.try_get(&key("a")).is_some());

        registry.remove(&key("a"));
        registry.remove(&key("a"));
        assert!(registry.try_get(&key("a")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lease_removes_entry_on_drop() {
        let registry = Arc::new(ExportJobRegistry::new());
        let lease = registry.start(&key("a")).unwrap();
        assert!(registry.start(&key("a")).is_err());
        assert!(registry.try_get(&key("a")).unwrap().same_job(lease.job()));

        drop(lease);
        assert!(registry.is_empty());
        assert!(registry.start(&key("a")).is_ok());
    }

    #[test]
    fn test_lease_released_on_panic() {
        let registry = Arc::new(ExportJobRegistry::new());
        let inner = Arc::clone(&registry);
        let observed = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&observed);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let lease = inner.start(&key("a")).unwrap();
            *seen.lock().unwrap() = Some(lease.job().clone());
            panic!("pipeline panicked");
        }));
        assert!(result.is_err());
        assert!(registry.is_empty());

        let job = observed.lock().unwrap().take().unwrap();
        assert_eq!(job.status(), ExportJobStatus::Failed);
    }

    #[test]
    fn test_dropped_lease_cancels_running_job() {
        let registry = Arc::new(ExportJobRegistry::new());
        let lease = registry.start(&key("a")).unwrap();
        let job = lease.job().clone();

        drop(lease);
        assert_eq!(job.status(), ExportJobStatus::Canceled);
    }

    #[test]
    fn test_dropped_lease_keeps_terminal_status() {
        let registry = Arc::new(ExportJobRegistry::new());
        let lease = registry.start(&key("a")).unwrap();
        let job = lease.job().clone();
        job.set_completed();

        drop(lease);
        assert_eq!(job.status(), ExportJobStatus::Completed);
    }

    #[test]
    fn test_concurrent_starts_create_one_job() {
        let registry = Arc::new(ExportJobRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_start(&key("a")).1)
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();
        assert_eq!(created, 1);
    }
}
