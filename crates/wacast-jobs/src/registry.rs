//! In-process guard against running two jobs of the same kind.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::Notify;
use wacast_core::error::WacastError;

use crate::checkpoint::JobKind;

#[derive(Debug, Default)]
struct StopInner {
    flag: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag that can also be awaited.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake anyone waiting in [`StopSignal::stopped`].
    pub fn stop(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`StopSignal::stop`] has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent stop() is not missed.
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks which job kinds are running and hands out their stop signals.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobKind, StopSignal>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobKind, StopSignal>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `kind`. Fails with `AlreadyRunning` while another lease holds it.
    pub fn acquire(self: &Arc<Self>, kind: JobKind) -> Result<JobLease, WacastError> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&kind) {
            return Err(WacastError::AlreadyRunning(kind.label().to_string()));
        }
        let signal = StopSignal::new();
        jobs.insert(kind, signal.clone());
        Ok(JobLease {
            registry: Arc::clone(self),
            kind,
            signal,
        })
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.jobs().contains_key(&kind)
    }

    /// Running job kinds, in a stable order.
    pub fn running(&self) -> Vec<JobKind> {
        let jobs = self.jobs();
        JobKind::ALL
            .into_iter()
            .filter(|k| jobs.contains_key(k))
            .collect()
    }

    /// Signal the job of `kind` to stop. Returns false if none is running.
    pub fn stop(&self, kind: JobKind) -> bool {
        match self.jobs().get(&kind) {
            Some(signal) => {
                signal.stop();
                true
            }
            None => false,
        }
    }

    /// Signal every running job. Returns the kinds that were signalled.
    pub fn stop_all(&self) -> Vec<JobKind> {
        let jobs = self.jobs();
        let mut stopped = Vec::new();
        for kind in JobKind::ALL {
            if let Some(signal) = jobs.get(&kind) {
                signal.stop();
                stopped.push(kind);
            }
        }
        stopped
    }

    fn release(&self, kind: JobKind) {
        self.jobs().remove(&kind);
    }
}

/// Proof of ownership of a job kind. Dropping it frees the kind.
#[derive(Debug)]
pub struct JobLease {
    registry: Arc<JobRegistry>,
    kind: JobKind,
    signal: StopSignal,
}

impl JobLease {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn signal(&self) -> &StopSignal {
        &self.signal
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.registry.release(self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let registry = Arc::new(JobRegistry::new());
        let lease = registry.acquire(JobKind::VerifyNumbers).unwrap();
        assert!(matches!(
            registry.acquire(JobKind::VerifyNumbers),
            Err(WacastError::AlreadyRunning(_))
        ));
        assert!(registry.is_running(JobKind::VerifyNumbers));

        let other = registry.acquire(JobKind::BroadcastMessage).unwrap();
        assert_eq!(
            registry.running(),
            vec![JobKind::VerifyNumbers, JobKind::BroadcastMessage]
        );

        drop(lease);
        assert!(!registry.is_running(JobKind::VerifyNumbers));
        assert!(registry.acquire(JobKind::VerifyNumbers).is_ok());
        drop(other);
        assert!(registry.running().is_empty());
    }

    #[test]
    fn test_stop_reaches_lease_signal() {
        let registry = Arc::new(JobRegistry::new());
        assert!(!registry.stop(JobKind::BroadcastMessage));

        let lease = registry.acquire(JobKind::BroadcastMessage).unwrap();
        assert!(!lease.signal().is_stopped());
        assert!(registry.stop(JobKind::BroadcastMessage));
        assert!(lease.signal().is_stopped());
    }

    #[test]
    fn test_stop_all() {
        let registry = Arc::new(JobRegistry::new());
        let a = registry.acquire(JobKind::VerifyNumbers).unwrap();
        let b = registry.acquire(JobKind::BroadcastMessage).unwrap();
        assert_eq!(registry.stop_all().len(), 2);
        assert!(a.signal().is_stopped() && b.signal().is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_wakes_waiter() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.stop();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_when_already_set() {
        let signal = StopSignal::new();
        signal.stop();
        tokio::time::timeout(Duration::from_millis(100), signal.stopped())
            .await
            .unwrap();
    }
}
