use std::{sync::Arc, time::Duration};

use tokio::{
  sync::{Mutex, OwnedMutexGuard},
  time::Instant,
};

/// Advisory, process-wide mutual exclusion: one mutex shared by every
/// schedule in the process. Not an OS-level lock: only serializes runs
/// started from within this process, per spec.md's single-process
/// scheduling model, where at most one run's quiescence-through-finalizer
/// region may execute at a time regardless of which schedule started it.
pub struct LockRegistry {
  mutex: Arc<Mutex<()>>,
}

impl Default for LockRegistry {
  fn default() -> Self {
    Self {
      mutex: Arc::new(Mutex::new(())),
    }
  }
}

#[derive(Debug, thiserror::Error)]
#[error("lock not acquired for schedule '{schedule}' within {timeout:?}")]
pub struct LockTimeoutError {
  pub schedule: String,
  pub timeout: Duration,
}

/// Held for the duration of the critical section. Dropping it releases
/// the lock; this is the outermost finalizer in the orchestrator pipeline.
pub struct LockGuard {
  _guard: OwnedMutexGuard<()>,
  pub acquired_at: Instant,
}

impl LockRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Waits up to `timeout` to acquire the process-wide lock. `schedule`
  /// identifies the caller only for the timeout error and logs; it does
  /// not select a separate mutex.
  pub async fn acquire(
    &self,
    schedule: &str,
    timeout: Duration,
  ) -> Result<LockGuard, LockTimeoutError> {
    match tokio::time::timeout(timeout, self.mutex.clone().lock_owned()).await {
      Ok(guard) => Ok(LockGuard {
        _guard: guard,
        acquired_at: Instant::now(),
      }),
      Err(_) => Err(LockTimeoutError {
        schedule: schedule.to_string(),
        timeout,
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn second_concurrent_acquire_times_out() {
    let registry = Arc::new(LockRegistry::new());
    let guard = registry.acquire("daily", Duration::from_secs(5)).await;
    assert!(guard.is_ok());

    let registry2 = registry.clone();
    let result = registry2
      .acquire("daily", Duration::from_millis(50))
      .await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn different_schedules_still_contend_the_same_lock() {
    let registry = Arc::new(LockRegistry::new());
    let a = registry.acquire("a", Duration::from_secs(5)).await;
    assert!(a.is_ok());

    let registry2 = registry.clone();
    let b = registry2.acquire("b", Duration::from_millis(50)).await;
    assert!(b.is_err());
  }

  #[tokio::test]
  async fn lock_is_released_on_guard_drop() {
    let registry = Arc::new(LockRegistry::new());
    {
      let _guard =
        registry.acquire("x", Duration::from_secs(5)).await.unwrap();
    }
    let result = registry.acquire("x", Duration::from_millis(50)).await;
    assert!(result.is_ok());
  }
}
