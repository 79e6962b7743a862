//! Named-condition rendezvous between thread groups.
//!
//! A condition is a named integer. One group `set`s it; another `wait`s until
//! it reaches a value or the timeout expires. Values only matter relative to
//! each other, so `wait` is satisfied by any value `>=` the requested one.

use crate::error::{DriverError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub trait SyncService: Send + Sync {
    /// Create the condition at 0, or reset it if it already exists.
    fn init(&self, condition: &str) -> Result<()>;
    /// Set the value, creating the condition if needed, and wake waiters.
    fn set(&self, condition: &str, value: i64) -> Result<()>;
    /// Block until `condition >= value`. Expiry is an error.
    fn wait(&self, condition: &str, value: i64, timeout: Duration) -> Result<()>;
    fn reset(&self, condition: &str) -> Result<()>;
    fn delete(&self, condition: &str) -> Result<()>;
    fn get(&self, condition: &str) -> Result<i64>;
}

// ---------------------------------------------------------------------------
// InProcessSync
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InProcessSync {
    conditions: Mutex<HashMap<String, i64>>,
    changed: Condvar,
}

impl InProcessSync {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncService for InProcessSync {
    fn init(&self, condition: &str) -> Result<()> {
        self.conditions.lock().insert(condition.to_string(), 0);
        self.changed.notify_all();
        Ok(())
    }

    fn set(&self, condition: &str, value: i64) -> Result<()> {
        self.conditions.lock().insert(condition.to_string(), value);
        self.changed.notify_all();
        Ok(())
    }

    fn wait(&self, condition: &str, value: i64, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut conditions = self.conditions.lock();
        loop {
            // A condition that does not exist yet may be created by another group.
            if conditions.get(condition).is_some_and(|v| *v >= value) {
                return Ok(());
            }
            if self.changed.wait_until(&mut conditions, deadline).timed_out() {
                if conditions.get(condition).is_some_and(|v| *v >= value) {
                    return Ok(());
                }
                return Err(DriverError::SyncTimeout {
                    condition: condition.to_string(),
                    value,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    fn reset(&self, condition: &str) -> Result<()> {
        let mut conditions = self.conditions.lock();
        match conditions.get_mut(condition) {
            Some(v) => {
                *v = 0;
                Ok(())
            }
            None => Err(DriverError::UnknownCondition(condition.to_string())),
        }
    }

    fn delete(&self, condition: &str) -> Result<()> {
        self.conditions
            .lock()
            .remove(condition)
            .map(|_| ())
            .ok_or_else(|| DriverError::UnknownCondition(condition.to_string()))
    }

    fn get(&self, condition: &str) -> Result<i64> {
        self.conditions
            .lock()
            .get(condition)
            .copied()
            .ok_or_else(|| DriverError::UnknownCondition(condition.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_then_get() {
        let sync = InProcessSync::new();
        sync.init("ready").unwrap();
        assert_eq!(sync.get("ready").unwrap(), 0);
        sync.set("ready", 3).unwrap();
        assert_eq!(sync.get("ready").unwrap(), 3);
        sync.reset("ready").unwrap();
        assert_eq!(sync.get("ready").unwrap(), 0);
    }

    #[test]
    fn delete_removes_condition() {
        let sync = InProcessSync::new();
        sync.set("gone", 1).unwrap();
        sync.delete("gone").unwrap();
        assert!(matches!(
            sync.get("gone"),
            Err(DriverError::UnknownCondition(_))
        ));
        assert!(sync.delete("gone").is_err());
        assert!(sync.reset("gone").is_err());
    }

    #[test]
    fn wait_returns_once_another_thread_sets() {
        let sync = Arc::new(InProcessSync::new());
        let setter = Arc::clone(&sync);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            setter.set("go", 1).unwrap();
        });
        sync.wait("go", 1, Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn wait_accepts_higher_value() {
        let sync = InProcessSync::new();
        sync.set("count", 5).unwrap();
        sync.wait("count", 2, Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn wait_times_out() {
        let sync = InProcessSync::new();
        sync.init("never").unwrap();
        let err = sync
            .wait("never", 1, Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, DriverError::SyncTimeout { .. }));
    }
}
