//! Session concurrency guards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::AiError;

/// Guard that clears the `busy` flag on drop, ensuring it is always released
/// even if the stream is abandoned or an early return occurs.
///
/// The flag is shared so the guard can travel with a spawned generation.
pub(crate) struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    /// Attempt to acquire the busy lock. Returns `Err` if already busy.
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, AiError> {
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(AiError::Busy);
        }
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Fail with `Busy` while a generation holds the flag.
pub(crate) fn ensure_idle(flag: &AtomicBool) -> Result<(), AiError> {
    if flag.load(Ordering::Acquire) {
        Err(AiError::Busy)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = BusyGuard::acquire(&flag).unwrap();
        assert!(matches!(BusyGuard::acquire(&flag), Err(AiError::Busy)));
        assert!(ensure_idle(&flag).is_err());
        drop(guard);
        assert!(ensure_idle(&flag).is_ok());
        assert!(BusyGuard::acquire(&flag).is_ok());
    }
}
