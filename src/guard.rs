//! In-flight guards: at most one running instance per operation class

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Flag held while an operation runs.
///
/// `try_acquire` hands out a permit that clears the flag when dropped, so the
/// flag is released on every exit path of the holder.
#[derive(Debug, Clone)]
pub struct InFlight {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new(name: &'static str) -> Self {
        Self { name, busy: Arc::new(AtomicBool::new(false)) }
    }

    pub fn try_acquire(&self) -> Option<InFlightPermit> {
        match self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                debug!("{} started", self.name);
                Some(InFlightPermit { name: self.name, busy: self.busy.clone() })
            }
            Err(_) => {
                debug!("{} already in flight", self.name);
                None
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Debug)]
pub struct InFlightPermit {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        debug!("{} finished", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder() {
        let guard = InFlight::new("submit");
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_early_return() {
        fn fails(guard: &InFlight) -> Result<(), &'static str> {
            let _permit = guard.try_acquire().ok_or("busy")?;
            Err("boom")
        }

        let guard = InFlight::new("reveal");
        assert_eq!(fails(&guard), Err("boom"));
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_released_on_panic() {
        let guard = InFlight::new("reveal");
        let cloned = guard.clone();
        let result = std::panic::catch_unwind(move || {
            let _permit = cloned.try_acquire().unwrap();
            panic!("step failed");
        });
        assert!(result.is_err());
        assert!(!guard.is_busy());
    }
}
