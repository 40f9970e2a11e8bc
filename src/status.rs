//! Transient operation status shown to the user
//!
//! One slot for the whole process. Any pipeline may publish; the last
//! publish wins and nothing is queued. Success and error states reset to
//! `Idle` after their display time; a newer publish cancels the pending reset.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Idle,
    Pending(String),
    Success(String),
    Error(String),
}

impl OperationStatus {
    pub fn message(&self) -> Option<&str> {
        match self {
            OperationStatus::Idle => None,
            OperationStatus::Pending(m)
            | OperationStatus::Success(m)
            | OperationStatus::Error(m) => Some(m),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OperationStatus::Error(_))
    }
}

#[derive(Default)]
struct ResetTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

pub struct StatusBoard {
    tx: Arc<watch::Sender<OperationStatus>>,
    timer: Arc<Mutex<ResetTimer>>,
    success_ttl: Duration,
    error_ttl: Duration,
}

impl StatusBoard {
    pub fn new(success_ttl: Duration, error_ttl: Duration) -> Self {
        let (tx, _) = watch::channel(OperationStatus::Idle);
        Self {
            tx: Arc::new(tx),
            timer: Arc::new(Mutex::new(ResetTimer::default())),
            success_ttl,
            error_ttl,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> OperationStatus {
        self.tx.borrow().clone()
    }

    /// Progress message; stays until replaced
    pub fn pending(&self, message: impl Into<String>) {
        let message = message.into();
        info!("⏳ {}", message);
        self.publish(OperationStatus::Pending(message), None);
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("✓ {}", message);
        self.publish(OperationStatus::Success(message), Some(self.success_ttl));
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("✗ {}", message);
        self.publish(OperationStatus::Error(message), Some(self.error_ttl));
    }

    /// Hide whatever is showing
    pub fn dismiss(&self) {
        self.publish(OperationStatus::Idle, None);
    }

    fn publish(&self, status: OperationStatus, ttl: Option<Duration>) {
        let mut timer = match self.timer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        timer.generation = timer.generation.wrapping_add(1);
        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }

        self.tx.send_replace(status);

        if let Some(ttl) = ttl {
            let generation = timer.generation;
            let tx = self.tx.clone();
            let slot = self.timer.clone();
            timer.handle = Some(tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let current = match slot.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                // A newer publish owns the slot now
                if current.generation == generation {
                    tx.send_replace(OperationStatus::Idle);
                }
            }));
        }
    }
}
