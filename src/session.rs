//! Encryption session lifecycle, gated on wallet connectivity
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──initialize──▶ InitializingCrypto ──ok──▶ Ready
//!      ▲                                                       │
//!      └──────────────── disconnect (from any state) ◀── Failed ◀┘ err
//! ```
//!
//! `initialize` only starts from `Connecting`, so it runs at most once per
//! wallet connection. A failed session stays `Failed` until the wallet
//! reconnects.

use crate::fhe::EncryptionService;
use crate::status::StatusBoard;
use crate::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::watch;
use tracing::{error, info, warn};

const INIT_FAILED_MESSAGE: &str =
    "FHEVM initialization failed. Please check your wallet connection.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    InitializingCrypto,
    Ready,
    Failed,
}

pub struct SessionManager<E> {
    service: Arc<E>,
    status: Arc<StatusBoard>,
    state: watch::Sender<SessionState>,
    account: RwLock<Option<Address>>,
    /// Bumped on every connectivity change; stale initializations compare against it
    epoch: AtomicU64,
    /// Epoch of the initialization currently running, if any
    initializing: Mutex<Option<u64>>,
}

/// Claim on initialization for one epoch. Released on drop unless a newer
/// epoch has taken the slot over.
struct InitClaim<'a> {
    slot: &'a Mutex<Option<u64>>,
    epoch: u64,
}

impl Drop for InitClaim<'_> {
    fn drop(&mut self) {
        let mut slot = lock_slot(self.slot);
        if *slot == Some(self.epoch) {
            *slot = None;
        }
    }
}

fn lock_slot(slot: &Mutex<Option<u64>>) -> MutexGuard<'_, Option<u64>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<E: EncryptionService> SessionManager<E> {
    pub fn new(service: Arc<E>, status: Arc<StatusBoard>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            service,
            status,
            state,
            account: RwLock::new(None),
            epoch: AtomicU64::new(0),
            initializing: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// An initialization for the current connection is running
    pub fn is_initializing(&self) -> bool {
        *lock_slot(&self.initializing) == Some(self.epoch.load(Ordering::Acquire))
    }

    /// Connected wallet, if any
    pub fn account(&self) -> Option<Address> {
        match self.account.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn service(&self) -> &Arc<E> {
        &self.service
    }

    /// Wallet connected (or switched account). Re-arms initialization.
    pub fn wallet_connected(&self, account: Address) {
        info!("Wallet connected: {}", account.short());
        self.set_account(Some(account));
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.transition(SessionState::Connecting);
    }

    /// Wallet gone. Drops the session so the next connection starts fresh.
    pub fn wallet_disconnected(&self) {
        info!("Wallet disconnected");
        self.set_account(None);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.transition(SessionState::Disconnected);
    }

    /// Bring the encryption session to `Ready`.
    ///
    /// Refused while already ready or initializing, without a wallet, and
    /// after a failure until the wallet reconnects. Failures publish an
    /// error status and are not retried.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        if self.account().is_none() {
            return Err(SessionError::NotConnected);
        }
        match self.state() {
            SessionState::Ready => return Err(SessionError::AlreadyReady),
            SessionState::InitializingCrypto => return Err(SessionError::InProgress),
            SessionState::Failed => return Err(SessionError::NeedsReconnect),
            SessionState::Disconnected => return Err(SessionError::NotConnected),
            SessionState::Connecting => {}
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let _claim = self.claim_init(epoch)?;

        info!("Initializing encryption session...");
        self.transition(SessionState::InitializingCrypto);

        let result = self.service.initialize().await;

        if self.epoch.load(Ordering::Acquire) != epoch {
            warn!("Wallet changed during initialization, discarding result");
            return Err(SessionError::Superseded);
        }

        match result {
            Ok(()) => {
                info!("Encryption session ready");
                self.transition(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize encryption session: {}", e);
                self.transition(SessionState::Failed);
                self.status.error(INIT_FAILED_MESSAGE);
                Err(SessionError::InitFailed(e.to_string()))
            }
        }
    }

    /// One initialization per epoch. A run left over from an earlier
    /// connection does not block the current one.
    fn claim_init(&self, epoch: u64) -> Result<InitClaim<'_>, SessionError> {
        let mut slot = lock_slot(&self.initializing);
        if *slot == Some(epoch) {
            return Err(SessionError::InProgress);
        }
        *slot = Some(epoch);
        Ok(InitClaim { slot: &self.initializing, epoch })
    }

    fn set_account(&self, account: Option<Address>) {
        match self.account.write() {
            Ok(mut guard) => *guard = account,
            Err(poisoned) => *poisoned.into_inner() = account,
        }
    }

    fn transition(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            info!("Session {:?} -> {:?}", prev, next);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("session already ready")]
    AlreadyReady,

    #[error("initialization already in progress")]
    InProgress,

    #[error("initialization failed earlier; reconnect the wallet to retry")]
    NeedsReconnect,

    #[error("wallet changed during initialization")]
    Superseded,

    #[error("initialization failed: {0}")]
    InitFailed(String),
}
