//! Lottery client: wallet connectivity, entry cache, and shared pipeline state
//!
//! The entry list is a full-replace cache of the ledger. It is rebuilt on
//! connect, on manual refresh, and after every mutating pipeline settles;
//! nothing patches individual entries in place. Statistics are recomputed
//! from the fresh list on every rebuild.
//!
//! The pipelines themselves live next door:
//! - `submit.rs`: encrypt → create entry → settle
//! - `reveal.rs`: short-circuit or reveal → prove → settle
//! - `draw.rs`: winner selection

use crate::config::LotteryConfig;
use crate::draw::WinnerSelector;
use crate::fhe::EncryptionService;
use crate::guard::InFlight;
use crate::ledger::{LedgerError, LedgerGateway, LedgerRecord};
use crate::session::{SessionError, SessionManager, SessionState};
use crate::stats::LotteryStats;
use crate::status::{OperationStatus, StatusBoard};
use crate::submit::TicketForm;
use crate::types::{display_id, now, Address, LotteryEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Entries and the statistics derived from exactly that list
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<LotteryEntry>,
    pub stats: LotteryStats,
    /// Reload that produced this list; 0 before the first load
    pub generation: u64,
}

impl Snapshot {
    /// Install `next` unless a later reload already landed. Reloads read the
    /// ledger outside the lock and may finish out of order.
    pub fn replace_if_newer(&mut self, next: Snapshot) -> bool {
        if next.generation <= self.generation {
            return false;
        }
        *self = next;
        true
    }
}

pub struct Lottery<L, E> {
    pub(crate) ledger: Arc<L>,
    pub(crate) session: SessionManager<E>,
    pub(crate) status: Arc<StatusBoard>,
    pub(crate) config: LotteryConfig,
    pub(crate) selector: WinnerSelector,

    pub(crate) snapshot: RwLock<Snapshot>,
    /// Last reload generation handed out
    reload_seq: AtomicU64,

    // Submission surface
    pub(crate) form: Mutex<TicketForm>,
    pub(crate) submission_open: AtomicBool,

    /// Values revealed by this session, keyed by ledger record id
    pub(crate) local_reveals: Mutex<HashMap<String, u64>>,

    // In-flight guards
    pub(crate) submitting: InFlight,
    pub(crate) encrypting: InFlight,
    pub(crate) revealing: InFlight,
    pub(crate) refreshing: InFlight,
}

impl<L: LedgerGateway, E: EncryptionService> Lottery<L, E> {
    pub fn new(ledger: Arc<L>, service: Arc<E>, config: LotteryConfig) -> Self {
        let status = Arc::new(StatusBoard::new(config.success_display, config.error_display));
        Self {
            ledger,
            session: SessionManager::new(service, status.clone()),
            status,
            selector: WinnerSelector::new(config.draw_mode),
            config,
            snapshot: RwLock::new(Snapshot::default()),
            reload_seq: AtomicU64::new(0),
            form: Mutex::new(TicketForm::default()),
            submission_open: AtomicBool::new(false),
            local_reveals: Mutex::new(HashMap::new()),
            submitting: InFlight::new("submit"),
            encrypting: InFlight::new("encrypt"),
            revealing: InFlight::new("reveal"),
            refreshing: InFlight::new("refresh"),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    pub fn status(&self) -> OperationStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<OperationStatus> {
        self.status.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn account(&self) -> Option<Address> {
        self.session.account()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn entries(&self) -> Vec<LotteryEntry> {
        self.snapshot.read().await.entries.clone()
    }

    pub async fn stats(&self) -> LotteryStats {
        self.snapshot.read().await.stats
    }

    pub async fn entry(&self, record_id: &str) -> Option<LotteryEntry> {
        self.snapshot
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.ledger_record_id == record_id)
            .cloned()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.is_busy()
    }

    // =========================================================================
    // WALLET CONNECTIVITY
    // =========================================================================

    /// Wallet connected: initialize the encryption session, then load entries.
    ///
    /// The entry list is loaded even when initialization fails, since reading
    /// the ledger does not need the encryption session.
    pub async fn connect_wallet(&self, account: Address) -> Result<(), LotteryError> {
        self.session.wallet_connected(account);

        let init = self.session.initialize().await;

        if let Err(e) = self.reload().await {
            warn!("Initial load failed: {}", e);
        }

        match init {
            Ok(()) => Ok(()),
            Err(SessionError::InitFailed(reason)) => Err(LotteryError::SessionInitFailed(reason)),
            Err(other) => {
                debug!("Session not initialized: {}", other);
                Err(LotteryError::SessionInitFailed(other.to_string()))
            }
        }
    }

    /// Wallet gone: reset the session and drop everything tied to this wallet.
    pub fn disconnect_wallet(&self) {
        self.session.wallet_disconnected();
        self.reveals().clear();
        self.close_submission();
    }

    // =========================================================================
    // ENTRY CACHE
    // =========================================================================

    /// Manual refresh. Ignored while another refresh is running.
    pub async fn refresh(&self) -> Result<usize, LotteryError> {
        let _permit = self.refreshing.try_acquire().ok_or(LotteryError::Busy("refresh"))?;
        self.reload().await
    }

    /// Replace the cached entry list with the ledger's current contents.
    ///
    /// Entries that fail to load individually are skipped; failing to list
    /// the ids fails the whole reload and leaves the previous list in place.
    pub(crate) async fn reload(&self) -> Result<usize, LotteryError> {
        let generation = self.reload_seq.fetch_add(1, Ordering::AcqRel) + 1;

        let ids = match self.ledger.list_entry_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list entries: {}", e);
                self.status.error("Failed to load lottery data");
                return Err(LotteryError::LoadFailed(e.to_string()));
            }
        };

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.ledger.get_entry(&id).await {
                Ok(record) => entries.push(entry_from_record(id, record)),
                Err(e) => warn!("Error loading entry {}: {}", id, e),
            }
        }

        let stats = LotteryStats::compute(&entries, now(), self.config.recent_window_secs);
        let count = entries.len();

        let mut snapshot = self.snapshot.write().await;
        if !snapshot.replace_if_newer(Snapshot { entries, stats, generation }) {
            debug!("Reload {} superseded by {}, discarded", generation, snapshot.generation);
            return Ok(snapshot.entries.len());
        }

        self.reveals()
            .retain(|id, _| snapshot.entries.iter().any(|e| &e.ledger_record_id == id));

        info!(
            "Loaded {} entries ({} verified, {}% win chance)",
            count, stats.verified_entries, stats.average_winning_chance
        );
        Ok(count)
    }

    pub(crate) fn reveals(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        match self.local_reveals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Cache entry for one ledger record. `revealed_value` is dropped unless the
/// ledger marks the record verified.
pub(crate) fn entry_from_record(record_id: String, record: LedgerRecord) -> LotteryEntry {
    LotteryEntry {
        id: display_id(&record_id, record.created_at),
        display_name: record.display_name,
        ledger_record_id: record_id,
        public_value1: record.public_value1,
        public_value2: record.public_value2,
        description: record.description,
        creator_address: record.creator_address,
        created_at: record.created_at,
        is_verified: record.is_verified,
        revealed_value: record.is_verified.then_some(record.revealed_value),
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Pipeline failures. `Display` is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LotteryError {
    #[error("Please connect wallet first")]
    NotConnected,

    #[error("FHEVM initialization failed: {0}")]
    SessionInitFailed(String),

    #[error("Failed to get contract with signer")]
    SigningUnavailable,

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Ticket is already verified on-chain")]
    AlreadyVerified,

    #[error("Decryption failed: {0}")]
    RevealFailed(String),

    #[error("{0}")]
    DrawUnavailable(String),

    #[error("{0}")]
    InvalidTicket(String),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Failed to load lottery data: {0}")]
    LoadFailed(String),
}

impl LotteryError {
    /// Failure of a write the wallet had to sign.
    pub(crate) fn from_submission(e: LedgerError) -> Self {
        if e.is_user_rejection() {
            LotteryError::UserRejected
        } else {
            LotteryError::SubmissionFailed(e.to_string())
        }
    }
}
