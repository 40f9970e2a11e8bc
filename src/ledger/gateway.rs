//! Ledger contract boundary: read handle, signing handle, pending transactions

use crate::types::{Address, ContractAddress, Hash};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::oneshot;

// =============================================================================
// FAILURE MARKERS
// =============================================================================
// Wallets and contracts report these conditions as free text. The pipelines
// match on the text as well as on the typed variants, so remote backends that
// only surface a message string are handled the same way.

/// Substring a wallet puts in its error when the user declines a prompt.
pub const USER_REJECTED_MARKER: &str = "user rejected transaction";

/// Substring the contract reverts with when an entry was already proven.
pub const ALREADY_VERIFIED_MARKER: &str = "Data already verified";

// =============================================================================
// RECORDS
// =============================================================================

/// Contract-side view of one entry, as returned by `getEntry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub display_name: String,
    pub public_value1: u64,
    pub public_value2: u64,
    pub description: String,
    pub creator_address: Address,
    pub created_at: u64,
    pub is_verified: bool,
    /// Zero until the entry is proven
    pub revealed_value: u64,
}

/// Arguments of `createEntry`.
#[derive(Debug, Clone)]
pub struct CreateEntry {
    pub record_id: String,
    pub display_name: String,
    pub ciphertext: Vec<u8>,
    pub input_proof: Vec<u8>,
    pub public_value1: u64,
    pub public_value2: u64,
    pub description: String,
}

/// Opaque reference to an encrypted value held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CiphertextHandle(pub Vec<u8>);

impl CiphertextHandle {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Settled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: Hash,
}

/// Submitted transaction that has not settled yet.
///
/// The backend resolves the channel once the transaction is final (or failed).
#[derive(Debug)]
pub struct PendingTx {
    pub tx_hash: Hash,
    settled: oneshot::Receiver<Result<Receipt, LedgerError>>,
}

impl PendingTx {
    /// Pending transaction plus the sender the backend resolves it with.
    pub fn channel(tx_hash: Hash) -> (Self, oneshot::Sender<Result<Receipt, LedgerError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx_hash, settled: rx }, tx)
    }

    /// Already-settled transaction
    pub fn settled(tx_hash: Hash) -> Self {
        let (pending, tx) = Self::channel(tx_hash);
        let _ = tx.send(Ok(Receipt { tx_hash }));
        pending
    }

    /// Wait for settlement
    pub async fn wait(self) -> Result<Receipt, LedgerError> {
        self.settled.await.map_err(|_| LedgerError::Dropped)?
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Read-only handle to the lottery contract.
pub trait LedgerGateway: Send + Sync + 'static {
    type Signer: LedgerSigner;

    fn contract_address(&self) -> ContractAddress;

    fn list_entry_ids(&self) -> impl Future<Output = Result<Vec<String>, LedgerError>> + Send;

    fn get_entry(&self, id: &str) -> impl Future<Output = Result<LedgerRecord, LedgerError>> + Send;

    fn get_ciphertext_handle(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<CiphertextHandle, LedgerError>> + Send;

    /// Liveness check used before a draw
    fn is_available(&self) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Signing handle bound to `account`. Fails when the wallet cannot sign.
    fn signer(
        &self,
        account: &Address,
    ) -> impl Future<Output = Result<Self::Signer, LedgerError>> + Send;
}

/// Signing handle to the lottery contract.
pub trait LedgerSigner: Send + Sync + 'static {
    fn create_entry(
        &self,
        entry: CreateEntry,
    ) -> impl Future<Output = Result<PendingTx, LedgerError>> + Send;

    fn submit_verification(
        &self,
        id: &str,
        clear_values: Vec<u8>,
        proof: Vec<u8>,
    ) -> impl Future<Output = Result<PendingTx, LedgerError>> + Send;
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("no signer available: {0}")]
    SignerUnavailable(String),

    #[error("user rejected transaction")]
    UserRejected,

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry already exists: {0}")]
    Duplicate(String),

    #[error("Data already verified")]
    AlreadyVerified,

    #[error("invalid input proof")]
    InvalidInputProof,

    #[error("invalid decryption proof")]
    InvalidDecryptionProof,

    #[error("transaction dropped before settlement")]
    Dropped,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Reverted(String),
}

impl LedgerError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, LedgerError::UserRejected) || self.to_string().contains(USER_REJECTED_MARKER)
    }

    pub fn is_already_verified(&self) -> bool {
        matches!(self, LedgerError::AlreadyVerified)
            || self.to_string().contains(ALREADY_VERIFIED_MARKER)
    }
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}
