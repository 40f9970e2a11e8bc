//! Local lottery contract
//!
//! A sled-backed emulation of the lottery contract for running the client
//! without a chain. It enforces the same rules a deployed contract does:
//!
//! 1. Record ids are unique.
//! 2. The input proof must bind the ciphertext to this contract and the sender.
//! 3. An entry can be proven exactly once; later proofs revert with
//!    "Data already verified".
//! 4. A decryption proof must be signed by the configured key-management key.
//!
//! Writes only become visible after the confirmation delay, like a block.
//! The stored ciphertext doubles as its own handle.

use super::gateway::{
    CiphertextHandle, CreateEntry, LedgerError, LedgerGateway, LedgerRecord, LedgerSigner,
    PendingTx, Receipt,
};
use crate::crypto::{decryption_message, input_proof, sha3, verify, PublicKey};
use crate::fhe::decode_clear_values;
use crate::types::{now, now_millis, Address, ContractAddress, Hash};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ENTRIES_TREE: &str = "entries";

/// Local ledger settings
#[derive(Debug, Clone)]
pub struct LocalLedgerConfig {
    /// Where the sled database lives; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub contract: ContractAddress,
    /// Time between submission and settlement
    pub confirm_delay: Duration,
    /// Key the decryption proofs must be signed with
    pub kms_public_key: PublicKey,
    /// Simulate a wallet that declines every signature prompt
    pub reject_signatures: bool,
}

impl Default for LocalLedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            contract: ContractAddress("0x5FbDB2315678afecb367f032d93F642f64180aa3".into()),
            confirm_delay: Duration::from_millis(500),
            kms_public_key: Vec::new(),
            reject_signatures: false,
        }
    }
}

/// Stored form of an entry: the public record plus its ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    record: LedgerRecord,
    ciphertext: Vec<u8>,
}

struct Inner {
    entries: sled::Tree,
    contract: ContractAddress,
    confirm_delay: Duration,
    kms_public_key: PublicKey,
    reject_signatures: bool,
}

impl Inner {
    fn load(&self, id: &str) -> Result<Option<(sled::IVec, StoredEntry)>, LedgerError> {
        match self.entries.get(id.as_bytes())? {
            Some(raw) => {
                let entry: StoredEntry = bincode::deserialize(&raw)?;
                Ok(Some((raw, entry)))
            }
            None => Ok(None),
        }
    }

    fn require(&self, id: &str) -> Result<(sled::IVec, StoredEntry), LedgerError> {
        self.load(id)?.ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }
}

#[derive(Clone)]
pub struct LocalLedger {
    inner: Arc<Inner>,
}

impl LocalLedger {
    pub fn open(config: LocalLedgerConfig) -> Result<Self, LedgerError> {
        let db = match &config.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| LedgerError::Storage(e.to_string()))?;
                sled::open(dir.join("ledger"))?
            }
            None => sled::Config::new().temporary(true).open()?,
        };
        let entries = db.open_tree(ENTRIES_TREE)?;

        info!("Local ledger {} opened ({} entries)", config.contract, entries.len());

        Ok(Self {
            inner: Arc::new(Inner {
                entries,
                contract: config.contract,
                confirm_delay: config.confirm_delay,
                kms_public_key: config.kms_public_key,
                reject_signatures: config.reject_signatures,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl LedgerGateway for LocalLedger {
    type Signer = LocalSigner;

    fn contract_address(&self) -> ContractAddress {
        self.inner.contract.clone()
    }

    async fn list_entry_ids(&self) -> Result<Vec<String>, LedgerError> {
        let mut ids = Vec::with_capacity(self.inner.entries.len());
        for key in self.inner.entries.iter().keys() {
            let key = key?;
            match String::from_utf8(key.to_vec()) {
                Ok(id) => ids.push(id),
                Err(_) => warn!("Skipping non-utf8 record key"),
            }
        }
        Ok(ids)
    }

    async fn get_entry(&self, id: &str) -> Result<LedgerRecord, LedgerError> {
        Ok(self.inner.require(id)?.1.record)
    }

    async fn get_ciphertext_handle(&self, id: &str) -> Result<CiphertextHandle, LedgerError> {
        Ok(CiphertextHandle(self.inner.require(id)?.1.ciphertext))
    }

    async fn is_available(&self) -> Result<bool, LedgerError> {
        Ok(true)
    }

    async fn signer(&self, account: &Address) -> Result<LocalSigner, LedgerError> {
        if account.as_str().is_empty() {
            return Err(LedgerError::SignerUnavailable("no account".into()));
        }
        Ok(LocalSigner { inner: self.inner.clone(), account: account.clone() })
    }
}

/// Signing handle bound to one account
pub struct LocalSigner {
    inner: Arc<Inner>,
    account: Address,
}

impl LocalSigner {
    fn tx_hash(&self, kind: &str, id: &str) -> Hash {
        sha3(format!("{}:{}:{}:{}", kind, id, self.account, now_millis()).as_bytes())
    }

    fn prompt(&self) -> Result<(), LedgerError> {
        if self.inner.reject_signatures {
            debug!("Wallet prompt declined for {}", self.account.short());
            return Err(LedgerError::UserRejected);
        }
        Ok(())
    }
}

impl LedgerSigner for LocalSigner {
    async fn create_entry(&self, entry: CreateEntry) -> Result<PendingTx, LedgerError> {
        self.prompt()?;

        let expected =
            input_proof(self.inner.contract.as_str(), self.account.as_str(), &entry.ciphertext);
        if entry.input_proof != expected {
            return Err(LedgerError::InvalidInputProof);
        }
        if self.inner.load(&entry.record_id)?.is_some() {
            return Err(LedgerError::Duplicate(entry.record_id));
        }

        let stored = StoredEntry {
            record: LedgerRecord {
                display_name: entry.display_name,
                public_value1: entry.public_value1,
                public_value2: entry.public_value2,
                description: entry.description,
                creator_address: self.account.clone(),
                created_at: now(),
                is_verified: false,
                revealed_value: 0,
            },
            ciphertext: entry.ciphertext,
        };
        let bytes = bincode::serialize(&stored)?;

        let tx_hash = self.tx_hash("create", &entry.record_id);
        let (pending, settle) = PendingTx::channel(tx_hash);
        let inner = self.inner.clone();
        let id = entry.record_id;

        tokio::spawn(async move {
            tokio::time::sleep(inner.confirm_delay).await;
            let swapped =
                inner.entries.compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes));
            let result = match swapped {
                Ok(Ok(())) => match inner.entries.flush() {
                    Ok(_) => {
                        info!("Entry {} settled", id);
                        Ok(Receipt { tx_hash })
                    }
                    Err(e) => Err(LedgerError::from(e)),
                },
                Ok(Err(_)) => Err(LedgerError::Duplicate(id)),
                Err(e) => Err(LedgerError::from(e)),
            };
            drop(inner);
            let _ = settle.send(result);
        });

        Ok(pending)
    }

    async fn submit_verification(
        &self,
        id: &str,
        clear_values: Vec<u8>,
        proof: Vec<u8>,
    ) -> Result<PendingTx, LedgerError> {
        self.prompt()?;

        let (_, stored) = self.inner.require(id)?;
        if stored.record.is_verified {
            return Err(LedgerError::AlreadyVerified);
        }

        let values = decode_clear_values(&clear_values)
            .map_err(|_| LedgerError::InvalidDecryptionProof)?;
        let value = values
            .iter()
            .find(|(handle, _)| handle.0 == stored.ciphertext)
            .map(|(_, v)| *v)
            .ok_or(LedgerError::InvalidDecryptionProof)?;

        verify(
            &self.inner.kms_public_key,
            &decryption_message(&stored.ciphertext, &clear_values),
            &proof,
        )
        .map_err(|_| LedgerError::InvalidDecryptionProof)?;

        let tx_hash = self.tx_hash("verify", id);
        let (pending, settle) = PendingTx::channel(tx_hash);
        let inner = self.inner.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep(inner.confirm_delay).await;
            let result = settle_verification(&inner, &id, value).map(|_| Receipt { tx_hash });
            drop(inner);
            let _ = settle.send(result);
        });

        Ok(pending)
    }
}

/// Mark `id` proven with `value`, unless someone got there first.
fn settle_verification(inner: &Inner, id: &str, value: u64) -> Result<(), LedgerError> {
    let (raw, mut stored) = inner.require(id)?;
    if stored.record.is_verified {
        return Err(LedgerError::AlreadyVerified);
    }
    stored.record.is_verified = true;
    stored.record.revealed_value = value;
    let updated = bincode::serialize(&stored)?;

    match inner.entries.compare_and_swap(id.as_bytes(), Some(raw), Some(updated))? {
        Ok(()) => {
            inner.entries.flush()?;
            info!("Entry {} verified on ledger", id);
            Ok(())
        }
        Err(_) => Err(LedgerError::AlreadyVerified),
    }
}
