//! Scripted ledger and encryption service for orchestrator tests
//!
//! The fake ledger keeps entries in memory, counts every call, and can be
//! told to fail in the ways a real wallet or contract does. Ciphertexts are
//! the little-endian bytes of the ticket, so the fake service "decrypts" a
//! handle by reading it back.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use whitelotto::fhe::{
    decode_clear_values, encode_clear_values, EncryptedInput, EncryptionService, FheError,
    RevealResult,
};
use whitelotto::ledger::{
    CiphertextHandle, CreateEntry, LedgerError, LedgerGateway, LedgerRecord, LedgerSigner,
    PendingTx,
};
use whitelotto::{Address, ContractAddress, Lottery, LotteryConfig};

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub const BOB: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

pub type TestLottery = Lottery<FakeLedger, FakeService>;

// =============================================================================
// LEDGER
// =============================================================================

#[derive(Default)]
pub struct LedgerCalls {
    pub list: AtomicUsize,
    pub get_entry: AtomicUsize,
    pub signer: AtomicUsize,
    pub create: AtomicUsize,
    pub verify: AtomicUsize,
}

impl LedgerCalls {
    pub fn total(&self) -> usize {
        self.list.load(Ordering::SeqCst)
            + self.get_entry.load(Ordering::SeqCst)
            + self.signer.load(Ordering::SeqCst)
            + self.create.load(Ordering::SeqCst)
            + self.verify.load(Ordering::SeqCst)
    }
}

/// Failure switches, all off by default
#[derive(Default)]
pub struct LedgerScript {
    pub signer_unavailable: AtomicBool,
    pub reject_signatures: AtomicBool,
    pub list_fails: AtomicBool,
    pub unavailable: AtomicBool,
    pub create_reverts: AtomicBool,
    /// Another actor proves the entry right before our proof lands
    pub verify_race: AtomicBool,
    /// Entries that fail to load individually
    pub broken: Mutex<Vec<String>>,
}

struct Stored {
    record: LedgerRecord,
    ciphertext: Vec<u8>,
}

struct Shared {
    entries: Mutex<BTreeMap<String, Stored>>,
    calls: LedgerCalls,
    script: LedgerScript,
    confirm_delay: Duration,
}

#[derive(Clone)]
pub struct FakeLedger {
    shared: Arc<Shared>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::with_confirm_delay(Duration::ZERO)
    }

    /// Writes settle after `delay` instead of immediately
    pub fn with_confirm_delay(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(BTreeMap::new()),
                calls: LedgerCalls::default(),
                script: LedgerScript::default(),
                confirm_delay: delay,
            }),
        }
    }

    pub fn calls(&self) -> &LedgerCalls {
        &self.shared.calls
    }

    pub fn script(&self) -> &LedgerScript {
        &self.shared.script
    }

    /// Insert an entry directly, as if someone else had created it
    pub fn seed(&self, id: &str, name: &str, ticket: u64, created_at: u64, verified: bool) {
        let record = LedgerRecord {
            display_name: name.into(),
            public_value1: ticket,
            public_value2: 0,
            description: "Lottery Participant Entry".into(),
            creator_address: Address::new(BOB),
            created_at,
            is_verified: verified,
            revealed_value: if verified { ticket } else { 0 },
        };
        self.shared
            .entries
            .lock()
            .unwrap()
            .insert(id.into(), Stored { record, ciphertext: ticket.to_le_bytes().to_vec() });
    }

    pub fn record(&self, id: &str) -> Option<LedgerRecord> {
        self.shared.entries.lock().unwrap().get(id).map(|s| s.record.clone())
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerGateway for FakeLedger {
    type Signer = FakeSigner;

    fn contract_address(&self) -> ContractAddress {
        ContractAddress(CONTRACT.into())
    }

    async fn list_entry_ids(&self) -> Result<Vec<String>, LedgerError> {
        self.shared.calls.list.fetch_add(1, Ordering::SeqCst);
        if self.shared.script.list_fails.load(Ordering::SeqCst) {
            return Err(LedgerError::Reverted("could not reach node".into()));
        }
        Ok(self.shared.entries.lock().unwrap().keys().cloned().collect())
    }

    async fn get_entry(&self, id: &str) -> Result<LedgerRecord, LedgerError> {
        self.shared.calls.get_entry.fetch_add(1, Ordering::SeqCst);
        if self.shared.script.broken.lock().unwrap().iter().any(|b| b == id) {
            return Err(LedgerError::Reverted("call exception".into()));
        }
        self.record(id).ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn get_ciphertext_handle(&self, id: &str) -> Result<CiphertextHandle, LedgerError> {
        let entries = self.shared.entries.lock().unwrap();
        entries
            .get(id)
            .map(|s| CiphertextHandle(s.ciphertext.clone()))
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    async fn is_available(&self) -> Result<bool, LedgerError> {
        Ok(!self.shared.script.unavailable.load(Ordering::SeqCst))
    }

    async fn signer(&self, account: &Address) -> Result<FakeSigner, LedgerError> {
        self.shared.calls.signer.fetch_add(1, Ordering::SeqCst);
        if self.shared.script.signer_unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::SignerUnavailable("no injected provider".into()));
        }
        Ok(FakeSigner { shared: self.shared.clone(), account: account.clone() })
    }
}

pub struct FakeSigner {
    shared: Arc<Shared>,
    account: Address,
}

impl FakeSigner {
    /// Resolve `apply` after the confirmation delay
    fn settle<F>(&self, apply: F) -> PendingTx
    where
        F: FnOnce(&Shared) -> Result<(), LedgerError> + Send + 'static,
    {
        let (pending, tx) = PendingTx::channel([1u8; 32]);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            if !shared.confirm_delay.is_zero() {
                tokio::time::sleep(shared.confirm_delay).await;
            }
            let result = apply(&shared).map(|_| whitelotto::ledger::Receipt { tx_hash: [1u8; 32] });
            let _ = tx.send(result);
        });
        pending
    }
}

impl LedgerSigner for FakeSigner {
    async fn create_entry(&self, entry: CreateEntry) -> Result<PendingTx, LedgerError> {
        self.shared.calls.create.fetch_add(1, Ordering::SeqCst);
        if self.shared.script.reject_signatures.load(Ordering::SeqCst) {
            return Err(LedgerError::Reverted("ACTION_REJECTED: user rejected transaction".into()));
        }
        let reverts = self.shared.script.create_reverts.load(Ordering::SeqCst);
        let creator = self.account.clone();

        Ok(self.settle(move |shared| {
            if reverts {
                return Err(LedgerError::Reverted("execution reverted: out of gas".into()));
            }
            let record = LedgerRecord {
                display_name: entry.display_name,
                public_value1: entry.public_value1,
                public_value2: entry.public_value2,
                description: entry.description,
                creator_address: creator,
                created_at: whitelotto::now(),
                is_verified: false,
                revealed_value: 0,
            };
            shared
                .entries
                .lock()
                .unwrap()
                .insert(entry.record_id, Stored { record, ciphertext: entry.ciphertext });
            Ok(())
        }))
    }

    async fn submit_verification(
        &self,
        id: &str,
        clear_values: Vec<u8>,
        _proof: Vec<u8>,
    ) -> Result<PendingTx, LedgerError> {
        self.shared.calls.verify.fetch_add(1, Ordering::SeqCst);
        if self.shared.script.reject_signatures.load(Ordering::SeqCst) {
            return Err(LedgerError::UserRejected);
        }

        let values = decode_clear_values(&clear_values)
            .map_err(|e| LedgerError::Reverted(e.to_string()))?;
        let value = values.first().map(|(_, v)| *v).unwrap_or_default();
        let race = self.shared.script.verify_race.load(Ordering::SeqCst);
        let id = id.to_string();

        Ok(self.settle(move |shared| {
            let mut entries = shared.entries.lock().unwrap();
            let stored = entries.get_mut(&id).ok_or_else(|| LedgerError::NotFound(id.clone()))?;
            if race {
                stored.record.is_verified = true;
                stored.record.revealed_value = value;
            }
            if stored.record.is_verified {
                let reason = "execution reverted: Data already verified";
                return Err(LedgerError::Reverted(reason.into()));
            }
            stored.record.is_verified = true;
            stored.record.revealed_value = value;
            Ok(())
        }))
    }
}

// =============================================================================
// ENCRYPTION SERVICE
// =============================================================================

#[derive(Default)]
pub struct ServiceCalls {
    pub initialize: AtomicUsize,
    pub encrypt: AtomicUsize,
    pub reveal: AtomicUsize,
}

#[derive(Default)]
pub struct FakeService {
    pub calls: ServiceCalls,
    pub fail_init: AtomicBool,
    pub fail_encrypt: AtomicBool,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init() -> Self {
        let service = Self::default();
        service.fail_init.store(true, Ordering::SeqCst);
        service
    }
}

impl EncryptionService for FakeService {
    async fn initialize(&self) -> Result<(), FheError> {
        self.calls.initialize.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(FheError::Init("relayer unreachable".into()));
        }
        Ok(())
    }

    async fn encrypt(
        &self,
        _contract: &ContractAddress,
        _user: &Address,
        value: u64,
    ) -> Result<EncryptedInput, FheError> {
        self.calls.encrypt.fetch_add(1, Ordering::SeqCst);
        if self.fail_encrypt.load(Ordering::SeqCst) {
            return Err(FheError::Encrypt("public key not loaded".into()));
        }
        Ok(EncryptedInput {
            ciphertext: value.to_le_bytes().to_vec(),
            proof: b"input-proof".to_vec(),
        })
    }

    async fn reveal<F, Fut>(
        &self,
        handles: &[CiphertextHandle],
        _contract: &ContractAddress,
        on_proof_ready: F,
    ) -> Result<RevealResult, FheError>
    where
        F: FnOnce(Vec<u8>, Vec<u8>) -> Fut + Send,
        Fut: Future<Output = Result<(), LedgerError>> + Send,
    {
        self.calls.reveal.fetch_add(1, Ordering::SeqCst);

        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            let bytes: [u8; 8] = handle
                .0
                .as_slice()
                .try_into()
                .map_err(|_| FheError::Decrypt("unknown handle".into()))?;
            values.push((handle.clone(), u64::from_le_bytes(bytes)));
        }

        let encoded = encode_clear_values(&values)?;
        on_proof_ready(encoded, b"kms-signature".to_vec()).await?;

        Ok(RevealResult { clear_values: values.into_iter().collect() })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub fn test_config() -> LotteryConfig {
    LotteryConfig { draw_reveal_delay: Duration::from_millis(50), ..LotteryConfig::default() }
}

pub fn lottery(ledger: &FakeLedger, service: FakeService) -> TestLottery {
    Lottery::new(Arc::new(ledger.clone()), Arc::new(service), test_config())
}

/// Lottery with Alice's wallet connected and a ready session
pub async fn connected(ledger: &FakeLedger) -> TestLottery {
    let lottery = lottery(ledger, FakeService::new());
    lottery.connect_wallet(Address::new(ALICE)).await.unwrap();
    lottery
}
