//! Local encryption service
//!
//! Stands in for the coprocessor and its key-management service so the
//! client runs end to end on one machine:
//!
//! - ciphertexts are ChaCha20-Poly1305 under a persisted 32-byte key, with
//!   the contract address as associated data
//! - input proofs are `SHA3-256(contract ‖ user ‖ ciphertext)`
//! - decryption proofs are ML-DSA signatures over `handles ‖ clear values`
//!
//! None of this is homomorphic. It only reproduces the message flow.

use super::service::{
    encode_clear_values, EncryptedInput, EncryptionService, FheError, RevealResult,
};
use crate::crypto::{decryption_message, input_proof, Keypair, PublicKey};
use crate::ledger::{CiphertextHandle, LedgerError};
use crate::types::{Address, ContractAddress};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const KEY_FILE: &str = "fhe_key.bin";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

pub struct LocalEncryptionService {
    cipher: ChaCha20Poly1305,
    kms: Keypair,
    initialized: AtomicBool,
    /// Simulated time to fetch public parameters
    init_delay: Duration,
}

impl LocalEncryptionService {
    /// Service with a key loaded from (or written to) `data_dir`
    pub fn open(data_dir: &Path) -> io::Result<Self> {
        let key = load_or_generate_key(data_dir)?;
        Ok(Self::with_key(key))
    }

    /// Service with a throwaway key
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_key(key)
    }

    fn with_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            kms: Keypair::generate(),
            initialized: AtomicBool::new(false),
            init_delay: Duration::ZERO,
        }
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Public key the ledger uses to check decryption proofs
    pub fn kms_public_key(&self) -> PublicKey {
        self.kms.public_key().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_initialized(&self) -> Result<(), FheError> {
        if self.is_initialized() { Ok(()) } else { Err(FheError::NotInitialized) }
    }

    fn seal(&self, contract: &ContractAddress, value: u64) -> Result<Vec<u8>, FheError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payload = Payload { msg: &value.to_le_bytes(), aad: contract.as_str().as_bytes() };
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|e| FheError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open_value(&self, contract: &ContractAddress, ciphertext: &[u8]) -> Result<u64, FheError> {
        if ciphertext.len() <= NONCE_SIZE {
            return Err(FheError::Decrypt("ciphertext too short".into()));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        let payload = Payload { msg: sealed, aad: contract.as_str().as_bytes() };
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| FheError::Decrypt("ciphertext rejected".into()))?;

        let bytes: [u8; 8] = plain
            .as_slice()
            .try_into()
            .map_err(|_| FheError::Decrypt("unexpected plaintext width".into()))?;
        Ok(u64::from_le_bytes(bytes))
    }
}

impl EncryptionService for LocalEncryptionService {
    async fn initialize(&self) -> Result<(), FheError> {
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.initialized.store(true, Ordering::Release);
        let fingerprint = hex::encode(&self.kms.public_key()[..8]);
        info!("Local encryption service ready, kms key {}", fingerprint);
        Ok(())
    }

    async fn encrypt(
        &self,
        contract: &ContractAddress,
        user: &Address,
        value: u64,
    ) -> Result<EncryptedInput, FheError> {
        self.ensure_initialized()?;
        let ciphertext = self.seal(contract, value)?;
        let proof = input_proof(contract.as_str(), user.as_str(), &ciphertext).to_vec();
        debug!("Encrypted input for {} ({} bytes)", user.short(), ciphertext.len());
        Ok(EncryptedInput { ciphertext, proof })
    }

    async fn reveal<F, Fut>(
        &self,
        handles: &[CiphertextHandle],
        contract: &ContractAddress,
        on_proof_ready: F,
    ) -> Result<RevealResult, FheError>
    where
        F: FnOnce(Vec<u8>, Vec<u8>) -> Fut + Send,
        Fut: Future<Output = Result<(), LedgerError>> + Send,
    {
        self.ensure_initialized()?;

        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            values.push((handle.clone(), self.open_value(contract, &handle.0)?));
        }

        let encoded = encode_clear_values(&values)?;
        let joined: Vec<u8> = handles.iter().flat_map(|h| h.0.iter().copied()).collect();
        let proof = self.kms.sign(&decryption_message(&joined, &encoded));

        on_proof_ready(encoded, proof).await?;

        Ok(RevealResult { clear_values: values.into_iter().collect() })
    }
}

/// Load the ciphertext key from `data_dir`, creating it on first use.
fn load_or_generate_key(data_dir: &Path) -> io::Result<[u8; KEY_SIZE]> {
    let key_path = data_dir.join(KEY_FILE);

    if key_path.exists() {
        let data = std::fs::read(&key_path)?;
        if data.len() != KEY_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid key file"));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&data);
        info!("Loaded encryption key from {:?}", key_path);
        return Ok(key);
    }

    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&key_path, key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&key_path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(&key_path, perms)?;
    }

    info!("Generated new encryption key, saved to {:?}", key_path);
    Ok(key)
}
