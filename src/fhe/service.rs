//! Homomorphic-encryption service boundary

use crate::ledger::{CiphertextHandle, LedgerError, ALREADY_VERIFIED_MARKER};
use crate::types::{Address, ContractAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

/// Ciphertext plus the proof that it was produced for a given contract and user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub ciphertext: Vec<u8>,
    pub proof: Vec<u8>,
}

/// Outcome of the reveal protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealResult {
    pub clear_values: BTreeMap<CiphertextHandle, u64>,
}

impl RevealResult {
    pub fn value_for(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.clear_values.get(handle).copied()
    }
}

/// Client session against the encryption service.
///
/// `reveal` drives the two-step protocol: the service produces the clear
/// values and their decryption proof, hands both to `on_proof_ready` (which
/// is expected to submit them to the ledger and wait for settlement), and
/// only then returns the clear values.
pub trait EncryptionService: Send + Sync + 'static {
    fn initialize(&self) -> impl Future<Output = Result<(), FheError>> + Send;

    fn encrypt(
        &self,
        contract: &ContractAddress,
        user: &Address,
        value: u64,
    ) -> impl Future<Output = Result<EncryptedInput, FheError>> + Send;

    fn reveal<F, Fut>(
        &self,
        handles: &[CiphertextHandle],
        contract: &ContractAddress,
        on_proof_ready: F,
    ) -> impl Future<Output = Result<RevealResult, FheError>> + Send
    where
        F: FnOnce(Vec<u8>, Vec<u8>) -> Fut + Send,
        Fut: Future<Output = Result<(), LedgerError>> + Send;
}

// =============================================================================
// CLEAR VALUE ENCODING
// =============================================================================

#[derive(Serialize, Deserialize)]
struct ClearValues {
    values: Vec<(CiphertextHandle, u64)>,
}

/// Encode the clear-value bundle submitted with a decryption proof.
pub fn encode_clear_values(values: &[(CiphertextHandle, u64)]) -> Result<Vec<u8>, FheError> {
    let bundle = ClearValues { values: values.to_vec() };
    postcard::to_allocvec(&bundle).map_err(|e| FheError::Encoding(e.to_string()))
}

pub fn decode_clear_values(data: &[u8]) -> Result<Vec<(CiphertextHandle, u64)>, FheError> {
    let bundle: ClearValues =
        postcard::from_bytes(data).map_err(|e| FheError::Encoding(e.to_string()))?;
    Ok(bundle.values)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FheError {
    #[error("encryption session not initialized")]
    NotInitialized,

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("proof submission failed: {0}")]
    Submission(#[from] LedgerError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FheError {
    /// The ledger refused the proof because another actor proved the entry first.
    pub fn is_already_verified(&self) -> bool {
        match self {
            FheError::Submission(e) => e.is_already_verified(),
            other => other.to_string().contains(ALREADY_VERIFIED_MARKER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_value_bundle() {
        let handle = CiphertextHandle(vec![1, 2, 3]);
        let encoded = encode_clear_values(&[(handle.clone(), 42)]).unwrap();
        assert_eq!(decode_clear_values(&encoded).unwrap(), vec![(handle, 42)]);
        assert!(decode_clear_values(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_already_verified_detection() {
        assert!(FheError::Submission(LedgerError::AlreadyVerified).is_already_verified());
        assert!(FheError::Decrypt("relayer: Data already verified".into()).is_already_verified());
        assert!(!FheError::Submission(LedgerError::Dropped).is_already_verified());
        assert!(!FheError::NotInitialized.is_already_verified());
    }
}
