//! Hashing and ML-DSA signatures used by the local encryption stand-in and ledger

use crate::types::Hash;
use pqcrypto_dilithium::dilithium3 as dilithium;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey as PkTrait};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

pub type PublicKey = Vec<u8>;
pub type Signature = Vec<u8>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Signing key of the decryption oracle (key-management side of the reveal protocol)
pub struct Keypair {
    pub public: PublicKey,
    secret: dilithium::SecretKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let (pk, sk) = dilithium::keypair();
        Self {
            public: pk.as_bytes().to_vec(),
            secret: sk,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = dilithium::detached_sign(message, &self.secret);
        sig.as_bytes().to_vec()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

pub fn verify(pubkey: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let pk = dilithium::PublicKey::from_bytes(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = dilithium::DetachedSignature::from_bytes(signature)
        .map_err(|_| CryptoError::InvalidSignature)?;
    dilithium::verify_detached_signature(&sig, message, &pk)
        .map_err(|_| CryptoError::InvalidSignature)
}

pub fn sha3(data: &[u8]) -> Hash {
    Sha3_256::digest(data).into()
}

pub fn sha3_concat(a: &[u8], b: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

/// Proof binding a ciphertext to the contract and the submitter that may use it.
///
/// `SHA3-256(contract ‖ 0x00 ‖ user ‖ 0x00 ‖ ciphertext)`
pub fn input_proof(contract: &str, user: &str, ciphertext: &[u8]) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(contract.as_bytes());
    hasher.update([0u8]);
    hasher.update(user.to_ascii_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

/// Message signed by the decryption oracle: `handle ‖ clear values`
pub fn decryption_message(handle: &[u8], clear_values: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(handle.len() + clear_values.len());
    msg.extend_from_slice(handle);
    msg.extend_from_slice(clear_values);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"clear values");
        assert!(verify(&kp.public, b"clear values", &sig).is_ok());
        assert!(verify(&kp.public, b"tampered", &sig).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage_key() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"msg");
        assert!(matches!(verify(&[1, 2, 3], b"msg", &sig), Err(CryptoError::InvalidPublicKey)));
    }

    #[test]
    fn test_input_proof_binds_user_case_insensitive() {
        let a = input_proof("0xc0ffee", "0xABCDEF", b"ct");
        let b = input_proof("0xc0ffee", "0xabcdef", b"ct");
        let c = input_proof("0xc0ffee", "0xabcdee", b"ct");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sha3_concat_matches_joined() {
        assert_eq!(sha3_concat(b"ab", b"cd"), sha3(b"abcd"));
    }
}
