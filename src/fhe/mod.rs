//! Encryption service: client boundary and local stand-in

pub mod local;
pub mod service;

pub use local::LocalEncryptionService;
pub use service::{
    decode_clear_values, encode_clear_values, EncryptedInput, EncryptionService, FheError,
    RevealResult,
};
