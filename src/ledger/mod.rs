//! Ledger access: contract boundary and local emulation

pub mod gateway;
pub mod local;

pub use gateway::{
    CiphertextHandle, CreateEntry, LedgerError, LedgerGateway, LedgerRecord, LedgerSigner,
    PendingTx, Receipt,
    ALREADY_VERIFIED_MARKER, USER_REJECTED_MARKER,
};
pub use local::{LocalLedger, LocalLedgerConfig, LocalSigner};
