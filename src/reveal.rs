//! Decrypt-verify pipeline
//!
//! Every call first reads the entry from the ledger. A verified entry is
//! answered from the ledger directly; the reveal protocol is never run twice
//! for the same entry because the contract only accepts one proof.
//!
//! Otherwise:
//!
//! ```text
//! signing handle → ciphertext handle → reveal(handle, contract, submit proof) → reload → value
//! ```
//!
//! The encryption service calls back into the ledger with the clear values
//! and decryption proof before it returns; the value is only handed out once
//! the ledger has settled the proof. If someone else proved the entry in the
//! meantime the ledger refuses with "already verified" and the pipeline
//! falls back to the ledger's copy.

use crate::fhe::{EncryptionService, FheError};
use crate::ledger::{LedgerError, LedgerGateway, LedgerSigner};
use crate::lottery::{Lottery, LotteryError};
use crate::types::{Address, LotteryEntry};
use tracing::{info, warn};

/// How a verification request was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Entry was already proven; value read from the ledger
    OnLedger(u64),
    /// This session ran the reveal protocol and the ledger accepted the proof
    Revealed(u64),
    /// Another actor proved the entry first; read the value from the reloaded list
    SettledElsewhere,
    /// A cached local reveal was discarded
    Forgotten,
}

impl RevealOutcome {
    pub fn value(&self) -> Option<u64> {
        match self {
            RevealOutcome::OnLedger(v) | RevealOutcome::Revealed(v) => Some(*v),
            RevealOutcome::SettledElsewhere | RevealOutcome::Forgotten => None,
        }
    }
}

/// Value to show for an entry, and who vouches for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayedValue {
    OnLedger(u64),
    /// Revealed by this session and not yet seen as verified on the ledger
    Local(u64),
}

impl<L: LedgerGateway, E: EncryptionService> Lottery<L, E> {
    pub fn is_revealing(&self) -> bool {
        self.revealing.is_busy()
    }

    /// Cached value from a reveal this session completed
    pub fn local_reveal(&self, record_id: &str) -> Option<u64> {
        self.reveals().get(record_id).copied()
    }

    pub fn displayed_value(&self, entry: &LotteryEntry) -> Option<DisplayedValue> {
        if let Some(v) = entry.verified_value() {
            return Some(DisplayedValue::OnLedger(v));
        }
        self.local_reveal(&entry.ledger_record_id).map(DisplayedValue::Local)
    }

    /// Verify action on an entry.
    ///
    /// With a cached local reveal this forgets the value instead of asking
    /// again, unless the ledger has verified the entry since, in which case
    /// the ledger answers.
    pub async fn toggle_reveal(&self, record_id: &str) -> Result<RevealOutcome, LotteryError> {
        if self.local_reveal(record_id).is_some() {
            let current = self.ledger.get_entry(record_id).await;
            let verified_now = matches!(current, Ok(r) if r.is_verified);
            self.reveals().remove(record_id);
            if !verified_now {
                info!("Forgot local reveal of {}", record_id);
                return Ok(RevealOutcome::Forgotten);
            }
        }

        let outcome = self.verify_entry(record_id).await?;
        if let RevealOutcome::Revealed(v) = outcome {
            self.reveals().insert(record_id.to_string(), v);
        }
        Ok(outcome)
    }

    /// Resolve the cleartext of `record_id`.
    ///
    /// A verified entry is answered from the ledger without taking the
    /// reveal guard. Running the reveal protocol is rejected with `Busy`
    /// while another reveal is in flight.
    pub async fn verify_entry(&self, record_id: &str) -> Result<RevealOutcome, LotteryError> {
        let Some(account) = self.session.account() else {
            self.status.error(LotteryError::NotConnected.to_string());
            return Err(LotteryError::NotConnected);
        };

        let result = match self.ledger.get_entry(record_id).await.map_err(read_error) {
            Ok(record) if record.is_verified => {
                info!("Entry {} already verified on ledger", record_id);
                self.status.success("Ticket already verified on-chain");
                return Ok(RevealOutcome::OnLedger(record.revealed_value));
            }
            Ok(_) => {
                let Some(_permit) = self.revealing.try_acquire() else {
                    return Err(LotteryError::Busy("reveal"));
                };
                self.run_reveal(&account, record_id).await
            }
            Err(e) => Err(e),
        };

        result.inspect_err(|e| {
            warn!("Reveal of {} failed: {:?}", record_id, e);
            self.status.error(e.to_string());
        })
    }

    async fn run_reveal(
        &self,
        account: &Address,
        record_id: &str,
    ) -> Result<RevealOutcome, LotteryError> {
        if !self.session.is_ready() {
            return Err(LotteryError::NotConnected);
        }

        let signer = self.ledger.signer(account).await.map_err(|e| {
            warn!("No signing handle for {}: {}", account.short(), e);
            LotteryError::SigningUnavailable
        })?;
        let handle = self.ledger.get_ciphertext_handle(record_id).await.map_err(read_error)?;
        let contract = self.ledger.contract_address();

        self.status.pending("Verifying ticket decryption...");

        let id = record_id.to_string();
        let submit_proof = move |clear_values, proof| async move {
            let pending = signer.submit_verification(&id, clear_values, proof).await?;
            pending.wait().await.map(|_| ())
        };
        let result = self
            .session
            .service()
            .reveal(std::slice::from_ref(&handle), &contract, submit_proof)
            .await;

        match result {
            Ok(revealed) => {
                let value = revealed
                    .value_for(&handle)
                    .ok_or_else(|| LotteryError::RevealFailed("no clear value for handle".into()))?;

                if let Err(e) = self.reload().await {
                    warn!("Entry {} verified but reload failed: {}", record_id, e);
                }
                info!("Entry {} revealed and verified", record_id);
                self.status.success("Ticket decrypted and verified!");
                Ok(RevealOutcome::Revealed(value))
            }
            Err(e) if e.is_already_verified() => {
                info!("Entry {} was verified concurrently, using ledger value", record_id);
                if let Err(e) = self.reload().await {
                    warn!("Reload after concurrent verification failed: {}", e);
                }
                self.status.success(LotteryError::AlreadyVerified.to_string());
                Ok(RevealOutcome::SettledElsewhere)
            }
            Err(FheError::Submission(e)) if e.is_user_rejection() => {
                Err(LotteryError::UserRejected)
            }
            Err(e) => Err(LotteryError::RevealFailed(e.to_string())),
        }
    }
}

fn read_error(e: LedgerError) -> LotteryError {
    match e {
        LedgerError::NotFound(id) => LotteryError::EntryNotFound(id),
        other => LotteryError::RevealFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_values() {
        assert_eq!(RevealOutcome::OnLedger(3).value(), Some(3));
        assert_eq!(RevealOutcome::Revealed(42).value(), Some(42));
        assert_eq!(RevealOutcome::SettledElsewhere.value(), None);
        assert_eq!(RevealOutcome::Forgotten.value(), None);
    }

    #[test]
    fn test_read_error_mapping() {
        assert_eq!(
            read_error(LedgerError::NotFound("lottery-9".into())),
            LotteryError::EntryNotFound("lottery-9".into())
        );
        assert!(matches!(read_error(LedgerError::Dropped), LotteryError::RevealFailed(_)));
    }
}
