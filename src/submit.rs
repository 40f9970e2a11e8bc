//! Encrypt-submit pipeline
//!
//! ```text
//! signing handle → encrypt(contract, submitter, ticket) → createEntry
//!     → settle → reload → clear form
//! ```
//!
//! Steps run strictly in order. Only settled entries reach the cache, so a
//! failure at any step leaves nothing behind except the still-filled form.

use crate::fhe::EncryptionService;
use crate::ledger::{CreateEntry, LedgerGateway, LedgerSigner};
use crate::lottery::{Lottery, LotteryError};
use crate::types::{new_record_id, Address, PUBLIC_VALUE2_RESERVED};
use std::sync::atomic::Ordering;
use std::sync::MutexGuard;
use tracing::{info, warn};

/// Contents of the submission form.
///
/// The ticket field only ever holds digits; everything else is stripped as
/// it is typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketForm {
    pub name: String,
    ticket_number: String,
}

impl TicketForm {
    pub fn new(name: &str, ticket_number: &str) -> Self {
        let mut form = Self::default();
        form.set_name(name);
        form.set_ticket_number(ticket_number);
        form
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_ticket_number(&mut self, raw: &str) {
        self.ticket_number = raw.chars().filter(char::is_ascii_digit).collect();
    }

    pub fn ticket_number(&self) -> &str {
        &self.ticket_number
    }

    /// Both fields filled in
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.ticket_number.is_empty()
    }

    /// Validated `(display name, ticket)`
    pub fn parse(&self) -> Result<(String, u64), LotteryError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LotteryError::InvalidTicket("Participant name is required".into()));
        }
        match self.ticket_number.parse::<u64>() {
            Ok(ticket) if ticket > 0 => Ok((name.to_string(), ticket)),
            _ => Err(LotteryError::InvalidTicket(
                "Ticket number must be a positive integer".into(),
            )),
        }
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.ticket_number.clear();
    }
}

impl<L: LedgerGateway, E: EncryptionService> Lottery<L, E> {
    // =========================================================================
    // SUBMISSION SURFACE
    // =========================================================================

    pub fn open_submission(&self) {
        self.submission_open.store(true, Ordering::Release);
    }

    /// Close the form. Does not abort a submission already in flight.
    pub fn close_submission(&self) {
        self.submission_open.store(false, Ordering::Release);
    }

    pub fn is_submission_open(&self) -> bool {
        self.submission_open.load(Ordering::Acquire)
    }

    pub fn form(&self) -> TicketForm {
        self.form_guard().clone()
    }

    pub fn edit_form(&self, edit: impl FnOnce(&mut TicketForm)) {
        edit(&mut self.form_guard());
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.is_busy()
    }

    pub fn is_encrypting(&self) -> bool {
        self.encrypting.is_busy()
    }

    /// Whether the submit action should be enabled
    pub fn can_submit(&self) -> bool {
        !self.submitting.is_busy() && !self.encrypting.is_busy() && self.form_guard().is_complete()
    }

    fn form_guard(&self) -> MutexGuard<'_, TicketForm> {
        match self.form.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Submit the ticket currently in the form. Returns the new record id.
    ///
    /// Rejected with `Busy` while another submission is in flight.
    pub async fn submit_ticket(&self) -> Result<String, LotteryError> {
        let account = match self.session.account() {
            Some(account) if self.session.is_ready() => account,
            _ => {
                self.status.error(LotteryError::NotConnected.to_string());
                return Err(LotteryError::NotConnected);
            }
        };

        let (name, ticket) = match self.form().parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                self.status.error(e.to_string());
                return Err(e);
            }
        };

        let Some(_permit) = self.submitting.try_acquire() else {
            return Err(LotteryError::Busy("submission"));
        };

        self.status.pending("Encrypting ticket with Zama FHE...");

        match self.run_submission(&account, name, ticket).await {
            Ok(record_id) => Ok(record_id),
            Err(e) => {
                warn!("Submission failed: {:?}", e);
                self.status.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_submission(
        &self,
        account: &Address,
        name: String,
        ticket: u64,
    ) -> Result<String, LotteryError> {
        let signer = self.ledger.signer(account).await.map_err(|e| {
            warn!("No signing handle for {}: {}", account.short(), e);
            LotteryError::SigningUnavailable
        })?;

        let contract = self.ledger.contract_address();

        let encrypted = {
            let _busy = self.encrypting.try_acquire();
            self.session
                .service()
                .encrypt(&contract, account, ticket)
                .await
                .map_err(|e| LotteryError::SubmissionFailed(e.to_string()))?
        };

        let record_id = new_record_id();
        info!("Submitting entry {} for {}", record_id, account.short());

        // public_value1 mirrors the ticket in clear next to its ciphertext
        let pending = signer
            .create_entry(CreateEntry {
                record_id: record_id.clone(),
                display_name: name,
                ciphertext: encrypted.ciphertext,
                input_proof: encrypted.proof,
                public_value1: ticket,
                public_value2: PUBLIC_VALUE2_RESERVED,
                description: self.config.entry_description.clone(),
            })
            .await
            .map_err(LotteryError::from_submission)?;

        self.status.pending("Waiting for transaction confirmation...");
        pending.wait().await.map_err(LotteryError::from_submission)?;

        self.status.success("Successfully entered the lottery!");

        if let Err(e) = self.reload().await {
            warn!("Entry {} settled but reload failed: {}", record_id, e);
        }

        self.close_submission();
        self.form_guard().clear();

        Ok(record_id)
    }
}
