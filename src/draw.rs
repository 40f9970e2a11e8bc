//! Winner selection over the loaded entries
//!
//! The draw is display-only. In `DrawMode::Local` the index comes from the
//! local PRNG and nobody else can check it. `DrawMode::Committed` derives the
//! index from a beacon value and the sorted record ids, so a third party with
//! the same inputs gets the same winner.

use crate::config::DrawMode;
use crate::crypto::sha3_concat;
use crate::fhe::EncryptionService;
use crate::ledger::LedgerGateway;
use crate::lottery::{Lottery, LotteryError};
use crate::types::LotteryEntry;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{info, warn};

const NO_PARTICIPANTS: &str = "No participants in the lottery";

/// Drawn winner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    /// Position in the entry list the draw ran over
    pub index: usize,
    pub entry: LotteryEntry,
    pub mode: DrawMode,
}

#[derive(Debug, Clone)]
pub struct WinnerSelector {
    mode: DrawMode,
}

impl WinnerSelector {
    pub fn new(mode: DrawMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    /// Index into `record_ids`, `None` when there is nothing to draw from.
    pub fn pick(&self, record_ids: &[&str]) -> Option<usize> {
        if record_ids.is_empty() {
            return None;
        }
        let len = record_ids.len();
        let index = match self.mode {
            DrawMode::Local => rand::thread_rng().gen_range(0..len),
            DrawMode::Committed { beacon } => committed_index(&beacon, record_ids),
        };
        Some(index)
    }
}

impl<L: LedgerGateway, E: EncryptionService> Lottery<L, E> {
    /// Draw a display-only winner from the loaded entries.
    ///
    /// Refused for an empty list or when the ledger does not answer its
    /// liveness check. The winner is returned after the configured reveal delay.
    pub async fn draw_winner(&self) -> Result<Winner, LotteryError> {
        let entries = self.entries().await;
        if entries.is_empty() {
            self.status.error(NO_PARTICIPANTS);
            return Err(LotteryError::DrawUnavailable(NO_PARTICIPANTS.into()));
        }

        self.status.pending("Drawing winner...");

        match self.ledger.is_available().await {
            Ok(true) => {}
            Ok(false) => return Err(self.draw_failed("ledger unavailable".into())),
            Err(e) => return Err(self.draw_failed(e.to_string())),
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.ledger_record_id.as_str()).collect();
        let Some(index) = self.selector.pick(&ids) else {
            return Err(self.draw_failed(NO_PARTICIPANTS.into()));
        };

        tokio::time::sleep(self.config.draw_reveal_delay).await;

        let entry = entries[index].clone();
        info!(
            "Winner drawn ({:?}): {} ({})",
            self.selector.mode(),
            entry.display_name,
            entry.ledger_record_id
        );
        self.status.success(format!("Winner selected: {}", entry.display_name));

        Ok(Winner { index, entry, mode: self.selector.mode() })
    }

    fn draw_failed(&self, reason: String) -> LotteryError {
        warn!("Draw failed: {}", reason);
        let message = format!("Draw failed: {}", reason);
        self.status.error(message.clone());
        LotteryError::DrawUnavailable(message)
    }
}

/// Reproducible draw: position in the caller's order of the winner among
/// the sorted ids.
fn committed_index(beacon: &[u8; 32], record_ids: &[&str]) -> usize {
    let mut sorted: Vec<&str> = record_ids.to_vec();
    sorted.sort_unstable();

    let joined = sorted.join("\n");
    let seed = sha3_concat(beacon, joined.as_bytes());
    let mut rng = ChaCha20Rng::from_seed(seed);
    let winner = sorted[rng.gen_range(0..sorted.len())];

    record_ids.iter().position(|id| *id == winner).unwrap_or(0)
}
