//! Orchestrator configuration

use crate::types::{Hash, ENTRY_DESCRIPTION, RECENT_WINDOW_SECS};
use std::time::Duration;

/// Where the winner draw takes its entropy from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    /// Local OS-seeded PRNG. Not reproducible and not verifiable by anyone else.
    #[default]
    Local,
    /// ChaCha20 seeded from `SHA3-256(beacon ‖ record ids)`. Anyone holding the
    /// beacon and the entry list can recompute the winner.
    Committed { beacon: Hash },
}

#[derive(Debug, Clone)]
pub struct LotteryConfig {
    /// How long a success notification stays up
    pub success_display: Duration,
    /// How long an error notification stays up
    pub error_display: Duration,
    /// Pause between picking a winner and presenting it
    pub draw_reveal_delay: Duration,
    /// Window for the "recent winners" statistic
    pub recent_window_secs: u64,
    pub draw_mode: DrawMode,
    /// Description written into every new entry
    pub entry_description: String,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            success_display: Duration::from_secs(2),
            error_display: Duration::from_secs(3),
            draw_reveal_delay: Duration::from_secs(2),
            recent_window_secs: RECENT_WINDOW_SECS,
            draw_mode: DrawMode::Local,
            entry_description: ENTRY_DESCRIPTION.to_string(),
        }
    }
}
