//! Derived lottery statistics

use crate::types::LotteryEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryStats {
    pub total_participants: usize,
    pub verified_entries: usize,
    /// `round(verified / total * 100)`, 0 for an empty lottery
    pub average_winning_chance: u32,
    /// Verified entries created within the trailing window
    pub recent_winners: usize,
}

impl LotteryStats {
    /// Recompute from scratch over the full entry list.
    pub fn compute(entries: &[LotteryEntry], now: u64, window_secs: u64) -> Self {
        let total = entries.len();
        let verified = entries.iter().filter(|e| e.is_verified).count();

        let chance = if total > 0 {
            (verified as f64 / total as f64 * 100.0).round() as u32
        } else {
            0
        };

        let cutoff = now.saturating_sub(window_secs);
        let recent = entries
            .iter()
            .filter(|e| e.is_verified && e.created_at > cutoff)
            .count();

        Self {
            total_participants: total,
            verified_entries: verified,
            average_winning_chance: chance,
            recent_winners: recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, RECENT_WINDOW_SECS};

    fn entry(verified: bool, created_at: u64) -> LotteryEntry {
        LotteryEntry {
            id: created_at,
            display_name: "p".into(),
            ledger_record_id: format!("lottery-{}", created_at),
            public_value1: 1,
            public_value2: 0,
            description: String::new(),
            creator_address: Address::new("0x01"),
            created_at,
            is_verified: verified,
            revealed_value: verified.then_some(1),
        }
    }

    #[test]
    fn test_empty() {
        assert_eq!(LotteryStats::compute(&[], 1_000, RECENT_WINDOW_SECS), LotteryStats::default());
    }

    #[test]
    fn test_rounding() {
        let now = 1_700_000_000;
        let entries = vec![entry(true, now), entry(false, now), entry(false, now)];
        // 33.3 -> 33
        let stats = LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS);
        assert_eq!(stats.average_winning_chance, 33);

        let entries = vec![entry(true, now), entry(true, now), entry(false, now)];
        // 66.7 -> 67
        let stats = LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS);
        assert_eq!(stats.average_winning_chance, 67);
    }

    #[test]
    fn test_recent_window_is_exclusive() {
        let now = 1_700_000_000;
        let entries = vec![
            entry(true, now - RECENT_WINDOW_SECS),
            entry(true, now - RECENT_WINDOW_SECS + 1),
        ];
        assert_eq!(LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS).recent_winners, 1);
    }
}
