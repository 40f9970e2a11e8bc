//! Statistics tests
//!
//! Run with: cargo test --test stats_test

mod common;

use common::{connected, FakeLedger};
use whitelotto::{now, Address, LotteryEntry, LotteryStats, RECENT_WINDOW_SECS};

fn entry(n: u64, verified: bool, created_at: u64) -> LotteryEntry {
    LotteryEntry {
        id: n,
        display_name: format!("P{}", n),
        ledger_record_id: format!("lottery-{}", n),
        public_value1: n,
        public_value2: 0,
        description: "Lottery Participant Entry".into(),
        creator_address: Address::new("0x01"),
        created_at,
        is_verified: verified,
        revealed_value: verified.then_some(n),
    }
}

// =============================================================================
// AGGREGATION
// =============================================================================

#[test]
fn test_mixed_ages_and_verification() {
    let now = 1_700_000_000;
    let entries = vec![entry(1, true, now - 3_600), entry(2, false, now - 90_000)];

    let stats = LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS);

    assert_eq!(stats.total_participants, 2);
    assert_eq!(stats.verified_entries, 1);
    assert_eq!(stats.average_winning_chance, 50);
    assert_eq!(stats.recent_winners, 1);
}

#[test]
fn test_old_verified_entries_are_not_recent() {
    let now = 1_700_000_000;
    let entries = vec![entry(1, true, now - 90_000), entry(2, true, now - 10)];

    let stats = LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS);
    assert_eq!(stats.verified_entries, 2);
    assert_eq!(stats.average_winning_chance, 100);
    assert_eq!(stats.recent_winners, 1);
}

#[test]
fn test_bounds_hold_for_every_mix() {
    let now = 1_700_000_000;
    for total in 0..40u64 {
        for verified in 0..=total {
            let entries: Vec<LotteryEntry> =
                (0..total).map(|i| entry(i, i < verified, now - i * 5_000)).collect();

            let stats = LotteryStats::compute(&entries, now, RECENT_WINDOW_SECS);

            assert_eq!(stats.total_participants, total as usize);
            assert!(stats.verified_entries <= stats.total_participants);
            assert!(stats.average_winning_chance <= 100);
            assert!(stats.recent_winners <= stats.verified_entries);
        }
    }
}

// =============================================================================
// THROUGH THE ORCHESTRATOR
// =============================================================================

#[tokio::test]
async fn test_stats_follow_reloads() {
    let ledger = FakeLedger::new();
    ledger.seed("lottery-1", "Alice", 42, now() - 3_600, false);
    ledger.seed("lottery-2", "Bob", 7, now() - 90_000, false);
    let lottery = connected(&ledger).await;

    let before = lottery.stats().await;
    assert_eq!(before.total_participants, 2);
    assert_eq!(before.verified_entries, 0);
    assert_eq!(before.average_winning_chance, 0);

    lottery.verify_entry("lottery-1").await.unwrap();

    let snapshot = lottery.snapshot().await;
    assert_eq!(snapshot.stats.verified_entries, 1);
    assert_eq!(snapshot.stats.average_winning_chance, 50);
    assert_eq!(snapshot.stats.recent_winners, 1);
    assert_eq!(snapshot.stats, LotteryStats::compute(&snapshot.entries, now(), RECENT_WINDOW_SECS));
}
