//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that windows and derived statistics
//! hold their invariants across random outcome sequences.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use roulette_pulse::domain::analytics::{
    FREQUENCY_EXTREMES, MIN_SEQUENCE_LENGTH, color_distribution, completed_sequences,
    compute_snapshot, current_streak, least_frequent, missing_dozens, most_frequent,
    number_frequency,
};
use roulette_pulse::domain::backoff::ReconnectBackoff;
use roulette_pulse::domain::outcome::{Outcome, Parity};
use roulette_pulse::domain::window::OutcomeWindow;

/// Most-recent-first outcomes built from raw values.
fn outcomes(values: &[u8]) -> Vec<Outcome> {
    let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let len = values.len() as i64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Outcome::new("P", *v, t0 + Duration::seconds(len - i as i64)).unwrap())
        .collect()
}

fn window(values: &[u8], capacity: usize) -> OutcomeWindow {
    OutcomeWindow::from_recent(outcomes(values), capacity).unwrap()
}

fn values_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..=36, 0..150)
}

// ── Window Properties ───────────────────────────────────────

proptest! {
    /// Pushing never grows a window past its capacity.
    #[test]
    fn window_never_exceeds_capacity(
        values in values_strategy(),
        capacity in 1usize..60,
    ) {
        let mut window = OutcomeWindow::new(capacity).unwrap();
        for outcome in outcomes(&values) {
            window.push(outcome);
            prop_assert!(window.len() <= capacity);
        }
        prop_assert_eq!(window.len(), values.len().min(capacity));
    }

    /// The newest push is always at the front.
    #[test]
    fn window_front_is_latest_push(
        values in prop::collection::vec(0u8..=36, 1..80),
        capacity in 1usize..40,
    ) {
        let mut window = OutcomeWindow::new(capacity).unwrap();
        for outcome in outcomes(&values) {
            let value = outcome.value();
            window.push(outcome);
            prop_assert_eq!(window.latest().map(Outcome::value), Some(value));
        }
    }
}

// ── Derived Statistic Properties ────────────────────────────

proptest! {
    /// Colour percentages of a non-empty window sum to 100 within rounding.
    #[test]
    fn color_percentages_sum_to_hundred(
        values in prop::collection::vec(0u8..=36, 1..150),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let total: Decimal = color_distribution(&window).iter().map(|c| c.percentage).sum();
        prop_assert!(
            (total - dec!(100)).abs() <= dec!(0.2),
            "colour percentages sum to {total}"
        );
    }

    /// Value frequency totals add up to the window size.
    #[test]
    fn number_frequency_totals_match_window(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let frequency = number_frequency(&window);
        let total: usize = frequency.iter().map(|f| f.total).sum();
        prop_assert_eq!(total, window.len());

        for pair in frequency.windows(2) {
            prop_assert!(
                pair[0].total > pair[1].total
                    || (pair[0].total == pair[1].total && pair[0].value < pair[1].value),
                "frequency not sorted: {:?} before {:?}", pair[0], pair[1]
            );
        }
    }

    /// A non-empty window always has a streak of at least one, never
    /// longer than the window, measured from the latest outcome.
    #[test]
    fn streak_bounded_by_window(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let streak = current_streak(&window);
        if window.is_empty() {
            prop_assert_eq!(streak.count, 0);
            prop_assert!(streak.label.is_none());
        } else {
            prop_assert!(streak.count >= 1);
            prop_assert!(streak.count <= window.len());

            let latest = window.latest().unwrap();
            let color_run = window.iter().take_while(|o| o.color() == latest.color()).count();
            let parity_run = window
                .iter()
                .take_while(|o| o.parity() == latest.parity())
                .count();
            prop_assert_eq!(streak.count, color_run.max(parity_run));
            if latest.parity() == Parity::Zero {
                prop_assert_eq!(color_run, parity_run);
            }
        }
    }

    /// Absence never exceeds the window size and missing dozens are
    /// sorted by absence, most missing first.
    #[test]
    fn missing_dozens_bounded_and_sorted(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let missing = missing_dozens(&window);
        prop_assert_eq!(missing.len(), 3);
        for entry in &missing {
            prop_assert!(entry.absence <= window.len());
            prop_assert!(entry.absence <= capacity);
        }
        for pair in missing.windows(2) {
            prop_assert!(pair[0].absence >= pair[1].absence);
        }
    }

    /// Completed sequences are long enough, fit in the window, and never
    /// overlap within one partition.
    #[test]
    fn sequences_bounded_by_window(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let sequences = completed_sequences(&window);

        let mut per_kind: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for sequence in &sequences {
            prop_assert!(sequence.length >= MIN_SEQUENCE_LENGTH);
            prop_assert!(sequence.length < window.len());
            prop_assert!(sequence.started_at <= sequence.ended_at);
            *per_kind.entry(sequence.label.kind()).or_default() += sequence.length;
        }
        for total in per_kind.values() {
            prop_assert!(*total <= window.len());
        }
    }

    /// The most frequent list is a prefix of the frequency table and the
    /// least frequent list is sorted rarest first.
    #[test]
    fn frequency_extremes_consistent(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let window = window(&values, capacity);
        let frequency = number_frequency(&window);
        let expected = frequency.len().min(FREQUENCY_EXTREMES);

        let most = most_frequent(&frequency, FREQUENCY_EXTREMES);
        prop_assert_eq!(most.len(), expected);
        prop_assert_eq!(&most[..], &frequency[..expected]);

        let least = least_frequent(&frequency, FREQUENCY_EXTREMES);
        prop_assert_eq!(least.len(), expected);
        for pair in least.windows(2) {
            prop_assert!(
                pair[0].total < pair[1].total
                    || (pair[0].total == pair[1].total && pair[0].value < pair[1].value)
            );
        }
        if let (Some(rarest), Some(min)) = (least.first(), frequency.iter().map(|f| f.total).min()) {
            prop_assert_eq!(rarest.total, min);
        }
    }

    /// Recomputing an unchanged window gives the same statistics.
    #[test]
    fn snapshot_is_idempotent(
        values in values_strategy(),
        capacity in 1usize..120,
    ) {
        let first = compute_snapshot("P", window(&values, capacity));
        let second = compute_snapshot("P", window(&values, capacity));
        prop_assert!(first.same_statistics(&second));
    }
}

// ── Backoff Properties ──────────────────────────────────────

proptest! {
    /// Delays never shrink between attempts and never pass the cap.
    #[test]
    fn backoff_monotonic_and_capped(
        base_ms in 1u64..5_000,
        max_ms in 1u64..120_000,
        attempt in 1u32..200,
    ) {
        let backoff = ReconnectBackoff::new(
            std::time::Duration::from_millis(base_ms),
            std::time::Duration::from_millis(max_ms),
        );
        let current = backoff.delay(attempt);
        let next = backoff.delay(attempt + 1);
        prop_assert!(next >= current);
        prop_assert!(current <= backoff.max());
        prop_assert!(current >= backoff.base().min(backoff.max()));
    }
}
