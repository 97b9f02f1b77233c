//! Rolling-window statistics.
//!
//! Pure derivations over an [`OutcomeWindow`]: colour distribution,
//! value frequency (with its most and least frequent values), current
//! streak, completed sequences and missing dozens. Every call to
//! [`compute_snapshot`] rebuilds the whole snapshot from the window, so
//! running it twice on the same window yields the same statistics.
//!
//! Percentages are exact decimals rounded to one place
//! (midpoint away from zero).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::outcome::{Color, Column, Dozen, Half, Outcome, Parity, StreamId};
use super::window::OutcomeWindow;

/// Absence at which a dozen is worth showing at all.
pub const LOW_ALERT_ABSENCE: usize = 15;
/// Absence at which a dozen counts as significantly missing.
pub const SIGNIFICANT_ABSENCE: usize = 20;
/// Absence at which a dozen is a high alert.
pub const HIGH_ALERT_ABSENCE: usize = 30;
/// Shortest run reported as a completed sequence.
pub const MIN_SEQUENCE_LENGTH: usize = 3;
/// Entries in each of the most and least frequent value lists.
pub const FREQUENCY_EXTREMES: usize = 5;

// ────────────────────────────────────────────
// Derived statistics
// ────────────────────────────────────────────

/// Share of one colour in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorShare {
    #[serde(rename = "cor")]
    pub color: Color,
    pub total: usize,
    #[serde(rename = "porcentagem", with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
}

/// Frequency of one wheel value in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberFrequency {
    #[serde(rename = "numero")]
    pub value: u8,
    pub total: usize,
    #[serde(rename = "porcentagem", with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
    #[serde(rename = "cor")]
    pub color: Color,
}

/// Partition a streak was measured under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakLabel {
    Color(Color),
    Parity(Parity),
}

impl StreakLabel {
    /// Partition name as shown to consumers.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Color(_) => "cor",
            Self::Parity(_) => "paridade",
        }
    }

    pub fn value(self) -> String {
        match self {
            Self::Color(color) => color.to_string(),
            Self::Parity(parity) => parity.to_string(),
        }
    }
}

/// Run of identical labels ending at the most recent outcome.
///
/// `label` is `None` (and `count` zero) only for an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentStreak {
    pub label: Option<StreakLabel>,
    pub count: usize,
}

impl CurrentStreak {
    pub const NONE: Self = Self {
        label: None,
        count: 0,
    };
}

impl Serialize for CurrentStreak {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CurrentStreak", 3)?;
        state.serialize_field("type", &self.label.map(StreakLabel::kind))?;
        state.serialize_field("value", &self.label.map(StreakLabel::value))?;
        state.serialize_field("count", &self.count)?;
        state.end()
    }
}

/// Partition a completed sequence was detected under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceLabel {
    Parity(Parity),
    Color(Color),
    Dozen(Dozen),
    Column(Column),
    Half(Half),
}

impl SequenceLabel {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Parity(_) => "paridade",
            Self::Color(_) => "cor",
            Self::Dozen(_) => "duzia",
            Self::Column(_) => "coluna",
            Self::Half(_) => "metade",
        }
    }

    pub fn value(self) -> String {
        match self {
            Self::Parity(parity) => parity.to_string(),
            Self::Color(color) => color.to_string(),
            Self::Dozen(dozen) => dozen.to_string(),
            Self::Column(column) => column.to_string(),
            Self::Half(half) => half.to_string(),
        }
    }
}

/// A run of one label that has already been broken.
///
/// Zero has no label under any of these partitions. It neither starts nor
/// breaks a run, and a run that spans it counts it in `length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedSequence {
    pub label: SequenceLabel,
    pub length: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Serialize for CompletedSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CompletedSequence", 5)?;
        state.serialize_field("tipo", self.label.kind())?;
        state.serialize_field("valor", &self.label.value())?;
        state.serialize_field("comprimento", &self.length)?;
        state.serialize_field("inicio", &self.started_at)?;
        state.serialize_field("fim", &self.ended_at)?;
        state.end()
    }
}

/// How loudly a missing dozen should be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Low,
    Significant,
    High,
}

impl AlertLevel {
    pub fn for_absence(absence: usize) -> Self {
        if absence >= HIGH_ALERT_ABSENCE {
            Self::High
        } else if absence >= SIGNIFICANT_ABSENCE {
            Self::Significant
        } else if absence >= LOW_ALERT_ABSENCE {
            Self::Low
        } else {
            Self::None
        }
    }
}

/// Gap since a dozen last appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingDozen {
    #[serde(rename = "dezena")]
    pub dozen: Dozen,
    /// Outcomes scanned before the first hit, or the window size without one.
    #[serde(rename = "ausencia")]
    pub absence: usize,
    /// 1-based position of the most recent hit, 0 if absent from the window.
    #[serde(rename = "ultima_aparicao")]
    pub last_seen: usize,
    pub alert: AlertLevel,
}

impl MissingDozen {
    pub fn is_significant(&self) -> bool {
        self.alert >= AlertLevel::Significant
    }
}

/// Complete statistics for one stream at one point in time.
///
/// Always replaced wholesale; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub stream_id: StreamId,
    pub color_distribution: Vec<ColorShare>,
    pub number_frequency: Vec<NumberFrequency>,
    pub most_frequent: Vec<NumberFrequency>,
    pub least_frequent: Vec<NumberFrequency>,
    pub current_streak: CurrentStreak,
    /// Completed runs, grouped by partition, oldest first within each.
    pub sequences: Vec<CompletedSequence>,
    pub missing_dozens: Vec<MissingDozen>,
    pub window: OutcomeWindow,
    pub computed_at: DateTime<Utc>,
}

impl AnalyticsSnapshot {
    /// Compare the derived statistics, ignoring `computed_at`.
    pub fn same_statistics(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id
            && self.color_distribution == other.color_distribution
            && self.number_frequency == other.number_frequency
            && self.most_frequent == other.most_frequent
            && self.least_frequent == other.least_frequent
            && self.current_streak == other.current_streak
            && self.sequences == other.sequences
            && self.missing_dozens == other.missing_dozens
            && self.window == other.window
    }

    /// The most-missing dozen, if any dozen is tracked.
    pub fn most_missing_dozen(&self) -> Option<&MissingDozen> {
        self.missing_dozens.first()
    }
}

// ────────────────────────────────────────────
// Derivations
// ────────────────────────────────────────────

/// Recompute every statistic from `window`.
pub fn compute_snapshot(stream_id: &str, window: OutcomeWindow) -> AnalyticsSnapshot {
    let frequency = number_frequency(&window);
    AnalyticsSnapshot {
        stream_id: stream_id.to_string(),
        color_distribution: color_distribution(&window),
        most_frequent: most_frequent(&frequency, FREQUENCY_EXTREMES),
        least_frequent: least_frequent(&frequency, FREQUENCY_EXTREMES),
        number_frequency: frequency,
        current_streak: current_streak(&window),
        sequences: completed_sequences(&window),
        missing_dozens: missing_dozens(&window),
        window,
        computed_at: Utc::now(),
    }
}

/// `total * 100 / size`, rounded to one decimal place.
pub fn percentage(total: usize, size: usize) -> Decimal {
    if size == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(total) * dec!(100) / Decimal::from(size))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// Count per colour present in the window, in red/black/green order.
pub fn color_distribution(window: &OutcomeWindow) -> Vec<ColorShare> {
    let size = window.len();
    let mut counts: BTreeMap<Color, usize> = BTreeMap::new();
    for outcome in window.iter() {
        *counts.entry(outcome.color()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(color, total)| ColorShare {
            color,
            total,
            percentage: percentage(total, size),
        })
        .collect()
}

/// Count per value present, most frequent first, ties by ascending value.
pub fn number_frequency(window: &OutcomeWindow) -> Vec<NumberFrequency> {
    let size = window.len();
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for outcome in window.iter() {
        *counts.entry(outcome.value()).or_default() += 1;
    }

    let mut frequency: Vec<NumberFrequency> = counts
        .into_iter()
        .map(|(value, total)| NumberFrequency {
            value,
            total,
            percentage: percentage(total, size),
            color: Color::of(value),
        })
        .collect();

    // BTreeMap already yields ascending values; a stable sort keeps them for ties.
    frequency.sort_by(|a, b| b.total.cmp(&a.total));
    frequency
}

/// The `n` most frequent values, in [`number_frequency`] order.
pub fn most_frequent(frequency: &[NumberFrequency], n: usize) -> Vec<NumberFrequency> {
    frequency.iter().take(n).cloned().collect()
}

/// The `n` least frequent values present in the window, rarest first,
/// ties by ascending value.
pub fn least_frequent(frequency: &[NumberFrequency], n: usize) -> Vec<NumberFrequency> {
    let mut rarest = frequency.to_vec();
    rarest.sort_by(|a, b| a.total.cmp(&b.total).then(a.value.cmp(&b.value)));
    rarest.truncate(n);
    rarest
}

/// Length of the run sharing the most recent entry's label.
fn run_length<L: PartialEq>(window: &OutcomeWindow, label: impl Fn(&Outcome) -> L) -> usize {
    let mut iter = window.iter();
    let Some(first) = iter.next() else {
        return 0;
    };
    let head = label(first);
    1 + iter.take_while(|o| label(o) == head).count()
}

/// Longest current run under the colour or parity partition.
///
/// Ties go to colour.
pub fn current_streak(window: &OutcomeWindow) -> CurrentStreak {
    let Some(latest) = window.latest() else {
        return CurrentStreak::NONE;
    };

    let color_run = run_length(window, Outcome::color);
    let parity_run = run_length(window, Outcome::parity);

    if parity_run > color_run {
        CurrentStreak {
            label: Some(StreakLabel::Parity(latest.parity())),
            count: parity_run,
        }
    } else {
        CurrentStreak {
            label: Some(StreakLabel::Color(latest.color())),
            count: color_run,
        }
    }
}

/// Broken runs of at least [`MIN_SEQUENCE_LENGTH`] under one partition.
///
/// `chronological` is oldest first. The run still open at the newest entry
/// is not reported; [`current_streak`] covers it.
fn completed_runs<L: Copy + PartialEq>(
    chronological: &[&Outcome],
    label_of: impl Fn(&Outcome) -> Option<L>,
    wrap: impl Fn(L) -> SequenceLabel,
) -> Vec<CompletedSequence> {
    let mut runs = Vec::new();
    let mut current: Option<(L, usize)> = None;

    for (i, outcome) in chronological.iter().enumerate() {
        let Some(label) = label_of(outcome) else {
            continue;
        };
        match current {
            Some((run_label, _)) if run_label == label => {}
            Some((run_label, start)) => {
                if i - start >= MIN_SEQUENCE_LENGTH {
                    runs.push(CompletedSequence {
                        label: wrap(run_label),
                        length: i - start,
                        started_at: chronological[start].occurred_at(),
                        ended_at: chronological[i - 1].occurred_at(),
                    });
                }
                current = Some((label, i));
            }
            None => current = Some((label, i)),
        }
    }
    runs
}

/// Completed sequences under the parity, colour, dozen, column and half
/// partitions, in that order.
pub fn completed_sequences(window: &OutcomeWindow) -> Vec<CompletedSequence> {
    let chronological: Vec<&Outcome> = window.iter().rev().collect();

    let mut sequences = completed_runs(
        &chronological,
        |o| (o.parity() != Parity::Zero).then_some(o.parity()),
        SequenceLabel::Parity,
    );
    sequences.extend(completed_runs(
        &chronological,
        |o| (o.color() != Color::Green).then_some(o.color()),
        SequenceLabel::Color,
    ));
    sequences.extend(completed_runs(&chronological, Outcome::dozen, SequenceLabel::Dozen));
    sequences.extend(completed_runs(&chronological, Outcome::column, SequenceLabel::Column));
    sequences.extend(completed_runs(&chronological, Outcome::half, SequenceLabel::Half));
    sequences
}

/// Absence of each dozen from the front of the window, largest first.
///
/// Absence is capped by the window: a dozen never seen in it reports the
/// window size, not its true historical gap.
pub fn missing_dozens(window: &OutcomeWindow) -> Vec<MissingDozen> {
    let mut result: Vec<MissingDozen> = Dozen::ALL
        .iter()
        .map(|&dozen| {
            let hit = window.iter().position(|o| o.dozen() == Some(dozen));
            let absence = hit.unwrap_or(window.len());
            MissingDozen {
                dozen,
                absence,
                last_seen: hit.map_or(0, |i| i + 1),
                alert: AlertLevel::for_absence(absence),
            }
        })
        .collect();

    result.sort_by(|a, b| b.absence.cmp(&a.absence));
    result
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    /// Window from values listed most-recent-first.
    fn window_of(values: &[u8]) -> OutcomeWindow {
        let now = Utc::now();
        let outcomes = values.iter().enumerate().map(|(i, &v)| {
            let age = Duration::seconds(i64::try_from(i).unwrap_or(0) * 30);
            Outcome::new("t1", v, now - age).unwrap()
        });
        OutcomeWindow::from_recent(outcomes, values.len().max(1)).unwrap()
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3), dec!(33.3));
        assert_eq!(percentage(2, 3), dec!(66.7));
        assert_eq!(percentage(1, 8), dec!(12.5));
        assert_eq!(percentage(1, 16), dec!(6.3));
        assert_eq!(percentage(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_color_distribution_counts() {
        // red, black, green, red
        let dist = color_distribution(&window_of(&[1, 2, 0, 3]));
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[0].color, Color::Red);
        assert_eq!(dist[0].total, 2);
        assert_eq!(dist[0].percentage, dec!(50.0));
        assert_eq!(dist[1].color, Color::Black);
        assert_eq!(dist[2].color, Color::Green);
        assert_eq!(dist[2].percentage, dec!(25.0));
    }

    #[test]
    fn test_color_distribution_omits_absent_colors() {
        let dist = color_distribution(&window_of(&[2, 4, 6]));
        assert_eq!(dist.len(), 1);
        assert_eq!(dist[0].color, Color::Black);
        assert_eq!(dist[0].percentage, dec!(100.0));
    }

    #[test]
    fn test_number_frequency_sort_and_ties() {
        let freq = number_frequency(&window_of(&[7, 3, 7, 20, 3, 7, 1]));
        let order: Vec<(u8, usize)> = freq.iter().map(|f| (f.value, f.total)).collect();
        assert_eq!(order, vec![(7, 3), (3, 2), (1, 1), (20, 1)]);
        assert_eq!(freq[0].color, Color::Red);
        assert_eq!(freq.iter().map(|f| f.total).sum::<usize>(), 7);
    }

    #[test]
    fn test_most_and_least_frequent() {
        let freq = number_frequency(&window_of(&[7, 3, 7, 20, 3, 7, 1, 9]));

        let most: Vec<u8> = most_frequent(&freq, 5).iter().map(|f| f.value).collect();
        assert_eq!(most, vec![7, 3, 1, 9, 20]);

        let least: Vec<u8> = least_frequent(&freq, 2).iter().map(|f| f.value).collect();
        assert_eq!(least, vec![1, 9]);
        let least: Vec<u8> = least_frequent(&freq, 5).iter().map(|f| f.value).collect();
        assert_eq!(least, vec![1, 9, 20, 3, 7]);

        assert!(most_frequent(&[], 5).is_empty());
    }

    #[test]
    fn test_sequences_span_zero() {
        // Oldest first: 1, 3, 0, 5, 2. Odd/red run of four (zero included),
        // broken by 2.
        let window = window_of(&[2, 5, 0, 3, 1]);
        let sequences = completed_sequences(&window);
        assert_eq!(sequences.len(), 2);

        assert_eq!(sequences[0].label, SequenceLabel::Parity(Parity::Odd));
        assert_eq!(sequences[0].length, 4);
        assert_eq!(sequences[1].label, SequenceLabel::Color(Color::Red));
        assert_eq!(sequences[1].length, 4);

        let values: Vec<&Outcome> = window.iter().collect();
        assert_eq!(sequences[0].started_at, values[4].occurred_at());
        assert_eq!(sequences[0].ended_at, values[1].occurred_at());
    }

    #[test]
    fn test_zero_does_not_break_dozen_or_half() {
        // Oldest first: 13, 14, 0, 15, 30.
        let sequences = completed_sequences(&window_of(&[30, 15, 0, 14, 13]));
        let labels: Vec<(SequenceLabel, usize)> =
            sequences.iter().map(|s| (s.label, s.length)).collect();
        assert_eq!(
            labels,
            vec![
                (SequenceLabel::Dozen(Dozen::Second), 4),
                (SequenceLabel::Half(Half::Low), 4),
            ]
        );
    }

    #[test]
    fn test_column_sequence() {
        // Oldest first: 1, 4, 7, 10, 2.
        let sequences = completed_sequences(&window_of(&[2, 10, 7, 4, 1]));
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].label, SequenceLabel::Column(Column::First));
        assert_eq!(sequences[0].length, 4);
    }

    #[test]
    fn test_open_run_is_not_completed() {
        // Oldest first: 0, 2, 4, 6. Leading zero starts nothing; the even run is still open.
        assert!(completed_sequences(&window_of(&[6, 4, 2, 0])).is_empty());
        assert!(completed_sequences(&OutcomeWindow::new(5).unwrap()).is_empty());
    }

    #[test]
    fn test_streak_three_reds_then_break() {
        // 1, 3, 5 are red; 2 is black and breaks the run.
        // Parity: 1, 3, 5 odd too, so parity run is 3 as well -> tie goes to colour.
        let streak = current_streak(&window_of(&[1, 3, 5, 2, 9]));
        assert_eq!(streak.label, Some(StreakLabel::Color(Color::Red)));
        assert_eq!(streak.count, 3);
    }

    #[test]
    fn test_streak_prefers_longer_parity_run() {
        // 2 black even, 4 black even, 12 red even, 14 red even
        let streak = current_streak(&window_of(&[2, 4, 12, 14, 1]));
        assert_eq!(streak.label, Some(StreakLabel::Parity(Parity::Even)));
        assert_eq!(streak.count, 4);
    }

    #[test]
    fn test_streak_single_entry_and_empty() {
        let streak = current_streak(&window_of(&[0]));
        assert_eq!(streak.label, Some(StreakLabel::Color(Color::Green)));
        assert_eq!(streak.count, 1);

        let empty = OutcomeWindow::new(10).unwrap();
        assert_eq!(current_streak(&empty), CurrentStreak::NONE);
    }

    #[test]
    fn test_streak_serializes_like_display_layer() {
        let streak = current_streak(&window_of(&[1, 3, 5, 2]));
        let json = serde_json::to_value(streak).unwrap();
        assert_eq!(json["type"], "cor");
        assert_eq!(json["value"], "red");
        assert_eq!(json["count"], 3);

        let none = serde_json::to_value(CurrentStreak::NONE).unwrap();
        assert!(none["type"].is_null());
        assert_eq!(none["count"], 0);
    }

    #[test]
    fn test_missing_dozen_first_hit_at_index_five() {
        // Index 0..4 are second/third dozen or zero; first "low" value at index 5.
        let missing = missing_dozens(&window_of(&[20, 30, 0, 15, 33, 4, 13]));
        let first = missing.iter().find(|m| m.dozen == Dozen::First).unwrap();
        assert_eq!(first.absence, 5);
        assert_eq!(first.last_seen, 6);
        assert_eq!(missing[0].dozen, Dozen::First);
    }

    #[test]
    fn test_missing_dozen_caps_at_window_size() {
        let values = vec![14u8; 25];
        let missing = missing_dozens(&window_of(&values));
        let first = missing.iter().find(|m| m.dozen == Dozen::First).unwrap();
        assert_eq!(first.absence, 25);
        assert_eq!(first.last_seen, 0);
        assert_eq!(first.alert, AlertLevel::Significant);
        assert!(first.is_significant());

        let second = missing.iter().find(|m| m.dozen == Dozen::Second).unwrap();
        assert_eq!(second.absence, 0);
        assert_eq!(second.alert, AlertLevel::None);
    }

    #[test]
    fn test_alert_levels() {
        assert_eq!(AlertLevel::for_absence(14), AlertLevel::None);
        assert_eq!(AlertLevel::for_absence(15), AlertLevel::Low);
        assert_eq!(AlertLevel::for_absence(20), AlertLevel::Significant);
        assert_eq!(AlertLevel::for_absence(29), AlertLevel::Significant);
        assert_eq!(AlertLevel::for_absence(30), AlertLevel::High);
    }

    #[test]
    fn test_snapshot_recompute_is_idempotent() {
        let window = window_of(&[17, 0, 22, 22, 9, 31, 4]);
        let a = compute_snapshot("t1", window.clone());
        let b = compute_snapshot("t1", window);
        assert!(a.same_statistics(&b));
    }

    #[test]
    fn test_snapshot_serialized_field_names() {
        let snapshot = compute_snapshot("t1", window_of(&[5]));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["streamId"], "t1");
        assert_eq!(json["colorDistribution"][0]["cor"], "red");
        assert_eq!(json["colorDistribution"][0]["porcentagem"], 100.0);
        assert_eq!(json["numberFrequency"][0]["numero"], 5);
        assert!(json["missingDozens"][0].get("ausencia").is_some());
        assert_eq!(json["mostFrequent"][0]["numero"], 5);
        assert_eq!(json["leastFrequent"][0]["numero"], 5);
        assert_eq!(json["sequences"].as_array().map(Vec::len), Some(0));

        let snapshot = compute_snapshot("t1", window_of(&[2, 5, 0, 3, 1]));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sequences"][0]["tipo"], "paridade");
        assert_eq!(json["sequences"][0]["valor"], "odd");
        assert_eq!(json["sequences"][0]["comprimento"], 4);
        assert!(json["sequences"][1].get("inicio").is_some());
        assert_eq!(json["window"].as_array().map(Vec::len), Some(1));
    }
}
