//! Core roulette outcome types.
//!
//! An `Outcome` is one spin result for one stream (table). Its colour,
//! parity, dozen, column and half are always derived from the value,
//! never supplied by the producer, so a classification can never
//! disagree with the number it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Identifier of an outcome stream (one roulette table).
pub type StreamId = String;

/// Highest value on a single-zero wheel.
pub const MAX_VALUE: u8 = 36;

/// Values painted red on a single-zero wheel.
const RED_VALUES: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

// ────────────────────────────────────────────
// Partition labels
// ────────────────────────────────────────────

/// Pocket colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl Color {
    /// All colours in display order.
    pub const ALL: [Self; 3] = [Self::Red, Self::Black, Self::Green];

    /// Colour of a wheel value. Zero is the only green pocket.
    pub fn of(value: u8) -> Self {
        if value == 0 {
            Self::Green
        } else if RED_VALUES.contains(&value) {
            Self::Red
        } else {
            Self::Black
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Black => write!(f, "black"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Parity of a value. Zero is neutral: neither even nor odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
    Zero,
}

impl Parity {
    pub fn of(value: u8) -> Self {
        match value {
            0 => Self::Zero,
            v if v % 2 == 0 => Self::Even,
            _ => Self::Odd,
        }
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Even => write!(f, "even"),
            Self::Odd => write!(f, "odd"),
            Self::Zero => write!(f, "zero"),
        }
    }
}

/// Value-range third of the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dozen {
    /// 1–12
    First,
    /// 13–24
    Second,
    /// 25–36
    Third,
}

impl Dozen {
    pub const ALL: [Self; 3] = [Self::First, Self::Second, Self::Third];

    /// Dozen containing `value`, or `None` for zero.
    pub fn of(value: u8) -> Option<Self> {
        match value {
            1..=12 => Some(Self::First),
            13..=24 => Some(Self::Second),
            25..=36 => Some(Self::Third),
            _ => None,
        }
    }

    /// Human-readable value range, e.g. `"1-12"`.
    pub fn range_label(self) -> &'static str {
        match self {
            Self::First => "1-12",
            Self::Second => "13-24",
            Self::Third => "25-36",
        }
    }
}

impl std::fmt::Display for Dozen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.range_label())
    }
}

/// Column of the betting layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    /// 1, 4, 7, ..., 34
    First,
    /// 2, 5, 8, ..., 35
    Second,
    /// 3, 6, 9, ..., 36
    Third,
}

impl Column {
    /// Column containing `value`, or `None` for zero.
    pub fn of(value: u8) -> Option<Self> {
        match value {
            0 => None,
            v => match (v - 1) % 3 {
                0 => Some(Self::First),
                1 => Some(Self::Second),
                _ => Some(Self::Third),
            },
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
            Self::Third => write!(f, "third"),
        }
    }
}

/// Low (1-18) or high (19-36) half of the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    Low,
    High,
}

impl Half {
    /// Half containing `value`, or `None` for zero.
    pub fn of(value: u8) -> Option<Self> {
        match value {
            1..=18 => Some(Self::Low),
            19..=36 => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Half {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::High => write!(f, "high"),
        }
    }
}

// ────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────

/// A single spin result. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome", into = "RawOutcome")]
pub struct Outcome {
    stream_id: StreamId,
    value: u8,
    color: Color,
    occurred_at: DateTime<Utc>,
}

impl Outcome {
    /// Build an outcome, deriving its colour from `value`.
    ///
    /// # Errors
    /// Returns `DomainError::ValueOutOfRange` if `value > 36`.
    pub fn new(
        stream_id: impl Into<StreamId>,
        value: u8,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if value > MAX_VALUE {
            return Err(DomainError::ValueOutOfRange { value: value.into() });
        }
        Ok(Self {
            stream_id: stream_id.into(),
            value,
            color: Color::of(value),
            occurred_at,
        })
    }

    /// Like [`Outcome::new`] but accepts any integer, as found on the wire.
    pub fn from_wire(
        stream_id: impl Into<StreamId>,
        value: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let value = u8::try_from(value).map_err(|_| DomainError::ValueOutOfRange { value })?;
        Self::new(stream_id, value, occurred_at)
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn parity(&self) -> Parity {
        Parity::of(self.value)
    }

    pub fn dozen(&self) -> Option<Dozen> {
        Dozen::of(self.value)
    }

    pub fn column(&self) -> Option<Column> {
        Column::of(self.value)
    }

    pub fn half(&self) -> Option<Half> {
        Half::of(self.value)
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Serialized shape of an outcome (category included for readers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    stream_id: StreamId,
    value: i64,
    #[serde(default, skip_deserializing)]
    category: Option<Color>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<RawOutcome> for Outcome {
    type Error = DomainError;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        Self::from_wire(raw.stream_id, raw.value, raw.occurred_at)
    }
}

impl From<Outcome> for RawOutcome {
    fn from(outcome: Outcome) -> Self {
        Self {
            stream_id: outcome.stream_id,
            value: outcome.value.into(),
            category: Some(outcome.color),
            occurred_at: outcome.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_mapping() {
        assert_eq!(Color::of(0), Color::Green);
        assert_eq!(Color::of(5), Color::Red);
        assert_eq!(Color::of(36), Color::Red);
        assert_eq!(Color::of(2), Color::Black);
        assert_eq!(Color::of(10), Color::Black);
        assert_eq!(Color::of(19), Color::Red);

        let reds = (0..=MAX_VALUE).filter(|v| Color::of(*v) == Color::Red).count();
        let blacks = (0..=MAX_VALUE).filter(|v| Color::of(*v) == Color::Black).count();
        assert_eq!(reds, 18);
        assert_eq!(blacks, 18);
    }

    #[test]
    fn test_zero_is_neutral() {
        assert_eq!(Parity::of(0), Parity::Zero);
        assert_eq!(Dozen::of(0), None);
        assert_eq!(Parity::of(14), Parity::Even);
        assert_eq!(Parity::of(7), Parity::Odd);
    }

    #[test]
    fn test_dozen_boundaries() {
        assert_eq!(Dozen::of(1), Some(Dozen::First));
        assert_eq!(Dozen::of(12), Some(Dozen::First));
        assert_eq!(Dozen::of(13), Some(Dozen::Second));
        assert_eq!(Dozen::of(24), Some(Dozen::Second));
        assert_eq!(Dozen::of(25), Some(Dozen::Third));
        assert_eq!(Dozen::of(36), Some(Dozen::Third));
    }

    #[test]
    fn test_column_and_half_mapping() {
        assert_eq!(Column::of(0), None);
        assert_eq!(Column::of(1), Some(Column::First));
        assert_eq!(Column::of(34), Some(Column::First));
        assert_eq!(Column::of(2), Some(Column::Second));
        assert_eq!(Column::of(35), Some(Column::Second));
        assert_eq!(Column::of(3), Some(Column::Third));
        assert_eq!(Column::of(36), Some(Column::Third));

        assert_eq!(Half::of(0), None);
        assert_eq!(Half::of(18), Some(Half::Low));
        assert_eq!(Half::of(19), Some(Half::High));

        for column in [Column::First, Column::Second, Column::Third] {
            let members = (1..=MAX_VALUE).filter(|v| Column::of(*v) == Some(column)).count();
            assert_eq!(members, 12);
        }
    }

    #[test]
    fn test_outcome_rejects_out_of_range() {
        let now = Utc::now();
        assert!(Outcome::new("t1", 37, now).is_err());
        assert!(Outcome::from_wire("t1", -1, now).is_err());
        assert!(Outcome::from_wire("t1", 1000, now).is_err());

        let outcome = Outcome::new("t1", 5, now).unwrap();
        assert_eq!(outcome.color(), Color::Red);
        assert_eq!(outcome.stream_id(), "t1");
    }

    #[test]
    fn test_outcome_serde_derives_category() {
        let json = r#"{"streamId":"Lightning","value":0,"occurredAt":"2024-05-01T12:00:00Z"}"#;
        let outcome: Outcome = serde_json::from_str(json).unwrap();
        assert_eq!(outcome.color(), Color::Green);

        let back = serde_json::to_value(&outcome).unwrap();
        assert_eq!(back["category"], "green");
        assert_eq!(back["streamId"], "Lightning");

        let bad = r#"{"streamId":"x","value":40,"occurredAt":"2024-05-01T12:00:00Z"}"#;
        assert!(serde_json::from_str::<Outcome>(bad).is_err());
    }
}
