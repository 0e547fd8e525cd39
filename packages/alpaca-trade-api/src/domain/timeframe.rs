//! Bar TimeFrame
//!
//! A [`TimeFrame`] is an `(amount, unit)` pair naming the bucket size of
//! aggregated bars. The wire form is `"{amount}{suffix}"`, e.g. `15Min`,
//! `1Day`.
//!
//! # Ranges
//!
//! | Unit | Allowed amount |
//! |------|----------------|
//! | Minute | 1..=59 |
//! | Hour | 1..=23 |
//! | Day, Week, Month | 1 |
//!
//! Ranges are enforced at construction (configuration error) and on every
//! mutation (validation error); a rejected mutation leaves the value intact.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Unit of a [`TimeFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrameUnit {
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Trading days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
}

impl TimeFrameUnit {
    /// Wire suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Minute => "Min",
            Self::Hour => "Hour",
            Self::Day => "Day",
            Self::Week => "Week",
            Self::Month => "Month",
        }
    }

    /// Largest amount allowed for this unit.
    #[must_use]
    pub const fn max_amount(self) -> u32 {
        match self {
            Self::Minute => 59,
            Self::Hour => 23,
            Self::Day | Self::Week | Self::Month => 1,
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "Min" | "T" => Some(Self::Minute),
            "Hour" | "H" => Some(Self::Hour),
            "Day" | "D" => Some(Self::Day),
            "Week" | "W" => Some(Self::Week),
            "Month" | "M" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Bar bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeFrame {
    amount: u32,
    unit: TimeFrameUnit,
}

impl TimeFrame {
    /// One minute.
    pub const MINUTE: Self = Self {
        amount: 1,
        unit: TimeFrameUnit::Minute,
    };
    /// One hour.
    pub const HOUR: Self = Self {
        amount: 1,
        unit: TimeFrameUnit::Hour,
    };
    /// One day.
    pub const DAY: Self = Self {
        amount: 1,
        unit: TimeFrameUnit::Day,
    };
    /// One week.
    pub const WEEK: Self = Self {
        amount: 1,
        unit: TimeFrameUnit::Week,
    };
    /// One month.
    pub const MONTH: Self = Self {
        amount: 1,
        unit: TimeFrameUnit::Month,
    };

    /// Build a time frame, rejecting out-of-range pairs with
    /// [`Error::Config`].
    pub fn new(amount: u32, unit: TimeFrameUnit) -> Result<Self> {
        check(amount, unit).map_err(Error::Config)?;
        Ok(Self { amount, unit })
    }

    /// Amount of units.
    #[must_use]
    pub const fn amount(&self) -> u32 {
        self.amount
    }

    /// Unit.
    #[must_use]
    pub const fn unit(&self) -> TimeFrameUnit {
        self.unit
    }

    /// Change the amount.
    pub fn set_amount(&mut self, amount: u32) -> Result<()> {
        check(amount, self.unit).map_err(Error::Validation)?;
        self.amount = amount;
        Ok(())
    }

    /// Change the unit.
    pub fn set_unit(&mut self, unit: TimeFrameUnit) -> Result<()> {
        check(self.amount, unit).map_err(Error::Validation)?;
        self.unit = unit;
        Ok(())
    }
}

fn check(amount: u32, unit: TimeFrameUnit) -> std::result::Result<(), String> {
    if (1..=unit.max_amount()).contains(&amount) {
        return Ok(());
    }
    Err(match unit {
        TimeFrameUnit::Minute => format!("minute time frame must be 1-59, got {amount}"),
        TimeFrameUnit::Hour => format!("hour time frame must be 1-23, got {amount}"),
        other => format!(
            "{} time frame amount must be 1, got {amount}",
            other.suffix().to_lowercase()
        ),
    })
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for TimeFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let amount = digits
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("invalid time frame: {s}")))?;
        let unit = TimeFrameUnit::from_suffix(suffix)
            .ok_or_else(|| Error::Config(format!("invalid time frame unit: {s}")))?;
        Self::new(amount, unit)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    const UNITS: [TimeFrameUnit; 5] = [
        TimeFrameUnit::Minute,
        TimeFrameUnit::Hour,
        TimeFrameUnit::Day,
        TimeFrameUnit::Week,
        TimeFrameUnit::Month,
    ];

    #[test_case(TimeFrame::MINUTE, "1Min")]
    #[test_case(TimeFrame::HOUR, "1Hour")]
    #[test_case(TimeFrame::DAY, "1Day")]
    #[test_case(TimeFrame::WEEK, "1Week")]
    #[test_case(TimeFrame::MONTH, "1Month")]
    fn wire_encoding(tf: TimeFrame, expected: &str) {
        assert_eq!(tf.to_string(), expected);
        assert_eq!(expected.parse::<TimeFrame>().unwrap(), tf);
    }

    #[test]
    fn fifteen_minutes() {
        let tf = TimeFrame::new(15, TimeFrameUnit::Minute).unwrap();
        assert_eq!(tf.to_string(), "15Min");
    }

    #[test]
    fn construction_errors_are_config_errors() {
        let err = TimeFrame::new(60, TimeFrameUnit::Minute).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(matches!("2Day".parse::<TimeFrame>(), Err(Error::Config(_))));
        assert!(matches!("Min".parse::<TimeFrame>(), Err(Error::Config(_))));
    }

    #[test]
    fn rejected_mutation_leaves_value_intact() {
        let mut tf = TimeFrame::new(30, TimeFrameUnit::Minute).unwrap();
        let err = tf.set_unit(TimeFrameUnit::Hour).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(tf.to_string(), "30Min");

        tf.set_amount(5).unwrap();
        tf.set_unit(TimeFrameUnit::Hour).unwrap();
        assert_eq!(tf.to_string(), "5Hour");
    }

    fn allowed(amount: u32, unit: TimeFrameUnit) -> bool {
        match unit {
            TimeFrameUnit::Minute => (1..=59).contains(&amount),
            TimeFrameUnit::Hour => (1..=23).contains(&amount),
            _ => amount == 1,
        }
    }

    proptest! {
        #[test]
        fn construction_matches_ranges(amount in 0u32..100, unit in 0usize..5) {
            let unit = UNITS[unit];
            prop_assert_eq!(TimeFrame::new(amount, unit).is_ok(), allowed(amount, unit));
        }

        #[test]
        fn mutation_matches_ranges(amount in 0u32..100, unit in 0usize..5) {
            let unit = UNITS[unit];
            let mut tf = TimeFrame::MINUTE;
            let amount_ok = tf.set_amount(amount).is_ok();
            prop_assert_eq!(amount_ok, allowed(amount, TimeFrameUnit::Minute));

            let before = tf;
            let unit_ok = tf.set_unit(unit).is_ok();
            prop_assert_eq!(unit_ok, allowed(before.amount(), unit));
            if !unit_ok {
                prop_assert_eq!(tf, before);
            }
        }
    }
}
