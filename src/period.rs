//! Calendar month buckets used to scope budgets.

use std::{fmt::Display, str::FromStr};

use time::{
    Date, Month, format_description::BorrowedFormatItem, macros::format_description,
    parsing::Parsed,
};

use crate::error::ValidationError;

/// The format for periods, e.g. "2024-03".
pub const PERIOD_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]");

/// A calendar month, e.g. March 2024.
///
/// Rendered and parsed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    year: i32,
    month: Month,
}

impl Period {
    /// Create a period for `month` of `year`.
    pub const fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    /// The period that `date` falls in.
    pub fn of(date: Date) -> Self {
        Self::new(date.year(), date.month())
    }

    /// Whether `date` falls in this period.
    pub fn contains(&self, date: Date) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month of the year.
    pub fn month(&self) -> Month {
        self.month
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, u8::from(self.month))
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let error = || ValidationError::InvalidPeriod(text.to_owned());

        let mut parsed = Parsed::new();
        let remaining = parsed
            .parse_items(text.trim().as_bytes(), PERIOD_FORMAT)
            .map_err(|_| error())?;

        if !remaining.is_empty() {
            return Err(error());
        }

        let (Some(year), Some(month)) = (parsed.year(), parsed.month()) else {
            return Err(error());
        };

        Ok(Self::new(year, month))
    }
}

#[cfg(test)]
mod tests {
    use time::{Month, macros::date};

    use crate::error::ValidationError;

    use super::Period;

    #[test]
    fn of_uses_year_and_month_of_date() {
        let period = Period::of(date!(2024 - 03 - 15));

        assert_eq!(period, Period::new(2024, Month::March));
        assert_eq!(period.to_string(), "2024-03");
    }

    #[test]
    fn contains_checks_year_as_well_as_month() {
        let period = Period::new(2024, Month::March);

        assert!(period.contains(date!(2024 - 03 - 01)));
        assert!(period.contains(date!(2024 - 03 - 31)));
        assert!(!period.contains(date!(2024 - 04 - 01)));
        assert!(!period.contains(date!(2023 - 03 - 15)));
    }

    #[test]
    fn parses_year_month() {
        assert_eq!("2024-12".parse(), Ok(Period::new(2024, Month::December)));
    }

    #[test]
    fn rejects_malformed_periods() {
        for text in ["2024", "2024-13", "24-03", "2024-3", "2024-03-01", "March"] {
            assert_eq!(
                text.parse::<Period>(),
                Err(ValidationError::InvalidPeriod(text.to_owned())),
                "{text} should not parse"
            );
        }
    }
}
