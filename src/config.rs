//! Settings that change how the tracker presents and evaluates data.

use crate::{Error, password::PasswordHash, period::Period, timezone::current_period};

/// The default timezone used to work out the current budget period.
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

/// The default currency symbol shown in front of amounts.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "ETB";

/// Settings for an [crate::ExpenseTracker].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// The canonical timezone, e.g. "Africa/Addis_Ababa", that decides which
    /// month is the current budget period.
    pub local_timezone: String,
    /// The symbol shown in front of amounts, e.g. "ETB".
    pub currency_symbol: String,
    /// The bcrypt cost used by the in-memory identity provider.
    pub password_hash_cost: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            local_timezone: DEFAULT_TIMEZONE.to_owned(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_owned(),
            password_hash_cost: PasswordHash::DEFAULT_COST,
        }
    }
}

impl TrackerConfig {
    /// The budget period that today falls in.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezone] if `local_timezone` is not a known timezone.
    pub fn current_period(&self) -> Result<Period, Error> {
        current_period(&self.local_timezone)
    }
}
