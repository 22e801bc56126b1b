//! Works out the local date, and so the current budget period, from a
//! canonical timezone name.

use time::{Date, OffsetDateTime, UtcOffset};
use time_tz::{Offset, TimeZone};

use crate::{Error, period::Period};

/// The UTC offset of `canonical_timezone` right now, e.g. "Pacific/Auckland".
///
/// Returns `None` if the timezone is not known.
pub fn get_local_offset(canonical_timezone: &str) -> Option<UtcOffset> {
    time_tz::timezones::get_by_name(canonical_timezone)
        .map(|tz| tz.get_offset_utc(&OffsetDateTime::now_utc()).to_utc())
}

/// Today's date in `canonical_timezone`.
///
/// # Errors
/// Returns [Error::InvalidTimezone] if the timezone is not known.
pub fn local_today(canonical_timezone: &str) -> Result<Date, Error> {
    let offset = get_local_offset(canonical_timezone)
        .ok_or_else(|| Error::InvalidTimezone(canonical_timezone.to_owned()))?;

    Ok(OffsetDateTime::now_utc().to_offset(offset).date())
}

/// The budget period that today falls in, in `canonical_timezone`.
///
/// # Errors
/// Returns [Error::InvalidTimezone] if the timezone is not known.
pub fn current_period(canonical_timezone: &str) -> Result<Period, Error> {
    local_today(canonical_timezone).map(Period::of)
}
