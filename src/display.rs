//! Formatting helpers for showing amounts and descriptions to the user.

use numfmt::{Formatter, Precision};
use unicode_segmentation::UnicodeSegmentation;

use crate::Error;

/// The max number of graphemes to display for a description before
/// truncating and displaying ellipses.
pub const MAX_DESCRIPTION_GRAPHEMES: usize = 32;

/// Formats amounts as currency with two decimal places and thousands
/// separators, e.g. "ETB 1,234.50".
pub struct CurrencyFormatter {
    prefix: String,
    formatter: Formatter,
}

impl CurrencyFormatter {
    /// Create a formatter that puts `symbol` in front of every amount.
    ///
    /// # Errors
    /// Returns [Error::InvalidCurrencySymbol] if the symbol is too long.
    pub fn new(symbol: &str) -> Result<Self, Error> {
        let prefix = format!("{symbol} ");
        let formatter = Formatter::currency(&prefix)
            .map_err(|_| Error::InvalidCurrencySymbol(symbol.to_owned()))?
            .precision(Precision::Decimals(2));

        Ok(Self { prefix, formatter })
    }

    /// Format `amount`, e.g. 12.3 as "ETB 12.30".
    pub fn format(&self, amount: f64) -> String {
        let sign = if amount < 0.0 { "-" } else { "" };

        // Zero is hardcoded as "0", so we must specify the formatted string for zero
        if amount == 0.0 {
            return format!("{}0.00", self.prefix);
        }

        let formatted = self.formatter.fmt_string(amount.abs());
        let number = formatted.strip_prefix(&self.prefix).unwrap_or(&formatted);

        format!("{sign}{}{}", self.prefix, pad_decimals(number))
    }
}

/// numfmt omits trailing zeros, e.g. "12.30" is rendered as "12.3", so add
/// them back.
fn pad_decimals(number: &str) -> String {
    match number.rfind('.') {
        None => format!("{number}.00"),
        Some(index) if number.len() - index == 2 => format!("{number}0"),
        Some(_) => number.to_owned(),
    }
}

/// Shorten `description` to at most [MAX_DESCRIPTION_GRAPHEMES] graphemes,
/// ending in "..." if anything was cut off.
pub fn truncate_description(description: &str) -> String {
    let description_length = description.graphemes(true).count();

    if description_length <= MAX_DESCRIPTION_GRAPHEMES {
        description.to_owned()
    } else {
        let truncated: String = description
            .graphemes(true)
            .take(MAX_DESCRIPTION_GRAPHEMES - 3)
            .collect();
        truncated + "..."
    }
}
