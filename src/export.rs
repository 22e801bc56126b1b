//! Serializes expenses as CSV text.

use crate::{Error, expense::DATE_FORMAT, expense::Expense};

/// The first line of every export.
pub const CSV_HEADER: &str = "Description,Category,Date,Amount";

/// Render `records` as CSV, one line per record in the given order.
///
/// Descriptions are always quoted, with any quotes inside them doubled.
/// Amounts are written with exactly two decimal places.
///
/// # Errors
/// Returns [Error::NothingToExport] if `records` is empty.
pub fn to_csv(records: &[Expense]) -> Result<String, Error> {
    if records.is_empty() {
        return Err(Error::NothingToExport);
    }

    let mut text = String::from(CSV_HEADER);
    text.push('\n');

    for expense in records {
        // A `Date` in the supported range always formats as YYYY-MM-DD.
        let date = expense
            .date
            .format(&DATE_FORMAT)
            .unwrap_or_else(|_| expense.date.to_string());

        text.push_str(&format!(
            "\"{}\",{},{},{:.2}\n",
            expense.description.replace('"', "\"\""),
            expense.category,
            date,
            expense.amount
        ));
    }

    Ok(text)
}
