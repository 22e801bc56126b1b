//! Defines expense records, the validated input for creating them and their
//! document representation in the remote store.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    category::Category,
    error::ValidationError,
    identity::UserID,
    store::{Document, DocumentId, StoreError, StoredDocument},
};

/// The format dates are entered, stored and exported in.
pub const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// The ID the remote store assigned to an expense.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpenseId(DocumentId);

impl ExpenseId {
    /// Create an expense ID.
    pub fn new(id: &str) -> Self {
        Self(DocumentId::new(id))
    }

    /// The key of the expense's document.
    pub fn document_id(&self) -> &DocumentId {
        &self.0
    }
}

impl From<DocumentId> for ExpenseId {
    fn from(id: DocumentId) -> Self {
        Self(id)
    }
}

impl Display for ExpenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single dated, categorized monetary entry owned by a user.
///
/// Expenses are never edited, only created and deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Expense {
    /// The ID of the expense's document.
    pub id: ExpenseId,
    /// How much was spent, never negative.
    pub amount: f64,
    /// A text description of what the money was spent on.
    pub description: String,
    /// What kind of expense this is.
    pub category: Category,
    /// The day the money was spent.
    pub date: Date,
    /// The user that owns the expense.
    pub owner: UserID,
}

impl Expense {
    /// Decode an expense from a document delivered by the store.
    ///
    /// # Errors
    /// Returns [StoreError::Malformed] if the document does not have the shape
    /// written by [NewExpense::to_document].
    pub fn from_document(document: StoredDocument) -> Result<Self, StoreError> {
        let fields: ExpenseDocument = serde_json::from_value(document.data).map_err(|error| {
            StoreError::Malformed(format!("expense {}: {error}", document.id))
        })?;

        Ok(Self {
            id: document.id.into(),
            amount: fields.amount,
            description: fields.description,
            category: fields.category,
            date: fields.date,
            owner: fields.user_id,
        })
    }
}

/// The raw text of the add expense form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseForm {
    /// The amount as typed, e.g. "12.50".
    pub amount: String,
    /// The description as typed.
    pub description: String,
    /// The selected category name, empty if nothing is selected.
    pub category: String,
    /// The date as `YYYY-MM-DD`.
    pub date: String,
}

impl ExpenseForm {
    /// Create a form from its field values.
    pub fn new(amount: &str, description: &str, category: &str, date: &str) -> Self {
        Self {
            amount: amount.to_owned(),
            description: description.to_owned(),
            category: category.to_owned(),
            date: date.to_owned(),
        }
    }
}

/// The validated data for creating an expense.
///
/// A `NewExpense` can only be constructed through [NewExpense::new] or
/// [NewExpense::from_form], so holding one means the amount is finite and not
/// negative and the description is not empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    amount: f64,
    description: String,
    category: Category,
    date: Date,
}

impl NewExpense {
    /// Validate and create the data for a new expense.
    ///
    /// # Errors
    /// Returns a [ValidationError] if `amount` is not a finite number that is
    /// zero or greater, or if `description` is empty.
    pub fn new(
        amount: f64,
        description: &str,
        category: Category,
        date: Date,
    ) -> Result<Self, ValidationError> {
        let amount = validate_amount(amount)?;
        let description = description.trim();

        if description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }

        Ok(Self {
            amount,
            description: description.to_owned(),
            category,
            date,
        })
    }

    /// Validate the raw text from the add expense form.
    ///
    /// Fields are checked in form order and the first invalid field is reported.
    ///
    /// # Errors
    /// Returns a [ValidationError] naming the first invalid field.
    pub fn from_form(form: &ExpenseForm) -> Result<Self, ValidationError> {
        let amount = parse_amount(&form.amount)?;

        if form.description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }

        let category = form.category.parse()?;
        let date = parse_date(&form.date)?;

        Self::new(amount, &form.description, category, date)
    }

    /// The amount spent.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// What the money was spent on.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The category of the expense.
    pub fn category(&self) -> Category {
        self.category
    }

    /// The day the money was spent.
    pub fn date(&self) -> Date {
        self.date
    }

    /// The document to write to the store for this expense.
    pub(crate) fn to_document(&self, owner: &UserID) -> Result<Document, StoreError> {
        serde_json::to_value(ExpenseDocument {
            amount: self.amount,
            description: self.description.clone(),
            category: self.category,
            date: self.date,
            user_id: owner.clone(),
        })
        .map_err(|error| StoreError::Malformed(error.to_string()))
    }
}

/// Parse a user-entered amount.
///
/// # Errors
/// Returns [ValidationError::InvalidAmount] if `text` is not a finite number
/// that is zero or greater.
pub fn parse_amount(text: &str) -> Result<f64, ValidationError> {
    let amount: f64 = text
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidAmount(text.to_owned()))?;

    validate_amount(amount).map_err(|_| ValidationError::InvalidAmount(text.to_owned()))
}

/// Check that `amount` is finite and not negative.
///
/// Negative zero is normalised to zero so it never renders as "-0.00".
pub(crate) fn validate_amount(amount: f64) -> Result<f64, ValidationError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount.abs())
    } else {
        Err(ValidationError::InvalidAmount(amount.to_string()))
    }
}

/// Parse a user-entered `YYYY-MM-DD` date.
///
/// # Errors
/// Returns [ValidationError::MissingDate] for empty text and
/// [ValidationError::InvalidDate] if the text is not a valid date.
pub fn parse_date(text: &str) -> Result<Date, ValidationError> {
    let text = text.trim();

    if text.is_empty() {
        return Err(ValidationError::MissingDate);
    }

    Date::parse(text, &DATE_FORMAT).map_err(|_| ValidationError::InvalidDate(text.to_owned()))
}

/// The fields of an expense document, named as they are in the store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseDocument {
    amount: f64,
    description: String,
    category: Category,
    #[serde(with = "iso_date")]
    date: Date,
    user_id: UserID,
}

/// (De)serializes dates as `YYYY-MM-DD` strings.
pub(crate) mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use time::Date;

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let text = date.format(&DATE_FORMAT).map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let text = String::deserialize(deserializer)?;
        Date::parse(&text, &DATE_FORMAT).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use crate::{
        category::Category,
        error::ValidationError,
        identity::UserID,
        store::{DocumentId, StoreError, StoredDocument},
    };

    use super::{Expense, ExpenseForm, NewExpense, parse_amount};

    #[test]
    fn from_form_accepts_valid_input() {
        let form = ExpenseForm::new("50", "Lunch", "Food", "2024-03-01");

        let expense = NewExpense::from_form(&form).unwrap();

        assert_eq!(expense.amount(), 50.0);
        assert_eq!(expense.description(), "Lunch");
        assert_eq!(expense.category(), Category::Food);
        assert_eq!(expense.date(), date!(2024 - 03 - 01));
    }

    #[test]
    fn from_form_rejects_negative_and_non_finite_amounts() {
        for amount in ["-1", "NaN", "inf", "", "twelve"] {
            let form = ExpenseForm::new(amount, "Lunch", "Food", "2024-03-01");

            assert_eq!(
                NewExpense::from_form(&form),
                Err(ValidationError::InvalidAmount(amount.to_owned())),
                "{amount:?} should be rejected"
            );
        }
    }

    #[test]
    fn from_form_reports_empty_fields() {
        let cases = [
            (
                ExpenseForm::new("1", " ", "Food", "2024-03-01"),
                ValidationError::EmptyDescription,
            ),
            (
                ExpenseForm::new("1", "Lunch", "", "2024-03-01"),
                ValidationError::MissingCategory,
            ),
            (
                ExpenseForm::new("1", "Lunch", "Food", ""),
                ValidationError::MissingDate,
            ),
            (
                ExpenseForm::new("1", "Lunch", "Food", "01/03/2024"),
                ValidationError::InvalidDate("01/03/2024".to_owned()),
            ),
        ];

        for (form, want) in cases {
            assert_eq!(NewExpense::from_form(&form), Err(want));
        }
    }

    #[test]
    fn zero_amount_is_allowed() {
        assert_eq!(parse_amount("0"), Ok(0.0));
        assert!(parse_amount("-0").unwrap().is_sign_positive());
    }

    #[test]
    fn document_uses_store_field_names() {
        let expense =
            NewExpense::new(12.5, "Bus fare", Category::Transportation, date!(2024 - 03 - 02))
                .unwrap();

        let document = expense.to_document(&UserID::new("alice")).unwrap();

        assert_eq!(
            document,
            json!({
                "amount": 12.5,
                "description": "Bus fare",
                "category": "Transportation",
                "date": "2024-03-02",
                "userId": "alice",
            })
        );
    }

    #[test]
    fn from_document_reads_store_document() {
        let document = StoredDocument {
            id: DocumentId::new("e1"),
            data: json!({
                "amount": 3.0,
                "description": "Coffee",
                "category": "Food",
                "date": "2024-03-05",
                "userId": "alice",
            }),
        };

        let expense = Expense::from_document(document).unwrap();

        assert_eq!(expense.id.to_string(), "e1");
        assert_eq!(expense.owner, UserID::new("alice"));
        assert_eq!(expense.date, date!(2024 - 03 - 05));
    }

    #[test]
    fn from_document_rejects_unknown_category() {
        let document = StoredDocument {
            id: DocumentId::new("e1"),
            data: json!({
                "amount": 3.0,
                "description": "Coffee",
                "category": "Pets",
                "date": "2024-03-05",
                "userId": "alice",
            }),
        };

        assert!(matches!(
            Expense::from_document(document),
            Err(StoreError::Malformed(_))
        ));
    }
}
