//! The fixed set of expense categories.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What an expense was for, e.g., 'Food', 'Utilities'.
///
/// The set is closed, users cannot add their own categories. The variant order
/// is the display order used when grouping expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Groceries and eating out.
    Food,
    /// Fuel, fares and vehicle costs.
    Transportation,
    /// Going out, games and subscriptions.
    Entertainment,
    /// Power, water, internet and phone bills.
    Utilities,
    /// Clothes, household items and gifts.
    Shopping,
    /// Doctor visits, medicine and insurance.
    Healthcare,
    /// Anything that does not fit the other categories.
    Other,
}

impl Category {
    /// Every category in display order.
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Transportation,
        Category::Entertainment,
        Category::Utilities,
        Category::Shopping,
        Category::Healthcare,
        Category::Other,
    ];

    /// The canonical name of the category.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transportation => "Transportation",
            Category::Entertainment => "Entertainment",
            Category::Utilities => "Utilities",
            Category::Shopping => "Shopping",
            Category::Healthcare => "Healthcare",
            Category::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    /// Parse a category name, ignoring case and surrounding whitespace.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();

        if text.is_empty() {
            return Err(ValidationError::MissingCategory);
        }

        Category::ALL
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(text))
            .ok_or_else(|| ValidationError::UnknownCategory(text.to_owned()))
    }
}
