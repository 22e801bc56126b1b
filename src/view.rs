//! Pure functions that derive what is shown from the cached expense records.
//!
//! Nothing here touches the network or the session, the same records and
//! options always produce the same view.

use std::{cmp::Ordering, collections::BTreeMap, str::FromStr};

use crate::{category::Category, error::ValidationError, expense::Expense, period::Period};

/// The sum of the amounts of `records`.
pub fn total(records: &[Expense]) -> f64 {
    records.iter().map(|expense| expense.amount).sum()
}

/// The subtotal of each category that has a non-zero total, in category order.
pub fn by_category(records: &[Expense]) -> BTreeMap<Category, f64> {
    let mut totals = BTreeMap::new();

    for expense in records {
        *totals.entry(expense.category).or_insert(0.0) += expense.amount;
    }

    totals.retain(|_, subtotal| *subtotal != 0.0);
    totals
}

/// The sum of the amounts of the `records` dated in `period`.
pub fn period_total(records: &[Expense], period: Period) -> f64 {
    records
        .iter()
        .filter(|expense| period.contains(expense.date))
        .map(|expense| expense.amount)
        .sum()
}

/// Whether adding `new_amount` to `period_total` goes over `budget`.
///
/// Always false if no budget has been set. Reaching the budget exactly does
/// not exceed it.
pub fn exceeds_budget(period_total: f64, new_amount: f64, budget: Option<f64>) -> bool {
    budget.is_some_and(|budget| period_total + new_amount > budget)
}

/// Which categories of expenses to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    /// Show every expense.
    #[default]
    All,
    /// Only show expenses in the category.
    Only(Category),
}

impl CategoryFilter {
    /// Whether `expense` passes the filter.
    pub fn matches(&self, expense: &Expense) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(category) => expense.category == *category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ValidationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.trim().eq_ignore_ascii_case("all") {
            Ok(CategoryFilter::All)
        } else {
            text.parse().map(CategoryFilter::Only)
        }
    }
}

/// The records that pass `filter`, in their original order.
pub fn filter(records: &[Expense], filter: CategoryFilter) -> Vec<Expense> {
    records
        .iter()
        .filter(|expense| filter.matches(expense))
        .cloned()
        .collect()
}

/// What to sort expenses by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// The date the money was spent.
    Date,
    /// The amount spent.
    Amount,
}

/// Which way to sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest or earliest first.
    Ascending,
    /// Largest or latest first.
    Descending,
}

/// How to order the visible expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    /// What to sort by.
    pub key: SortKey,
    /// Which way to sort.
    pub direction: SortDirection,
}

impl SortOrder {
    /// Latest first.
    pub const NEWEST: SortOrder = SortOrder {
        key: SortKey::Date,
        direction: SortDirection::Descending,
    };
    /// Earliest first.
    pub const OLDEST: SortOrder = SortOrder {
        key: SortKey::Date,
        direction: SortDirection::Ascending,
    };
    /// Smallest amount first.
    pub const LOWEST: SortOrder = SortOrder {
        key: SortKey::Amount,
        direction: SortDirection::Ascending,
    };
    /// Largest amount first.
    pub const HIGHEST: SortOrder = SortOrder {
        key: SortKey::Amount,
        direction: SortDirection::Descending,
    };

    fn compare(&self, a: &Expense, b: &Expense) -> Ordering {
        let ordering = match self.key {
            SortKey::Date => a.date.cmp(&b.date),
            SortKey::Amount => a.amount.total_cmp(&b.amount),
        };

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::NEWEST
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_lowercase().as_str() {
            "newest" => Ok(SortOrder::NEWEST),
            "oldest" => Ok(SortOrder::OLDEST),
            "lowest" => Ok(SortOrder::LOWEST),
            "highest" => Ok(SortOrder::HIGHEST),
            _ => Err(ValidationError::UnknownSortOrder(text.to_owned())),
        }
    }
}

/// Sort `records` in place. The sort is stable, records that compare equal
/// keep their order.
pub fn sort(records: &mut [Expense], order: SortOrder) {
    records.sort_by(|a, b| order.compare(a, b));
}

/// The user's choice of filter and sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Which categories to show.
    pub filter: CategoryFilter,
    /// How to order what is shown.
    pub sort: SortOrder,
}

/// Everything the expense list shows, derived from the cached records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseView {
    /// The filtered and sorted records.
    pub visible: Vec<Expense>,
    /// The total of every record, ignoring the filter.
    pub total: f64,
    /// The total of the visible records.
    pub visible_total: f64,
    /// The subtotal of each category over every record, ignoring the filter.
    pub by_category: BTreeMap<Category, f64>,
}

impl ExpenseView {
    /// Derive the view of `records` for `options`.
    pub fn derive(records: &[Expense], options: &ViewOptions) -> Self {
        let mut visible = filter(records, options.filter);
        sort(&mut visible, options.sort);

        Self {
            visible_total: total(&visible),
            visible,
            total: total(records),
            by_category: by_category(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::{Date, Month, macros::date};

    use crate::{
        category::Category,
        error::ValidationError,
        expense::{Expense, ExpenseId},
        identity::UserID,
        period::Period,
    };

    use super::{
        CategoryFilter, ExpenseView, SortOrder, ViewOptions, by_category, exceeds_budget, filter,
        period_total, sort, total,
    };

    fn expense(id: &str, amount: f64, category: Category, date: Date) -> Expense {
        Expense {
            id: ExpenseId::new(id),
            amount,
            description: format!("expense {id}"),
            category,
            date,
            owner: UserID::new("alice"),
        }
    }

    fn records() -> Vec<Expense> {
        vec![
            expense("1", 12.5, Category::Food, date!(2024 - 03 - 02)),
            expense("2", 30.0, Category::Transportation, date!(2024 - 03 - 15)),
            expense("3", 12.5, Category::Food, date!(2024 - 02 - 28)),
            expense("4", 0.0, Category::Other, date!(2024 - 03 - 15)),
            expense("5", 99.75, Category::Utilities, date!(2024 - 04 - 01)),
        ]
    }

    fn ids(records: &[Expense]) -> Vec<String> {
        records.iter().map(|expense| expense.id.to_string()).collect()
    }

    #[test]
    fn total_of_no_records_is_zero() {
        assert_eq!(total(&[]), 0.0);
    }

    #[test]
    fn total_equals_sum_of_category_subtotals() {
        let records = records();

        let subtotal_sum: f64 = by_category(&records).values().sum();

        assert_eq!(total(&records), subtotal_sum);
        assert_eq!(total(&records), 154.75);
    }

    #[test]
    fn by_category_omits_zero_subtotals() {
        let subtotals = by_category(&records());

        assert_eq!(
            subtotals.into_iter().collect::<Vec<_>>(),
            vec![
                (Category::Food, 25.0),
                (Category::Transportation, 30.0),
                (Category::Utilities, 99.75),
            ]
        );
    }

    #[test]
    fn filter_keeps_only_selected_category() {
        let food = filter(&records(), CategoryFilter::Only(Category::Food));

        assert_eq!(ids(&food), vec!["1", "3"]);
        assert_eq!(filter(&records(), CategoryFilter::All).len(), 5);
    }

    #[test]
    fn sort_newest_keeps_ties_in_input_order() {
        let mut records = records();

        sort(&mut records, SortOrder::NEWEST);

        assert_eq!(ids(&records), vec!["5", "2", "4", "1", "3"]);
    }

    #[test]
    fn sort_by_amount_in_both_directions() {
        let mut records = records();

        sort(&mut records, SortOrder::LOWEST);
        assert_eq!(ids(&records), vec!["4", "1", "3", "2", "5"]);

        sort(&mut records, SortOrder::HIGHEST);
        assert_eq!(ids(&records), vec!["5", "2", "1", "3", "4"]);
    }

    #[test]
    fn filter_then_sort_is_idempotent() {
        let options = ViewOptions {
            filter: CategoryFilter::Only(Category::Food),
            sort: SortOrder::OLDEST,
        };

        let once = ExpenseView::derive(&records(), &options);
        let twice = ExpenseView::derive(&once.visible, &options);

        assert_eq!(once.visible, twice.visible);
    }

    #[test]
    fn period_total_only_counts_records_in_period() {
        let march = Period::new(2024, Month::March);

        assert_eq!(period_total(&records(), march), 42.5);
    }

    #[test]
    fn exceeds_budget_is_false_without_budget() {
        assert!(!exceeds_budget(1_000_000.0, 1_000_000.0, None));
        assert!(!exceeds_budget(0.0, f64::MAX, None));
    }

    #[test]
    fn exceeds_budget_is_strict() {
        assert!(exceeds_budget(80.0, 30.0, Some(100.0)));
        assert!(!exceeds_budget(70.0, 30.0, Some(100.0)));
        assert!(exceeds_budget(0.0, 0.01, Some(0.0)));
    }

    #[test]
    fn single_lunch_without_budget() {
        let records = vec![expense("1", 50.0, Category::Food, date!(2024 - 03 - 01))];

        let view = ExpenseView::derive(&records, &ViewOptions::default());

        assert_eq!(view.total, 50.0);
        assert!(!exceeds_budget(0.0, 50.0, None));
    }

    #[test]
    fn view_keeps_overall_total_when_filtered() {
        let options = ViewOptions {
            filter: CategoryFilter::Only(Category::Transportation),
            sort: SortOrder::default(),
        };

        let view = ExpenseView::derive(&records(), &options);

        assert_eq!(view.total, 154.75);
        assert_eq!(view.visible_total, 30.0);
        assert_eq!(view.by_category.len(), 3);
    }

    #[test]
    fn parses_filters_and_sort_orders() {
        assert_eq!("all".parse(), Ok(CategoryFilter::All));
        assert_eq!(
            "food".parse(),
            Ok(CategoryFilter::Only(Category::Food))
        );
        assert_eq!("Highest".parse(), Ok(SortOrder::HIGHEST));
        assert_eq!(
            "biggest".parse::<SortOrder>(),
            Err(ValidationError::UnknownSortOrder("biggest".to_owned()))
        );
    }
}
