//! User-facing messages for the outcome of an operation.
//!
//! The presentation layer decides how to show an [Alert]; the core only
//! decides what it says.

use std::fmt::Display;

/// Alert message types for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    /// The operation completed.
    Success,
    /// The operation completed, but the user should know about something.
    Warning,
    /// The operation failed.
    Error,
}

/// A short message and optional details to show to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Determines how the alert should be styled.
    pub alert_type: AlertType,
    /// A one line summary.
    pub message: String,
    /// A longer explanation, may be empty.
    pub details: String,
}

impl Alert {
    /// Create a new success alert
    pub fn success(message: &str, details: &str) -> Self {
        Self {
            alert_type: AlertType::Success,
            message: message.to_owned(),
            details: details.to_owned(),
        }
    }

    /// Create a new warning alert
    pub fn warning(message: &str, details: &str) -> Self {
        Self {
            alert_type: AlertType::Warning,
            message: message.to_owned(),
            details: details.to_owned(),
        }
    }

    /// Create a new error alert
    pub fn error(message: &str, details: &str) -> Self {
        Self {
            alert_type: AlertType::Error,
            message: message.to_owned(),
            details: details.to_owned(),
        }
    }

    /// Create a new error alert without details
    pub fn error_simple(message: &str) -> Self {
        Self::error(message, "")
    }
}

impl Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.message, self.details)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Alert, AlertType};

    #[test]
    fn display_omits_empty_details() {
        let alert = Alert::error_simple("Invalid amount.");

        assert_eq!(alert.alert_type, AlertType::Error);
        assert_eq!(alert.to_string(), "Invalid amount.");
    }

    #[test]
    fn display_joins_message_and_details() {
        let alert = Alert::success("Budget saved", "ETB 100.00 for 2024-03");

        assert_eq!(alert.to_string(), "Budget saved: ETB 100.00 for 2024-03");
    }
}
