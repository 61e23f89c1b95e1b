use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Days until a debt falls due when the backend sends no due date.
pub const DEFAULT_DUE_DAYS: i64 = 30;

/// Description length bounds in characters.
const DESCRIPTION_MIN_CHARS: usize = 3;
const DESCRIPTION_MAX_CHARS: usize = 500;

/// One tracked debt between the user and a contact.
///
/// `contact_name` is a denormalized display copy taken at creation time;
/// it is not re-synced when the contact is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtRecord {
    pub record_id: String,
    pub contact_id: String,
    pub contact_name: String,
    pub amount: Decimal,
    pub description: String,
    pub created_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// true = the user owes the contact.
    pub is_my_debt: bool,
    pub is_paid_back: bool,
}

impl DebtRecord {
    /// Derived, never persisted: unpaid and past its due date.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_paid_back && now > self.due_date
    }
}

/// Client-side input for creating or updating a debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDebt {
    pub contact_id: String,
    pub contact_name: String,
    pub amount: Decimal,
    pub description: String,
    /// Omitted means "created date plus 30 days".
    pub due_date: Option<DateTime<Utc>>,
    pub is_my_debt: bool,
}

impl NewDebt {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut fields = Vec::new();

        if self.contact_id.trim().is_empty() {
            fields.push(FieldError::new("contact_id", "must reference a contact"));
        }

        if self.amount <= Decimal::ZERO {
            fields.push(FieldError::new("amount", "must be greater than zero"));
        }

        let desc_chars = self.description.trim().chars().count();
        if desc_chars < DESCRIPTION_MIN_CHARS {
            fields.push(FieldError::new(
                "description",
                format!("must be at least {} characters", DESCRIPTION_MIN_CHARS),
            ));
        } else if desc_chars > DESCRIPTION_MAX_CHARS {
            fields.push(FieldError::new(
                "description",
                format!("must be at most {} characters", DESCRIPTION_MAX_CHARS),
            ));
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn debt(paid: bool, due: DateTime<Utc>) -> DebtRecord {
        DebtRecord {
            record_id: "d1".to_string(),
            contact_id: "c1".to_string(),
            contact_name: "Ana Li".to_string(),
            amount: Decimal::from(50),
            description: "lunch".to_string(),
            created_date: due - Duration::days(DEFAULT_DUE_DAYS),
            due_date: due,
            is_my_debt: true,
            is_paid_back: paid,
        }
    }

    #[test]
    fn test_overdue_requires_unpaid_and_past_due() {
        let now = Utc::now();
        assert!(debt(false, now - Duration::hours(1)).is_overdue(now));
        assert!(!debt(false, now + Duration::hours(1)).is_overdue(now));
        // Paid records are never overdue, no matter how old
        assert!(!debt(true, now - Duration::days(90)).is_overdue(now));
    }

    #[test]
    fn test_overdue_is_strict_at_the_boundary() {
        let now = Utc::now();
        assert!(!debt(false, now).is_overdue(now));
    }

    #[test]
    fn test_new_debt_validation() {
        let good = NewDebt {
            contact_id: "c1".to_string(),
            contact_name: "Ana Li".to_string(),
            amount: Decimal::from(50),
            description: "lunch".to_string(),
            due_date: None,
            is_my_debt: true,
        };
        assert!(good.validate().is_ok());

        let mut bad = good.clone();
        bad.contact_id = String::new();
        bad.amount = Decimal::ZERO;
        bad.description = "ab".to_string();
        let fields: Vec<_> = bad
            .validate()
            .unwrap_err()
            .iter()
            .map(|f| f.field)
            .collect();
        assert_eq!(fields, vec!["contact_id", "amount", "description"]);
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let bad = NewDebt {
            contact_id: "c1".to_string(),
            contact_name: "Ana Li".to_string(),
            amount: Decimal::from(-5),
            description: "typo".to_string(),
            due_date: None,
            is_my_debt: false,
        };
        assert_eq!(bad.validate().unwrap_err()[0].field, "amount");
    }
}
