use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Historical trace of a settled debt. Append-only: nothing here mutates
/// the referenced debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payment_id: String,
    pub original_debt_id: String,
    pub contact_name: String,
    pub paid_amount: Decimal,
    pub payment_description: String,
    pub payment_date: DateTime<Utc>,
    /// Direction of the settled debt at the time it was paid.
    pub was_my_debt: bool,
}
