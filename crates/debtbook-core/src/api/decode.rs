//! Resilient decoding of backend JSON into canonical records.
//!
//! The backend's field names drift across deployments, so every canonical
//! field is resolved through an ordered alias list: first present,
//! non-null value wins. The alias tables below are the single auditable
//! policy for that mapping - there is no per-call-site guessing.
//!
//! Decoding never fails. Unparseable numbers degrade to zero, missing
//! booleans to `false`, missing creation dates to "now", and a missing
//! due date to the created date plus [`DEFAULT_DUE_DAYS`]. Every
//! degradation beyond plain defaulting is recorded as a [`DecodeWarning`]
//! so callers can surface it without aborting the record or the
//! surrounding collection.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::ledger::LedgerOverview;
use crate::models::{Contact, DebtRecord, PaymentRecord, DEFAULT_DUE_DAYS};

// ============================================================================
// Alias tables
// ============================================================================

const CONTACT_ID_KEYS: &[&str] = &["id", "userId", "contactId", "_id"];
const CONTACT_NAME_KEYS: &[&str] = &["fullName", "full_name", "name", "userName"];
const CONTACT_PHONE_KEYS: &[&str] = &["phoneNumber", "phone_number", "phone", "mobilePhone"];
const CONTACT_EMAIL_KEYS: &[&str] = &["email", "emailAddress", "email_address"];

const DEBT_ID_KEYS: &[&str] = &["id", "recordId", "debtId", "_id"];
const DEBT_CONTACT_ID_KEYS: &[&str] = &["contactId", "contact_id", "userId"];
const DEBT_CONTACT_NAME_KEYS: &[&str] = &["contactName", "contact_name", "name", "fullName"];
const DEBT_AMOUNT_KEYS: &[&str] = &["amount", "debt_amount", "debtAmount", "paidAmount"];
const DEBT_DESCRIPTION_KEYS: &[&str] = &["description", "desc", "note"];
const DEBT_CREATED_KEYS: &[&str] = &["createdDate", "created_date", "createdAt", "created_at", "date"];
const DEBT_DUE_KEYS: &[&str] = &["dueDate", "due_date", "deadline"];
const DEBT_IS_MINE_KEYS: &[&str] = &["isMyDebt", "is_my_debt", "myDebt"];
const DEBT_IS_PAID_KEYS: &[&str] = &["isPaidBack", "is_paid_back", "isPaid", "paid"];

const PAYMENT_ID_KEYS: &[&str] = &["id", "paymentId", "payment_id", "_id"];
const PAYMENT_DEBT_ID_KEYS: &[&str] = &["originalDebtId", "original_debt_id", "debtId", "recordId"];
const PAYMENT_CONTACT_NAME_KEYS: &[&str] = &["contactName", "contact_name", "name"];
const PAYMENT_AMOUNT_KEYS: &[&str] = &["paidAmount", "paid_amount", "amount"];
const PAYMENT_DESCRIPTION_KEYS: &[&str] =
    &["paymentDescription", "payment_description", "description", "note"];
const PAYMENT_DATE_KEYS: &[&str] = &["paymentDate", "payment_date", "paidDate", "date", "createdDate"];
const PAYMENT_WAS_MINE_KEYS: &[&str] = &["wasMyDebt", "was_my_debt", "isMyDebt"];

const OVERVIEW_I_OWE_KEYS: &[&str] = &["totalIOwe", "total_i_owe", "totalOwedByMe", "iOwe"];
const OVERVIEW_THEY_OWE_KEYS: &[&str] = &["totalTheyOwe", "total_they_owe", "totalOwedToMe", "theyOwe"];
const OVERVIEW_ACTIVE_KEYS: &[&str] = &["activeCount", "active_count", "unpaidCount"];
const OVERVIEW_OVERDUE_KEYS: &[&str] = &["overdueCount", "overdue_count"];

// ============================================================================
// Diagnostics
// ============================================================================

/// One field-level degradation observed while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    pub entity: &'static str,
    pub field: &'static str,
    pub detail: String,
}

/// Accumulates decode warnings across one call's worth of records.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<DecodeWarning>,
}

impl Diagnostics {
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<DecodeWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, entity: &'static str, field: &'static str, detail: String) {
        debug!(entity, field, detail = %detail, "decode degradation");
        self.warnings.push(DecodeWarning {
            entity,
            field,
            detail,
        });
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decodes backend JSON values into canonical records.
///
/// Pure given its construction-time clock: identical input and the same
/// `now` always produce identical records.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    now: DateTime<Utc>,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Decode with a fixed clock.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn decode_contact(&self, value: &Value, diags: &mut Diagnostics) -> Contact {
        let id = string_field(value, CONTACT_ID_KEYS).unwrap_or_default();
        if id.is_empty() {
            diags.warn("contact", "id", "no id alias present".to_string());
        }
        Contact {
            id,
            full_name: string_field(value, CONTACT_NAME_KEYS).unwrap_or_default(),
            phone_number: string_field(value, CONTACT_PHONE_KEYS).unwrap_or_default(),
            email: string_field(value, CONTACT_EMAIL_KEYS).filter(|e| !e.is_empty()),
        }
    }

    pub fn decode_debt(&self, value: &Value, diags: &mut Diagnostics) -> DebtRecord {
        let created_date = self
            .date_field(value, DEBT_CREATED_KEYS, "debt", diags)
            .unwrap_or(self.now);
        let due_date = self
            .date_field(value, DEBT_DUE_KEYS, "debt", diags)
            .unwrap_or(created_date + Duration::days(DEFAULT_DUE_DAYS));

        DebtRecord {
            record_id: string_field(value, DEBT_ID_KEYS).unwrap_or_default(),
            contact_id: string_field(value, DEBT_CONTACT_ID_KEYS).unwrap_or_default(),
            contact_name: string_field(value, DEBT_CONTACT_NAME_KEYS).unwrap_or_default(),
            amount: decimal_field(value, DEBT_AMOUNT_KEYS, "debt", "amount", diags),
            description: string_field(value, DEBT_DESCRIPTION_KEYS).unwrap_or_default(),
            created_date,
            due_date,
            is_my_debt: bool_field(value, DEBT_IS_MINE_KEYS, "debt", "isMyDebt", diags),
            is_paid_back: bool_field(value, DEBT_IS_PAID_KEYS, "debt", "isPaidBack", diags),
        }
    }

    pub fn decode_payment(&self, value: &Value, diags: &mut Diagnostics) -> PaymentRecord {
        PaymentRecord {
            payment_id: string_field(value, PAYMENT_ID_KEYS).unwrap_or_default(),
            original_debt_id: string_field(value, PAYMENT_DEBT_ID_KEYS).unwrap_or_default(),
            contact_name: string_field(value, PAYMENT_CONTACT_NAME_KEYS).unwrap_or_default(),
            paid_amount: decimal_field(value, PAYMENT_AMOUNT_KEYS, "payment", "paidAmount", diags),
            payment_description: string_field(value, PAYMENT_DESCRIPTION_KEYS).unwrap_or_default(),
            payment_date: self
                .date_field(value, PAYMENT_DATE_KEYS, "payment", diags)
                .unwrap_or(self.now),
            was_my_debt: bool_field(value, PAYMENT_WAS_MINE_KEYS, "payment", "wasMyDebt", diags),
        }
    }

    /// Decode a pre-aggregated backend summary. `None` when the payload is
    /// not even an object - the caller falls back to local recomputation.
    /// Field deviations inside an object are a backend contract bug and are
    /// surfaced as warnings, not corrected beyond the alias mapping.
    pub fn decode_overview(
        &self,
        value: &Value,
        diags: &mut Diagnostics,
    ) -> Option<LedgerOverview> {
        if !value.is_object() {
            return None;
        }
        Some(LedgerOverview {
            total_i_owe: decimal_field(value, OVERVIEW_I_OWE_KEYS, "overview", "totalIOwe", diags),
            total_they_owe: decimal_field(
                value,
                OVERVIEW_THEY_OWE_KEYS,
                "overview",
                "totalTheyOwe",
                diags,
            ),
            active_count: count_field(value, OVERVIEW_ACTIVE_KEYS, "overview", "activeCount", diags),
            overdue_count: count_field(
                value,
                OVERVIEW_OVERDUE_KEYS,
                "overview",
                "overdueCount",
                diags,
            ),
        })
    }

    pub fn decode_contact_list(&self, value: &Value, diags: &mut Diagnostics) -> Vec<Contact> {
        self.decode_list(value, "contacts", diags, Self::decode_contact)
    }

    pub fn decode_debt_list(&self, value: &Value, diags: &mut Diagnostics) -> Vec<DebtRecord> {
        self.decode_list(value, "debts", diags, Self::decode_debt)
    }

    pub fn decode_payment_list(&self, value: &Value, diags: &mut Diagnostics) -> Vec<PaymentRecord> {
        self.decode_list(value, "payments", diags, Self::decode_payment)
    }

    fn decode_list<T>(
        &self,
        value: &Value,
        plural: &'static str,
        diags: &mut Diagnostics,
        decode_one: impl Fn(&Self, &Value, &mut Diagnostics) -> T,
    ) -> Vec<T> {
        unwrap_collection(value, plural)
            .iter()
            .filter_map(|item| {
                if item.is_object() {
                    Some(decode_one(self, item, diags))
                } else {
                    diags.warn(plural, "item", format!("skipped non-object entry: {}", item));
                    None
                }
            })
            .collect()
    }

    fn date_field(
        &self,
        value: &Value,
        keys: &[&'static str],
        entity: &'static str,
        diags: &mut Diagnostics,
    ) -> Option<DateTime<Utc>> {
        let (key, raw) = pick(value, keys)?;
        match raw {
            Value::String(s) => {
                let parsed = parse_instant(s);
                if parsed.is_none() {
                    diags.warn(entity, key, format!("unparseable date {:?}", s));
                }
                parsed
            }
            other => {
                diags.warn(entity, key, format!("unexpected date value: {}", other));
                None
            }
        }
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Field resolution helpers
// ============================================================================

/// First present, non-null value among the aliases, with the alias that won.
fn pick<'a>(value: &'a Value, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|&key| value.get(key).filter(|v| !v.is_null()).map(|v| (key, v)))
}

/// Resolve a string field; numeric values are accepted and stringified
/// (backends disagree on whether ids are strings or numbers).
fn string_field(value: &Value, keys: &[&'static str]) -> Option<String> {
    let (_, raw) = pick(value, keys)?;
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve a decimal field; accepts numbers and numeric strings. An
/// unparseable value degrades to zero with a warning rather than an error.
fn decimal_field(
    value: &Value,
    keys: &[&'static str],
    entity: &'static str,
    field: &'static str,
    diags: &mut Diagnostics,
) -> Decimal {
    let Some((key, raw)) = pick(value, keys) else {
        return Decimal::ZERO;
    };
    match value_to_decimal(raw) {
        Some(d) => d,
        None => {
            diags.warn(entity, key, format!("unparseable {} value: {}", field, raw));
            Decimal::ZERO
        }
    }
}

fn value_to_decimal(raw: &Value) -> Option<Decimal> {
    match raw {
        // Going through the JSON token text keeps "12.30" exact instead of
        // routing it through an f64
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .ok()
                .or_else(|| Decimal::from_scientific(&text).ok())
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Decimal::from_str(trimmed)
                    .ok()
                    .or_else(|| Decimal::from_scientific(trimmed).ok())
            }
        }
        _ => None,
    }
}

/// Resolve a non-negative integer count; accepts numbers and numeric
/// strings, degrading to zero with a warning otherwise.
fn count_field(
    value: &Value,
    keys: &[&'static str],
    entity: &'static str,
    field: &'static str,
    diags: &mut Diagnostics,
) -> usize {
    let Some((key, raw)) = pick(value, keys) else {
        return 0;
    };
    let parsed = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) => n as usize,
        None => {
            diags.warn(entity, key, format!("unparseable {} value: {}", field, raw));
            0
        }
    }
}

/// Resolve a boolean field. Missing means `false` - the fail-closed
/// default that avoids double-crediting on partial data.
fn bool_field(
    value: &Value,
    keys: &[&'static str],
    entity: &'static str,
    field: &'static str,
    diags: &mut Diagnostics,
) -> bool {
    let Some((key, raw)) = pick(value, keys) else {
        return false;
    };
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" | "" => false,
            other => {
                diags.warn(entity, key, format!("unrecognized {} value {:?}", field, other));
                false
            }
        },
        other => {
            diags.warn(entity, key, format!("unexpected {} value: {}", field, other));
            false
        }
    }
}

/// Parse an ISO-8601 instant; date-only values land at midnight UTC and
/// zoneless timestamps are taken as UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

/// Unwrap a backend list response. Supported shapes, tried in order:
/// a bare array, `{"data": [...]}`, and `{"data": {"<plural>": [...]}}`.
/// Anything else is an empty list, never an error.
pub fn unwrap_collection<'a>(value: &'a Value, plural: &str) -> &'a [Value] {
    if let Some(items) = value.as_array() {
        return items;
    }
    if let Some(data) = value.get("data") {
        if let Some(items) = data.as_array() {
            return items;
        }
        if let Some(items) = data.get(plural).and_then(Value::as_array) {
            return items;
        }
    }
    &[]
}
