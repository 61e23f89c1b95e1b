//! Canonical record types for the ledger.
//!
//! One in-memory representation per entity, independent of whatever JSON
//! shape the backend happened to send. Decoding from backend responses
//! lives in `api::decode`; these types only know their own invariants.

pub mod contact;
pub mod debt;
pub mod payment;

pub use contact::{Contact, NewContact};
pub use debt::{DebtRecord, NewDebt, DEFAULT_DUE_DAYS};
pub use payment::PaymentRecord;
