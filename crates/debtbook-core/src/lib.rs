//! debtbook-core - ledger synchronization core for the debtbook client.
//!
//! Tracks informal debts between the user and their contacts against a
//! backend whose response shapes drift across deployments. The pieces:
//!
//! - [`api::decode`]: resilient decoding of backend JSON into canonical
//!   records, with an auditable field-alias policy
//! - [`cache`]: time-boxed per-collection cache with explicit
//!   invalidation on mutation
//! - [`ledger`]: pure derived views (overdue, totals, net balances)
//! - [`repository`]: the orchestrating layer the UI talks to, with
//!   defined fallback and error semantics
//!
//! The backend is reached only through the [`api::Transport`] port;
//! [`api::HttpTransport`] is the bundled default implementation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod repository;

pub use api::{HttpTransport, Method, Transport, TransportReply};
pub use cache::{Collection, LedgerCache};
pub use config::Config;
pub use error::{ConflictReason, FieldError, LedgerError};
pub use ledger::LedgerOverview;
pub use models::{Contact, DebtRecord, NewContact, NewDebt, PaymentRecord};
pub use repository::{Diagnostic, LedgerRepository, MarkPaidOutcome};
