//! Ledger repository: the one component that talks to the transport.
//!
//! Mediates cache, decoder and aggregation for the presentation layer.
//! Read paths never fail outward - they degrade to the last cached value
//! or an empty list, reporting the trouble on the diagnostics channel.
//! Write paths always resolve to a definite success or a [`LedgerError`].
//!
//! Concurrency: one refresh lock per collection keeps at most one fetch
//! in flight; waiters re-check the cache by fetch sequence after the lock
//! and reuse the winner's result instead of refetching. Collection
//! refreshes run as spawned tasks, so a caller that stops waiting cannot
//! cancel a fetch other waiters depend on. Mutations are independent
//! requests - no queueing, no speculative retries (retry policy, if any,
//! belongs to the transport).

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::api::decode::{DecodeWarning, Diagnostics, RecordDecoder};
use crate::api::{Method, Transport, TransportReply};
use crate::cache::{Collection, LedgerCache};
use crate::error::{ConflictReason, LedgerError};
use crate::ledger::{self, LedgerOverview};
use crate::models::{Contact, DebtRecord, NewContact, NewDebt, PaymentRecord, DEFAULT_DUE_DAYS};

const CONTACTS_PATH: &str = "/contacts";
const DEBTS_PATH: &str = "/debts";
const PAYMENTS_PATH: &str = "/payments";
const SUMMARY_PATH: &str = "/debts/summary";

/// What `mark_as_paid` resolved to. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkPaidOutcome {
    /// The backend flipped the record to paid.
    Marked,
    /// The record was already settled; nothing changed anywhere.
    AlreadyPaid,
}

/// Non-fatal events surfaced to the caller out of band.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// The decoder degraded a field to a safe default.
    Decode(DecodeWarning),
    /// A read path fell back to cached-or-empty after a failure.
    ReadDegraded {
        collection: Collection,
        message: String,
    },
}

#[derive(Default)]
struct RefreshLocks {
    contacts: AsyncMutex<()>,
    debts: AsyncMutex<()>,
    payments: AsyncMutex<()>,
}

pub struct LedgerRepository {
    transport: Arc<dyn Transport>,
    cache: Arc<LedgerCache>,
    refresh: RefreshLocks,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl LedgerRepository {
    /// Both collaborators are constructed once per app session and
    /// injected; the repository holds no other state.
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<LedgerCache>) -> Self {
        Self {
            transport,
            cache,
            refresh: RefreshLocks::default(),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    // =========================================================================
    // Contacts
    // =========================================================================

    /// Cache-first contact list, alphabetical (case-insensitive).
    /// Never fails: degrades to the last cached value or an empty list.
    pub async fn list_contacts(&self, force_refresh: bool) -> Vec<Contact> {
        if !force_refresh {
            if let Some(cached) = self.cache.contacts() {
                return cached;
            }
        }

        let seen_seq = self.cache.applied_seq(Collection::Contacts);
        let _guard = self.refresh.contacts.lock().await;
        if self.cache.applied_seq(Collection::Contacts) != seen_seq {
            // Someone refreshed while we waited for the lock; reuse it.
            if let Some(cached) = self.cache.contacts() {
                return cached;
            }
        }

        match self.refresh_contacts().await {
            Ok(records) => records,
            Err(err) => {
                self.report_degraded(Collection::Contacts, &err);
                self.cache.last_known_contacts().unwrap_or_default()
            }
        }
    }

    async fn refresh_contacts(&self) -> Result<Vec<Contact>, LedgerError> {
        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            let seq = cache.begin_fetch();
            let reply = send(transport.as_ref(), Method::Get, CONTACTS_PATH, None).await?;
            if !reply.success {
                return Err(reply_failure(&reply));
            }

            let mut diags = Diagnostics::default();
            let payload = reply.data.unwrap_or(Value::Null);
            let mut records = RecordDecoder::new().decode_contact_list(&payload, &mut diags);
            records.sort_by_key(|c| c.full_name.to_lowercase());
            cache.put_contacts(records.clone(), seq);
            Ok((records, diags.take_warnings()))
        });
        self.join_refresh(handle).await
    }

    /// Fetch one contact and fold it into a still-valid cache slot.
    pub async fn get_contact(&self, id: &str) -> Result<Contact, LedgerError> {
        let reply = send(
            self.transport.as_ref(),
            Method::Get,
            &format!("{}/{}", CONTACTS_PATH, id),
            None,
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }
        let data = reply
            .data
            .ok_or_else(|| LedgerError::unknown("empty reply for contact fetch"))?;

        let mut diags = Diagnostics::default();
        let mut contact = RecordDecoder::new().decode_contact(&data, &mut diags);
        self.absorb_warnings(diags.take_warnings());
        if contact.id.is_empty() {
            // Single-record replies sometimes omit the id; take it from the path
            contact.id = id.to_string();
        }

        self.cache.upsert_contact(contact.clone());
        Ok(contact)
    }

    /// Validate locally, then create on the backend. A validation failure
    /// never reaches the transport.
    pub async fn create_contact(&self, input: &NewContact) -> Result<Contact, LedgerError> {
        input
            .validate()
            .map_err(|fields| LedgerError::ValidationFailed { fields })?;

        let reply = send(
            self.transport.as_ref(),
            Method::Post,
            CONTACTS_PATH,
            Some(contact_body(input)),
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }

        let contact = contact_from_reply(reply.data, input, None);
        if contact.id.is_empty() {
            warn!("backend reply to contact create carried no id");
        }
        self.cache.invalidate(Collection::Contacts);
        Ok(contact)
    }

    pub async fn update_contact(
        &self,
        id: &str,
        input: &NewContact,
    ) -> Result<Contact, LedgerError> {
        input
            .validate()
            .map_err(|fields| LedgerError::ValidationFailed { fields })?;

        let reply = send(
            self.transport.as_ref(),
            Method::Put,
            &format!("{}/{}", CONTACTS_PATH, id),
            Some(contact_body(input)),
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }

        let contact = contact_from_reply(reply.data, input, Some(id));
        // Denormalized contact names on debts are allowed to drift; only
        // the contacts slot goes stale here.
        self.cache.invalidate(Collection::Contacts);
        Ok(contact)
    }

    /// Refuses while any unpaid debt still references the contact, without
    /// calling the transport. If the debt check itself cannot complete the
    /// delete is refused too - this guard fails closed.
    pub async fn delete_contact(&self, id: &str) -> Result<(), LedgerError> {
        let debts = self.debts_for_contact(id).await?;
        let active = debts.iter().filter(|d| !d.is_paid_back).count();
        if active > 0 {
            return Err(LedgerError::Conflict(ConflictReason::HasActiveDebts {
                count: active,
            }));
        }

        let reply = send(
            self.transport.as_ref(),
            Method::Delete,
            &format!("{}/{}", CONTACTS_PATH, id),
            None,
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }
        self.cache.invalidate(Collection::Contacts);
        Ok(())
    }

    // =========================================================================
    // Debts
    // =========================================================================

    /// Cache-first debt list, newest first. Never fails outward.
    pub async fn list_debts(&self, force_refresh: bool) -> Vec<DebtRecord> {
        if !force_refresh {
            if let Some(cached) = self.cache.debts() {
                return cached;
            }
        }

        let seen_seq = self.cache.applied_seq(Collection::Debts);
        let _guard = self.refresh.debts.lock().await;
        if self.cache.applied_seq(Collection::Debts) != seen_seq {
            if let Some(cached) = self.cache.debts() {
                return cached;
            }
        }

        match self.refresh_debts().await {
            Ok(records) => records,
            Err(err) => {
                self.report_degraded(Collection::Debts, &err);
                self.cache.last_known_debts().unwrap_or_default()
            }
        }
    }

    async fn refresh_debts(&self) -> Result<Vec<DebtRecord>, LedgerError> {
        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            let seq = cache.begin_fetch();
            let reply = send(transport.as_ref(), Method::Get, DEBTS_PATH, None).await?;
            if !reply.success {
                return Err(reply_failure(&reply));
            }

            let mut diags = Diagnostics::default();
            let payload = reply.data.unwrap_or(Value::Null);
            let mut records = RecordDecoder::new().decode_debt_list(&payload, &mut diags);
            records.sort_by(|a, b| {
                b.created_date
                    .cmp(&a.created_date)
                    .then_with(|| a.record_id.cmp(&b.record_id))
            });
            cache.put_debts(records.clone(), seq);
            Ok((records, diags.take_warnings()))
        });
        self.join_refresh(handle).await
    }

    /// Debts for one contact. Never fails outward; see
    /// [`Self::debts_for_contact`] for the path selection.
    pub async fn list_debts_by_contact(&self, contact_id: &str) -> Vec<DebtRecord> {
        match self.debts_for_contact(contact_id).await {
            Ok(records) => records,
            Err(err) => {
                self.report_degraded(Collection::Debts, &err);
                self.cache
                    .last_known_debts()
                    .map(|all| filter_by_contact(all, contact_id))
                    .unwrap_or_default()
            }
        }
    }

    /// Named fallback policy for per-contact debts: a fresh cache is
    /// filtered client-side; otherwise the server-side filter endpoint is
    /// tried; if the backend refuses it, the full collection is fetched
    /// and filtered locally. All three paths share one predicate, so they
    /// agree for the same backing data.
    async fn debts_for_contact(&self, contact_id: &str) -> Result<Vec<DebtRecord>, LedgerError> {
        if let Some(cached) = self.cache.debts() {
            return Ok(filter_by_contact(cached, contact_id));
        }

        match send(
            self.transport.as_ref(),
            Method::Get,
            &format!("{}?contactId={}", DEBTS_PATH, contact_id),
            None,
        )
        .await
        {
            Ok(reply) if reply.success => {
                let mut diags = Diagnostics::default();
                let payload = reply.data.unwrap_or(Value::Null);
                let records = RecordDecoder::new().decode_debt_list(&payload, &mut diags);
                self.absorb_warnings(diags.take_warnings());
                // Partial data: do not overwrite the full-collection slot
                return Ok(filter_by_contact(records, contact_id));
            }
            Ok(reply) => {
                debug!(message = ?reply.message, "server-side debt filter refused, using full fetch");
            }
            Err(err) => {
                debug!(error = %err, "server-side debt filter unreachable, using full fetch");
            }
        }

        let _guard = self.refresh.debts.lock().await;
        if let Some(cached) = self.cache.debts() {
            return Ok(filter_by_contact(cached, contact_id));
        }
        let all = self.refresh_debts().await?;
        Ok(filter_by_contact(all, contact_id))
    }

    /// Fetch one debt and fold it into a still-valid cache slot.
    pub async fn get_debt(&self, record_id: &str) -> Result<DebtRecord, LedgerError> {
        let reply = send(
            self.transport.as_ref(),
            Method::Get,
            &format!("{}/{}", DEBTS_PATH, record_id),
            None,
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }
        let data = reply
            .data
            .ok_or_else(|| LedgerError::unknown("empty reply for debt fetch"))?;

        let mut diags = Diagnostics::default();
        let mut record = RecordDecoder::new().decode_debt(&data, &mut diags);
        self.absorb_warnings(diags.take_warnings());
        if record.record_id.is_empty() {
            record.record_id = record_id.to_string();
        }

        self.cache.upsert_debt(record.clone());
        Ok(record)
    }

    pub async fn create_debt(&self, input: &NewDebt) -> Result<DebtRecord, LedgerError> {
        input
            .validate()
            .map_err(|fields| LedgerError::ValidationFailed { fields })?;

        let reply = send(
            self.transport.as_ref(),
            Method::Post,
            DEBTS_PATH,
            Some(debt_body(input)),
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }

        let record = debt_from_reply(reply.data, input, None);
        if record.record_id.is_empty() {
            warn!("backend reply to debt create carried no id");
        }
        self.cache.invalidate(Collection::Debts);
        Ok(record)
    }

    /// Update an unpaid debt. Settled records are terminal.
    pub async fn update_debt(
        &self,
        record_id: &str,
        input: &NewDebt,
    ) -> Result<DebtRecord, LedgerError> {
        input
            .validate()
            .map_err(|fields| LedgerError::ValidationFailed { fields })?;

        let current = match self.cache.last_known_debt(record_id) {
            Some(record) => record,
            None => self.get_debt(record_id).await?,
        };
        if current.is_paid_back {
            return Err(LedgerError::Conflict(ConflictReason::DebtSettled));
        }

        let reply = send(
            self.transport.as_ref(),
            Method::Put,
            &format!("{}/{}", DEBTS_PATH, record_id),
            Some(debt_body(input)),
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }

        let record = debt_from_reply(reply.data, input, Some(record_id));
        self.cache.invalidate(Collection::Debts);
        Ok(record)
    }

    pub async fn delete_debt(&self, record_id: &str) -> Result<(), LedgerError> {
        let reply = send(
            self.transport.as_ref(),
            Method::Delete,
            &format!("{}/{}", DEBTS_PATH, record_id),
            None,
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }
        self.cache.invalidate(Collection::Debts);
        Ok(())
    }

    /// Settle a debt. Idempotent on success: an already-paid record is a
    /// success with no state change and no transport write. `is_paid_back`
    /// is monotonic, so even a stale cached copy saying "paid" is final.
    pub async fn mark_as_paid(&self, record_id: &str) -> Result<MarkPaidOutcome, LedgerError> {
        let known = match self.cache.last_known_debt(record_id) {
            Some(record) => record,
            None => self.get_debt(record_id).await?,
        };
        if known.is_paid_back {
            return Ok(MarkPaidOutcome::AlreadyPaid);
        }

        let reply = send(
            self.transport.as_ref(),
            Method::Post,
            &format!("{}/{}/paid", DEBTS_PATH, record_id),
            None,
        )
        .await?;
        if !reply.success {
            return Err(reply_failure(&reply));
        }

        // The backend appends the payment trace, so both slots are stale.
        // This is the one entry on the cross-invalidation list.
        self.cache.invalidate(Collection::Debts);
        self.cache.invalidate(Collection::Payments);
        Ok(MarkPaidOutcome::Marked)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Cache-first payment history, newest first. Never fails outward.
    pub async fn list_payments(&self, force_refresh: bool) -> Vec<PaymentRecord> {
        if !force_refresh {
            if let Some(cached) = self.cache.payments() {
                return cached;
            }
        }

        let seen_seq = self.cache.applied_seq(Collection::Payments);
        let _guard = self.refresh.payments.lock().await;
        if self.cache.applied_seq(Collection::Payments) != seen_seq {
            if let Some(cached) = self.cache.payments() {
                return cached;
            }
        }

        match self.refresh_payments().await {
            Ok(records) => records,
            Err(err) => {
                self.report_degraded(Collection::Payments, &err);
                self.cache.last_known_payments().unwrap_or_default()
            }
        }
    }

    async fn refresh_payments(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
        let transport = Arc::clone(&self.transport);
        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            let seq = cache.begin_fetch();
            let reply = send(transport.as_ref(), Method::Get, PAYMENTS_PATH, None).await?;
            if !reply.success {
                return Err(reply_failure(&reply));
            }

            let mut diags = Diagnostics::default();
            let payload = reply.data.unwrap_or(Value::Null);
            let mut records = RecordDecoder::new().decode_payment_list(&payload, &mut diags);
            records.sort_by(|a, b| {
                b.payment_date
                    .cmp(&a.payment_date)
                    .then_with(|| a.payment_id.cmp(&b.payment_id))
            });
            cache.put_payments(records.clone(), seq);
            Ok((records, diags.take_warnings()))
        });
        self.join_refresh(handle).await
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Ledger totals. Named fallback policy: the backend's pre-aggregated
    /// summary is preferred; when it fails or is unavailable the totals
    /// are recomputed locally from the debt collection. Never fails
    /// outward.
    pub async fn get_overview(&self, force_refresh: bool) -> LedgerOverview {
        if let Some(view) = self.fetch_summary().await {
            return view;
        }
        let debts = self.list_debts(force_refresh).await;
        ledger::overview(&debts, Utc::now())
    }

    async fn fetch_summary(&self) -> Option<LedgerOverview> {
        let reply = match send(self.transport.as_ref(), Method::Get, SUMMARY_PATH, None).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!(error = %err, "summary endpoint unreachable, recomputing locally");
                return None;
            }
        };
        if !reply.success {
            debug!(message = ?reply.message, "summary endpoint refused, recomputing locally");
            return None;
        }

        let data = reply.data?;
        let mut diags = Diagnostics::default();
        let view = RecordDecoder::new().decode_overview(&data, &mut diags);
        self.absorb_warnings(diags.take_warnings());
        if view.is_none() {
            debug!("summary payload unusable, recomputing locally");
        }
        view
    }

    /// Signed unpaid balance against one contact, from cache-first debts.
    pub async fn net_balance(&self, contact_id: &str) -> Decimal {
        let debts = self.list_debts(false).await;
        ledger::net_balance(&debts, contact_id)
    }

    // =========================================================================
    // Diagnostics and plumbing
    // =========================================================================

    /// Drain everything reported since the last call.
    pub fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }

    async fn join_refresh<T>(
        &self,
        handle: tokio::task::JoinHandle<Result<(T, Vec<DecodeWarning>), LedgerError>>,
    ) -> Result<T, LedgerError> {
        match handle.await {
            Ok(Ok((records, warnings))) => {
                self.absorb_warnings(warnings);
                Ok(records)
            }
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(LedgerError::unknown(format!(
                "refresh task failed: {}",
                join_err
            ))),
        }
    }

    fn absorb_warnings(&self, warnings: Vec<DecodeWarning>) {
        if warnings.is_empty() {
            return;
        }
        let mut sink = self.diagnostics.lock();
        sink.extend(warnings.into_iter().map(Diagnostic::Decode));
    }

    fn report_degraded(&self, collection: Collection, err: &LedgerError) {
        warn!(%collection, error = %err, "read degraded to cached-or-empty");
        self.diagnostics.lock().push(Diagnostic::ReadDegraded {
            collection,
            message: err.to_string(),
        });
    }
}

/// A transport rejection and a refused reply meet the caller the same
/// way; this is the only place raw transport errors are converted.
async fn send(
    transport: &dyn Transport,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<TransportReply, LedgerError> {
    match transport.request(method, path, body).await {
        Ok(reply) => Ok(reply),
        Err(err) => Err(LedgerError::transport(format!("{:#}", err))),
    }
}

fn reply_failure(reply: &TransportReply) -> LedgerError {
    let message = reply
        .message
        .clone()
        .unwrap_or_else(|| "backend refused the request".to_string());
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("no such") {
        LedgerError::NotFound
    } else if lower.contains("unsupported") || lower.contains("not implemented") {
        // e.g. a backend revision without the mark-paid route
        LedgerError::unknown(message)
    } else {
        LedgerError::transport(message)
    }
}

fn filter_by_contact(debts: Vec<DebtRecord>, contact_id: &str) -> Vec<DebtRecord> {
    debts
        .into_iter()
        .filter(|d| d.contact_id == contact_id)
        .collect()
}

fn contact_body(input: &NewContact) -> Value {
    json!({
        "fullName": input.full_name.trim(),
        "phoneNumber": input.phone_number.trim(),
        "email": input.email.as_deref().map(str::trim).filter(|e| !e.is_empty()),
    })
}

fn debt_body(input: &NewDebt) -> Value {
    let mut body = json!({
        "contactId": input.contact_id,
        "contactName": input.contact_name,
        "amount": input.amount,
        "description": input.description.trim(),
        "isMyDebt": input.is_my_debt,
    });
    if let Some(due) = input.due_date {
        body["dueDate"] = json!(due.to_rfc3339());
    }
    body
}

/// Decode a mutation reply, backfilling from the input when the backend
/// echoes less than the full record.
fn contact_from_reply(data: Option<Value>, input: &NewContact, path_id: Option<&str>) -> Contact {
    let mut diags = Diagnostics::default();
    let mut contact = RecordDecoder::new().decode_contact(&data.unwrap_or(Value::Null), &mut diags);
    // An id warning here just means the backend echoed a partial body
    diags.take_warnings();

    if contact.id.is_empty() {
        if let Some(id) = path_id {
            contact.id = id.to_string();
        }
    }
    if contact.full_name.is_empty() {
        contact.full_name = input.full_name.trim().to_string();
    }
    if contact.phone_number.is_empty() {
        contact.phone_number = input.phone_number.trim().to_string();
    }
    if contact.email.is_none() {
        contact.email = input
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
    }
    contact
}

fn debt_from_reply(data: Option<Value>, input: &NewDebt, path_id: Option<&str>) -> DebtRecord {
    let mut diags = Diagnostics::default();
    let mut record = RecordDecoder::new().decode_debt(&data.unwrap_or(Value::Null), &mut diags);
    diags.take_warnings();

    if record.record_id.is_empty() {
        if let Some(id) = path_id {
            record.record_id = id.to_string();
        }
    }
    if record.contact_id.is_empty() {
        record.contact_id = input.contact_id.clone();
    }
    if record.contact_name.is_empty() {
        record.contact_name = input.contact_name.clone();
    }
    if record.amount == Decimal::ZERO {
        record.amount = input.amount;
    }
    if record.description.is_empty() {
        record.description = input.description.trim().to_string();
    }
    if let Some(due) = input.due_date {
        // Only trust our own copy when the backend echoed no due date
        if record.due_date == record.created_date + Duration::days(DEFAULT_DUE_DAYS) {
            record.due_date = due;
        }
    }
    record.is_my_debt = input.is_my_debt;
    record
}
