//! In-memory ledger cache.
//!
//! One slot per entity collection, each stamped with the instant of its
//! last full refresh. The cache is a read-through accelerator, never a
//! source of truth: any mutation invalidates the affected slot and the
//! next read refetches.
//!
//! Slot replacement is atomic behind a `parking_lot` lock; no lock is
//! ever held across an await point. Write ordering between overlapping
//! fetches is decided by a monotonically increasing fetch-sequence token
//! (last writer by sequence, not by wall clock).

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::models::{Contact, DebtRecord, PaymentRecord};

/// Slots go stale this many minutes after a `put`. A tuning constant,
/// not a protocol requirement - override with [`LedgerCache::with_ttl`].
pub const DEFAULT_TTL_MINUTES: i64 = 5;

/// The entity collections the cache knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Contacts,
    Debts,
    Payments,
}

impl Collection {
    /// Plural key the backend uses for nested list responses, also the
    /// collection's path segment.
    pub fn plural(&self) -> &'static str {
        match self {
            Collection::Contacts => "contacts",
            Collection::Debts => "debts",
            Collection::Payments => "payments",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.plural())
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    records: Vec<T>,
    last_refreshed: DateTime<Utc>,
    applied_seq: u64,
}

#[derive(Debug)]
struct StoreState<T> {
    slot: Option<Slot<T>>,
    /// Fetches that began at or before this sequence must not land: their
    /// data predates the last invalidating mutation.
    floor_seq: u64,
}

impl<T> Default for StoreState<T> {
    fn default() -> Self {
        Self {
            slot: None,
            floor_seq: 0,
        }
    }
}

/// Generic per-collection store; the public typed accessors below are the
/// only way in or out.
#[derive(Debug)]
struct Store<T> {
    state: RwLock<StoreState<T>>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }
}

impl<T: Clone> Store<T> {
    /// Records if the slot is populated, non-empty, and younger than `ttl`.
    fn fresh(&self, ttl: Duration) -> Option<Vec<T>> {
        let guard = self.state.read();
        let slot = guard.slot.as_ref()?;
        if slot.records.is_empty() || Utc::now() - slot.last_refreshed >= ttl {
            return None;
        }
        Some(slot.records.clone())
    }

    /// Records regardless of age - the read-path degradation fallback.
    fn last_known(&self) -> Option<Vec<T>> {
        self.state.read().slot.as_ref().map(|s| s.records.clone())
    }

    /// Replace the slot wholesale and stamp `last_refreshed`. Ignored if a
    /// later-sequenced fetch already landed or the fetch predates the last
    /// invalidation.
    fn put(&self, records: Vec<T>, seq: u64) {
        let mut guard = self.state.write();
        if seq <= guard.floor_seq {
            tracing::debug!(seq, floor = guard.floor_seq, "pre-invalidation put ignored");
            return;
        }
        if let Some(existing) = guard.slot.as_ref() {
            if existing.applied_seq >= seq {
                tracing::debug!(seq, applied = existing.applied_seq, "stale put ignored");
                return;
            }
        }
        guard.slot = Some(Slot {
            records,
            last_refreshed: Utc::now(),
            applied_seq: seq,
        });
    }

    /// Clear the slot and fence out fetches begun at or before `floor_seq`.
    fn invalidate(&self, floor_seq: u64) {
        let mut guard = self.state.write();
        guard.slot = None;
        guard.floor_seq = guard.floor_seq.max(floor_seq);
    }

    /// Update or append one record in a populated slot without touching
    /// `last_refreshed` (the TTL keeps running).
    fn upsert(&self, record: T, matches: impl Fn(&T) -> bool) {
        let mut guard = self.state.write();
        let Some(slot) = guard.slot.as_mut() else {
            return;
        };
        match slot.records.iter_mut().find(|r| matches(r)) {
            Some(existing) => *existing = record,
            None => slot.records.push(record),
        }
    }

    fn applied_seq(&self) -> u64 {
        self.state
            .read()
            .slot
            .as_ref()
            .map(|s| s.applied_seq)
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        if let Some(slot) = self.state.write().slot.as_mut() {
            slot.last_refreshed -= by;
        }
    }
}

/// Shared cache for the app session. Constructed once and injected into
/// the repository - no hidden statics.
#[derive(Debug)]
pub struct LedgerCache {
    ttl: Duration,
    next_seq: AtomicU64,
    contacts: Store<Contact>,
    debts: Store<DebtRecord>,
    payments: Store<PaymentRecord>,
}

impl LedgerCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL_MINUTES)
    }

    pub fn with_ttl(ttl_minutes: i64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes),
            next_seq: AtomicU64::new(0),
            contacts: Store::default(),
            debts: Store::default(),
            payments: Store::default(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::with_ttl(config.cache_ttl_minutes)
    }

    /// Hand out the ordering token for a fetch that is about to start.
    /// The matching `put_*` call passes it back; a `put` carrying an older
    /// token than the last applied one is dropped.
    pub fn begin_fetch(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sequence of the last fetch applied to the collection (0 if none).
    /// Lets a waiter detect that somebody else refreshed while it slept.
    pub fn applied_seq(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Contacts => self.contacts.applied_seq(),
            Collection::Debts => self.debts.applied_seq(),
            Collection::Payments => self.payments.applied_seq(),
        }
    }

    /// Clear a slot after a mutation. Any fetch already in flight is
    /// fenced out: its data predates the mutation.
    pub fn invalidate(&self, collection: Collection) {
        tracing::debug!(%collection, "cache slot invalidated");
        let floor = self.next_seq.load(Ordering::Relaxed);
        match collection {
            Collection::Contacts => self.contacts.invalidate(floor),
            Collection::Debts => self.debts.invalidate(floor),
            Collection::Payments => self.payments.invalidate(floor),
        }
    }

    // ===== Contacts =====

    pub fn contacts(&self) -> Option<Vec<Contact>> {
        self.contacts.fresh(self.ttl)
    }

    pub fn last_known_contacts(&self) -> Option<Vec<Contact>> {
        self.contacts.last_known()
    }

    pub fn put_contacts(&self, records: Vec<Contact>, seq: u64) {
        self.contacts.put(records, seq);
    }

    pub fn upsert_contact(&self, contact: Contact) {
        let id = contact.id.clone();
        self.contacts.upsert(contact, |c| c.id == id);
    }

    // ===== Debts =====

    pub fn debts(&self) -> Option<Vec<DebtRecord>> {
        self.debts.fresh(self.ttl)
    }

    pub fn last_known_debts(&self) -> Option<Vec<DebtRecord>> {
        self.debts.last_known()
    }

    pub fn put_debts(&self, records: Vec<DebtRecord>, seq: u64) {
        self.debts.put(records, seq);
    }

    pub fn upsert_debt(&self, debt: DebtRecord) {
        let id = debt.record_id.clone();
        self.debts.upsert(debt, |d| d.record_id == id);
    }

    /// Any known copy of one debt, fresh or stale.
    pub fn last_known_debt(&self, record_id: &str) -> Option<DebtRecord> {
        self.debts
            .last_known()
            .and_then(|records| records.into_iter().find(|d| d.record_id == record_id))
    }

    // ===== Payments =====

    pub fn payments(&self) -> Option<Vec<PaymentRecord>> {
        self.payments.fresh(self.ttl)
    }

    pub fn last_known_payments(&self) -> Option<Vec<PaymentRecord>> {
        self.payments.last_known()
    }

    pub fn put_payments(&self, records: Vec<PaymentRecord>, seq: u64) {
        self.payments.put(records, seq);
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, collection: Collection, by: Duration) {
        match collection {
            Collection::Contacts => self.contacts.backdate(by),
            Collection::Debts => self.debts.backdate(by),
            Collection::Payments => self.payments.backdate(by),
        }
    }
}

impl Default for LedgerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.to_string(),
            full_name: name.to_string(),
            phone_number: "+998901234567".to_string(),
            email: None,
        }
    }

    #[test]
    fn test_get_after_put_is_fresh() {
        let cache = LedgerCache::new();
        let seq = cache.begin_fetch();
        cache.put_contacts(vec![contact("c1", "Ana")], seq);
        let got = cache.contacts().expect("slot should be fresh");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "c1");
    }

    #[test]
    fn test_empty_slot_is_not_fresh() {
        let cache = LedgerCache::new();
        let seq = cache.begin_fetch();
        cache.put_contacts(vec![], seq);
        assert!(cache.contacts().is_none());
        // but it is still the last known value
        assert_eq!(cache.last_known_contacts().unwrap().len(), 0);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = LedgerCache::with_ttl(5);
        let seq = cache.begin_fetch();
        cache.put_contacts(vec![contact("c1", "Ana")], seq);
        cache.backdate(Collection::Contacts, Duration::minutes(6));
        assert!(cache.contacts().is_none());
        // stale data still available for degradation
        assert_eq!(cache.last_known_contacts().unwrap().len(), 1);
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let cache = LedgerCache::new();
        let seq = cache.begin_fetch();
        cache.put_contacts(vec![contact("c1", "Ana")], seq);
        cache.invalidate(Collection::Contacts);
        assert!(cache.contacts().is_none());
        assert!(cache.last_known_contacts().is_none());
    }

    #[test]
    fn test_invalidation_is_per_collection() {
        let cache = LedgerCache::new();
        cache.put_contacts(vec![contact("c1", "Ana")], cache.begin_fetch());
        cache.invalidate(Collection::Debts);
        assert!(cache.contacts().is_some());
    }

    #[test]
    fn test_upsert_replaces_in_place_and_keeps_ttl() {
        let cache = LedgerCache::with_ttl(5);
        let seq = cache.begin_fetch();
        cache.put_contacts(vec![contact("c1", "Ana")], seq);
        cache.backdate(Collection::Contacts, Duration::minutes(4));

        cache.upsert_contact(contact("c1", "Ana Li"));
        cache.upsert_contact(contact("c2", "Bek"));

        let got = cache.contacts().expect("still inside ttl");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].full_name, "Ana Li");

        // upsert did not reset the clock: two more minutes tips it stale
        cache.backdate(Collection::Contacts, Duration::minutes(2));
        assert!(cache.contacts().is_none());
    }

    #[test]
    fn test_upsert_into_empty_slot_is_a_no_op() {
        let cache = LedgerCache::new();
        cache.upsert_contact(contact("c1", "Ana"));
        assert!(cache.last_known_contacts().is_none());
    }

    #[test]
    fn test_later_sequence_wins_regardless_of_arrival_order() {
        let cache = LedgerCache::new();
        let first = cache.begin_fetch();
        let second = cache.begin_fetch();

        // The later-started fetch completes first...
        cache.put_contacts(vec![contact("c2", "Bek")], second);
        // ...and the slow earlier fetch must not clobber it.
        cache.put_contacts(vec![contact("c1", "Ana")], first);

        let got = cache.contacts().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "c2");
        assert_eq!(cache.applied_seq(Collection::Contacts), second);
    }

    #[test]
    fn test_sequence_tokens_are_monotonic() {
        let cache = LedgerCache::new();
        let a = cache.begin_fetch();
        let b = cache.begin_fetch();
        assert!(b > a);
    }

    #[test]
    fn test_invalidation_fences_out_in_flight_fetch() {
        let cache = LedgerCache::new();
        let in_flight = cache.begin_fetch();
        // A mutation lands while the fetch is still on the wire
        cache.invalidate(Collection::Contacts);
        // The pre-mutation fetch completes late and must be dropped
        cache.put_contacts(vec![contact("c1", "Ana")], in_flight);
        assert!(cache.last_known_contacts().is_none());

        // A fetch begun after the invalidation lands normally
        let fresh = cache.begin_fetch();
        cache.put_contacts(vec![contact("c2", "Bek")], fresh);
        assert_eq!(cache.contacts().unwrap()[0].id, "c2");
    }
}
