use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use protogas_core::domain::customer::{Customer, CustomerId, CustomerUpsert};
use protogas_core::domain::idempotency::{Fingerprint, IdempotencyRecord, RecordOutcome};
use protogas_core::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use protogas_core::domain::summary::CallSummary;

use super::{
    CallStateCache, CallSummaryRepository, CustomerRepository, IdempotencyRepository,
    OrderRepository, RepositoryError,
};

/// Shared "backend is down" switch for the in-memory fakes.
#[derive(Default)]
struct Availability(AtomicBool);

impl Availability {
    fn set_unavailable(&self, unavailable: bool) {
        self.0.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, Customer>>,
    lookups: AtomicUsize,
    upserts: AtomicUsize,
    availability: Availability,
}

impl InMemoryCustomerRepository {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.availability.set_unavailable(unavailable);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Reads by phone or id.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.customers.read().await.len()
    }
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Customer>, RepositoryError> {
        self.availability.check()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let customers = self.customers.read().await;
        Ok(customers.get(phone).cloned())
    }

    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        self.availability.check()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let customers = self.customers.read().await;
        Ok(customers.values().find(|customer| &customer.id == id).cloned())
    }

    async fn upsert(&self, customer: CustomerUpsert) -> Result<Customer, RepositoryError> {
        self.availability.check()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let mut customers = self.customers.write().await;
        let stored = match customers.get(&customer.phone) {
            Some(existing) => Customer {
                name: customer.name,
                address: customer.address,
                email: customer.email,
                updated_at: later_than(now, existing.created_at),
                ..existing.clone()
            },
            None => Customer {
                id: CustomerId::new(),
                name: customer.name,
                phone: customer.phone,
                address: customer.address,
                email: customer.email,
                created_at: now,
                updated_at: now,
            },
        };
        customers.insert(stored.phone.clone(), stored.clone());
        Ok(stored)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.availability.check()?;
        Ok(self.customers.read().await.len() as u64)
    }
}

/// An update must never look like a fresh insert, even on a coarse clock.
fn later_than(now: DateTime<Utc>, created_at: DateTime<Utc>) -> DateTime<Utc> {
    if now > created_at {
        now
    } else {
        created_at + chrono::Duration::microseconds(1)
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
    availability: Availability,
}

impl InMemoryOrderRepository {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.availability.set_unavailable(unavailable);
    }

    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    /// Stands in for the back office moving an order along.
    pub async fn set_status(&self, id: &OrderId, status: OrderStatus) -> bool {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|order| &order.id == id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        self.availability.check()?;
        let order = order.into_order(Utc::now());
        self.orders.write().await.push(order.clone());
        Ok(order)
    }

    async fn find_latest_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>, RepositoryError> {
        self.availability.check()?;
        let orders = self.orders.read().await;
        Ok(orders.iter().rev().find(|order| &order.customer_id == customer_id).cloned())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.availability.check()?;
        Ok(self.orders.read().await.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryIdempotencyRepository {
    records: RwLock<HashMap<String, IdempotencyRecord>>,
    inserts: AtomicUsize,
    availability: Availability,
}

impl InMemoryIdempotencyRepository {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.availability.set_unavailable(unavailable);
    }

    /// Insert attempts, including ones that hit an existing fingerprint.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl IdempotencyRepository for InMemoryIdempotencyRepository {
    async fn find(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        self.availability.check()?;
        let records = self.records.read().await;
        Ok(records.get(fingerprint.as_str()).cloned())
    }

    async fn insert(&self, record: IdempotencyRecord) -> Result<RecordOutcome, RepositoryError> {
        self.availability.check()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let mut records = self.records.write().await;
        if records.contains_key(record.fingerprint.as_str()) {
            return Ok(RecordOutcome::AlreadyRecorded);
        }
        records.insert(record.fingerprint.0.clone(), record);
        Ok(RecordOutcome::Inserted)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.availability.check()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

struct CachedValue {
    value: String,
    expires_at: Instant,
}

/// TTL cache on the tokio clock, so paused-time tests can step past expiry.
#[derive(Default)]
pub struct InMemoryCallStateCache {
    entries: RwLock<HashMap<String, CachedValue>>,
    availability: Availability,
}

impl InMemoryCallStateCache {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.availability.set_unavailable(unavailable);
    }
}

#[async_trait::async_trait]
impl CallStateCache for InMemoryCallStateCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        self.availability.check()?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_secs: u64,
    ) -> Result<(), RepositoryError> {
        self.availability.check()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            CachedValue { value, expires_at: now + Duration::from_secs(ttl_secs) },
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCallSummaryRepository {
    summaries: RwLock<HashMap<String, CallSummary>>,
    availability: Availability,
}

impl InMemoryCallSummaryRepository {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.availability.set_unavailable(unavailable);
    }

    pub async fn get(&self, conversation_id: &str) -> Option<CallSummary> {
        self.summaries.read().await.get(conversation_id).cloned()
    }
}

#[async_trait::async_trait]
impl CallSummaryRepository for InMemoryCallSummaryRepository {
    async fn save(&self, summary: CallSummary) -> Result<(), RepositoryError> {
        self.availability.check()?;
        let mut summaries = self.summaries.write().await;
        summaries.insert(summary.conversation_id.clone(), summary);
        Ok(())
    }
}
