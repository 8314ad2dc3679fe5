use crate::error::StoreError;
use crate::reading::{NewReading, Reading, ReadingId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of a live subscription. Each newly persisted reading arrives once, in insert
/// order. The channel ends when the subscription is released.
#[derive(Debug)]
pub struct LiveSubscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<Reading>,
}

/// Durable readings store consumed by the analytics engine.
///
/// `query` is inclusive of both `from` and `to` and returns readings ascending by
/// `(created_at, id)`.
pub trait ReadingStore: Send + Sync + 'static {
    fn query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Reading>, StoreError>> + Send;

    fn insert(
        &self,
        reading: NewReading,
    ) -> impl Future<Output = Result<Reading, StoreError>> + Send;

    fn subscribe(&self) -> Result<LiveSubscription, StoreError>;

    fn unsubscribe(&self, id: SubscriptionId);

    fn clear_all(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn clear_device(&self, device_id: &str)
        -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Holds one live subscription and releases it exactly once, on `release` or drop.
pub struct SubscriptionGuard<S: ReadingStore> {
    store: Arc<S>,
    id: Option<SubscriptionId>,
}

impl<S: ReadingStore> SubscriptionGuard<S> {
    pub fn acquire(
        store: Arc<S>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Reading>), StoreError> {
        let subscription = store.subscribe()?;
        tracing::info!(subscription = %subscription.id, "live subscription acquired");
        let guard = Self {
            store,
            id: Some(subscription.id),
        };
        Ok((guard, subscription.events))
    }

    pub fn id(&self) -> Option<SubscriptionId> {
        self.id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(id) = self.id.take() {
            self.store.unsubscribe(id);
            tracing::info!(subscription = %id, "live subscription released");
        }
    }
}

impl<S: ReadingStore> Drop for SubscriptionGuard<S> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: Vec<Reading>,
    next_id: i64,
    next_subscription: u64,
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<Reading>>,
}

/// In-process store with insert notifications. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("reading store lock poisoned".to_string()))
    }

    fn query_sync(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        if from > to {
            return Err(StoreError::InvalidRange { from, to });
        }
        let inner = self.lock()?;
        let mut rows: Vec<Reading> = inner
            .rows
            .iter()
            .filter(|reading| reading.created_at >= from && reading.created_at <= to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.cmp_order(b));
        Ok(rows)
    }

    fn insert_sync(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let reading = reading.into_reading(ReadingId(inner.next_id));
        inner.rows.push(reading.clone());

        let mut closed = Vec::new();
        for (id, tx) in &inner.subscribers {
            if tx.send(reading.clone()).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            tracing::debug!(subscription = %id, "dropping subscriber with closed receiver");
            inner.subscribers.remove(&id);
        }

        tracing::trace!(id = %reading.id, device = %reading.device_id, "stored reading");
        Ok(reading)
    }

    fn retain_rows<F>(&self, keep: F) -> Result<u64, StoreError>
    where
        F: Fn(&Reading) -> bool,
    {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner.rows.retain(|reading| keep(reading));
        Ok((before - inner.rows.len()) as u64)
    }
}

impl ReadingStore for MemoryReadingStore {
    fn query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Reading>, StoreError>> + Send {
        let result = self.query_sync(from, to);
        async move { result }
    }

    fn insert(
        &self,
        reading: NewReading,
    ) -> impl Future<Output = Result<Reading, StoreError>> + Send {
        let result = self.insert_sync(reading);
        async move { result }
    }

    fn subscribe(&self) -> Result<LiveSubscription, StoreError> {
        let mut inner = self.lock()?;
        inner.next_subscription += 1;
        let id = SubscriptionId::from_raw(inner.next_subscription);
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.insert(id, tx);
        Ok(LiveSubscription { id, events: rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut inner) = self.lock() {
            inner.subscribers.remove(&id);
        }
    }

    fn clear_all(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let result = self.retain_rows(|_| false);
        async move { result }
    }

    fn clear_device(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let device_id = device_id.trim();
        let result = self.retain_rows(|reading| reading.device_id != device_id);
        async move { result }
    }
}
