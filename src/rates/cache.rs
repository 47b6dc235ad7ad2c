//! Cached rate table with change notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::{RateError, RateSource};

/// A full snapshot of per-unit rates, tagged with its origin.
///
/// Rates are expressed in the reference currency, whose own rate is
/// exactly 1.0. The table is replaced wholesale on every refresh.
#[derive(Debug, Clone)]
pub struct RateTable {
    pub rates: HashMap<String, f64>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl RateTable {
    fn empty() -> Self {
        Self {
            rates: HashMap::new(),
            source: String::new(),
            fetched_at: Utc::now(),
        }
    }
}

type Subscriber = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Holds the current rate table, refreshes it from a remote source and
/// notifies subscribers when it changes.
///
/// Conversion reads the last successfully fetched table and never waits
/// for a fresh fetch; a failed refresh keeps the previous table intact.
pub struct RateCache {
    source: Box<dyn RateSource>,
    reference: String,
    table: RwLock<RateTable>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl RateCache {
    /// Create the cache and perform one initial refresh.
    ///
    /// Fails if the initial fetch fails, so consumers never observe an
    /// unpopulated cache. Later refresh failures are soft.
    pub async fn new(
        source: Box<dyn RateSource>,
        reference: impl Into<String>,
    ) -> Result<Self, RateError> {
        let cache = Self {
            source,
            reference: reference.into(),
            table: RwLock::new(RateTable::empty()),
            subscribers: Mutex::new(Vec::new()),
        };

        cache.refresh().await?;
        Ok(cache)
    }

    /// Convert an amount between two currencies using the cached table.
    ///
    /// Goes through the reference currency: `amount * rate(src) / rate(dst)`.
    /// A currency missing from the table degrades to a zero rate rather
    /// than blocking or erroring.
    pub fn convert(&self, amount: f64, src: &str, dst: &str) -> f64 {
        if src == dst {
            return amount;
        }

        let table = self.table.read().unwrap();
        let rate = |code: &str| table.rates.get(code).copied().unwrap_or(0.0);

        amount * rate(src) / rate(dst)
    }

    /// Register a process-lifetime subscriber fired after every refresh
    /// that changes the rates.
    ///
    /// Each notification runs in its own spawned task, never inline with
    /// the refresh or with this call.
    pub fn register_subscriber<F>(&self, subscriber: F)
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Arc::new(subscriber));
    }

    /// Fetch the current rates and atomically swap the cached table.
    ///
    /// On failure the previous table is retained and the error returned;
    /// the caller decides whether that is fatal (startup) or not (timer).
    pub async fn refresh(&self) -> Result<(), RateError> {
        let mut fetched = self.source.fetch().await?;
        fetched.rates.insert(self.reference.clone(), 1.0);

        let changed = {
            let mut table = self.table.write().unwrap();
            let changed = table.rates != fetched.rates;
            *table = fetched;
            changed
        };

        if changed {
            self.notify_subscribers();
        }

        Ok(())
    }

    /// Number of currencies in the cached table.
    pub fn currency_count(&self) -> usize {
        self.table.read().unwrap().rates.len()
    }

    /// When the cached table was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.table.read().unwrap().fetched_at
    }

    fn notify_subscribers(&self) {
        let subscribers: Vec<Subscriber> = self.subscribers.lock().unwrap().clone();

        tracing::debug!(count = subscribers.len(), "rates changed, notifying subscribers");
        for subscriber in subscribers {
            tokio::spawn(subscriber());
        }
    }
}
