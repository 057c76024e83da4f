//! Scripted sources shared by the fetcher and batch tests.

use crate::core::{AggregateQuery, AggregateSource, YieldSource};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tracks how many calls are running at once and the highest count seen.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct MockSource {
    pub calls: AtomicUsize,
    value: Mutex<Option<f64>>,
    fail_first: usize,
    delay: Duration,
    timeout: Duration,
    in_flight: Option<Arc<InFlight>>,
}

impl MockSource {
    pub fn returning(value: Option<f64>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            value: Mutex::new(value),
            fail_first: 0,
            delay: Duration::ZERO,
            timeout: Duration::ZERO,
            in_flight: None,
        }
    }

    /// Returns `None` for the first `n` calls.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Own call bound reported through `timeout()`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tracking(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn set(&self, value: Option<f64>) {
        *self.value.lock().unwrap() = value;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn simulate_call(delay: Duration, in_flight: Option<&InFlight>) {
    if let Some(in_flight) = in_flight {
        in_flight.enter();
    }
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    if let Some(in_flight) = in_flight {
        in_flight.exit();
    }
}

#[async_trait]
impl YieldSource for MockSource {
    fn name(&self) -> &str {
        "mock-primary"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch_yield(&self) -> Option<f64> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        simulate_call(self.delay, self.in_flight.as_deref()).await;
        if n < self.fail_first {
            return None;
        }
        *self.value.lock().unwrap()
    }
}

pub struct MockAggregate {
    pub calls: AtomicUsize,
    value: Mutex<Option<f64>>,
    pub last_query: Mutex<Option<AggregateQuery>>,
    delay: Duration,
    timeout: Duration,
    in_flight: Option<Arc<InFlight>>,
}

impl MockAggregate {
    pub fn returning(value: Option<f64>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            value: Mutex::new(value),
            last_query: Mutex::new(None),
            delay: Duration::ZERO,
            timeout: Duration::ZERO,
            in_flight: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tracking(mut self, in_flight: Arc<InFlight>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn set(&self, value: Option<f64>) {
        *self.value.lock().unwrap() = value;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AggregateSource for MockAggregate {
    fn name(&self) -> &str {
        "mock-aggregate"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn aggregate_yield(&self, query: &AggregateQuery) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        simulate_call(self.delay, self.in_flight.as_deref()).await;
        *self.value.lock().unwrap()
    }
}
