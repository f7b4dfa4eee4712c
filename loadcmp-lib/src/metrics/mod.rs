//! Named metric series collected while a scenario runs.
//!
//! Every metric owns its own synchronisation: a [`Trend`] keeps its samples
//! in a record buffer and a snapshot history with one mutex each, while
//! [`Rate`], [`Counter`] and [`Gauge`] are
//! plain atomics. The [`MetricRegistry`] lock is only taken when metrics are
//! registered or snapshotted, never while recording.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use rama::{
    error::{BoxError, ErrorExt as _},
    utils::str::arcstr::ArcStr,
};

mod scenario;
pub use self::scenario::ScenarioMetrics;

#[cfg(test)]
mod tests;

/// Sample rejected by a [`Trend`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(test, derive(PartialEq))]
pub enum InvalidSample {
    NotFinite(f64),
    Negative(f64),
}

impl fmt::Display for InvalidSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidSample::NotFinite(v) => write!(f, "InvalidSample: value is not finite ({v})"),
            InvalidSample::Negative(v) => write!(f, "InvalidSample: value is negative ({v})"),
        }
    }
}

impl std::error::Error for InvalidSample {}

/// Distribution of numeric samples (e.g. request durations in milliseconds).
///
/// Recording only touches the `pending` buffer. A snapshot swaps that buffer
/// out and folds it into the sorted `history` under a separate lock.
#[derive(Debug, Clone, Default)]
pub struct Trend {
    inner: Arc<TrendInner>,
}

#[derive(Debug, Default)]
struct TrendInner {
    pending: Mutex<Vec<f64>>,
    history: Mutex<Vec<f64>>,
}

impl Trend {
    pub fn add(&self, value: f64) -> Result<(), InvalidSample> {
        if !value.is_finite() {
            return Err(InvalidSample::NotFinite(value));
        }
        if value < 0. {
            return Err(InvalidSample::Negative(value));
        }
        self.inner.pending.lock().push(value);
        Ok(())
    }

    /// Record a duration as milliseconds.
    pub fn add_duration(&self, duration: Duration) {
        self.inner
            .pending
            .lock()
            .push(duration.as_secs_f64() * 1000.);
    }

    pub fn snapshot(&self) -> TrendSnapshot {
        let mut history = self.inner.history.lock();
        let fresh = std::mem::take(&mut *self.inner.pending.lock());
        if !fresh.is_empty() {
            history.extend(fresh);
            history.sort_unstable_by(f64::total_cmp);
        }
        TrendSnapshot::from_sorted(&history)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendSnapshot {
    fn from_sorted(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let count = samples.len();
        let sum: f64 = samples.iter().sum();

        Self {
            count: count as u64,
            sum,
            min: samples[0],
            max: samples[count - 1],
            avg: sum / count as f64,
            p50: percentile(samples, 0.50),
            p90: percentile(samples, 0.90),
            p95: percentile(samples, 0.95),
            p99: percentile(samples, 0.99),
        }
    }
}

/// Linear interpolation between the two closest ranks of a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0., 1.) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

/// Fraction of `true` observations.
#[derive(Debug, Clone, Default)]
pub struct Rate {
    inner: Arc<RateCounts>,
}

#[derive(Debug, Default)]
struct RateCounts {
    passes: AtomicU64,
    total: AtomicU64,
}

impl Rate {
    pub fn add(&self, value: bool) {
        if value {
            self.inner.passes.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RateSnapshot {
        // total is read first so passes can never exceed it
        let total = self.inner.total.load(Ordering::Acquire);
        let passes = self.inner.passes.load(Ordering::Acquire).min(total);
        RateSnapshot {
            passes,
            fails: total - passes,
            rate: if total == 0 {
                0.
            } else {
                passes as f64 / total as f64
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateSnapshot {
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

impl RateSnapshot {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Monotonic count.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last observed value.
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Only raise the gauge, used for high-water marks.
    pub fn set_max(&self, value: u64) {
        self.value.fetch_max(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub enum Metric {
    Trend(Trend),
    Rate(Rate),
    Counter(Counter),
    Gauge(Gauge),
}

impl Metric {
    fn kind(&self) -> &'static str {
        match self {
            Metric::Trend(_) => "trend",
            Metric::Rate(_) => "rate",
            Metric::Counter(_) => "counter",
            Metric::Gauge(_) => "gauge",
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Metric::Trend(trend) => MetricSnapshot::Trend(trend.snapshot()),
            Metric::Rate(rate) => MetricSnapshot::Rate(rate.snapshot()),
            Metric::Counter(counter) => MetricSnapshot::Counter(counter.get()),
            Metric::Gauge(gauge) => MetricSnapshot::Gauge(gauge.get()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSnapshot {
    Trend(TrendSnapshot),
    Rate(RateSnapshot),
    Counter(u64),
    Gauge(u64),
}

impl MetricSnapshot {
    pub fn as_trend(&self) -> Option<&TrendSnapshot> {
        match self {
            MetricSnapshot::Trend(trend) => Some(trend),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<&RateSnapshot> {
        match self {
            MetricSnapshot::Rate(rate) => Some(rate),
            _ => None,
        }
    }

    /// Value of a counter or gauge.
    pub fn as_value(&self) -> Option<u64> {
        match self {
            MetricSnapshot::Counter(value) | MetricSnapshot::Gauge(value) => Some(*value),
            _ => None,
        }
    }
}

/// Snapshot of all metrics of one registry, ordered by metric name.
pub type MetricsSnapshot = BTreeMap<ArcStr, MetricSnapshot>;

/// Explicit registry of named metrics.
///
/// A registry is created per scenario per run,
/// so nothing leaks between runs.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: Arc<RwLock<HashMap<ArcStr, Metric>>>,
}

macro_rules! impl_register {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Register (or fetch) the ", stringify!($variant), " named `name`.")]
        pub fn $fn_name(&self, name: impl Into<ArcStr>) -> Result<$ty, BoxError> {
            let name = name.into();
            match self.register(name.clone(), || Metric::$variant(Default::default()))? {
                Metric::$variant(metric) => Ok(metric),
                other => Err(BoxError::from("metric already registered with another kind")
                    .context_field("name", name)
                    .context_field("kind", other.kind())),
            }
        }
    };
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    impl_register!(trend, Trend, Trend);
    impl_register!(rate, Rate, Rate);
    impl_register!(counter, Counter, Counter);
    impl_register!(gauge, Gauge, Gauge);

    fn register(
        &self,
        name: ArcStr,
        new_metric: impl FnOnce() -> Metric,
    ) -> Result<Metric, BoxError> {
        if name.is_empty() {
            return Err(BoxError::from("metric name cannot be empty"));
        }
        if let Some(metric) = self.metrics.read().get(&name) {
            return Ok(metric.clone());
        }
        Ok(self
            .metrics
            .write()
            .entry(name)
            .or_insert_with(new_metric)
            .clone())
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.snapshot()))
            .collect()
    }
}
