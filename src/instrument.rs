use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use hdrhistogram::Histogram as HdrHistogram;
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Quantiles exported for every latency summary.
const SUMMARY_QUANTILES: &[f64] = &[0.5, 0.9, 0.99];

/// A monotonically increasing counter, safe to update from any thread.
///
/// Counters are cheap clones of a shared cell; a clone handed to a worker
/// observes the same total as the registry it came from.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn new() -> Counter { Default::default() }

    pub fn inc(&self) { self.add(1) }

    pub fn add(&self, n: u64) { self.0.fetch_add(n, Ordering::Relaxed); }

    pub fn get(&self) -> u64 { self.0.load(Ordering::Relaxed) }
}

/// A last-write-wins value, safe to update from any thread.
#[derive(Clone, Default)]
pub struct Gauge(Arc<AtomicU64>);

impl Gauge {
    pub fn new() -> Gauge { Default::default() }

    pub fn set(&self, value: u64) { self.0.store(value, Ordering::Relaxed); }

    pub fn get(&self) -> u64 { self.0.load(Ordering::Relaxed) }
}

/// A latency summary backed by an HDR histogram of nanosecond observations.
///
/// Quantiles come back in seconds, matching how the values are exported.
#[derive(Clone)]
pub struct Summary {
    inner: Arc<Mutex<SummaryInner>>,
}

struct SummaryInner {
    histogram: HdrHistogram<u64>,
    sum_nanos: u64,
}

impl Summary {
    pub fn new() -> Summary {
        let histogram = HdrHistogram::new_with_bounds(1, u64::max_value(), 3).unwrap();
        Summary {
            inner: Arc::new(Mutex::new(SummaryInner {
                histogram,
                sum_nanos: 0,
            })),
        }
    }

    /// Records one observation.
    pub fn observe(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        let mut inner = self.inner.lock();
        inner.histogram.saturating_record(nanos);
        inner.sum_nanos = inner.sum_nanos.wrapping_add(nanos);
    }

    /// Number of observations recorded.
    pub fn count(&self) -> u64 { self.inner.lock().histogram.len() }

    /// Value at the given quantile (0.0 to 1.0), in seconds.
    pub fn quantile(&self, q: f64) -> f64 {
        self.inner.lock().histogram.value_at_percentile(q * 100.0) as f64 / 1e9
    }

    /// Sum of all observations, in seconds.
    pub fn sum(&self) -> f64 { self.inner.lock().sum_nanos as f64 / 1e9 }
}

impl Default for Summary {
    fn default() -> Summary { Summary::new() }
}

enum Metric {
    Counter(Counter),
    Gauge(Gauge),
    Constant(f64),
    Summary(Summary),
}

struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn render(&self) -> String { format_key(&self.name, &self.labels) }

    fn render_suffixed(&self, suffix: &str) -> String {
        format_key(&format!("{}{}", self.name, suffix), &self.labels)
    }

    fn render_quantile(&self, q: f64) -> String {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(("quantile".to_owned(), q.to_string()));
        labels.extend(self.labels.iter().cloned());
        format_key(&self.name, &labels)
    }
}

fn format_key(name: &str, labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return name.to_owned();
    }

    let mut out = String::from(name);
    out.push('{');
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(v);
        out.push('"');
    }
    out.push('}');
    out
}

/// Registrar for the metrics exported by the store and the queue manager.
///
/// A `Registry` is a cheap clone; components register their counters, gauges,
/// and summaries at construction and keep updating the returned handles, while
/// the embedding process renders the lot with [`Registry::snapshot`].
#[derive(Clone, Default)]
pub struct Registry {
    metrics: Arc<Mutex<Vec<(MetricKey, Metric)>>>,
}

impl Registry {
    pub fn new() -> Registry { Default::default() }

    /// Registers and returns a counter.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Counter {
        let counter = Counter::new();
        self.push(name, labels, Metric::Counter(counter.clone()));
        counter
    }

    /// Registers and returns a gauge.
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Gauge {
        let gauge = Gauge::new();
        self.push(name, labels, Metric::Gauge(gauge.clone()));
        gauge
    }

    /// Registers a value fixed at registration time.
    pub fn constant(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.push(name, labels, Metric::Constant(value));
    }

    /// Registers and returns a latency summary.
    pub fn summary(&self, name: &str, labels: &[(&str, &str)]) -> Summary {
        let summary = Summary::new();
        self.push(name, labels, Metric::Summary(summary.clone()));
        summary
    }

    fn push(&self, name: &str, labels: &[(&str, &str)], metric: Metric) {
        let key = MetricKey {
            name: name.to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        };
        self.metrics.lock().push((key, metric));
    }

    /// Renders a point-in-time view of every registered metric.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for (key, metric) in self.metrics.lock().iter() {
            match metric {
                Metric::Counter(counter) => {
                    snapshot.counts.insert(key.render(), counter.get());
                },
                Metric::Gauge(gauge) => {
                    snapshot.counts.insert(key.render(), gauge.get());
                },
                Metric::Constant(value) => {
                    snapshot.values.insert(key.render(), *value);
                },
                Metric::Summary(summary) => {
                    for q in SUMMARY_QUANTILES {
                        snapshot.values.insert(key.render_quantile(*q), summary.quantile(*q));
                    }
                    snapshot.counts.insert(key.render_suffixed("_count"), summary.count());
                    snapshot.values.insert(key.render_suffixed("_sum"), summary.sum());
                },
            }
        }
        snapshot
    }
}

/// A point-in-time view of registered metric data.
#[derive(Default)]
pub struct Snapshot {
    counts: HashMap<String, u64, FnvBuildHasher>,
    values: HashMap<String, f64, FnvBuildHasher>,
}

impl Snapshot {
    /// Gets the counter or gauge value for the given metric key.
    ///
    /// Returns `None` if the key has no integer value in this snapshot.
    pub fn count(&self, key: &str) -> Option<u64> { self.counts.get(key).copied() }

    /// Gets the float-valued metric for the given key.
    ///
    /// Returns `None` if the key has no float value in this snapshot.
    pub fn value(&self, key: &str) -> Option<f64> { self.values.get(key).copied() }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let field_count = self.counts.len() + self.values.len();
        let mut map = serializer.serialize_map(Some(field_count))?;
        for (k, v) in &self.counts {
            map.serialize_entry(k, v)?;
        }
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
