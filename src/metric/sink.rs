//! Exposition descriptors and the prometheus-backed sample sink.

use ahash::AHashMap as HashMap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts, Registry};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::EmitError;

/// Label schema shared by every per-group sample.
pub const GROUP_LABELS: &[&str] = &["grouper", "group"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Counter,
    Gauge,
}

/// Static description of one exported metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub value_type: ValueType,
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value_type: ValueType::Counter,
            labels: GROUP_LABELS,
        }
    }

    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value_type: ValueType::Gauge,
            labels: GROUP_LABELS,
        }
    }
}

#[derive(Clone)]
enum SampleVec {
    Counter(CounterVec),
    Gauge(GaugeVec),
}

impl SampleVec {
    fn desc(&self) -> Vec<&Desc> {
        match self {
            SampleVec::Counter(v) => v.desc(),
            SampleVec::Gauge(v) => v.desc(),
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            SampleVec::Counter(v) => v.collect(),
            SampleVec::Gauge(v) => v.collect(),
        }
    }

    fn reset(&self) {
        match self {
            SampleVec::Counter(v) => v.reset(),
            SampleVec::Gauge(v) => v.reset(),
        }
    }
}

/// The registered face of a sink: serves the last published families.
struct PublishedFamilies {
    vecs: Vec<SampleVec>,
    families: Arc<RwLock<Vec<MetricFamily>>>,
}

impl Collector for PublishedFamilies {
    fn desc(&self) -> Vec<&Desc> {
        self.vecs.iter().flat_map(SampleVec::desc).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Metric vectors keyed by metric name, staged off-registry.
///
/// Writes land in the vectors; the registry only sees what [`MetricSink::publish`]
/// swapped in last, so a gather never observes a half-written group set.
/// Counters carry cumulative values read from /proc, so they are written with
/// reset + `inc_by` rather than incremented across scrapes.
#[derive(Clone, Default)]
pub struct MetricSink {
    vecs: HashMap<&'static str, SampleVec>,
    published: Arc<RwLock<Vec<MetricFamily>>>,
}

impl MetricSink {
    /// Creates a vector per descriptor and registers them as one collector.
    pub fn register<'a>(
        registry: &Registry,
        descs: impl IntoIterator<Item = &'a MetricDesc>,
    ) -> prometheus::Result<Self> {
        let mut vecs = HashMap::new();
        for desc in descs {
            if vecs.contains_key(desc.name) {
                continue;
            }
            let opts = Opts::new(desc.name, desc.help);
            let vec = match desc.value_type {
                ValueType::Counter => SampleVec::Counter(CounterVec::new(opts, desc.labels)?),
                ValueType::Gauge => SampleVec::Gauge(GaugeVec::new(opts, desc.labels)?),
            };
            vecs.insert(desc.name, vec);
        }

        let published = Arc::new(RwLock::new(Vec::new()));
        if !vecs.is_empty() {
            registry.register(Box::new(PublishedFamilies {
                vecs: vecs.values().cloned().collect(),
                families: Arc::clone(&published),
            }))?;
        }
        Ok(Self { vecs, published })
    }

    /// Number of metric families this sink writes.
    pub fn family_count(&self) -> usize {
        self.vecs.len()
    }

    /// Stages one sample. Fails if `name` was never registered.
    pub fn set(&self, name: &str, labels: &[&str], value: f64) -> Result<(), EmitError> {
        let vec = self
            .vecs
            .get(name)
            .ok_or_else(|| EmitError::MissingDescriptor(name.to_string()))?;
        let map_err = |source| EmitError::Prometheus {
            name: name.to_string(),
            source,
        };
        match vec {
            SampleVec::Counter(v) => {
                let counter = v.get_metric_with_label_values(labels).map_err(map_err)?;
                counter.reset();
                counter.inc_by(value.max(0.0));
            }
            SampleVec::Gauge(v) => {
                v.get_metric_with_label_values(labels)
                    .map_err(map_err)?
                    .set(value);
            }
        }
        Ok(())
    }

    /// Drops every staged child so groups that vanished stop being exported.
    pub fn reset(&self) {
        for vec in self.vecs.values() {
            vec.reset();
        }
    }

    /// Makes the staged samples visible to the registry in one swap.
    pub fn publish(&self) {
        let families: Vec<MetricFamily> = self.vecs.values().flat_map(SampleVec::collect).collect();
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = families;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    const DESCS: [MetricDesc; 2] = [
        MetricDesc::counter("test_events_total", "Events"),
        MetricDesc::gauge("test_level", "Level"),
    ];

    fn encode(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .expect("encode failed");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn test_set_counter_overwrites_previous_value() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter()).expect("register failed");

        sink.set("test_events_total", &["cgroup", "web"], 10.0).unwrap();
        sink.set("test_events_total", &["cgroup", "web"], 4.0).unwrap();
        sink.publish();

        let text = encode(&registry);
        assert!(text.contains("test_events_total{group=\"web\",grouper=\"cgroup\"} 4"));
    }

    #[test]
    fn test_missing_descriptor() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter()).expect("register failed");

        let err = sink.set("unknown_metric", &["cgroup", "web"], 1.0).unwrap_err();
        assert!(matches!(err, EmitError::MissingDescriptor(ref n) if n == "unknown_metric"));
    }

    #[test]
    fn test_wrong_label_count_is_an_error() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter()).expect("register failed");
        assert!(sink.set("test_level", &["only-one"], 1.0).is_err());
    }

    #[test]
    fn test_reset_removes_children() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter()).expect("register failed");

        sink.set("test_level", &["name", "db"], 3.0).unwrap();
        sink.publish();
        assert!(encode(&registry).contains("group=\"db\""));

        sink.reset();
        sink.publish();
        assert!(!encode(&registry).contains("group=\"db\""));
    }

    #[test]
    fn test_staged_samples_hidden_until_publish() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter()).expect("register failed");

        sink.set("test_level", &["cgroup", "web"], 1.0).unwrap();
        sink.publish();
        sink.reset();
        sink.set("test_level", &["cgroup", "db"], 2.0).unwrap();

        let text = encode(&registry);
        assert!(text.contains("group=\"web\""));
        assert!(!text.contains("group=\"db\""));
    }

    #[test]
    fn test_duplicate_descriptors_register_once() {
        let registry = Registry::new();
        let sink = MetricSink::register(&registry, DESCS.iter().chain(DESCS.iter()))
            .expect("register failed");
        assert_eq!(sink.family_count(), 2);
    }
}
