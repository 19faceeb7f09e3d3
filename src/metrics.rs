//! Metric sinks fed by the poll loop
//!
//! [`PrometheusSink`] owns a private registry whose gauges hold their value
//! in a single atomic, so a scrape running alongside a poll sees each field
//! either before or after its update, never in between. [`MemorySink`]
//! records the same writes in a map for tests.

use crate::error::Result;
use crate::register_map::{MeasurementField, Metric, Phase};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::RwLock;

/// Destination for decoded measurements
pub trait MetricSink: Send + Sync {
    /// Overwrite the current value of every field
    fn publish(&self, fields: &[MeasurementField]);

    /// A poll iteration completed without error
    fn record_success(&self, at: DateTime<Utc>);

    /// Reading or decoding the named group failed
    fn record_failure(&self, group: &str);
}

/// Prometheus-backed sink
pub struct PrometheusSink {
    registry: Registry,
    phased: HashMap<Metric, GaugeVec>,
    frequency: Gauge,
    last_success: Gauge,
    poll_errors: IntCounterVec,
}

impl PrometheusSink {
    /// Create and register every exported metric under `namespace`
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new();

        let mut phased = HashMap::new();
        for metric in Metric::ALL.into_iter().filter(|m| m.is_phased()) {
            let gauge = GaugeVec::new(
                Opts::new(metric.name(), metric.help()).namespace(namespace),
                &["phase"],
            )?;
            registry.register(Box::new(gauge.clone()))?;
            phased.insert(metric, gauge);
        }

        let frequency = Gauge::with_opts(
            Opts::new(Metric::Frequency.name(), Metric::Frequency.help()).namespace(namespace),
        )?;
        registry.register(Box::new(frequency.clone()))?;

        let last_success = Gauge::with_opts(
            Opts::new(
                "last_poll_success_timestamp_seconds",
                "Unix time of the last fully successful poll",
            )
            .namespace(namespace),
        )?;
        registry.register(Box::new(last_success.clone()))?;

        let poll_errors = IntCounterVec::new(
            Opts::new("poll_errors_total", "Failed register group reads").namespace(namespace),
            &["group"],
        )?;
        registry.register(Box::new(poll_errors.clone()))?;

        Ok(Self {
            registry,
            phased,
            frequency,
            last_success,
            poll_errors,
        })
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::ExporterError::metrics(e.to_string()))
    }

    /// Content type to send with [`PrometheusSink::render`]
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl MetricSink for PrometheusSink {
    fn publish(&self, fields: &[MeasurementField]) {
        for field in fields {
            match (field.phase, self.phased.get(&field.metric)) {
                (Some(phase), Some(gauge)) => {
                    gauge.with_label_values(&[phase.label()]).set(field.value());
                }
                (None, _) if field.metric == Metric::Frequency => {
                    self.frequency.set(field.value());
                }
                _ => tracing::warn!(
                    metric = field.metric.name(),
                    "Dropping field with mismatched phase label"
                ),
            }
        }
    }

    fn record_success(&self, at: DateTime<Utc>) {
        self.last_success
            .set(at.timestamp_millis() as f64 / 1000.0);
    }

    fn record_failure(&self, group: &str) {
        self.poll_errors.with_label_values(&[group]).inc();
    }
}

/// In-memory sink, mainly for tests
#[derive(Default)]
pub struct MemorySink {
    values: RwLock<HashMap<(Metric, Option<Phase>), f64>>,
    last_success: RwLock<Option<DateTime<Utc>>>,
    failures: RwLock<HashMap<String, u64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric, phase: Option<Phase>) -> Option<f64> {
        self.values
            .read()
            .ok()
            .and_then(|v| v.get(&(metric, phase)).copied())
    }

    /// Number of distinct (metric, phase) series written so far
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success.read().ok().and_then(|t| *t)
    }

    pub fn failures(&self, group: &str) -> u64 {
        self.failures
            .read()
            .ok()
            .and_then(|f| f.get(group).copied())
            .unwrap_or(0)
    }
}

impl MetricSink for MemorySink {
    fn publish(&self, fields: &[MeasurementField]) {
        if let Ok(mut values) = self.values.write() {
            for field in fields {
                values.insert((field.metric, field.phase), field.value());
            }
        }
    }

    fn record_success(&self, at: DateTime<Utc>) {
        if let Ok(mut last) = self.last_success.write() {
            *last = Some(at);
        }
    }

    fn record_failure(&self, group: &str) {
        if let Ok(mut failures) = self.failures.write() {
            *failures.entry(group.to_string()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(metric: Metric, phase: Option<Phase>, raw: i64, divisor: u32) -> MeasurementField {
        MeasurementField {
            metric,
            phase,
            raw,
            divisor,
        }
    }

    #[test]
    fn test_prometheus_sink_renders_published_values() {
        let sink = PrometheusSink::new("em540").unwrap();
        sink.publish(&[
            field(Metric::VoltsLineNeutral, Some(Phase::L1), 2305, 10),
            field(Metric::WattHours, Some(Phase::Sys), 1_234_567, 1),
            field(Metric::Frequency, None, 50_010, 1000),
        ]);
        sink.record_failure("energy");

        let text = sink.render().unwrap();
        assert!(text.contains("em540_volts_l_n{phase=\"L1\"} 230.5"));
        assert!(text.contains("em540_wh{phase=\"sys\"} 1234567"));
        assert!(text.contains("em540_hz 50.01"));
        assert!(text.contains("em540_poll_errors_total{group=\"energy\"} 1"));
        assert!(text.contains("# HELP em540_volts_l_n Volts line to neutral"));
        assert!(sink.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_prometheus_sink_success_timestamp() {
        let sink = PrometheusSink::new("meter").unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap();
        sink.record_success(at);
        let text = sink.render().unwrap();
        assert!(text.contains("meter_last_poll_success_timestamp_seconds 1700000000.5"));
    }

    #[test]
    fn test_memory_sink_overwrites() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.publish(&[field(Metric::Amps, Some(Phase::L2), 1500, 1000)]);
        sink.publish(&[field(Metric::Amps, Some(Phase::L2), 2500, 1000)]);
        assert_eq!(sink.get(Metric::Amps, Some(Phase::L2)), Some(2.5));
        assert_eq!(sink.get(Metric::Amps, Some(Phase::L1)), None);
        assert_eq!(sink.len(), 1);

        sink.record_failure("frequency");
        sink.record_failure("frequency");
        assert_eq!(sink.failures("frequency"), 2);
        assert_eq!(sink.failures("energy"), 0);
    }
}
