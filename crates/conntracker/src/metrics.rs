//! Prometheus metrics for conntracker

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters for flow and footprint events
#[derive(Clone)]
pub struct MetricsCollector {
    pub flows_inserted_total: IntCounter,
    pub flows_promoted_total: IntCounter,
    pub flow_duplicates_total: IntCounter,
    pub footprints_attached_total: IntCounter,
    pub orphan_footprints_total: IntCounter,
    pub rejected_events_total: IntCounter,

    /// Records currently held across all six tables
    pub flows: IntGauge,

    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let flows_inserted_total = IntCounter::with_opts(Opts::new(
            "conntracker_flows_inserted_total",
            "Total number of flow records created",
        ))?;
        registry.register(Box::new(flows_inserted_total.clone()))?;

        let flows_promoted_total = IntCounter::with_opts(Opts::new(
            "conntracker_flows_promoted_total",
            "Total number of unconfirmed flows promoted to confirmed",
        ))?;
        registry.register(Box::new(flows_promoted_total.clone()))?;

        let flow_duplicates_total = IntCounter::with_opts(Opts::new(
            "conntracker_flow_duplicates_total",
            "Total number of flow observations already recorded",
        ))?;
        registry.register(Box::new(flow_duplicates_total.clone()))?;

        let footprints_attached_total = IntCounter::with_opts(Opts::new(
            "conntracker_footprints_attached_total",
            "Total number of footprints appended to a flow trace",
        ))?;
        registry.register(Box::new(footprints_attached_total.clone()))?;

        let orphan_footprints_total = IntCounter::with_opts(Opts::new(
            "conntracker_orphan_footprints_total",
            "Total number of footprints dropped for lack of a matching flow",
        ))?;
        registry.register(Box::new(orphan_footprints_total.clone()))?;

        let rejected_events_total = IntCounter::with_opts(Opts::new(
            "conntracker_rejected_events_total",
            "Total number of events rejected for a family or key mismatch",
        ))?;
        registry.register(Box::new(rejected_events_total.clone()))?;

        let flows = IntGauge::with_opts(Opts::new(
            "conntracker_flows",
            "Current number of flow records",
        ))?;
        registry.register(Box::new(flows.clone()))?;

        Ok(Self {
            flows_inserted_total,
            flows_promoted_total,
            flow_duplicates_total,
            footprints_attached_total,
            orphan_footprints_total,
            rejected_events_total,
            flows,
            registry: Arc::new(registry),
        })
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = MetricsCollector::new().unwrap();
        assert_eq!(metrics.flows_inserted_total.get(), 0);
        assert_eq!(metrics.orphan_footprints_total.get(), 0);
        assert_eq!(metrics.flows.get(), 0);
    }

    #[test]
    fn test_encode_text() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.orphan_footprints_total.inc();
        metrics.flows.set(3);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("conntracker_orphan_footprints_total 1"));
        assert!(text.contains("conntracker_flows 3"));
    }

    #[test]
    fn test_collectors_are_independent() {
        let one = MetricsCollector::new().unwrap();
        let two = MetricsCollector::new().unwrap();
        one.flows_inserted_total.inc();
        assert_eq!(two.flows_inserted_total.get(), 0);
    }
}
