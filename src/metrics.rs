//! Prometheus counters for presence and routing, exposed on `/metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub online_sessions: IntGauge,
    pub admissions: IntCounterVec,
    pub messages_routed: IntCounterVec,
    pub deliveries_dropped: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let online_sessions =
            IntGauge::new("rtchat_online_sessions", "Sessions currently in the presence registry")?;
        let admissions = IntCounterVec::new(
            Opts::new("rtchat_admissions_total", "Admission attempts by outcome"),
            &["outcome"],
        )?;
        let messages_routed = IntCounterVec::new(
            Opts::new("rtchat_messages_routed_total", "Inbound messages routed by kind"),
            &["kind"],
        )?;
        let deliveries_dropped = IntCounter::new(
            "rtchat_deliveries_dropped_total",
            "Frames dropped because a connection queue was full or closed",
        )?;

        registry.register(Box::new(online_sessions.clone()))?;
        registry.register(Box::new(admissions.clone()))?;
        registry.register(Box::new(messages_routed.clone()))?;
        registry.register(Box::new(deliveries_dropped.clone()))?;

        Ok(Self {
            registry,
            online_sessions,
            admissions,
            messages_routed,
            deliveries_dropped,
        })
    }

    pub fn record_drops(&self, dropped: usize) {
        if dropped > 0 {
            self.deliveries_dropped.inc_by(dropped as u64);
        }
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::error!("encode metrics: {:?}", e);
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_series() {
        let metrics = Metrics::new().unwrap();
        metrics.online_sessions.set(2);
        metrics.admissions.with_label_values(&["rejected"]).inc();
        metrics.record_drops(3);

        let text = metrics.render();
        assert!(text.contains("rtchat_online_sessions 2"));
        assert!(text.contains("rtchat_admissions_total{outcome=\"rejected\"} 1"));
        assert!(text.contains("rtchat_deliveries_dropped_total 3"));
    }
}
