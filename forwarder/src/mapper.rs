//! Event to envelope conversion
//!
//! Only heartbeats are forwarded. Each heartbeat becomes one gauge envelope
//! carrying every metric of the heartbeat, tagged with the instance identity.

use crate::error::ConvertError;
use crate::proto::definitions::{event, Event, Heartbeat};
use crate::proto::loggregator_v2::{envelope, value, Envelope, Gauge, GaugeValue, Value};
use std::collections::HashMap;

/// Value of the `origin` tag on every forwarded envelope
pub const ORIGIN: &str = "bosh-system-metrics-forwarder";

/// Converts upstream events into downstream envelopes
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    ip_tag: Option<String>,
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapper that adds an `ip` tag with the given value
    pub fn with_ip_tag(ip: impl Into<String>) -> Self {
        Self {
            ip_tag: Some(ip.into()),
        }
    }

    /// Convert one event
    pub fn map(&self, event: &Event) -> Result<Envelope, ConvertError> {
        match &event.message {
            Some(event::Message::Heartbeat(heartbeat)) => Ok(self.map_heartbeat(event, heartbeat)),
            Some(event::Message::Alert(_)) => Err(ConvertError::UnsupportedEvent("alert")),
            None => Err(ConvertError::UnsupportedEvent("empty")),
        }
    }

    fn map_heartbeat(&self, event: &Event, heartbeat: &Heartbeat) -> Envelope {
        let metrics = heartbeat
            .metrics
            .iter()
            .map(|metric| {
                (
                    metric.name.clone(),
                    GaugeValue {
                        unit: unit_for(&metric.name).to_string(),
                        value: metric.value,
                    },
                )
            })
            .collect();

        let mut tags = HashMap::with_capacity(6);
        tags.insert("job".to_string(), text(&heartbeat.job));
        tags.insert("index".to_string(), text(&heartbeat.instance_id));
        tags.insert("id".to_string(), text(&heartbeat.instance_id));
        tags.insert("origin".to_string(), text(ORIGIN));
        tags.insert("deployment".to_string(), text(&event.deployment));
        if let Some(ip) = &self.ip_tag {
            tags.insert("ip".to_string(), text(ip));
        }

        Envelope {
            timestamp: event.timestamp,
            source_id: String::new(),
            tags,
            message: Some(envelope::Message::Gauge(Gauge { metrics })),
        }
    }
}

fn text(s: &str) -> Value {
    Value {
        data: Some(value::Data::Text(s.to_string())),
    }
}

/// Unit for a heartbeat metric name; unknown metrics have no unit
pub fn unit_for(name: &str) -> &'static str {
    match name {
        "system.healthy" => "b",
        "system.load.1m" | "system.cpu.user" | "system.cpu.sys" | "system.cpu.wait" => "Load",
        "system.disk.system.percent"
        | "system.disk.system.inode_percent"
        | "system.disk.ephemeral.percent"
        | "system.disk.ephemeral.inode_percent"
        | "system.disk.persistent.percent"
        | "system.disk.persistent.inode_percent"
        | "system.mem.percent"
        | "system.swap.percent" => "Percent",
        "system.mem.kb" | "system.swap.kb" => "Kb",
        _ => "",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::proto::definitions::heartbeat::Metric;
    use crate::proto::definitions::Alert;

    const INSTANCE_ID: &str = "6f60a3ce-9e4d-477f-ba45-7d29bcfab5b9";

    fn metric(name: &str, value: f64) -> Metric {
        Metric {
            name: name.to_string(),
            value,
            timestamp: 1499293724,
            tags: HashMap::new(),
        }
    }

    fn heartbeat_event(metrics: Vec<Metric>) -> Event {
        Event {
            id: "55b68400-f984-4f76-b341-cf849e07d4f9".to_string(),
            timestamp: 1499293724,
            deployment: "loggregator".to_string(),
            message: Some(event::Message::Heartbeat(Heartbeat {
                agent_id: "2accd102-37e7-4dd6-b337-b3f87da97914".to_string(),
                job: "consul".to_string(),
                index: 4,
                instance_id: INSTANCE_ID.to_string(),
                job_state: "running".to_string(),
                metrics,
            })),
        }
    }

    fn tag(envelope: &Envelope, key: &str) -> Option<String> {
        match envelope.tags.get(key)?.data.as_ref()? {
            value::Data::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn gauge(envelope: &Envelope) -> &HashMap<String, GaugeValue> {
        match envelope.message.as_ref().unwrap() {
            envelope::Message::Gauge(g) => &g.metrics,
        }
    }

    #[test]
    fn test_map_heartbeat() {
        let event = heartbeat_event(vec![metric("system.healthy", 1.0)]);
        let envelope = Mapper::new().map(&event).unwrap();

        assert_eq!(envelope.timestamp, 1499293724);
        assert_eq!(envelope.tags.len(), 5);
        assert_eq!(tag(&envelope, "deployment").as_deref(), Some("loggregator"));
        assert_eq!(tag(&envelope, "job").as_deref(), Some("consul"));
        assert_eq!(tag(&envelope, "id").as_deref(), Some(INSTANCE_ID));
        assert_eq!(tag(&envelope, "index").as_deref(), Some(INSTANCE_ID));
        assert_eq!(tag(&envelope, "origin").as_deref(), Some(ORIGIN));
        assert!(tag(&envelope, "ip").is_none());

        let metrics = gauge(&envelope);
        assert_eq!(metrics.len(), 1);
        assert_eq!(
            metrics["system.healthy"],
            GaugeValue {
                unit: "b".to_string(),
                value: 1.0
            }
        );
    }

    #[test]
    fn test_map_full_heartbeat_units() {
        let names = [
            ("system.load.1m", 0.18, "Load"),
            ("system.cpu.user", 2.5, "Load"),
            ("system.cpu.sys", 3.2, "Load"),
            ("system.cpu.wait", 0.0, "Load"),
            ("system.mem.percent", 28.0, "Percent"),
            ("system.mem.kb", 1139140.0, "Kb"),
            ("system.swap.percent", 0.0, "Percent"),
            ("system.swap.kb", 9788.0, "Kb"),
            ("system.disk.system.percent", 23.0, "Percent"),
            ("system.disk.system.inode_percent", 14.0, "Percent"),
            ("system.disk.ephemeral.percent", 4.0, "Percent"),
            ("system.disk.ephemeral.inode_percent", 2.0, "Percent"),
            ("system.disk.persistent.percent", 4.0, "Percent"),
            ("system.disk.persistent.inode_percent", 2.0, "Percent"),
            ("system.healthy", 1.0, "b"),
            ("system.something.new", 7.0, ""),
        ];
        let event = heartbeat_event(names.iter().map(|(n, v, _)| metric(n, *v)).collect());

        let envelope = Mapper::new().map(&event).unwrap();
        let metrics = gauge(&envelope);

        assert_eq!(metrics.len(), names.len());
        for (name, value, unit) in names {
            let got = &metrics[name];
            assert_eq!(got.unit, unit, "unit for {name}");
            assert_eq!(got.value, value, "value for {name}");
        }
    }

    #[test]
    fn test_ip_tag_override() {
        let event = heartbeat_event(vec![metric("system.healthy", 1.0)]);
        let envelope = Mapper::with_ip_tag("10.0.16.7").map(&event).unwrap();

        assert_eq!(tag(&envelope, "ip").as_deref(), Some("10.0.16.7"));
        assert_eq!(envelope.tags.len(), 6);
    }

    #[test]
    fn test_alert_is_not_supported() {
        let event = Event {
            id: "93eaa9b6-4a4a-4a5b-9a1e-0bb9e2d8f5c4".to_string(),
            timestamp: 1499359162,
            deployment: "loggregator".to_string(),
            message: Some(event::Message::Alert(Alert {
                severity: 4,
                category: "".to_string(),
                title: "SSH Logout".to_string(),
                summary: "user logged out".to_string(),
                source: "loggregator: consul(6f60a3ce)".to_string(),
                created_at: 1499359162,
            })),
        };

        let err = Mapper::new().map(&event).unwrap_err();
        assert_eq!(err, ConvertError::UnsupportedEvent("alert"));
    }

    #[test]
    fn test_empty_event_is_not_supported() {
        let err = Mapper::new().map(&Event::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedEvent(_)));
    }
}
