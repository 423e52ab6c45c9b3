//! Which MQTT topics an ear subscribes to.

use serde::Serialize;

use crate::config::TrackingConfig;
use crate::message::{encode_topic, SERIAL_TYPE_ALIASES};

/// JSON message types published by atomic transactive nodes.
pub const ATN_JSON_TYPE_ALIASES: &[&str] = &[
    "gt.dispatch.boolean.100",
    "gt.sh.cli.atn.cmd.110",
    "gt.telemetry.110",
];

/// JSON message types published by SCADAs.
pub const SCADA_JSON_TYPE_ALIASES: &[&str] = &[
    "snapshot.spaceheat.100",
    "gs.pwr.100",
    "gt.sh.status.110",
];

/// Message types published by local sensors.
pub const LOCAL_SENSOR_TYPE_ALIASES: &[&str] = &["gt.telemetry.110"];

/// MQTT quality of service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible.
    AtLeastOnce,
    /// Exactly once delivery.
    ExactlyOnce,
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => Self::AtMostOnce,
            Qos::AtLeastOnce => Self::AtLeastOnce,
            Qos::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// A single topic subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Encoded MQTT topic.
    pub topic: String,
    /// Requested quality of service.
    pub qos: Qos,
}

/// All GridWorks topics (unencoded) the ear recognizes.
///
/// Duplicates are dropped, keeping the first occurrence.
#[must_use]
pub fn recognized_topics(tracking: &TrackingConfig) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    let mut push = |topic: String| {
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    };

    for alias in &tracking.atn_aliases {
        for kind in ATN_JSON_TYPE_ALIASES.iter().chain(SERIAL_TYPE_ALIASES) {
            push(format!("gw/{alias}/{kind}"));
        }
    }
    for alias in &tracking.scada_aliases {
        for kind in SCADA_JSON_TYPE_ALIASES.iter().chain(SERIAL_TYPE_ALIASES) {
            push(format!("gw/{alias}/{kind}"));
        }
    }
    for alias in &tracking.local_sensor_aliases {
        for kind in LOCAL_SENSOR_TYPE_ALIASES {
            push(format!("{alias}/{kind}"));
        }
    }

    topics
}

/// Encoded subscriptions for every recognized topic, at least once.
#[must_use]
pub fn subscriptions(tracking: &TrackingConfig) -> Vec<Subscription> {
    recognized_topics(tracking)
        .iter()
        .map(|topic| Subscription {
            topic: encode_topic(topic),
            qos: Qos::AtLeastOnce,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking() -> TrackingConfig {
        TrackingConfig {
            atn_aliases: vec!["hw1.isone.ct.orange1".to_string()],
            scada_aliases: vec!["hw1.isone.ct.orange1.ta.scada".to_string()],
            local_sensor_aliases: vec!["a.tank.temp0".to_string()],
        }
    }

    #[test]
    fn test_empty_tracking_has_no_topics() {
        assert!(recognized_topics(&TrackingConfig::default()).is_empty());
    }

    #[test]
    fn test_recognized_topics() {
        let topics = recognized_topics(&tracking());
        // 4 ATN types, 3 SCADA types (gs.pwr.100 listed twice), 1 sensor type
        assert_eq!(topics.len(), 8);
        assert!(topics.contains(&"gw/hw1.isone.ct.orange1/gt.dispatch.boolean.100".to_string()));
        assert!(topics.contains(&"gw/hw1.isone.ct.orange1/gs.pwr.100".to_string()));
        assert!(topics
            .contains(&"gw/hw1.isone.ct.orange1.ta.scada/snapshot.spaceheat.100".to_string()));
        assert!(topics.contains(&"a.tank.temp0/gt.telemetry.110".to_string()));
    }

    #[test]
    fn test_topics_are_deduplicated() {
        let topics = recognized_topics(&tracking());
        let scada_pwr = topics
            .iter()
            .filter(|t| t.as_str() == "gw/hw1.isone.ct.orange1.ta.scada/gs.pwr.100")
            .count();
        assert_eq!(scada_pwr, 1);
    }

    #[test]
    fn test_subscriptions_are_encoded() {
        let subs = subscriptions(&tracking());
        assert_eq!(subs.len(), 8);
        assert!(subs.iter().all(|s| !s.topic.contains('.')));
        assert!(subs.iter().all(|s| s.qos == Qos::AtLeastOnce));
        assert_eq!(subs[0].topic, "gw/hw1-isone-ct-orange1/gt-dispatch-boolean-100");
    }

    #[test]
    fn test_qos_conversion() {
        assert_eq!(rumqttc::QoS::from(Qos::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
        assert_eq!(rumqttc::QoS::from(Qos::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(rumqttc::QoS::from(Qos::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }
}
