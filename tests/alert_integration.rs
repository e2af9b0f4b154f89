//! Alert Integration Tests
//!
//! Subscribers imported into a sled registry, alerted over several rounds
//! so the cooldown written back to the registry gates the next round.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hailcast::alerts::{AlertMessage, DispatchError, Notifier, ProximityAlerter};
use hailcast::config::AlertConfig;
use hailcast::storage::{SledRegistry, SubscriberRegistry};
use hailcast::types::{Device, LastAlert, SeverityTier, StormCell};
use std::sync::Mutex;
use tempfile::tempdir;

/// Records every delivery; endpoints starting with `dead:` fail.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, AlertMessage)>>,
}

impl RecordingNotifier {
    fn take(&self) -> Vec<(String, AlertMessage)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, device: &Device, message: &AlertMessage) -> Result<(), DispatchError> {
        if device.endpoint.starts_with("dead:") {
            return Err(DispatchError::InvalidEndpoint(device.endpoint.clone()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((device.endpoint.clone(), message.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

const SUBSCRIBERS: &str = r#"[
  {"id": "near", "location": {"lat": -34.65, "lon": -68.0},
   "devices": [{"endpoint": "https://push.example/near"}, {"endpoint": "dead:near-old-phone"}]},
  {"id": "far", "location": {"lat": -35.5, "lon": -68.0},
   "devices": [{"endpoint": "https://push.example/far"}]},
  {"id": "recent", "location": {"lat": -34.62, "lon": -68.02}, "last_alert": "2026-01-25 11:55:00",
   "devices": [{"endpoint": "https://push.example/recent"}]},
  {"id": "nowhere", "devices": [{"endpoint": "https://push.example/nowhere"}]},
  {"id": "garbled", "location": {"lat": -34.58, "lon": -67.98}, "last_alert": "yesterday-ish",
   "devices": [{"endpoint": "https://push.example/garbled"}]},
  {"id": "unreachable", "location": {"lat": -34.6, "lon": -68.01},
   "devices": [{"endpoint": "dead:only-device"}]}
]"#;

fn hail_cell() -> StormCell {
    StormCell {
        lat: -34.6,
        lon: -68.0,
        max_dbz: 61.0,
        severity: SeverityTier::ProbableHail,
        area_px: 42,
    }
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 25, h, m, 0).unwrap()
}

fn endpoints(sent: &[(String, AlertMessage)]) -> Vec<&str> {
    let mut e: Vec<&str> = sent.iter().map(|(endpoint, _)| endpoint.as_str()).collect();
    e.sort_unstable();
    e
}

#[tokio::test]
async fn cooldown_persists_across_rounds() {
    let dir = tempdir().unwrap();
    let seed = dir.path().join("subscribers.json");
    std::fs::write(&seed, SUBSCRIBERS).unwrap();

    let registry = SledRegistry::open(dir.path().join("subscribers.db")).unwrap();
    assert_eq!(registry.import_json(&seed).unwrap(), 6);

    let notifier = std::sync::Arc::new(RecordingNotifier::default());
    let config = AlertConfig::default();
    let alerter = ProximityAlerter::new(&config, notifier.clone());
    let cells = [hail_cell()];

    // 12:00 "recent" was alerted at 11:55, "unreachable" has no working device
    let sent = alerter.check(&cells, &registry, at(12, 0)).await.unwrap();
    assert_eq!(sent, 2);
    let delivered = notifier.take();
    assert_eq!(
        endpoints(&delivered),
        vec!["https://push.example/garbled", "https://push.example/near"]
    );
    assert_eq!(registry.get("near").unwrap().unwrap().last_alert_at(), LastAlert::At(at(12, 0)));
    assert_eq!(registry.get("unreachable").unwrap().unwrap().last_alert_at(), LastAlert::Never);

    // 12:05 the 11:55 alert is exactly one cooldown old
    let sent = alerter.check(&cells, &registry, at(12, 5)).await.unwrap();
    assert_eq!(sent, 1);
    assert_eq!(endpoints(&notifier.take()), vec!["https://push.example/recent"]);

    // 12:16 everyone nearby is eligible again
    let sent = alerter.check(&cells, &registry, at(12, 16)).await.unwrap();
    assert_eq!(sent, 3);
    assert_eq!(notifier.take().len(), 3);

    let far = registry.get("far").unwrap().unwrap();
    assert_eq!(far.last_alert_at(), LastAlert::Never);
}

#[tokio::test]
async fn alert_payload_describes_the_nearest_cell() {
    let dir = tempdir().unwrap();
    let registry = SledRegistry::open(dir.path().join("subscribers.db")).unwrap();
    let seed = dir.path().join("subscribers.json");
    std::fs::write(&seed, SUBSCRIBERS).unwrap();
    registry.import_json(&seed).unwrap();

    let notifier = std::sync::Arc::new(RecordingNotifier::default());
    let alerter = ProximityAlerter::new(&AlertConfig::default(), notifier.clone());
    let weak = StormCell {
        lat: -34.9,
        lon: -68.0,
        max_dbz: 51.0,
        severity: SeverityTier::Storm,
        area_px: 5,
    };
    alerter
        .check(&[weak, hail_cell()], &registry, at(12, 0))
        .await
        .unwrap();

    let delivered = notifier.take();
    let (_, message) = delivered
        .iter()
        .find(|(endpoint, _)| endpoint.ends_with("/near"))
        .unwrap();
    assert_eq!(message.data["subscriber_id"], "near");
    assert_eq!(message.data["cell"]["type"], serde_json::json!(SeverityTier::ProbableHail));
    let distance = message.data["distance_km"].as_f64().unwrap();
    assert!((distance - 5.56).abs() < 0.05, "distance {distance}");
    assert!(message.body.contains("61 dBZ"));
}

#[tokio::test]
async fn no_cells_leaves_registry_untouched() {
    let dir = tempdir().unwrap();
    let registry = SledRegistry::open(dir.path().join("subscribers.db")).unwrap();
    let seed = dir.path().join("subscribers.json");
    std::fs::write(&seed, SUBSCRIBERS).unwrap();
    registry.import_json(&seed).unwrap();
    let before = registry.list().unwrap();

    let notifier = std::sync::Arc::new(RecordingNotifier::default());
    let alerter = ProximityAlerter::new(&AlertConfig::default(), notifier.clone());
    assert_eq!(alerter.check(&[], &registry, at(12, 0)).await.unwrap(), 0);

    assert!(notifier.take().is_empty());
    assert_eq!(registry.list().unwrap(), before);
}
