//! Proximity Alerter - storm cells vs. subscriber locations
//!
//! For every subscriber with a location, the nearest cell is found by
//! great-circle distance. Subscribers inside the alert radius and outside
//! their cooldown get one message per device. The cooldown is tracked per
//! subscriber: one successful device delivery writes the last-alert time
//! once and counts the subscriber once.
//!
//! Delivery failures and cooldown write failures are logged; they never stop
//! the remaining devices or subscribers.

pub mod notifier;

pub use notifier::{AlertMessage, DispatchError, LogNotifier, Notifier};
#[cfg(feature = "webhook")]
pub use notifier::WebhookNotifier;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AlertConfig;
use crate::grid::haversine_km;
use crate::storage::{RegistryError, SubscriberRegistry};
use crate::types::{GeoPoint, LastAlert, StormCell, Subscriber};

pub struct ProximityAlerter {
    radius_km: f64,
    cooldown: chrono::Duration,
    notifier: Arc<dyn Notifier>,
}

impl ProximityAlerter {
    pub fn new(config: &AlertConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            radius_km: config.radius_km,
            cooldown: chrono::Duration::minutes(config.cooldown_minutes),
            notifier,
        }
    }

    /// Alert subscribers near `cells`. Returns the number of subscribers
    /// reached on at least one device.
    ///
    /// With no cells the registry is not read at all.
    pub async fn check(
        &self,
        cells: &[StormCell],
        registry: &dyn SubscriberRegistry,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistryError> {
        if cells.is_empty() {
            return Ok(0);
        }

        let subscribers = registry.list()?;
        let mut dispatched = 0;

        for subscriber in &subscribers {
            let Some(location) = subscriber.location else {
                continue;
            };
            if self.in_cooldown(subscriber, now) {
                debug!(subscriber = %subscriber.id, "In cooldown, skipped");
                continue;
            }
            let Some((distance_km, cell)) = nearest_cell(location, cells) else {
                continue;
            };
            if distance_km >= self.radius_km {
                continue;
            }

            let message = build_message(subscriber, cell, distance_km);
            if self.deliver_all(subscriber, &message).await == 0 {
                warn!(subscriber = %subscriber.id, "No device accepted the alert");
                continue;
            }

            dispatched += 1;
            if let Err(e) = registry.set_last_alert(&subscriber.id, now) {
                warn!(subscriber = %subscriber.id, error = %e, "Failed to record last alert time");
            }
            info!(
                subscriber = %subscriber.id,
                distance_km = %format!("{distance_km:.1}"),
                severity = %cell.severity,
                "🚨 Proximity alert sent"
            );
        }

        Ok(dispatched)
    }

    fn in_cooldown(&self, subscriber: &Subscriber, now: DateTime<Utc>) -> bool {
        match subscriber.last_alert_at() {
            LastAlert::At(at) => now - at < self.cooldown,
            LastAlert::Never | LastAlert::Unparseable => false,
        }
    }

    /// Deliver to every device; returns how many succeeded.
    async fn deliver_all(&self, subscriber: &Subscriber, message: &AlertMessage) -> usize {
        let mut delivered = 0;
        for device in &subscriber.devices {
            match self.notifier.deliver(device, message).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    subscriber = %subscriber.id,
                    endpoint = %device.endpoint,
                    notifier = self.notifier.name(),
                    error = %e,
                    "Alert delivery failed"
                ),
            }
        }
        delivered
    }
}

/// Closest cell to `point` and its distance in kilometres.
pub fn nearest_cell(point: GeoPoint, cells: &[StormCell]) -> Option<(f64, &StormCell)> {
    cells
        .iter()
        .map(|c| (haversine_km(point, c.location()), c))
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

fn build_message(subscriber: &Subscriber, cell: &StormCell, distance_km: f64) -> AlertMessage {
    AlertMessage {
        title: format!("⚠️ {} nearby", capitalize(cell.severity.label())),
        body: format!(
            "{} of {:.0} dBZ detected {:.1} km from your location.",
            capitalize(cell.severity.label()),
            cell.max_dbz,
            distance_km
        ),
        data: serde_json::json!({
            "subscriber_id": subscriber.id,
            "distance_km": distance_km,
            "cell": cell,
            "url": "/",
        }),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}
