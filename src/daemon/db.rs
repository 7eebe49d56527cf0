//! Plate observation store and average speed checks.
//!
//! Observations are kept per road and per plate in arrival order.
//! Cameras report out of order, so every new observation is compared
//! against all earlier ones for the same road and plate.

use std::collections::HashMap;

use log::{debug, info};
use tokio::sync::Mutex;

use super::dispatch::{Delivery, DispatchRegistry};
use super::history::{Reservation, TicketHistory, day_of};
use super::protocol::Ticket;

/// A plate seen by a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub plate: String,
    pub road: u16,
    pub mile: u16,
    pub timestamp: u32,
}

/// Check one pair of observations of the same plate on the same road.
///
/// Returns a ticket when the average speed between them exceeds
/// `limit + 0.5` mph. Pairs taken at the same instant have no average
/// speed and are skipped.
pub fn check_pair(a: &Observation, b: &Observation, limit: u16) -> Option<Ticket> {
    let (first, second) = if a.timestamp <= b.timestamp {
        (a, b)
    } else {
        (b, a)
    };

    let seconds = u64::from(second.timestamp - first.timestamp);
    if seconds == 0 {
        return None;
    }
    let miles = u64::from(first.mile.abs_diff(second.mile));

    // miles * 3600 / seconds > limit + 0.5, kept in integers
    if 2 * miles * 3600 <= (2 * u64::from(limit) + 1) * seconds {
        return None;
    }

    // hundredths of mph, rounded half up
    let speed = (miles * 360_000 + seconds / 2) / seconds;

    Some(Ticket {
        plate: first.plate.clone(),
        road: first.road,
        mile1: first.mile,
        timestamp1: first.timestamp,
        mile2: second.mile,
        timestamp2: second.timestamp,
        speed: u16::try_from(speed).unwrap_or(u16::MAX),
    })
}

#[derive(Debug, Default)]
pub struct ViolationDetector {
    roads: Mutex<HashMap<u16, HashMap<String, Vec<Observation>>>>,
}

impl ViolationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `observation` and issue the tickets it gives rise to.
    ///
    /// Each violating pair asks `history` for its days and granted tickets
    /// go straight to `registry`. The whole step runs under the store lock,
    /// so two observations of one plate never scan a stale list and a
    /// road's tickets reach the registry in the order they were issued.
    /// Returns the tickets issued.
    pub async fn record(
        &self,
        observation: Observation,
        limit: u16,
        history: &TicketHistory,
        registry: &DispatchRegistry,
    ) -> Vec<Ticket> {
        let mut roads = self.roads.lock().await;
        let seen = roads
            .entry(observation.road)
            .or_default()
            .entry(observation.plate.clone())
            .or_default();

        let candidates: Vec<Ticket> = seen
            .iter()
            .filter_map(|prior| check_pair(prior, &observation, limit))
            .collect();
        seen.push(observation);

        let mut issued = Vec::new();
        for ticket in candidates {
            let day1 = day_of(ticket.timestamp1);
            let day2 = day_of(ticket.timestamp2);

            if history.try_reserve(&ticket.plate, day1, day2).await == Reservation::Denied {
                debug!(
                    "{} already ticketed within days {}..={}, dropping",
                    ticket.plate, day1, day2
                );
                continue;
            }

            info!(
                "ticket for {} on road {}: {:.2} mph between {}@{} and {}@{}",
                ticket.plate,
                ticket.road,
                f64::from(ticket.speed) / 100.0,
                ticket.mile1,
                ticket.timestamp1,
                ticket.mile2,
                ticket.timestamp2
            );
            match registry.submit(ticket.clone()).await {
                Delivery::Delivered(id) => debug!("ticket sent to dispatcher {}", id),
                Delivery::Queued => {
                    debug!("no dispatcher for road {}, ticket queued", ticket.road)
                }
            }
            issued.push(ticket);
        }

        issued
    }

    #[cfg(test)]
    /// Observations of `plate` on `road`, in arrival order.
    pub(crate) async fn observations(&self, road: u16, plate: &str) -> Vec<Observation> {
        let roads = self.roads.lock().await;
        roads
            .get(&road)
            .and_then(|plates| plates.get(plate))
            .cloned()
            .unwrap_or_default()
    }
}
