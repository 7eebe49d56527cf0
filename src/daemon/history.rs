//! Per-plate record of the days already covered by an issued ticket.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

pub const SECONDS_PER_DAY: u32 = 86400;

/// Day index of a unix timestamp.
pub fn day_of(timestamp: u32) -> u32 {
    timestamp / SECONDS_PER_DAY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    Denied,
}

/// At most one ticket per plate per day.
#[derive(Debug, Default)]
pub struct TicketHistory {
    days: Mutex<HashMap<String, HashSet<u32>>>,
}

impl TicketHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve every day from `day1` to `day2` for `plate`.
    ///
    /// Denied if any day in the span already has a ticket; nothing is
    /// recorded in that case. Check and insert happen under one lock.
    pub async fn try_reserve(&self, plate: &str, day1: u32, day2: u32) -> Reservation {
        let (first, last) = (day1.min(day2), day1.max(day2));

        let mut days = self.days.lock().await;
        let issued = days.entry(plate.to_string()).or_default();

        if (first..=last).any(|day| issued.contains(&day)) {
            return Reservation::Denied;
        }
        issued.extend(first..=last);
        Reservation::Granted
    }

    /// Whether `plate` already has a ticket covering `day`.
    #[cfg(test)]
    pub(crate) async fn is_reserved(&self, plate: &str, day: u32) -> bool {
        let days = self.days.lock().await;
        days.get(plate).is_some_and(|issued| issued.contains(&day))
    }
}
