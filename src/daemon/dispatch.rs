//! Routes tickets to dispatchers, holding them per road until one is
//! connected.

use std::collections::{HashMap, VecDeque};

use log::{debug, warn};
use tokio::sync::{Mutex, mpsc};

use super::protocol::{Message, Ticket};

pub type ClientId = u32;

/// Outbound message queue of one connection.
pub type Outbox = mpsc::UnboundedSender<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered(ClientId),
    Queued,
}

#[derive(Debug)]
struct Dispatcher {
    roads: Vec<u16>,
    outbox: Outbox,
}

#[derive(Debug, Default)]
struct Registry {
    dispatchers: HashMap<ClientId, Dispatcher>,
    /// Dispatcher ids per road, in registration order.
    roads: HashMap<u16, Vec<ClientId>>,
    pending: HashMap<u16, VecDeque<Ticket>>,
}

impl Registry {
    /// Hand the road's pending tickets, oldest first, to its dispatchers.
    ///
    /// Each ticket goes to the earliest-registered dispatcher whose outbox
    /// is still open. Stops at the first ticket nobody can take. Returns
    /// the last dispatcher that received one.
    fn drain(&mut self, road: u16) -> Option<ClientId> {
        let queue = self.pending.get_mut(&road)?;
        let ids = self.roads.get(&road)?;
        let mut delivered_to = None;

        'tickets: while let Some(ticket) = queue.front() {
            for id in ids {
                let Some(dispatcher) = self.dispatchers.get(id) else {
                    continue;
                };
                if dispatcher.outbox.send(Message::Ticket(ticket.clone())).is_ok() {
                    delivered_to = Some(*id);
                    queue.pop_front();
                    continue 'tickets;
                }
                warn!(
                    "dispatcher {} has gone away, ticket for {} not delivered to it",
                    id, ticket.plate
                );
            }
            break;
        }

        if queue.is_empty() {
            self.pending.remove(&road);
        }
        delivered_to
    }
}

/// Per-road dispatcher sets and pending ticket queues behind one lock.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    inner: Mutex<Registry>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add dispatcher `id` to every road in `roads` and flush whatever was
    /// waiting for those roads to it. Returns how many tickets it received.
    pub async fn register(&self, id: ClientId, roads: &[u16], outbox: Outbox) -> usize {
        let mut inner = self.inner.lock().await;

        let mut served = Vec::with_capacity(roads.len());
        for road in roads {
            if !served.contains(road) {
                served.push(*road);
            }
        }

        for road in &served {
            let ids = inner.roads.entry(*road).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        inner.dispatchers.insert(
            id,
            Dispatcher {
                roads: served.clone(),
                outbox,
            },
        );

        let mut flushed = 0;
        for road in served {
            let before = inner.pending.get(&road).map_or(0, VecDeque::len);
            inner.drain(road);
            let after = inner.pending.get(&road).map_or(0, VecDeque::len);
            flushed += before - after;
        }

        if flushed > 0 {
            debug!("flushed {} pending tickets to dispatcher {}", flushed, id);
        }
        flushed
    }

    /// Remove dispatcher `id` from every road it served.
    pub async fn unregister(&self, id: ClientId) {
        let mut inner = self.inner.lock().await;

        let Some(dispatcher) = inner.dispatchers.remove(&id) else {
            return;
        };
        for road in dispatcher.roads {
            if let Some(ids) = inner.roads.get_mut(&road) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    inner.roads.remove(&road);
                }
            }
        }
    }

    /// Send `ticket` to one dispatcher for its road, or queue it until one
    /// registers. Tickets already waiting for the road go first.
    pub async fn submit(&self, ticket: Ticket) -> Delivery {
        let mut inner = self.inner.lock().await;
        let road = ticket.road;

        inner.pending.entry(road).or_default().push_back(ticket);
        let delivered_to = inner.drain(road);

        match delivered_to {
            Some(id) if !inner.pending.contains_key(&road) => Delivery::Delivered(id),
            _ => Delivery::Queued,
        }
    }

    /// Number of tickets waiting for a dispatcher on `road`.
    #[cfg(test)]
    pub(crate) async fn pending(&self, road: u16) -> usize {
        let inner = self.inner.lock().await;
        inner.pending.get(&road).map_or(0, VecDeque::len)
    }

    /// Number of dispatchers registered for `road`.
    #[cfg(test)]
    pub(crate) async fn dispatchers(&self, road: u16) -> usize {
        let inner = self.inner.lock().await;
        inner.roads.get(&road).map_or(0, Vec::len)
    }
}
