use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::net::{TcpListener, ToSocketAddrs};

use super::db::{Observation, ViolationDetector};
use super::dispatch::{ClientId, DispatchRegistry};
use super::history::TicketHistory;
use super::session::handle_connection;

/// Everything the connections share.
#[derive(Debug, Default)]
pub struct State {
    pub detector: ViolationDetector,
    pub history: TicketHistory,
    pub registry: DispatchRegistry,
    next_id: AtomicU32,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_client_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store a camera observation and route any ticket it produces.
    /// Returns the number of tickets issued.
    pub async fn record_observation(&self, observation: Observation, limit: u16) -> usize {
        self.detector
            .record(observation, limit, &self.history, &self.registry)
            .await
            .len()
    }
}

pub struct Server {
    listener: TcpListener,
    state: Arc<State>,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind listener")?;

        Ok(Self {
            listener,
            state: Arc::new(State::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task each.
    pub async fn run(self) -> Result<()> {
        loop {
            let (client, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let id = self.state.next_client_id();
            info!("client {} connected from {}", id, addr);

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(client, id, state).await {
                    warn!("client {} connection error: {:#}", id, e);
                }
                info!("client {} disconnected", id);
            });
        }
    }
}
