//! Per-connection byte stream handling.
//!
//! A connection runs as two tasks: the read loop below, which decodes
//! messages and drives [`ClientState`], and a writer task that owns the
//! write half. Everything sent to the client (tickets, heartbeats,
//! errors) goes through the writer's channel, so writes never interleave.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::client::{Action, ClientState, ClientType, ProtocolError};
use super::db::Observation;
use super::dispatch::{ClientId, Outbox};
use super::protocol::{Message, MessageDecoder, encode};
use super::server::State;

/// Serve one client until it disconnects or breaks the protocol.
///
/// A protocol violation is answered with an `Error` message and is not
/// an error of this function; I/O failures are.
pub async fn handle_connection<S>(stream: S, id: ClientId, state: Arc<State>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (outbox, inbox) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_messages(writer, inbox));

    let mut session = Session::new(id, outbox, state);
    let (served, written) = tokio::select! {
        result = session.serve(&mut reader) => (result, None),
        written = &mut writer_task => (Ok(()), Some(written)),
    };
    session.close().await;

    // Once every outbox is dropped the writer flushes what is left and exits.
    let written = match written {
        Some(written) => written,
        None => writer_task.await,
    };

    served?;
    written.context("writer task failed")?
}

async fn write_messages<W>(mut writer: W, mut inbox: UnboundedReceiver<Message>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = inbox.recv().await {
        let bytes = encode(&message).with_context(|| format!("encoding {:?}", message))?;
        writer
            .write_all(&bytes)
            .await
            .with_context(|| format!("writing {:?}", message))?;
    }
    // Peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(())
}

fn spawn_heartbeat(period: Duration, outbox: Outbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if outbox.send(Message::Heartbeat).is_err() {
                break;
            }
        }
    })
}

struct Session {
    id: ClientId,
    client: ClientState,
    decoder: MessageDecoder,
    outbox: Outbox,
    state: Arc<State>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Session {
    fn new(id: ClientId, outbox: Outbox, state: Arc<State>) -> Self {
        Self {
            id,
            client: ClientState::new(),
            decoder: MessageDecoder::new(),
            outbox,
            state,
            heartbeat: None,
        }
    }

    async fn serve<R>(&mut self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 1024];

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .with_context(|| format!("reading from client {}", self.id))?;
            if n == 0 {
                debug!("client {} closed the connection", self.id);
                return Ok(());
            }
            self.decoder.extend(&buf[..n]);

            loop {
                let message = match self.decoder.next_message() {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(
                            "client {} discarding bytes {}",
                            self.id,
                            hex::encode(self.decoder.pending())
                        );
                        self.reject(format!("malformed message: {}", e));
                        return Ok(());
                    }
                };

                debug!("client {} sent {:?}", self.id, message);
                if let Err(e) = self.process(message).await {
                    self.reject(e.to_string());
                    return Ok(());
                }
            }
        }
    }

    fn reject(&self, reason: String) {
        warn!("client {} violated the protocol: {}", self.id, reason);
        let _ = self.outbox.send(Message::error(reason));
    }

    async fn process(&mut self, message: Message) -> Result<(), ProtocolError> {
        match self.client.handle(message)? {
            Action::Observe {
                camera,
                plate,
                timestamp,
            } => {
                let observation = Observation {
                    plate,
                    road: camera.road,
                    mile: camera.mile,
                    timestamp,
                };
                // Runs as its own task so a session torn down mid-record
                // cannot drop a ticket whose days are already reserved.
                let state = Arc::clone(&self.state);
                let recorded = tokio::spawn(async move {
                    state.record_observation(observation, camera.limit).await
                });
                if let Err(e) = recorded.await {
                    error!("client {} observation was not recorded: {}", self.id, e);
                }
            }
            Action::CameraIdentified(camera) => {
                info!(
                    "client {} is a camera on road {} at mile {} (limit {} mph)",
                    self.id, camera.road, camera.mile, camera.limit
                );
            }
            Action::DispatcherIdentified(roads) => {
                info!("client {} is a dispatcher for roads {:?}", self.id, roads);
                self.state
                    .registry
                    .register(self.id, &roads, self.outbox.clone())
                    .await;
            }
            Action::Heartbeat(Some(period)) => {
                debug!("client {} wants a heartbeat every {:?}", self.id, period);
                self.heartbeat = Some(spawn_heartbeat(period, self.outbox.clone()));
            }
            Action::Heartbeat(None) => {}
        }
        Ok(())
    }

    /// Stop the heartbeat and leave the registry. Consumes the session so
    /// its outbox is dropped too.
    async fn close(mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
            let _ = heartbeat.await;
        }
        if let ClientType::Dispatcher { .. } = self.client.client_type {
            self.state.registry.unregister(self.id).await;
        }
    }
}
