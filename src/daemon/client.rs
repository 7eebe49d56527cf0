//! Client role tracking for the speed camera protocol.
//!
//! A connection starts out unidentified and becomes a camera or a
//! dispatcher exactly once. [`ClientState::handle`] validates every
//! incoming message against the current role and tells the session what
//! to do with it.

use std::time::Duration;

use super::protocol::{IAmCamera, Message};

/// Roles a client can take on for the lifetime of its connection.
#[derive(PartialEq, Debug, Clone)]
pub enum ClientType {
    /// Not yet identified
    Unidentified,
    /// Camera client that reports plate observations
    Camera(IAmCamera),
    /// Dispatcher client that receives tickets for specific roads
    Dispatcher { roads: Vec<u16> },
}

/// Protocol sequencing violations. All of them end the connection.
#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    NotIdentified,
    NotACamera,
    AlreadyIdentified,
    DuplicateHeartbeatRequest,
    /// A server-to-client message arrived from a client.
    UnexpectedMessage(u8),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::NotIdentified => write!(f, "client is not identified"),
            ProtocolError::NotACamera => write!(f, "client is not a camera"),
            ProtocolError::AlreadyIdentified => write!(f, "client already identified"),
            ProtocolError::DuplicateHeartbeatRequest => write!(f, "heartbeat already requested"),
            ProtocolError::UnexpectedMessage(tag) => {
                write!(f, "unexpected message type: 0x{:02x}", tag)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// What the session must do after a message was accepted.
#[derive(Debug, PartialEq)]
pub enum Action {
    /// A plate was seen by this camera.
    Observe {
        camera: IAmCamera,
        plate: String,
        timestamp: u32,
    },
    CameraIdentified(IAmCamera),
    /// Register with the dispatch registry for these roads.
    DispatcherIdentified(Vec<u16>),
    /// Start emitting heartbeats; `None` means the client asked for none.
    Heartbeat(Option<Duration>),
}

/// Tracks the current state of a client connection.
#[derive(Debug)]
pub struct ClientState {
    pub client_type: ClientType,
    /// Whether client has requested heartbeats
    pub has_heartbeat: bool,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    /// Create a new unidentified client state.
    pub fn new() -> Self {
        Self {
            client_type: ClientType::Unidentified,
            has_heartbeat: false,
        }
    }

    /// Check if the client has identified itself.
    pub fn is_identified(&self) -> bool {
        self.client_type != ClientType::Unidentified
    }

    /// Apply one incoming message, transitioning the role if it identifies
    /// the client.
    pub fn handle(&mut self, message: Message) -> Result<Action, ProtocolError> {
        match message {
            Message::IAmCamera(camera) => {
                self.identify(ClientType::Camera(camera))?;
                Ok(Action::CameraIdentified(camera))
            }
            Message::IAmDispatcher(dispatcher) => {
                self.identify(ClientType::Dispatcher {
                    roads: dispatcher.roads.clone(),
                })?;
                Ok(Action::DispatcherIdentified(dispatcher.roads))
            }
            Message::Plate(plate) => match self.client_type {
                ClientType::Camera(camera) => Ok(Action::Observe {
                    camera,
                    plate: plate.plate,
                    timestamp: plate.timestamp,
                }),
                ClientType::Unidentified => Err(ProtocolError::NotIdentified),
                ClientType::Dispatcher { .. } => Err(ProtocolError::NotACamera),
            },
            Message::WantHeartbeat(want) => {
                if self.has_heartbeat {
                    return Err(ProtocolError::DuplicateHeartbeatRequest);
                }
                self.has_heartbeat = true;

                let period = (want.interval > 0)
                    .then(|| Duration::from_millis(u64::from(want.interval) * 100));
                Ok(Action::Heartbeat(period))
            }
            other @ (Message::Error(_) | Message::Ticket(_) | Message::Heartbeat) => {
                Err(ProtocolError::UnexpectedMessage(other.tag()))
            }
        }
    }

    fn identify(&mut self, client_type: ClientType) -> Result<(), ProtocolError> {
        if self.is_identified() {
            return Err(ProtocolError::AlreadyIdentified);
        }
        self.client_type = client_type;
        Ok(())
    }
}
