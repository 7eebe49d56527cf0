//! Typed protocol messages.

use super::constants::*;

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Message {
    Error(Error),
    Plate(Plate),
    Ticket(Ticket),
    WantHeartbeat(WantHeartbeat),
    Heartbeat,
    IAmCamera(IAmCamera),
    IAmDispatcher(IAmDispatcher),
}

impl Message {
    /// The wire tag this message is encoded with.
    pub fn tag(&self) -> u8 {
        match self {
            Message::Error(_) => MSG_ERROR,
            Message::Plate(_) => MSG_PLATE,
            Message::Ticket(_) => MSG_TICKET,
            Message::WantHeartbeat(_) => MSG_WANT_HEARTBEAT,
            Message::Heartbeat => MSG_HEARTBEAT,
            Message::IAmCamera(_) => MSG_IAM_CAMERA,
            Message::IAmDispatcher(_) => MSG_IAM_DISPATCHER,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Message::Error(Error { msg: msg.into() })
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Error {
    pub msg: String,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Plate {
    pub plate: String,
    pub timestamp: u32,
}

/// An average speed violation.
///
/// `timestamp1 <= timestamp2`, and `mile1`/`mile2` belong to the
/// earlier and later observation respectively. `speed` is in
/// hundredths of a mile per hour.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Ticket {
    pub plate: String,
    pub road: u16,
    pub mile1: u16,
    pub timestamp1: u32,
    pub mile2: u16,
    pub timestamp2: u32,
    pub speed: u16,
}

/// Heartbeat request; `interval` is in deciseconds, 0 disables.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct WantHeartbeat {
    pub interval: u32,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct IAmCamera {
    pub road: u16,
    pub mile: u16,
    pub limit: u16,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct IAmDispatcher {
    pub roads: Vec<u16>,
}
