//! Binary encoding, the inverse of [`parse`](super::parse).

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::{constants::*, messages::*};

#[derive(Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// A field that does not fit its 1-byte length prefix.
    StringTooLong(usize),
    TooManyRoads(usize),
    Io(io::ErrorKind),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::StringTooLong(len) => {
                write!(f, "string of {} bytes exceeds {}", len, MAX_FIELD_LEN)
            }
            EncodeError::TooManyRoads(len) => {
                write!(f, "{} roads exceeds {}", len, MAX_FIELD_LEN)
            }
            EncodeError::Io(kind) => write!(f, "write failed: {}", kind),
        }
    }
}

impl std::error::Error for EncodeError {}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self {
        EncodeError::Io(e.kind())
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) -> Result<(), EncodeError> {
    let bytes = s.as_bytes();
    if bytes.len() > MAX_FIELD_LEN {
        return Err(EncodeError::StringTooLong(bytes.len()));
    }
    out.write_u8(bytes.len() as u8)?;
    out.write_all(bytes)?;
    Ok(())
}

/// Encode a message into its wire form.
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut out = vec![message.tag()];

    match message {
        Message::Error(error) => write_string(&mut out, &error.msg)?,
        Message::Plate(plate) => {
            write_string(&mut out, &plate.plate)?;
            out.write_u32::<BigEndian>(plate.timestamp)?;
        }
        Message::Ticket(ticket) => {
            write_string(&mut out, &ticket.plate)?;
            out.write_u16::<BigEndian>(ticket.road)?;
            out.write_u16::<BigEndian>(ticket.mile1)?;
            out.write_u32::<BigEndian>(ticket.timestamp1)?;
            out.write_u16::<BigEndian>(ticket.mile2)?;
            out.write_u32::<BigEndian>(ticket.timestamp2)?;
            out.write_u16::<BigEndian>(ticket.speed)?;
        }
        Message::WantHeartbeat(want) => {
            out.write_u32::<BigEndian>(want.interval)?;
        }
        Message::Heartbeat => {}
        Message::IAmCamera(camera) => {
            out.write_u16::<BigEndian>(camera.road)?;
            out.write_u16::<BigEndian>(camera.mile)?;
            out.write_u16::<BigEndian>(camera.limit)?;
        }
        Message::IAmDispatcher(dispatcher) => {
            if dispatcher.roads.len() > MAX_FIELD_LEN {
                return Err(EncodeError::TooManyRoads(dispatcher.roads.len()));
            }
            out.write_u8(dispatcher.roads.len() as u8)?;
            for road in &dispatcher.roads {
                out.write_u16::<BigEndian>(*road)?;
            }
        }
    }

    Ok(out)
}
