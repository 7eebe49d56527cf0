//! Binary protocol parsing for the speed camera protocol.
//!
//! Messages arrive on a byte stream with no framing beyond their own
//! fields: a `u8` type tag followed by big-endian integers and
//! length-prefixed strings.
//!
//! ```text
//! +--------+------------------+
//! | Type   | Message Data     |
//! | (u8)   | (variable)       |
//! +--------+------------------+
//! ```
//!
//! [`parse`] reads one message from the front of a buffer. Reads can be
//! split at any byte, so [`MessageDecoder`] buffers input and only hands
//! out a message once every field is present.
//!
//! # Error Handling
//!
//! [`ParseError::InsufficientData`] means "wait for more bytes" and never
//! leaves the decoder. Every other variant is a malformed message.

use std::io::{self, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use super::{constants::*, messages::*};

/// Errors that can occur when parsing binary protocol data.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Unknown message type byte
    InvalidMessageType(u8),
    /// Not enough bytes available to complete parsing
    InsufficientData,
    /// String contains bytes outside of ASCII
    InvalidString,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidMessageType(t) => write!(f, "invalid message type: 0x{:02x}", t),
            ParseError::InsufficientData => write!(f, "insufficient data for parsing"),
            ParseError::InvalidString => write!(f, "string is not ascii"),
        }
    }
}

impl std::error::Error for ParseError {}

fn insufficient(_: io::Error) -> ParseError {
    ParseError::InsufficientData
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, ParseError> {
    cursor.read_u8().map_err(insufficient)
}

fn read_u16_be(cursor: &mut Cursor<&[u8]>) -> Result<u16, ParseError> {
    cursor.read_u16::<BigEndian>().map_err(insufficient)
}

fn read_u32_be(cursor: &mut Cursor<&[u8]>) -> Result<u32, ParseError> {
    cursor.read_u32::<BigEndian>().map_err(insufficient)
}

/// Read a length-prefixed string: `[length: u8][data: u8; length]`.
fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, ParseError> {
    let len = read_u8(cursor)? as usize;
    let mut bytes = vec![0; len];
    cursor.read_exact(&mut bytes).map_err(insufficient)?;

    if !bytes.is_ascii() {
        return Err(ParseError::InvalidString);
    }
    String::from_utf8(bytes).map_err(|_| ParseError::InvalidString)
}

/// Parse one message from the front of `data`.
///
/// Returns the message and the number of bytes it occupied. An unknown
/// tag is reported as soon as the tag byte is available, without waiting
/// for further input.
pub fn parse(data: &[u8]) -> Result<(Message, usize), ParseError> {
    let mut cursor = Cursor::new(data);

    let message = match read_u8(&mut cursor)? {
        MSG_ERROR => parse_error(&mut cursor)?,
        MSG_PLATE => parse_plate(&mut cursor)?,
        MSG_TICKET => parse_ticket(&mut cursor)?,
        MSG_WANT_HEARTBEAT => parse_wantheartbeat(&mut cursor)?,
        MSG_HEARTBEAT => Message::Heartbeat,
        MSG_IAM_CAMERA => parse_iamcamera(&mut cursor)?,
        MSG_IAM_DISPATCHER => parse_iamdispatcher(&mut cursor)?,
        unknown => return Err(ParseError::InvalidMessageType(unknown)),
    };

    Ok((message, cursor.position() as usize))
}

fn parse_error(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let msg = read_string(cursor)?;
    Ok(Message::Error(Error { msg }))
}

fn parse_plate(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let plate = read_string(cursor)?;
    let timestamp = read_u32_be(cursor)?;

    Ok(Message::Plate(Plate { plate, timestamp }))
}

fn parse_ticket(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let plate = read_string(cursor)?;
    let road = read_u16_be(cursor)?;
    let mile1 = read_u16_be(cursor)?;
    let timestamp1 = read_u32_be(cursor)?;
    let mile2 = read_u16_be(cursor)?;
    let timestamp2 = read_u32_be(cursor)?;
    let speed = read_u16_be(cursor)?;

    Ok(Message::Ticket(Ticket {
        plate,
        road,
        mile1,
        timestamp1,
        mile2,
        timestamp2,
        speed,
    }))
}

fn parse_wantheartbeat(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let interval = read_u32_be(cursor)?;
    Ok(Message::WantHeartbeat(WantHeartbeat { interval }))
}

fn parse_iamcamera(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let road = read_u16_be(cursor)?;
    let mile = read_u16_be(cursor)?;
    let limit = read_u16_be(cursor)?;

    Ok(Message::IAmCamera(IAmCamera { road, mile, limit }))
}

fn parse_iamdispatcher(cursor: &mut Cursor<&[u8]>) -> Result<Message, ParseError> {
    let numroads = read_u8(cursor)?;
    let mut roads = Vec::with_capacity(numroads as usize);

    for _ in 0..numroads {
        roads.push(read_u16_be(cursor)?);
    }

    Ok(Message::IAmDispatcher(IAmDispatcher { roads }))
}

/// Incremental decoder over a byte stream.
///
/// Feed it whatever a read returned with [`extend`](Self::extend), then
/// call [`next_message`](Self::next_message) until it yields `None`.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buffer: Vec<u8>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete message.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn next_message(&mut self) -> Result<Option<Message>, ParseError> {
        match parse(&self.buffer) {
            Ok((message, consumed)) => {
                self.buffer.drain(..consumed);
                Ok(Some(message))
            }
            Err(ParseError::InsufficientData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
