//! Message type tags for the speed camera protocol.
//!
//! Every message starts with one of these bytes. The tag alone decides
//! which fields follow, so there is no overall length prefix.

/// Protocol violation report (Server->Client)
pub const MSG_ERROR: u8 = 0x10;

/// Number plate observation (Client->Server)
pub const MSG_PLATE: u8 = 0x20;

/// Average speed violation ticket (Server->Client)
pub const MSG_TICKET: u8 = 0x21;

/// Heartbeat request (Client->Server)
pub const MSG_WANT_HEARTBEAT: u8 = 0x40;

/// Heartbeat (Server->Client)
pub const MSG_HEARTBEAT: u8 = 0x41;

/// Camera identification (Client->Server)
pub const MSG_IAM_CAMERA: u8 = 0x80;

/// Dispatcher identification (Client->Server)
pub const MSG_IAM_DISPATCHER: u8 = 0x81;

/// Longest string or road list a 1-byte length prefix can describe.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;
