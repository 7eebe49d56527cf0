mod constants;
mod encoding;
mod messages;
mod parsing;

pub use constants::*;
pub use encoding::{EncodeError, encode};
pub use messages::*;
pub use parsing::{MessageDecoder, ParseError, parse};
