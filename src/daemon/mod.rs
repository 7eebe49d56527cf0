pub mod client;
pub mod db;
pub mod dispatch;
pub mod history;
pub mod protocol;
pub mod server;
pub mod session;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use client::{ClientState, ClientType, ProtocolError};
pub use db::{Observation, ViolationDetector};
pub use dispatch::{ClientId, Delivery, DispatchRegistry};
pub use history::{Reservation, TicketHistory};
pub use protocol::{Message, MessageDecoder, ParseError, encode, parse};
pub use server::{Server, State};
pub use session::handle_connection;
