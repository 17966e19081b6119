//! WebSocket signaling relay for two-party WebRTC rooms

mod actor;
mod hub;
mod messages;
mod registry;
mod relay;
mod server;
mod types;

pub use actor::{COMMAND_QUEUE_CAPACITY, RelayHandle};
pub use messages::{ClientMessage, ServerMessage};
pub use registry::{Departure, MAX_ROOM_MEMBERS, SessionRegistry};
pub use relay::Relay;
pub use server::SignalingServer;
pub use types::{ConnId, OutboundMessage, RoomId, SignalingError};
