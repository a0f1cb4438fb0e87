/// Real-time notification push
///
/// Architecture:
/// 1. messages: STOMP frame codec
/// 2. transport: WebSocket connection, STOMP handshake and subscription
/// 3. manager: connection state machine with fixed-delay reconnection
pub mod manager;
pub mod messages;
pub mod transport;

pub use manager::{ConnectionManager, ConnectionState};
pub use messages::{FrameError, StompCommand, StompFrame};
pub use transport::{PushChannel, PushTransport, StompTransport};
