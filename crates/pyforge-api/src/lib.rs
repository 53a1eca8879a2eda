// pyforge-api: Wire protocol and transport for the PyForge client runtime.

pub mod error;
pub mod page;
pub mod payload;
pub mod protocol;
pub mod websocket;

pub use error::Error;
pub use protocol::{MessageType, WsMessage};
pub use websocket::{DisconnectReason, SocketConfig, SocketEvent, SocketHandle};
