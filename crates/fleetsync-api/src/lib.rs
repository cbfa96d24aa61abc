// fleetsync-api: wire protocol and transports for the fleet synchronization client

pub mod error;
pub mod protocol;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use protocol::{
    CommandRequest, CommandResponse, EventCategory, InboundMessage, OutboundMessage, Priority,
};
pub use rest::RestClient;
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{Channel, Connector, FrameSink, FrameStream, WebSocketConnector};
