//! Network surfaces: the JSON/MessagePack codec, the HTTP admin server and
//! the WebSocket streaming endpoint. Transport errors never reach the
//! subsystems; they are logged and the offending message or connection is
//! dropped.

pub mod codec;
pub mod http;
pub mod ws;

pub use codec::Codec;
pub use http::start_http_server;
pub use ws::{run_ws_server, CommandMessage, WorldUpdate};
