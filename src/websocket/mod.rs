//! WebSocket module for the HashKey BBO stream

mod client;
mod keepalive;
mod manager;
mod reconnect;

pub use client::{handle_frame, FrameSender, StreamTransport, TransportContext, TransportEvent};
pub use keepalive::KeepAlive;
pub use manager::{ConnectionState, StreamConfig, StreamSupervisor};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
