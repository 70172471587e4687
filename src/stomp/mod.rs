//! STOMP 1.2 framing over websocket text messages.

pub mod commands;
pub mod frame;
pub mod heartbeat;

pub use frame::{decode, Frame};
