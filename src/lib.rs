pub mod api;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod session;
pub mod stomp;
