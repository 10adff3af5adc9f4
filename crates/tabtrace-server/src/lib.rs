//! # tabtrace-server
//!
//! WebSocket front door. Bridge clients forward the browser's network,
//! navigation and tab events in and receive listener and badge frames
//! back; consumer clients use the same socket for the page-facing messages.

pub mod client;
pub mod handlers;
pub mod host_channel;
pub mod rpc;
pub mod server;

pub use client::ClientRegistry;
pub use host_channel::HostChannel;
pub use server::{start, ServerConfig, ServerHandle};
