//! WebSocket fan-out of notification events.
//!
//! Every browser tab holds one socket. [`bridge`] forwards each notifier
//! event to all sockets as JSON; [`store_relay`] turns store changes made by
//! other server processes into notifier events.

pub mod bridge;
mod handler;
mod heartbeat;
pub mod manager;
pub mod store_relay;

pub use bridge::EventBridge;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
pub use store_relay::spawn_store_relay;
