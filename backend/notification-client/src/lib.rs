pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::Notification;
pub use services::*;
pub use websocket::{ConnectionManager, ConnectionState, PushChannel, PushTransport, StompTransport};
