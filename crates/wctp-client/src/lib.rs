//! Headless WebCTP gateway session client.
//!
//! Wires the relay transport, the session driver and a console status view:
//! - TOML configuration and CLI
//! - Relay connection + session driver
//! - Status and account snapshot rendering
//! - Graceful logout on shutdown

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
