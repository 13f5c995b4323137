//! KDL configuration parsing for autocd.
//!
//! This crate handles parsing of:
//! - The server configuration file (config.kdl)
//! - Human-readable durations ("5m", "1h30m")

pub mod app;
pub mod duration;
pub mod error;

pub use app::{
    AdminConfig, AppConfig, LogConfig, LogFormat, ScriptsConfig, WebhookConfig, load_config,
    parse_config,
};
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
