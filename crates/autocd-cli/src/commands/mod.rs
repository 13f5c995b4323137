//! CLI command implementations.

pub mod exec;
pub mod runs;
pub mod sign;

use std::path::Path;

use anyhow::Result;
use autocd_config::load_config;

pub fn validate(path: &Path) -> Result<()> {
    match load_config(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!(
                "  webhook:  0.0.0.0:{}{}",
                config.webhook.port, config.webhook.path
            );
            if config.webhook.secret.is_empty() {
                println!("  secret:   (empty)");
            }
            println!(
                "  scripts:  {} (push -> {})",
                config.scripts.path.display(),
                config.scripts.push
            );
            println!(
                "  limits:   {} concurrent, {:?} timeout",
                config.scripts.max_concurrent, config.scripts.timeout
            );
            println!(
                "  operator: {}",
                if config.admin.token.is_some() {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
