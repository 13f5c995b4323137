//! Payload signing for manual webhook deliveries.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use autocd_core::signature::sign;

/// Print the `sha256=<hex>` signature of a file, or of stdin.
pub fn run(secret: &str, file: Option<&Path>) -> Result<()> {
    let body = read_payload(file)?;
    println!("{}", sign(&body, secret));
    Ok(())
}

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read payload: {}", path.display())),
        None => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read payload from stdin")?;
            Ok(body)
        }
    }
}
