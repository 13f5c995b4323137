//! Duration strings such as `300s`, `5m` or `1h30m`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::{ConfigError, ConfigResult};

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|s|m|h)").expect("valid duration regex"));

/// Parse a duration made of `<number><unit>` components (`ms`, `s`, `m`, `h`).
/// A bare integer is taken as seconds.
pub fn parse_duration(input: &str) -> ConfigResult<Duration> {
    let input = input.trim();
    let invalid = || ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("cannot parse {:?}", input),
    };

    if input.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in COMPONENT.captures_iter(input) {
        let whole = caps.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let value: u64 = caps[1].parse().map_err(|_| invalid())?;
        let part = match &caps[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            _ => return Err(invalid()),
        };
        total = total.saturating_add(part);
    }

    if consumed != input.len() {
        return Err(invalid());
    }
    Ok(total)
}
