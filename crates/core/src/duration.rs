//! Short duration grammar used by cache TTL settings (`30s`, `15m`, `24h`, `7d`, `2w`).

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration: {0:?} (expected e.g. 30s, 15m, 24h, 7d)")]
pub struct DurationError(pub String);

/// Parse an integer amount followed by one unit of `s`, `m`, `h`, `d`, or `w`.
pub fn parse_duration(value: &str) -> Result<Duration, DurationError> {
    let trimmed = value.trim();
    let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
    let (amount, unit) = trimmed.split_at(split);

    let amount: u64 = amount.parse().map_err(|_| DurationError(value.to_string()))?;
    let unit_secs = match unit.trim().to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(DurationError(value.to_string())),
    };

    amount
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| DurationError(value.to_string()))
}
