//! Human-readable durations for settings and command line flags.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Parse `"500ms"`, `"5s"`, `"2m"` or a bare number of seconds.
///
/// ```
/// use vehicle_runtime::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_duration_string("60"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("soon"), None);
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: u64 = number.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

/// Serde adapter for optional duration fields written as strings or bare seconds.
pub(crate) fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) => parse_duration_string(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{}'", text))),
    }
}
