use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod common;
pub mod health;
pub mod moderator;
pub mod play;
pub mod public;
pub mod sse;
pub mod validation;

/// Render unix milliseconds as RFC 3339.
pub fn format_timestamp_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_unix_millis() {
        assert_eq!(format_timestamp_ms(0), "1970-01-01T00:00:00Z");
        assert!(format_timestamp_ms(1_700_000_000_000).starts_with("2023-11-14T22:13:20"));
    }
}
