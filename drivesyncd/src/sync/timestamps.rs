use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Distant-past sentinel the barrier resets to; any real timestamp on
/// either side is newer.
pub const SENTINEL: OffsetDateTime = datetime!(2000-01-01 12:00:00 UTC);

/// Slack absorbing the rounding between the store's nanosecond timestamps
/// and the local filesystem's possibly coarser mtimes.
pub const MTIME_SLACK: Duration = Duration::milliseconds(500);

pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value, &Rfc3339)
}

pub fn format_nanos(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value.format(&Rfc3339)
}

/// Second-precision UTC rendering for the modified-since query; the store
/// compares these at second granularity.
pub fn format_seconds_utc(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value
        .to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .expect("zero nanoseconds is always in range")
        .format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_rendering_drops_the_fraction() {
        let stamp = parse_rfc3339("2024-01-22T18:32:04.223456789Z").unwrap();
        assert_eq!(format_seconds_utc(stamp).unwrap(), "2024-01-22T18:32:04Z");
    }

    #[test]
    fn nano_rendering_round_trips() {
        let stamp = parse_rfc3339("2024-01-22T18:32:04.223Z").unwrap();
        assert_eq!(parse_rfc3339(&format_nanos(stamp).unwrap()).unwrap(), stamp);
    }

    #[test]
    fn sentinel_predates_any_real_timestamp() {
        let stamp = parse_rfc3339("2022-01-22T18:32:04.223Z").unwrap();
        assert!(SENTINEL < stamp);
    }
}
