//! Cron and duration parsing for the AVDC state machine.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::Error;

/// `cron` (the crate) speaks a 6/7-field dialect with a leading seconds
/// field, while callers write the standard 5-field "minute hour dom month
/// dow" dialect. A bare 5-field expression is widened to 6 fields by
/// pinning seconds to `0`, so both a standard expression ("0 1 * * *")
/// and a caller who already wrote a 6-field expression parse the same way.
fn widen_to_six_fields(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Evaluates `expr` as a standard 5-field cron expression and returns the
/// next fire time strictly after `after`.
pub fn next_fire(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    let widened = widen_to_six_fields(expr);
    let schedule =
        Schedule::from_str(&widened).map_err(|e| Error::Cron(format!("{expr:?}: {e}")))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| Error::Cron(format!("{expr:?} has no future occurrence")))
}

/// Validates `expr` as a standard 5-field cron expression ("minute hour
/// dom month dow"), used by the admission webhook. A 6/7-field expression
/// (even one `cron` itself would accept once widened) is rejected here —
/// spec.md §4.6 asks specifically for "a valid 5-field cron expression".
pub fn validate_cron(expr: &str) -> Result<(), Error> {
    if expr.split_whitespace().count() != 5 {
        return Err(Error::Cron(format!(
            "{expr:?}: expected a 5-field cron expression (minute hour dom month dow)"
        )));
    }
    let widened = widen_to_six_fields(expr);
    Schedule::from_str(&widened)
        .map(|_| ())
        .map_err(|e| Error::Cron(format!("{expr:?}: {e}")))
}

/// Parses a `humantime`-style duration string ("1h", "30m", "0s").
pub fn parse_duration(value: &str) -> Result<Duration, Error> {
    humantime::parse_duration(value).map_err(|e| Error::Duration(format!("{value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_fire_advances_past_after() {
        let after = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let next = next_fire("0 * * * *", after).unwrap();
        assert!(next > after);
    }

    #[test]
    fn next_fire_accepts_standard_five_field_expressions() {
        // Daily at 01:00.
        let after = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let next = next_fire("0 1 * * *", after).unwrap();
        assert_eq!(next, "2026-01-01T01:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn validate_cron_rejects_garbage() {
        assert!(validate_cron("not a cron expression").is_err());
    }

    #[test]
    fn parse_duration_accepts_humantime_strings() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("banana").is_err());
    }
}
