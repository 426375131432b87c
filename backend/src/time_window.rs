//! Time-window parsing and validation shared by every backend-proxy tool
//! (spec §6: `start_time_iso`, `end_time_iso`, `lookback_minutes`).

use chrono::{DateTime, NaiveDateTime, Utc};
use kg_core::errors::ValidationError;

pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;
pub const MAX_LOOKBACK_MINUTES: i64 = 1440;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw tool arguments before validation, as a handler would pull them out
/// of the JSON-RPC params.
#[derive(Debug, Default, Clone)]
pub struct TimeWindowArgs {
    pub start_time_iso: Option<String>,
    pub end_time_iso: Option<String>,
    pub lookback_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn start_iso(&self) -> String {
        self.start.format(TIME_FORMAT).to_string()
    }

    pub fn end_iso(&self) -> String {
        self.end.format(TIME_FORMAT).to_string()
    }
}

fn parse_time(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .map_err(|_| ValidationError::Other(format!("{field} must match YYYY-MM-DD HH:MM:SS, got '{raw}'")))
}

/// Resolves the effective window for a time-bounded tool call. `end`
/// defaults to now, `start` defaults to `end - lookback_minutes`
/// (lookback itself defaults to 60, capped at 1440).
pub fn resolve_time_window(args: &TimeWindowArgs) -> Result<TimeWindow, ValidationError> {
    let lookback = args.lookback_minutes.unwrap_or(DEFAULT_LOOKBACK_MINUTES);
    if lookback > MAX_LOOKBACK_MINUTES {
        return Err(ValidationError::LookbackTooLarge {
            max: MAX_LOOKBACK_MINUTES as u32,
            actual: lookback as u32,
        });
    }

    let end = match &args.end_time_iso {
        Some(raw) => parse_time("end_time_iso", raw)?,
        None => Utc::now(),
    };
    let start = match &args.start_time_iso {
        Some(raw) => parse_time("start_time_iso", raw)?,
        None => end - chrono::Duration::minutes(lookback),
    };

    if start > end {
        return Err(ValidationError::StartAfterEnd);
    }

    Ok(TimeWindow { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_now_minus_default_lookback() {
        let window = resolve_time_window(&TimeWindowArgs::default()).unwrap();
        let delta = window.end - window.start;
        assert_eq!(delta.num_minutes(), DEFAULT_LOOKBACK_MINUTES);
    }

    #[test]
    fn lookback_over_cap_is_rejected() {
        let args = TimeWindowArgs {
            lookback_minutes: Some(1441),
            ..Default::default()
        };
        match resolve_time_window(&args) {
            Err(ValidationError::LookbackTooLarge { max, actual }) => {
                assert_eq!(max, 1440);
                assert_eq!(actual, 1441);
            }
            other => panic!("expected LookbackTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn start_after_end_is_rejected() {
        let args = TimeWindowArgs {
            start_time_iso: Some("2026-01-01 10:00:00".into()),
            end_time_iso: Some("2026-01-01 09:00:00".into()),
            lookback_minutes: None,
        };
        match resolve_time_window(&args) {
            Err(ValidationError::StartAfterEnd) => {}
            other => panic!("expected StartAfterEnd, got {other:?}"),
        }
    }

    #[test]
    fn explicit_window_is_used_verbatim() {
        let args = TimeWindowArgs {
            start_time_iso: Some("2026-01-01 09:00:00".into()),
            end_time_iso: Some("2026-01-01 10:00:00".into()),
            lookback_minutes: None,
        };
        let window = resolve_time_window(&args).unwrap();
        assert_eq!(window.start_iso(), "2026-01-01 09:00:00");
        assert_eq!(window.end_iso(), "2026-01-01 10:00:00");
    }

    #[test]
    fn malformed_time_is_rejected() {
        let args = TimeWindowArgs {
            start_time_iso: Some("not-a-time".into()),
            ..Default::default()
        };
        assert!(resolve_time_window(&args).is_err());
    }
}
