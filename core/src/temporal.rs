//! Fixed 5-minute time-bucket quantization used to aggregate events.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Width of an event aggregation bucket (GLOSSARY: "Token bucket window").
pub const BUCKET_WIDTH_MINUTES: i64 = 5;

/// Floors `ts` to the start of its 5-minute bucket.
pub fn bucket_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let epoch_minutes = ts.timestamp() / 60;
    let bucket_minutes = (epoch_minutes / BUCKET_WIDTH_MINUTES) * BUCKET_WIDTH_MINUTES;
    Utc.timestamp_opt(bucket_minutes * 60, 0).single().unwrap_or(ts)
}

/// The exclusive end of the bucket containing `ts`.
pub fn bucket_end(ts: DateTime<Utc>) -> DateTime<Utc> {
    bucket_start(ts) + Duration::minutes(BUCKET_WIDTH_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn floors_to_five_minute_boundary() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 42).unwrap();
        let bucketed = bucket_start(ts);
        assert_eq!(bucketed, Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap());
    }

    #[test]
    fn bucket_end_is_five_minutes_after_start() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap();
        assert_eq!(bucket_start(ts), ts);
        assert_eq!(bucket_end(ts), Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap());
    }

    #[test]
    fn same_bucket_for_any_point_within_window() {
        let a = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 6, 1, 0, 4, 59).unwrap();
        assert_eq!(bucket_start(a), bucket_start(b));
    }
}
