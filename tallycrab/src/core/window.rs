//! Hour buckets and fixed summary windows
//!
//! Increments are grouped into hour buckets in UTC. Summary queries cover
//! five fixed lookback windows, all measured from one captured instant so a
//! single summary is internally consistent.

use chrono::{DateTime, Duration, Utc};

/// Width of one counter bucket, in seconds
pub const BUCKET_SECONDS: i64 = 3600;

/// One of the five fixed summary lookback windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Window {
    /// All windows, shortest first, in summary order
    pub const ALL: [Window; 5] = [
        Window::Hour,
        Window::Day,
        Window::Week,
        Window::Month,
        Window::Year,
    ];

    /// How far back this window reaches
    pub fn lookback(&self) -> Duration {
        match self {
            Window::Hour => Duration::hours(1),
            Window::Day => Duration::days(1),
            Window::Week => Duration::days(7),
            Window::Month => Duration::days(30),
            Window::Year => Duration::days(365),
        }
    }

    /// The window's start relative to `now`; sums cover buckets strictly
    /// after this instant
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookback()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
            Window::Week => "week",
            Window::Month => "month",
            Window::Year => "year",
        }
    }
}

/// Truncate `at` to the start of its hour bucket, in UTC
///
/// Idempotent: the bucket boundary maps to itself.
///
/// # Example
///
/// ```
/// use tallycrab::bucket_start;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2024, 7, 9, 14, 42, 7).unwrap();
/// let bucket = Utc.with_ymd_and_hms(2024, 7, 9, 14, 0, 0).unwrap();
/// assert_eq!(bucket_start(at), bucket);
/// assert_eq!(bucket_start(bucket), bucket);
/// ```
pub fn bucket_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let into_hour = Duration::seconds(at.timestamp().rem_euclid(BUCKET_SECONDS))
        + Duration::nanoseconds(i64::from(at.timestamp_subsec_nanos()));
    at - into_hour
}
