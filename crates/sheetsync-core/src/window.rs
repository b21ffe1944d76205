//! Fetch windows for the record source.
//!
//! A [`FetchWindow`] bounds which messages a run asks the record source for.
//! Either side may be open: an unbounded window means "the whole history".

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A possibly open time window for fetching records.
///
/// Represents the half-open interval `[start, end)` in UTC. A missing bound
/// is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    /// Start of the window (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// End of the window (exclusive).
    pub end: Option<DateTime<Utc>>,
}

/// Returned when a window's start is not before its end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fetch window start ({start}) must be before end ({end})")]
pub struct InvalidWindow {
    /// The requested start.
    pub start: DateTime<Utc>,
    /// The requested end.
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Creates a window from optional bounds, rejecting inverted ranges.
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, InvalidWindow> {
        if let (Some(start), Some(end)) = (start, end)
            && start >= end
        {
            return Err(InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The unbounded window (whole history).
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A window covering `lookback` before `now`, open at the end.
    pub fn lookback(now: DateTime<Utc>, lookback: Duration) -> Self {
        Self {
            start: Some(now - lookback),
            end: None,
        }
    }

    /// Returns true if neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Checks if a datetime falls within this window.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= dt) && self.end.is_none_or(|end| dt < end)
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<DateTime<Utc>>| {
            b.map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| "*".to_string())
        };
        write!(f, "[{}, {})", bound(self.start), bound(self.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn bounded_window_contains() {
        let window = FetchWindow::new(
            Some(utc(2025, 2, 5, 9, 0, 0)),
            Some(utc(2025, 2, 5, 17, 0, 0)),
        )
        .unwrap();

        assert!(window.contains(utc(2025, 2, 5, 9, 0, 0))); // start inclusive
        assert!(window.contains(utc(2025, 2, 5, 16, 59, 59)));
        assert!(!window.contains(utc(2025, 2, 5, 17, 0, 0))); // end exclusive
        assert!(!window.contains(utc(2025, 2, 5, 8, 59, 59)));
    }

    #[test]
    fn open_ends() {
        let window = FetchWindow::new(Some(utc(2025, 2, 5, 9, 0, 0)), None).unwrap();
        assert!(window.contains(utc(2099, 1, 1, 0, 0, 0)));
        assert!(!window.contains(utc(2025, 2, 5, 8, 0, 0)));

        let unbounded = FetchWindow::unbounded();
        assert!(unbounded.is_unbounded());
        assert!(unbounded.contains(utc(1970, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = FetchWindow::new(
            Some(utc(2025, 2, 5, 17, 0, 0)),
            Some(utc(2025, 2, 5, 9, 0, 0)),
        )
        .unwrap_err();
        assert_eq!(err.start, utc(2025, 2, 5, 17, 0, 0));

        // Empty windows are rejected too.
        let at = utc(2025, 2, 5, 9, 0, 0);
        assert!(FetchWindow::new(Some(at), Some(at)).is_err());
    }

    #[test]
    fn lookback_window() {
        let now = utc(2025, 2, 5, 12, 0, 0);
        let window = FetchWindow::lookback(now, Duration::days(2));
        assert_eq!(window.start, Some(utc(2025, 2, 3, 12, 0, 0)));
        assert_eq!(window.end, None);
    }

    #[test]
    fn display() {
        let window = FetchWindow::new(Some(utc(2025, 2, 5, 9, 0, 0)), None).unwrap();
        assert_eq!(window.to_string(), "[2025-02-05T09:00:00+00:00, *)");
    }
}
