//! Transition records: a state paired with the instant it was observed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};
use crate::state::ReachState;

/// Wall-clock time of a transition in milliseconds since the Unix epoch.
///
/// This is the transition log key. Its text form is plain decimal ASCII.
/// Millisecond resolution keeps two edges sampled within the same second
/// on distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from whole seconds since the epoch.
    ///
    /// Saturates at the ends of the representable range.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Returns the current wall-clock millisecond.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Returns milliseconds since the epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the next representable millisecond, if any.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Parses decimal milliseconds.
    pub fn parse(text: &str) -> DomainResult<Self> {
        text.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| DomainError::InvalidTimestamp {
                value: text.to_string(),
            })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A recorded change of reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// Instant at which the new state was first observed
    pub at: Timestamp,

    /// State entered at that instant
    pub state: ReachState,
}

impl Transition {
    /// Creates a new transition.
    pub fn new(at: Timestamp, state: ReachState) -> Self {
        Self { at, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_text_is_decimal_millis() {
        let ts = Timestamp::from_millis(1_700_000_000_250);
        assert_eq!(ts.to_string(), "1700000000250");
        assert_eq!(Timestamp::parse("1700000000250").unwrap(), ts);
    }

    #[test]
    fn test_timestamp_from_secs() {
        assert_eq!(Timestamp::from_secs(3), Timestamp::from_millis(3_000));
        assert_eq!(Timestamp::from_secs(i64::MAX).as_millis(), i64::MAX);
        assert_eq!(Timestamp::from_secs(i64::MIN).as_millis(), i64::MIN);
    }

    #[test]
    fn test_timestamp_parse_rejects_garbage() {
        assert!(Timestamp::parse("17e8").is_err());
        assert!(Timestamp::parse("").is_err());
        assert!("abc".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_timestamp_ordering_is_numeric() {
        // 9 < 10 numerically even though "9" > "10" as text
        assert!(Timestamp::from_millis(9) < Timestamp::from_millis(10));
    }

    #[test]
    fn test_sub_second_instants_are_distinct() {
        let a = Timestamp::from_millis(1_000_100);
        let b = Timestamp::from_millis(1_000_600);
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_timestamp_next_saturates_at_max() {
        assert_eq!(Timestamp::from_millis(5).next(), Some(Timestamp::from_millis(6)));
        assert_eq!(Timestamp::from_millis(i64::MAX).next(), None);
    }

    #[test]
    fn test_timestamp_now_is_recent() {
        // 2020-01-01
        assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_timestamp_serializes_as_number() {
        let json = serde_json::to_string(&Timestamp::from_millis(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_transition_serialization() {
        let t = Transition::new(Timestamp::from_millis(100), ReachState::Up);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"at":100,"state":"up"}"#);
    }
}
