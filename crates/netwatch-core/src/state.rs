//! Reachability state and its storage encoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// Binary reachability of the monitored host.
///
/// Stored and transmitted as the literal text `true` (up) or `false`
/// (down). That text is what existing transition logs contain, so
/// [`ReachState::encode`] and [`ReachState::decode`] must stay in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachState {
    /// Host answered the probe within its timeout
    Up,

    /// Probe failed, timed out, or has never succeeded
    #[default]
    Down,
}

impl ReachState {
    /// Storage text for up.
    pub const UP_TEXT: &'static str = "true";

    /// Storage text for down.
    pub const DOWN_TEXT: &'static str = "false";

    /// Converts a probe result into a state.
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Up
        } else {
            Self::Down
        }
    }

    /// Returns true if the host is reachable.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }

    /// Returns the storage text for this state.
    pub fn encode(&self) -> &'static str {
        match self {
            Self::Up => Self::UP_TEXT,
            Self::Down => Self::DOWN_TEXT,
        }
    }

    /// Parses the storage text back into a state.
    pub fn decode(text: &str) -> DomainResult<Self> {
        match text {
            Self::UP_TEXT => Ok(Self::Up),
            Self::DOWN_TEXT => Ok(Self::Down),
            other => Err(DomainError::InvalidState {
                value: other.to_string(),
            }),
        }
    }

    /// Returns the verb phrase used in pushed messages.
    pub fn verb_phrase(&self) -> &'static str {
        match self {
            Self::Up => "came up.",
            Self::Down => "went down.",
        }
    }
}

impl fmt::Display for ReachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

impl FromStr for ReachState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl From<bool> for ReachState {
    fn from(reachable: bool) -> Self {
        Self::from_reachable(reachable)
    }
}
