//! Human-readable status frames.

use std::fmt;

use chrono::{Local, TimeZone};
use netwatch_core::{Timestamp, Transition};

/// Layout of the `<time>` part of a status frame.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// A single message pushed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFrame {
    /// The most relevant known transition (exact match or latest)
    Status(Transition),

    /// Heartbeat sent before any transition has ever been recorded
    NoHistory { at: Timestamp },
}

impl PushFrame {
    /// Renders the frame using the machine's local time zone.
    pub fn render(&self) -> String {
        self.render_in(&Local)
    }

    /// Renders the frame in the given time zone.
    ///
    /// `At <time> the connection came up.` / `... went down.`
    pub fn render_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        match self {
            Self::Status(transition) => format!(
                "At {} the connection {}",
                format_time(transition.at, tz),
                transition.state.verb_phrase()
            ),
            Self::NoHistory { at } => format!(
                "At {} no connection transitions have been recorded yet.",
                format_time(*at, tz)
            ),
        }
    }
}

impl From<Transition> for PushFrame {
    fn from(transition: Transition) -> Self {
        Self::Status(transition)
    }
}

/// Formats a timestamp to the second, falling back to the raw key when
/// it cannot be represented in the zone.
fn format_time<Tz>(at: Timestamp, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match tz.timestamp_millis_opt(at.as_millis()).single() {
        Some(dt) => dt.format(TIME_FORMAT).to_string(),
        None => at.to_string(),
    }
}
