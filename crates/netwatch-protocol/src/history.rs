//! History export exchanged on an `init` request.
//!
//! Wire shape: `[["<ts>", ...], ["true"|"false", ...]]`, two parallel
//! arrays of text in key order. `<ts>` is decimal epoch milliseconds.

use serde::{Deserialize, Serialize};

use netwatch_core::{DomainResult, ReachState, Timestamp, Transition};

/// Client request line asking for the full history.
pub const INIT_REQUEST: &str = "init";

/// Returns true if a client line asks for history.
pub fn is_init_request(line: &str) -> bool {
    line.contains(INIT_REQUEST)
}

/// Returns true if a daemon line is a history reply rather than a
/// status sentence.
///
/// Status frames can arrive on the same connection before the reply.
pub fn is_history_frame(line: &str) -> bool {
    line.trim_start().starts_with('[')
}

/// Full transition history as two parallel text arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPayload(Vec<String>, Vec<String>);

impl HistoryPayload {
    /// Builds the payload from transitions already in key order.
    pub fn from_transitions<I>(transitions: I) -> Self
    where
        I: IntoIterator<Item = Transition>,
    {
        let (times, states) = transitions
            .into_iter()
            .map(|t| (t.at.to_string(), t.state.encode().to_string()))
            .unzip();
        Self(times, states)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.0.len().min(self.1.len())
    }

    /// Returns true if the payload has no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the text arrays back into transitions.
    ///
    /// Extra entries in the longer array are ignored.
    pub fn to_transitions(&self) -> DomainResult<Vec<Transition>> {
        self.0
            .iter()
            .zip(self.1.iter())
            .map(|(ts, state)| {
                Ok(Transition::new(
                    Timestamp::parse(ts)?,
                    ReachState::decode(state)?,
                ))
            })
            .collect()
    }

    /// Serializes to a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a JSON frame.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
