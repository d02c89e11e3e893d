//! netwatch protocol - frames pushed over the status socket
//!
//! The push channel is line oriented: every frame is one UTF-8 line.
//! Status frames are plain English sentences; the optional history
//! reply to an `init` request is a single JSON line.

pub mod frame;
pub mod history;

pub use frame::{PushFrame, TIME_FORMAT};
pub use history::{is_history_frame, is_init_request, HistoryPayload, INIT_REQUEST};
