//! netwatch daemon - reachability sampler and status push server
//!
//! This crate provides the runtime pieces of the daemon:
//! - `sampler` - polls the probe and records up/down transitions
//! - `store` - durable, append-only transition log (redb)
//! - `status` - read path over the log (exact lookup and latest)
//! - `relay` - non-blocking handoff from the sampler to live sessions
//! - `server` - Unix socket server, one subscriber session per client
//! - `probe` - ICMP and TCP reachability probes
//! - `config` / `context` - settings and the wiring shared by all tasks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      netwatchd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐  append   ┌─────────────────────────┐  │
//! │  │     Sampler     │──────────▶│     TransitionStore     │  │
//! │  │ (probe + edges) │           │    (stateChanges table) │  │
//! │  └────────┬────────┘           └────────────▲────────────┘  │
//! │           │ notify (never blocks)           │ get / latest  │
//! │           ▼                                 │               │
//! │  ┌─────────────────┐  one waiter  ┌─────────┴─────────────┐ │
//! │  │      Relay      │─────────────▶│  SubscriberSession    │ │
//! │  │  (single slot)  │              │  (per client, beats)  │ │
//! │  └─────────────────┘              └───────────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod context;
pub mod probe;
pub mod relay;
pub mod sampler;
pub mod server;
pub mod status;
pub mod store;
