#![forbid(unsafe_code)]

//! `agent-relay` — relay chat requests to a headless AI coding-agent CLI.
//!
//! Two core components:
//!
//! - [`engine`] — spawns and supervises the agent CLI subprocess, speaks its
//!   newline-delimited JSON event protocol in one-shot and interactive modes,
//!   and races the stream against idle/soft-ceiling timers and external
//!   cancellation.
//! - [`store`] — one durable [`store::record::SessionRecord`] per conversation
//!   key, deciding when a previous subprocess session can be resumed and
//!   guarding against resets racing in-flight calls.

pub mod config;
pub mod engine;
pub mod errors;
pub mod store;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
