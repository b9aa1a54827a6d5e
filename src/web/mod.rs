//! Web interface module
//!
//! A small HTTP API next to the RESP listener: statistics, the slot map,
//! and one-shot command execution.

mod handlers;
mod server;

pub use server::{router, run_web_server};
