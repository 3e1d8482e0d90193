//! `sk-domain`: shared types for the skywork-relay crates.
//!
//! Holds the configuration structs, the error taxonomy, the boxed line
//! stream alias used by transports, and structured trace events. The
//! protocol client itself lives in `sk-client`.

pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
