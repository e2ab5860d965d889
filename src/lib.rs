//! Core library for the tick-bridge project.
//!
//! Bridges a push-based streaming quote feed to pull-based consumers: a
//! supervised WebSocket connection tracks the most recent tick per
//! instrument, a dedup tracker suppresses repeat delivery, and a polling
//! facade exposes "give me the latest tick" to request/response callers.

pub mod codec;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod feed;
pub mod http;
pub mod models;
pub mod service;
pub mod stats;
pub mod utils;
