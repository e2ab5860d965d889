//! Upstream feed connectivity.
//!
//! Two operating modes share the wire codec: a persistent connection owned
//! by a supervising receive loop ([`connection`]) and throttled one-shot
//! fetches ([`transient`]).

pub mod connection;
pub mod transient;

pub use connection::{ConnState, FeedClient, FeedConfig};
pub use transient::{ThrottleGate, fetch_one};
