//! Pub/sub channels with replay, keyed by run id (§4.5).

pub mod channel;

pub use channel::Bus;
