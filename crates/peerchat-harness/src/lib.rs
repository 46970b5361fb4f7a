//! PeerChat Harness
//!
//! Deterministic building blocks for exercising PeerChat without a network:
//! a controllable [`MockTimeSource`] for the pure state machines and an
//! in-memory [`LoopbackNetwork`] whose transports plug into the runtime like
//! any other [`peerchat_core::TransportTask`].

pub mod loopback;
pub mod time;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use time::MockTimeSource;
