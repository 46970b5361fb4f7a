//! Core Logic Module
//!
//! This module contains the core logic task implementation split into focused components:
//! - `state`: Core application state, statistics and the runtime clock
//! - `handlers`: Command, event and timer handlers
//! - `task`: Main CoreLogicTask implementation and coordination
//!
//! All session state is serialized through the single `CoreLogicTask`. Commands
//! from the UI, events from the transport and timer expiries are processed one
//! at a time, so the session manager never needs a lock.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::CommandHandlers;
pub use state::{CoreState, CoreStats, RuntimeClock};
pub use task::CoreLogicTask;
