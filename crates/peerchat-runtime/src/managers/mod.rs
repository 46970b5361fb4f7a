//! Stateful managers owned by the Core Logic task

pub mod session;

pub use session::{Outcome, Session, SessionManager};
