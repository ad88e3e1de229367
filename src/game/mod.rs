//! Live game sessions and their clocks.

pub mod clock;
pub mod session;

pub use clock::{start_clock, ClockHost};
pub use session::{NewSession, SessionRegistry};
