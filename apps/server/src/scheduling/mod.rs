//! The pure scheduling engine: slot availability, cancellation/reschedule
//! policy, recurring expansion, and derived analytics. No I/O in this tree —
//! handlers load rows and feed them in.

pub mod analytics;
pub mod availability;
pub mod policy;
pub mod recurring;
pub mod time;
