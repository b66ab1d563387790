//! Capture core → transmission core hand-off and the worker that drains it.

pub mod queue;
pub mod worker;
