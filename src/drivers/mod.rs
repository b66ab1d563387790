//! Platform drivers.

pub mod task_pin;
