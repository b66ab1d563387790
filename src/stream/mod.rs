//! Stream classification and priority routing.

pub mod classify;
pub mod frame;
pub mod router;
