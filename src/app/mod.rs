//! Application layer: port traits and the handlers that consume frames.

pub mod handlers;
pub mod modem_status;
pub mod nmea;
pub mod ports;
