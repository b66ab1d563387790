//! Tracker link multiplexer library.
//!
//! One UART carries both the GNSS sentence stream and AT command traffic
//! to the SIM7670G.  This crate captures that byte stream, reassembles it
//! into lines, classifies and routes each line, and hands positioning data
//! to the network side on the other core.
//!
//! Exposes the pure-logic modules for integration testing.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod capture;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod stream;
pub mod transport;

pub use error::{Error, Fault, Result};
pub use pipeline::{CaptureLoop, CaptureStep, Pipeline, RunningPipeline};
