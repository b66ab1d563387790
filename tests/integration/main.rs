//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the scripted modem link.  All tests run on the host (x86_64)
//! with no real hardware required.

mod capture_tests;
mod command_tests;
mod mock_link;
mod transport_tests;
