//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements         | Connects to              |
//! |------------|--------------------|--------------------------|
//! | `log_sink` | StatsSink          | Serial log output        |
//! | `network`  | NetworkTransport   | Log / null stand-ins     |
//! | `uart`     | LinkRx, LinkTx     | ESP-IDF UART driver      |

pub mod log_sink;
pub mod network;
#[cfg(target_os = "espidf")]
pub mod uart;
