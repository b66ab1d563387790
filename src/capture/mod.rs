//! Capture path: link bytes → ring → pooled frame buffers → lines.

pub mod assembler;
pub mod harvester;
pub mod pool;
pub mod ring;
