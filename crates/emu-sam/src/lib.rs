//! SAM Coupé display pipeline.
//!
//! Pairs the MGT ASIC display synthesis (`mgt-asic`) with the machine-side
//! pieces it needs: the SAM's paged internal RAM, display configuration, and
//! headless PNG capture of finished frames. The CPU and I/O decoding live
//! outside this crate; anything that owns a [`SamMemory`] and a cycle counter
//! can drive the display.

#[cfg(feature = "native")]
pub mod capture;
mod config;
mod memory;

pub use config::{RamSize, SamConfig};
pub use memory::{PAGE_SIZE, SamMemory};
