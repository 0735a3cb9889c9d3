#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Stimulation pattern engines and the session controller that drives them.
//
// The crate stays portable across host tooling and embedded targets by
// avoiding the Rust standard library. Radio plumbing lives behind the
// `transport::Transport` seam.

pub mod command;
pub mod device;
pub mod modes;
pub mod session;
pub mod telemetry;
pub mod transport;
