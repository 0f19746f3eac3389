//! Captured screenshots handed to export destinations.
//!
//! The capture pipeline itself lives in the host application; destinations
//! only ever see the finished image and its metadata, and never mutate it.

pub mod file;
pub mod types;

pub use types::{Capture, CaptureDetails};
