//! Shared infrastructure for the sidus workspace: pixel buffers, logging
//! setup and bounded parallel iteration.

pub mod buffer2;
pub mod log_setup;
pub mod parallel;

pub use buffer2::Buffer2;
