//! Sync Engine - the heart of FastSync
//!
//! This module implements the per-file synchronization pipeline:
//! - A shared byte meter for aggregate throughput
//! - A metering reader around every response body
//! - A resumable, self-verifying download task per manifest entry
//! - A bounded worker pool with a separate download slot limit
//! - A once-per-second throughput reporter

mod download_task;
mod metering_stream;
mod rate_meter;
mod reporter;
mod scheduler;
mod verify;

pub use download_task::*;
pub use metering_stream::*;
pub use rate_meter::*;
pub use reporter::*;
pub use scheduler::*;
pub use verify::*;
