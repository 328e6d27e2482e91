//! # Status and Timing
//!
//! The status vocabulary with its per-version coercion table, and the calculators that
//! derive a status and a timing for a chunk of the flow graph.

pub mod calculator;
#[allow(clippy::module_inception)]
pub mod status;
pub mod timing;

pub use calculator::StatusCalculator;
pub use status::{Status, StatusApiVersion};
pub use timing::{TimingCalculator, TimingInfo};
