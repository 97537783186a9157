//! Foundation module - Core utilities shared by the renderer
//!
//! - Math types and transforms
//! - Logging setup
//! - The worker pool used for parallel per-entity updates
//! - Frame statistics

pub mod jobs;
pub mod logging;
pub mod math;
pub mod stats;
