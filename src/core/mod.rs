//! Core domain models for the CI pipeline
//!
//! The build matrix, step conditions, environment composition and the
//! results of a run. Nothing in here spawns processes.

pub mod condition;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod result;
pub mod step;

pub use condition::*;
pub use context::*;
pub use environment::*;
pub use error::*;
pub use matrix::*;
pub use pipeline::*;
pub use result::*;
pub use step::*;
