//! # corral-common
//!
//! Shared types for the Corral pod lifecycle manager.
//!
//! This crate provides functionality used across the Corral crates:
//! - Pod and container ID generation and validation
//! - Human-readable name generation
//! - Standard filesystem paths
//! - The common error taxonomy

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod names;
pub mod paths;

pub use error::{CorralError, CorralResult};
pub use id::{ContainerId, PodId};
pub use paths::CorralPaths;
