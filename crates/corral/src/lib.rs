//! # Corral
//!
//! Pod lifecycle management for container runtimes.
//!
//! A pod groups containers that share a lifecycle and, optionally, a cgroup.
//! Corral creates pods, answers registry queries, and tears pods down along
//! with their containers, stopping processes, releasing storage and removing
//! the pod cgroup.
//!
//! ## Features
//!
//! - **Ordered locking**: runtime, pod and container locks, with optional
//!   `flock` lock files for coordination between processes
//! - **Cgroup managers**: `cgroupfs` and `systemd` parent validation, cgroup
//!   v1, v2 and hybrid hierarchies
//! - **Pluggable backends**: state store, OCI runtime and cgroup backends are
//!   traits with default implementations
//! - **Persistence**: pod and container records as JSON on disk
//!
//! ## Usage
//!
//! ```no_run
//! use corral::pod::{with_name, with_pod_cgroup};
//! use corral::runtime::{Runtime, RuntimeConfig};
//!
//! # fn example() -> corral_common::CorralResult<()> {
//! let runtime = Runtime::new(RuntimeConfig::default())?;
//!
//! let pod = runtime.new_pod(vec![with_name("web"), with_pod_cgroup()])?;
//! assert_eq!(runtime.lookup_pod("web")?.id(), pod.id());
//!
//! runtime.remove_pod(&pod, true, true)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cgroup;
pub mod container;
pub mod lock;
pub mod oci;
pub mod pod;
pub mod runtime;
pub mod state;

pub use container::Container;
pub use pod::Pod;
pub use runtime::{Runtime, RuntimeConfig};
