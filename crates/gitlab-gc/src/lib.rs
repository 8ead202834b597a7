//! Garbage collector for GitLab CI workloads on Kubernetes.
//!
//! A run makes two passes over the cluster:
//!
//! 1. executor pods in the runner namespace older than the configured max age
//!    are deleted;
//! 2. CI namespaces are judged by the age of their youngest resource and
//!    deleted once that exceeds the review or build threshold.
//!
//! # Example
//!
//! ```ignore
//! use k8s_gitlab_gc::{run, GcConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GcConfig { dry_run: true, ..GcConfig::default() };
//!     let report = run(&config).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod age;
pub mod classify;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod executors;
pub mod kubernetes;
pub mod namespaces;
pub mod policy;

pub use age::{AgeSignal, ResourceAge};
pub use collector::{collect, run, RunReport};
pub use config::{ExecutorPodMatch, GcConfig, ResourceKind};
pub use error::{GcError, Result};
pub use kubernetes::{ClusterApi, KubeClusterApi};
pub use policy::{Decision, RetentionPolicy};
