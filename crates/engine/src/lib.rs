//! # Engine
//!
//! Runs gated, retryable actions across inventory hosts.
//!
//! ## Core Concepts
//!
//! - **Task**: one [`Action`] over a set of host patterns, with an optional
//!   [`Prepare`] gate, a [`RetryPolicy`] and a parallel/serial flag. A task
//!   may loop over items, run once, and carry `until`/`failed_when` checks
//! - **Module**: tasks in strict order; a failing task stops the module unless
//!   it ignores errors. Rescue tasks run after a failure; always tasks run
//!   last. A module may roll out in [`SerialEntry`] waves
//! - **Pipeline**: modules in order, a fresh pipeline-scope cache per run and the
//!   [`PipelineResult`] ledger
//! - **PipelineHandle**: a pipeline running in the background that can be
//!   polled and cancelled
//!
//! ## Example
//!
//! ```ignore
//! use connector::DefaultConnectorFactory;
//! use engine::{Module, Pipeline, Task, RetryPolicy};
//! use engine::action::Command;
//! use engine::prepare::FirstHost;
//! use inventory::Inventory;
//! use std::time::Duration;
//!
//! let inventory = Inventory::from_path("hosts.yaml")?;
//! let pipeline = Pipeline::new("bootstrap").module(
//!     Module::new("control-plane")
//!         .task(
//!             Task::new("init", Command::new("kubeadm init").sudo().register("init"))
//!                 .hosts(["kube_control_plane"])
//!                 .prepare(FirstHost),
//!         )
//!         .task(
//!             Task::new("pull", Command::new("kubeadm config images pull").sudo())
//!                 .hosts(["k8s_cluster"])
//!                 .parallel()
//!                 .retry(RetryPolicy::new(3, Duration::from_secs(5))),
//!         ),
//! );
//!
//! let result = pipeline.run(&inventory, &DefaultConnectorFactory::default());
//! println!("{result}");
//! ```
//!
//! ## Provider Traits
//!
//! - [`Action`]: the work a task performs on one host
//! - [`Prepare`]: per-host gate deciding run or skip
//! - [`SkipWhen`]: module-level skip condition
//! - [`ProgressCallback`]: receives progress updates from every worker

pub mod action;
pub mod cancel;
pub mod context;
pub mod error;
pub mod handle;
pub mod module;
pub mod pipeline;
pub mod prepare;
pub mod progress;
pub mod result;
pub mod retry;
pub mod serial;
pub mod task;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use action::{Action, BoxedAction};
pub use cancel::CancelToken;
pub use context::{HostContext, Scope};
pub use error::{Error, ErrorCategory, Result};
pub use handle::PipelineHandle;
pub use module::{Module, SkipWhen};
pub use pipeline::{DEFAULT_CONCURRENCY, Pipeline};
pub use prepare::{BoxedPrepare, Prepare};
pub use progress::{NoProgress, ProgressCallback};
pub use result::{FailedTask, HostFailure, HostOutcome, Phase, PipelineResult, TaskStatus};
pub use retry::RetryPolicy;
pub use serial::SerialEntry;
pub use task::Task;
