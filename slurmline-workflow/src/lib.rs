//! Execution core for cluster-scheduled pipeline work
//!
//! A [`Coordinator`] takes a Work Unit and either runs it in-process or
//! prepares a scratch directory, submits a batch job and tracks it until
//! the job leaves the queue. On the compute node the [`Runner`] executes
//! the unit and owns the node-local scratch lifecycle.

pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Result, WorkflowError};
pub use runner::Runner;
