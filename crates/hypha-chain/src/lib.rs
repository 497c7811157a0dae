//! # hypha-chain
//!
//! Ordered, best-effort execution of named tasks.
//!
//! - [`ChainExecutor`]: one `execute_step` per executor kind, a shared `run`
//!   driver that executes steps strictly in order and records every outcome
//! - [`AgentChainExecutor`]: dispatches to task handlers behind the safety gate
//! - [`PluginChainExecutor`]: dispatches to plugins, piping outputs forward
//! - [`HandlerRegistry`] / [`PluginRegistry`]: in-memory name lookup
//! - [`tracking`]: per-handler request counters and latency histograms

#![deny(unsafe_code)]

pub mod agent;
pub mod errors;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod tracking;
pub mod types;

pub use agent::{AgentChainExecutor, HALTED_OUTPUT};
pub use errors::{ChainError, StepError, TaskError};
pub use executor::{ChainExecutor, StepLimits};
pub use plugin::{Plugin, PluginChainExecutor, PluginRegistry};
pub use registry::{HandlerRegistry, TaskHandler, TaskRegistry};
pub use types::{ChainContext, ChainHistory, ChainStep, StepResult};
