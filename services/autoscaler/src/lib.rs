//! Replica autoscaler library.
//!
//! This crate primarily ships an `autoscaler` binary, but exposes its pieces
//! as a library for integration testing.
//!
//! - [`config`]: YAML configuration, loaded once at startup
//! - [`client`]: executes configured request tasks against the scaled service
//! - [`scaling`]: status snapshot parsing and the one-step scaling rule
//! - [`scaler`]: the polling loop
//! - [`probe`]: `/healthz` and `/readyz` endpoints

pub mod cli;
pub mod client;
pub mod config;
pub mod probe;
pub mod scaler;
pub mod scaling;
pub mod task;
pub mod telemetry;

pub use client::{CallFailure, CallOutcome, TaskClient};
pub use config::{Config, ConfigError};
pub use probe::{ProbeError, ProbeServer};
pub use scaler::{Autoscaler, CycleOutcome};
pub use scaling::{ScaleDecision, ScalingPolicy, SnapshotError, StatusSnapshot};
pub use task::{HttpTask, ScalingTasks};
