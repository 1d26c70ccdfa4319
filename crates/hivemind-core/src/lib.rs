//! Hivemind Core - cluster coordination kernel
//!
//! This crate provides the coordination layer of the Hivemind agent
//! platform: discovering worker nodes over an unreliable broadcast bus,
//! deploying a bootstrap payload to them, binding each to a configured
//! role, and dispatching correlated request/response tasks with bounded
//! waiting and graceful shutdown.

pub mod bus;
pub mod cluster;
pub mod config;
pub mod error;
pub mod observability;
pub mod state;
pub mod worker;

pub use bus::memory::{MemoryBus, MemoryHub};
pub use bus::{BusError, MessageBus};
pub use cluster::assign::AssignmentOutcome;
pub use cluster::deploy::DeployOutcome;
pub use cluster::{start_cluster, ClusterHandle, ClusterStatus, RoleStatus};
pub use config::ClusterConfig;
pub use error::ClusterError;
pub use state::{ClusterState, Node};
pub use worker::{EchoHandler, RoleHandler, Worker};
