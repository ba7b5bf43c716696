// src/graph/mod.rs

//! Dependency discovery and batching.
//!
//! - [`batching`] is the pure ordering algorithm.
//! - [`builder`] asks the external inventories what a change affects and
//!   feeds the answer to the batching step.

pub mod batching;
pub mod builder;

pub use batching::{BatchPlan, PlanNode, PlannedArtifact, batch_nodes};
pub use builder::{DependencyGraphBuilder, image_attributes, module_attributes};
