//! Workflow graph execution.
//!
//! A workflow is a directed graph of named steps. Every step has exactly one
//! outgoing `Transition`: either a direct edge or a conditional edge whose
//! predicate reads the shared `WorkflowState` and picks a `BranchKey`.
//! Conditional edges may point backward, so revision loops are ordinary
//! cycles; the engine bounds them with a per-step visit count.
//!
//! `WorkflowEngine::start` hands out a `WorkflowRun`, which executes one step
//! per `advance()` call and can be snapshotted and resumed.

pub mod builder;
pub mod engine;
pub mod registry;
pub mod transition;

pub use builder::{EdgeDescription, GraphBuilder, GraphDescription, NodeDescription, WorkflowGraph};
pub use devflow_core::types::BranchKey;
pub use engine::{RunSnapshot, StepOutcome, WorkflowEngine, WorkflowRun};
pub use registry::{FnStep, StepRegistry};
pub use transition::{Predicate, StatusRoute, Transition};
