//! Built-in SDLC steps for the devflow engine.
//!
//! Each step prompts a [`TextGenerator`](devflow_core::traits::TextGenerator),
//! stores the reply in the workflow state and writes it under the output
//! directory. [`pipeline`] assembles the steps into the canonical graphs.

pub mod artifacts;
pub mod builtin;
pub mod pipeline;
pub mod verdict;

pub use artifacts::{extract_code_blocks, ArtifactDir, ArtifactWriter, CodeBlock};
pub use builtin::{ids, StepEnv};
pub use pipeline::{
    apply_gates, builtin_registry, gate_target, linear_graph, sdlc_graph, GateTarget, Pipeline,
};
pub use verdict::Verdict;
