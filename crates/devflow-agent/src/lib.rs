pub mod approval;
pub mod checkpoint;
pub mod gate;
pub mod graph;
pub mod trace;

pub use approval::{GateStatus, ReviewBroker, ReviewGate};
pub use checkpoint::CheckpointStore;
pub use gate::{
    ApprovalOutcome, Approver, DecisionSource, GatedReview, LocalApprover, RemoteApprover,
    ReviewRequest,
};
pub use graph::{
    BranchKey, GraphBuilder, GraphDescription, Predicate, RunSnapshot, StatusRoute, StepOutcome,
    StepRegistry, Transition, WorkflowEngine, WorkflowGraph, WorkflowRun,
};
pub use trace::{ExecutionTrace, TraceEntry};
