//! Workflow graph execution.
//!
//! A stored workflow is a list of editor nodes plus edges. The runner orders
//! the nodes breadth-first from the triggers, resolves each into a typed
//! `NodeKind`, and runs them one after another against a shared
//! `ExecutionContext`.

pub mod context;
pub mod executor;
pub mod node;
pub mod order;

pub use context::{ExecutionContext, NodeOutcome};
pub use executor::{WorkflowExecutor, WorkflowRunResult};
pub use node::{Action, Condition, NodeKind};
pub use order::build_execution_order;
