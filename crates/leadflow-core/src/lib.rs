pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;
pub mod workflow;

pub use config::AppConfig;
pub use error::{LeadflowError, Result};
pub use event::EventBus;
pub use traits::CrmStore;
pub use types::*;
pub use workflow::{NodeData, NodeType, Position, Workflow, WorkflowEdge, WorkflowNode};
