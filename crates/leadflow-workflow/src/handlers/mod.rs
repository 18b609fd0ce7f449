//! Node handlers.
//!
//! Each handler is a stateless async function of `(config, context, env)`.
//! Missing CRM records come back as a failed `NodeOutcome`; only storage
//! errors travel as `Err`, and the runner turns those into failed outcomes too.

pub mod actions;
pub mod conditions;

use leadflow_core::config::WorkflowConfig;
use leadflow_core::traits::CrmStore;

/// What handlers may touch while running a node.
#[derive(Clone, Copy)]
pub struct HandlerEnv<'a> {
    pub store: &'a dyn CrmStore,
    pub settings: &'a WorkflowConfig,
}
