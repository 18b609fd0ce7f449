use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use leadflow_core::config::WorkflowConfig;
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::event::EventBus;
use leadflow_core::traits::CrmStore;
use leadflow_core::types::{JsonMap, WorkflowEvent};
use leadflow_core::workflow::{Workflow, WorkflowNode};

use super::context::{ExecutionContext, NodeOutcome};
use super::node::{Action, Condition, NodeKind};
use super::order::build_execution_order;
use crate::handlers::{actions, conditions, HandlerEnv};

/// Result of one workflow run.
///
/// `success` only says the workflow was loaded and walked; individual node
/// failures live in the context results.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRunResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
    pub executed_nodes: usize,
    /// Node whose outcome asked the run to stop, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    pub elapsed_ms: u64,
}

impl WorkflowRunResult {
    fn failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            context: None,
            executed_nodes: 0,
            stopped_at: None,
            elapsed_ms,
        }
    }
}

/// Runs stored workflows against a CRM store.
///
/// Nodes run one at a time in breadth-first order from the triggers. Every
/// node produces an outcome, errors included; only an outcome with
/// `continue: false` ends the run early.
pub struct WorkflowExecutor {
    store: Arc<dyn CrmStore>,
    settings: WorkflowConfig,
    events: Option<Arc<EventBus>>,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self {
            store,
            settings: WorkflowConfig::default(),
            events: None,
        }
    }

    pub fn with_settings(mut self, settings: WorkflowConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Publish run and node events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Load `workflow_id` and run it with `trigger_data` (usually
    /// `{"lead_id": ...}`). Never fails; problems are reported in the result.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        trigger_data: JsonMap,
    ) -> WorkflowRunResult {
        let start = Instant::now();

        let workflow = match self.load(workflow_id).await {
            Ok(wf) => wf,
            Err(e) => {
                error!(workflow_id, error = %e, "Workflow run aborted");
                return WorkflowRunResult::failed(e.to_string(), elapsed(start));
            }
        };

        let order = build_execution_order(&workflow.nodes, &workflow.edges);
        info!(
            workflow_id,
            name = %workflow.name,
            nodes = order.len(),
            "Workflow run started"
        );
        self.publish(WorkflowEvent::RunStarted {
            workflow_id: workflow_id.to_string(),
            node_count: order.len(),
        });

        let mut ctx = ExecutionContext::new(workflow_id, trigger_data);
        let mut stopped_at = None;

        for node_id in &order {
            let Some(node) = workflow.node(node_id) else {
                continue;
            };
            if ctx.result(node_id).is_some() {
                warn!(workflow_id, node_id = %node_id, "Duplicate node id, skipped");
                continue;
            }

            let node_start = Instant::now();
            let outcome = self.run_node(node, &ctx).await;
            let (success, proceed) = (outcome.success, outcome.proceed);
            debug!(
                workflow_id,
                node_id = %node_id,
                success,
                proceed,
                elapsed_ms = elapsed(node_start),
                "Node finished"
            );

            ctx.record(node_id.clone(), outcome);
            self.publish(WorkflowEvent::NodeCompleted {
                workflow_id: workflow_id.to_string(),
                node_id: node_id.clone(),
                success,
                proceed,
            });

            if !proceed {
                info!(workflow_id, node_id = %node_id, "Node stopped the run");
                stopped_at = Some(node_id.clone());
                break;
            }
        }

        let executed_nodes = ctx.results().len();
        info!(
            workflow_id,
            executed_nodes,
            elapsed_ms = elapsed(start),
            "Workflow run finished"
        );
        self.publish(WorkflowEvent::RunFinished {
            workflow_id: workflow_id.to_string(),
            executed_nodes,
            success: true,
        });

        WorkflowRunResult {
            success: true,
            error: None,
            context: Some(ctx),
            executed_nodes,
            stopped_at,
            elapsed_ms: elapsed(start),
        }
    }

    async fn load(&self, workflow_id: &str) -> Result<Workflow> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| LeadflowError::NotFound {
                kind: "Workflow",
                id: workflow_id.to_string(),
            })
    }

    /// Run one node, folding any error into a failed outcome.
    async fn run_node(&self, node: &WorkflowNode, ctx: &ExecutionContext) -> NodeOutcome {
        match self.dispatch(node, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Node failed");
                NodeOutcome::failed(e.to_string())
            }
        }
    }

    async fn dispatch(&self, node: &WorkflowNode, ctx: &ExecutionContext) -> Result<NodeOutcome> {
        let env = HandlerEnv {
            store: self.store.as_ref(),
            settings: &self.settings,
        };
        match NodeKind::resolve(node)? {
            NodeKind::Trigger { subtype } => Ok(NodeOutcome::ok().with("trigger", subtype)),
            NodeKind::Action(action) => match action {
                Action::AssignToUnit(cfg) => actions::assign_to_unit(&cfg, ctx, &env).await,
                Action::SendWhatsapp(cfg) => actions::send_whatsapp(&cfg, ctx, &env).await,
                Action::StartAiConversation(cfg) => {
                    actions::start_ai_conversation(&cfg, ctx, &env).await
                }
                Action::UpdateLeadField(cfg) => actions::update_lead_field(&cfg, ctx, &env).await,
            },
            NodeKind::Condition(Condition::CheckPositiveResponse(cfg)) => {
                conditions::check_positive_response(&cfg, ctx, &env).await
            }
            NodeKind::Unsupported { node_type, subtype } => Ok(NodeOutcome::failed(format!(
                "Unsupported node: {}/{}",
                node_type.as_str(),
                subtype
            ))),
        }
    }
}

fn elapsed(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
