//! Shared fixtures for leadflow tests: seeded stores and a store that fails
//! every lookup except the workflow load.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::traits::CrmStore;
use leadflow_core::types::*;
use leadflow_core::workflow::{Workflow, WorkflowEdge, WorkflowNode};
use leadflow_store::SqliteStore;

pub const UNIT_ID: &str = "u1";
pub const LEAD_ID: &str = "l1";
pub const ASSISTANT_ID: &str = "asst_roma";

pub fn unit() -> Unit {
    Unit::new(UNIT_ID, "Roma Centro").with_assistant(ASSISTANT_ID)
}

pub fn lead() -> Lead {
    Lead::new(LEAD_ID)
        .with_name("Mario", "Rossi")
        .with_phone("+393331234567")
        .with_unit(UNIT_ID)
        .with_agent("agent_7")
}

pub fn whatsapp_config() -> WhatsappConfiguration {
    WhatsappConfiguration {
        id: "wa_u1".into(),
        unit_id: UNIT_ID.into(),
        phone_number: "+390612345678".into(),
        is_active: true,
        welcome_message: None,
    }
}

/// In-memory store with one unit, its active WhatsApp number and one lead
/// assigned to it.
pub async fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("in-memory store");
    store.insert_unit(&unit()).await.expect("seed unit");
    store.insert_lead(&lead()).await.expect("seed lead");
    store
        .insert_whatsapp_config(&whatsapp_config())
        .await
        .expect("seed whatsapp config");
    store
}

/// Store an incoming message from the seeded lead, `minutes_ago` in the past.
pub async fn lead_replies(store: &SqliteStore, id: &str, text: &str, minutes_ago: i64) {
    let at: DateTime<Utc> = Utc::now() - Duration::minutes(minutes_ago);
    store
        .insert_whatsapp_message(&WhatsappMessage::incoming(id, LEAD_ID, text, at))
        .await
        .expect("seed message");
}

/// trigger → action, the smallest runnable graph.
pub fn two_node_workflow(id: &str, action_subtype: &str) -> Workflow {
    Workflow::new(id, "Two nodes")
        .with_nodes(vec![
            WorkflowNode::trigger("trigger_A", "lead_created"),
            WorkflowNode::action("action_B", action_subtype),
        ])
        .with_edges(vec![WorkflowEdge::new("trigger_A", "action_B")])
}

/// A store whose every call after `get_workflow` fails with a database error.
pub struct FailingStore {
    pub workflow: Workflow,
}

impl FailingStore {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow }
    }
}

fn unavailable<T: Send + 'static>() -> BoxFuture<'static, Result<T>> {
    Box::pin(async { Err(LeadflowError::Database("connection refused".into())) })
}

impl CrmStore for FailingStore {
    fn get_workflow(&self, id: &str) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let found = (self.workflow.id == id).then(|| self.workflow.clone());
        Box::pin(async move { Ok(found) })
    }

    fn insert_workflow(&self, _workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn list_workflows(&self) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        unavailable()
    }

    fn get_lead(&self, _id: &str) -> BoxFuture<'_, Result<Option<Lead>>> {
        unavailable()
    }

    fn insert_lead(&self, _lead: &Lead) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn update_lead(&self, _id: &str, _updates: &JsonMap) -> BoxFuture<'_, Result<bool>> {
        unavailable()
    }

    fn get_unit(&self, _id: &str) -> BoxFuture<'_, Result<Option<Unit>>> {
        unavailable()
    }

    fn insert_unit(&self, _unit: &Unit) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn active_whatsapp_config(
        &self,
        _unit_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappConfiguration>>> {
        unavailable()
    }

    fn insert_whatsapp_config(&self, _config: &WhatsappConfiguration) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn insert_whatsapp_message(&self, _message: &WhatsappMessage) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn latest_incoming_message(
        &self,
        _lead_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappMessage>>> {
        unavailable()
    }

    fn incoming_messages(&self, _lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>> {
        unavailable()
    }

    fn messages_for_lead(&self, _lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>> {
        unavailable()
    }

    fn insert_ai_conversation(&self, _conversation: &AiConversation) -> BoxFuture<'_, Result<()>> {
        unavailable()
    }

    fn conversations_for_lead(&self, _lead_id: &str) -> BoxFuture<'_, Result<Vec<AiConversation>>> {
        unavailable()
    }
}
