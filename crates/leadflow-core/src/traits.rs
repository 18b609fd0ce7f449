use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;
use crate::workflow::Workflow;

/// CRM document store: the collections the workflow runner reads and writes.
///
/// `get_*` lookups return `Ok(None)` for a missing document; `Err` is reserved
/// for storage failures.
pub trait CrmStore: Send + Sync + 'static {
    // workflows
    fn get_workflow(&self, id: &str) -> BoxFuture<'_, Result<Option<Workflow>>>;

    fn insert_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>>;

    fn list_workflows(&self) -> BoxFuture<'_, Result<Vec<Workflow>>>;

    // leads
    fn get_lead(&self, id: &str) -> BoxFuture<'_, Result<Option<Lead>>>;

    fn insert_lead(&self, lead: &Lead) -> BoxFuture<'_, Result<()>>;

    /// Merge `updates` into the lead document. Returns `false` if no lead has this id.
    fn update_lead(&self, id: &str, updates: &JsonMap) -> BoxFuture<'_, Result<bool>>;

    // units
    fn get_unit(&self, id: &str) -> BoxFuture<'_, Result<Option<Unit>>>;

    fn insert_unit(&self, unit: &Unit) -> BoxFuture<'_, Result<()>>;

    // whatsapp
    fn active_whatsapp_config(
        &self,
        unit_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappConfiguration>>>;

    fn insert_whatsapp_config(&self, config: &WhatsappConfiguration) -> BoxFuture<'_, Result<()>>;

    fn insert_whatsapp_message(&self, message: &WhatsappMessage) -> BoxFuture<'_, Result<()>>;

    /// Most recent incoming message for a lead.
    fn latest_incoming_message(
        &self,
        lead_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappMessage>>>;

    /// All incoming messages for a lead, oldest first.
    fn incoming_messages(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>>;

    fn messages_for_lead(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>>;

    // ai conversations
    fn insert_ai_conversation(&self, conversation: &AiConversation) -> BoxFuture<'_, Result<()>>;

    fn conversations_for_lead(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<AiConversation>>>;
}
