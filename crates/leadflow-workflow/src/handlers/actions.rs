use chrono::Utc;
use tracing::{debug, info, warn};

use leadflow_core::error::Result;
use leadflow_core::types::{
    AiConversation, ConversationStatus, Lead, MessageDirection, MessageSender, Unit,
    WhatsappMessage,
};

use super::HandlerEnv;
use crate::graph::context::{ExecutionContext, NodeOutcome};
use crate::graph::node::{
    AssignToUnitConfig, SendWhatsappConfig, StartAiConversationConfig, UpdateLeadFieldConfig,
};

pub const LEAD_NOT_FOUND: &str = "Lead not found";
pub const LEAD_WITHOUT_UNIT: &str = "Lead has no unit assigned";
pub const UNIT_NOT_FOUND: &str = "Unit not found";
pub const NO_ACTIVE_WHATSAPP: &str = "No active WhatsApp configuration for unit";
pub const NO_ASSISTANT: &str = "Unit has no AI assistant configured";

async fn load_lead(ctx: &ExecutionContext, env: &HandlerEnv<'_>) -> Result<Option<Lead>> {
    match ctx.lead_id() {
        Some(id) => env.store.get_lead(id).await,
        None => Ok(None),
    }
}

/// The subject lead and its unit, or the outcome naming the missing link.
async fn lead_with_unit(
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<std::result::Result<(Lead, Unit), NodeOutcome>> {
    let Some(lead) = load_lead(ctx, env).await? else {
        return Ok(Err(NodeOutcome::failed(LEAD_NOT_FOUND)));
    };
    let Some(unit_id) = lead.unit_id.clone() else {
        return Ok(Err(NodeOutcome::failed(LEAD_WITHOUT_UNIT)));
    };
    let Some(unit) = env.store.get_unit(&unit_id).await? else {
        return Ok(Err(NodeOutcome::failed(UNIT_NOT_FOUND)));
    };
    Ok(Ok((lead, unit)))
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

/// Fill `{nome}`, `{cognome}` and `{unit_name}` in a welcome template.
pub fn render_welcome(template: &str, lead: &Lead, unit: &Unit) -> String {
    template
        .replace("{nome}", lead.nome.as_deref().unwrap_or_default())
        .replace("{cognome}", lead.cognome.as_deref().unwrap_or_default())
        .replace("{unit_name}", &unit.name)
}

/// Confirm the lead already sits in a unit. Assignment itself happens
/// upstream; this only reports the unit and the lead's agent.
pub async fn assign_to_unit(
    config: &AssignToUnitConfig,
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<NodeOutcome> {
    let (lead, unit) = match lead_with_unit(ctx, env).await? {
        Ok(found) => found,
        Err(missing) => return Ok(missing),
    };

    if let Some(expected) = config.unit_id.as_deref() {
        if expected != unit.id {
            warn!(
                lead_id = %lead.id,
                expected_unit = expected,
                actual_unit = %unit.id,
                "Lead is in a different unit than the workflow expects"
            );
        }
    }

    info!(lead_id = %lead.id, unit_id = %unit.id, "Lead unit verified");
    Ok(NodeOutcome::ok()
        .with("unit_id", unit.id)
        .with("unit_name", unit.name)
        .with("agent_id", lead.assigned_agent_id))
}

/// Send the unit's welcome message to the lead over WhatsApp.
///
/// The message is recorded as sent; there is no delivery tracking.
pub async fn send_whatsapp(
    config: &SendWhatsappConfig,
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<NodeOutcome> {
    let (lead, unit) = match lead_with_unit(ctx, env).await? {
        Ok(found) => found,
        Err(missing) => return Ok(missing),
    };
    let Some(whatsapp) = env.store.active_whatsapp_config(&unit.id).await? else {
        return Ok(NodeOutcome::failed(NO_ACTIVE_WHATSAPP));
    };

    let template = non_empty(&unit.welcome_message)
        .or_else(|| non_empty(&whatsapp.welcome_message))
        .or_else(|| non_empty(&config.message_template))
        .unwrap_or(env.settings.default_message_template.as_str());
    let text = render_welcome(template, &lead, &unit);

    let now = Utc::now();
    let message = WhatsappMessage {
        id: format!("msg_{}_{}", lead.id, now.timestamp_micros()),
        lead_id: lead.id.clone(),
        unit_id: Some(unit.id.clone()),
        phone_number: lead.telefono.clone(),
        message: text,
        direction: MessageDirection::Outgoing,
        sender: MessageSender::Bot,
        status: "sent".to_string(),
        timestamp: now,
    };
    env.store.insert_whatsapp_message(&message).await?;

    info!(lead_id = %lead.id, message_id = %message.id, "Welcome message sent");
    Ok(NodeOutcome::ok()
        .with("message_id", message.id)
        .with("message", message.message)
        .with("phone_number", lead.telefono)
        .with("from_number", whatsapp.phone_number))
}

/// Open a conversation between the lead and the unit's AI assistant.
pub async fn start_ai_conversation(
    config: &StartAiConversationConfig,
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<NodeOutcome> {
    let (lead, unit) = match lead_with_unit(ctx, env).await? {
        Ok(found) => found,
        Err(missing) => return Ok(missing),
    };
    let Some(assistant_id) = non_empty(&unit.assistant_id).map(str::to_string) else {
        return Ok(NodeOutcome::failed(NO_ASSISTANT));
    };

    let now = Utc::now();
    let conversation = AiConversation {
        id: format!("conv_{}_{}", lead.id, now.timestamp_micros()),
        lead_id: lead.id.clone(),
        unit_id: unit.id.clone(),
        assistant_id,
        thread_id: None,
        status: ConversationStatus::Active,
        initial_prompt: config.initial_prompt.clone(),
        created_at: now,
    };
    env.store.insert_ai_conversation(&conversation).await?;

    info!(
        lead_id = %lead.id,
        conversation_id = %conversation.id,
        "AI conversation started"
    );
    Ok(NodeOutcome::ok()
        .with("conversation_id", conversation.id)
        .with("assistant_id", conversation.assistant_id))
}

/// Write the node's `updates` map straight onto the lead document.
pub async fn update_lead_field(
    config: &UpdateLeadFieldConfig,
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<NodeOutcome> {
    if config.updates.is_empty() {
        debug!("No lead fields to update");
        return Ok(NodeOutcome::ok().with("no_updates", true));
    }
    let Some(lead_id) = ctx.lead_id() else {
        return Ok(NodeOutcome::failed(LEAD_NOT_FOUND));
    };
    if !env.store.update_lead(lead_id, &config.updates).await? {
        return Ok(NodeOutcome::failed(LEAD_NOT_FOUND));
    }

    let fields: Vec<String> = config.updates.keys().cloned().collect();
    info!(lead_id, fields = ?fields, "Lead fields updated");
    Ok(NodeOutcome::ok().with("updated_fields", fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::config::WorkflowConfig;
    use leadflow_core::traits::CrmStore;
    use leadflow_core::types::JsonMap;
    use leadflow_store::SqliteStore;
    use leadflow_test_utils as fixtures;
    use serde_json::json;

    fn ctx_for(lead_id: &str) -> ExecutionContext {
        let mut data = JsonMap::new();
        data.insert("lead_id".into(), json!(lead_id));
        ExecutionContext::new("wf", data)
    }

    fn env<'a>(store: &'a SqliteStore, settings: &'a WorkflowConfig) -> HandlerEnv<'a> {
        HandlerEnv { store, settings }
    }

    #[test]
    fn test_render_welcome() {
        let lead = Lead::new("l").with_name("Anna", "Bianchi");
        let unit = Unit::new("u", "Milano Nord");
        assert_eq!(
            render_welcome("Ciao {nome} {cognome}, qui {unit_name}", &lead, &unit),
            "Ciao Anna Bianchi, qui Milano Nord"
        );
        // missing fields render empty
        assert_eq!(render_welcome("Ciao {nome}!", &Lead::new("x"), &unit), "Ciao !");
    }

    #[tokio::test]
    async fn test_assign_to_unit_reports_unit_and_agent() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let outcome = assign_to_unit(
            &AssignToUnitConfig::default(),
            &ctx_for(fixtures::LEAD_ID),
            &env(&store, &settings),
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert!(outcome.proceed);
        assert_eq!(outcome.get_str("unit_id"), Some(fixtures::UNIT_ID));
        assert_eq!(outcome.get_str("unit_name"), Some("Roma Centro"));
        assert_eq!(outcome.get_str("agent_id"), Some("agent_7"));
    }

    #[tokio::test]
    async fn test_assign_to_unit_missing_links() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let env = env(&store, &settings);
        let cfg = AssignToUnitConfig::default();

        let outcome = assign_to_unit(&cfg, &ctx_for("ghost"), &env).await.unwrap();
        assert_eq!(outcome, NodeOutcome::failed(LEAD_NOT_FOUND));

        store.insert_lead(&Lead::new("l-free")).await.unwrap();
        let outcome = assign_to_unit(&cfg, &ctx_for("l-free"), &env).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some(LEAD_WITHOUT_UNIT));
        assert!(outcome.proceed);

        store
            .insert_lead(&Lead::new("l-stale").with_unit("u-deleted"))
            .await
            .unwrap();
        let outcome = assign_to_unit(&cfg, &ctx_for("l-stale"), &env).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some(UNIT_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_send_whatsapp_uses_default_template() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let outcome = send_whatsapp(
            &SendWhatsappConfig::default(),
            &ctx_for(fixtures::LEAD_ID),
            &env(&store, &settings),
        )
        .await
        .unwrap();

        assert!(outcome.success, "{:?}", outcome.error);
        let text = outcome.get_str("message").unwrap();
        assert!(text.starts_with("Ciao Mario!"));
        assert!(text.contains("Roma Centro"));
        assert!(outcome
            .get_str("message_id")
            .unwrap()
            .starts_with("msg_l1_"));

        let stored = store.messages_for_lead(fixtures::LEAD_ID).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender, MessageSender::Bot);
        assert_eq!(stored[0].direction, MessageDirection::Outgoing);
        assert_eq!(stored[0].status, "sent");
        assert_eq!(stored[0].phone_number.as_deref(), Some("+393331234567"));
    }

    #[tokio::test]
    async fn test_send_whatsapp_template_precedence() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let env = env(&store, &settings);
        let node_cfg = SendWhatsappConfig {
            message_template: Some("Nodo: {nome}".into()),
        };

        // node template beats the built-in default
        let outcome = send_whatsapp(&node_cfg, &ctx_for(fixtures::LEAD_ID), &env)
            .await
            .unwrap();
        assert_eq!(outcome.get_str("message"), Some("Nodo: Mario"));

        // whatsapp configuration beats the node
        let mut wa = fixtures::whatsapp_config();
        wa.welcome_message = Some("Numero: {cognome}".into());
        store.insert_whatsapp_config(&wa).await.unwrap();
        let outcome = send_whatsapp(&node_cfg, &ctx_for(fixtures::LEAD_ID), &env)
            .await
            .unwrap();
        assert_eq!(outcome.get_str("message"), Some("Numero: Rossi"));

        // unit beats everything
        store
            .insert_unit(&fixtures::unit().with_welcome_message("Unità: {unit_name}"))
            .await
            .unwrap();
        let outcome = send_whatsapp(&node_cfg, &ctx_for(fixtures::LEAD_ID), &env)
            .await
            .unwrap();
        assert_eq!(outcome.get_str("message"), Some("Unità: Roma Centro"));
    }

    #[tokio::test]
    async fn test_send_whatsapp_without_active_config() {
        let store = fixtures::seeded_store().await;
        let mut wa = fixtures::whatsapp_config();
        wa.is_active = false;
        store.insert_whatsapp_config(&wa).await.unwrap();

        let settings = WorkflowConfig::default();
        let outcome = send_whatsapp(
            &SendWhatsappConfig::default(),
            &ctx_for(fixtures::LEAD_ID),
            &env(&store, &settings),
        )
        .await
        .unwrap();
        assert_eq!(outcome, NodeOutcome::failed(NO_ACTIVE_WHATSAPP));
        assert!(store
            .messages_for_lead(fixtures::LEAD_ID)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_start_ai_conversation() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let cfg = StartAiConversationConfig {
            initial_prompt: Some("Qualifica il lead".into()),
        };
        let ctx = ctx_for(fixtures::LEAD_ID);
        let outcome = start_ai_conversation(&cfg, &ctx, &env(&store, &settings))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.get_str("assistant_id"), Some(fixtures::ASSISTANT_ID));

        let convs = store.conversations_for_lead(fixtures::LEAD_ID).await.unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].status, ConversationStatus::Active);
        assert_eq!(convs[0].initial_prompt.as_deref(), Some("Qualifica il lead"));
        assert!(convs[0].id.starts_with("conv_l1_"));
    }

    #[tokio::test]
    async fn test_start_ai_conversation_without_assistant() {
        let store = fixtures::seeded_store().await;
        store
            .insert_unit(&Unit::new(fixtures::UNIT_ID, "Roma Centro"))
            .await
            .unwrap();
        let settings = WorkflowConfig::default();
        let outcome = start_ai_conversation(
            &StartAiConversationConfig::default(),
            &ctx_for(fixtures::LEAD_ID),
            &env(&store, &settings),
        )
        .await
        .unwrap();
        assert_eq!(outcome, NodeOutcome::failed(NO_ASSISTANT));
    }

    #[tokio::test]
    async fn test_update_lead_field() {
        let store = fixtures::seeded_store().await;
        let settings = WorkflowConfig::default();
        let env = env(&store, &settings);

        let outcome = update_lead_field(
            &UpdateLeadFieldConfig::default(),
            &ctx_for(fixtures::LEAD_ID),
            &env,
        )
        .await
        .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.get("no_updates"), Some(&json!(true)));

        let cfg = UpdateLeadFieldConfig {
            updates: json!({"status": "in_qualifica", "qualification_started": true})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let outcome = update_lead_field(&cfg, &ctx_for(fixtures::LEAD_ID), &env)
            .await
            .unwrap();
        assert!(outcome.success);

        let lead = store.get_lead(fixtures::LEAD_ID).await.unwrap().unwrap();
        assert_eq!(lead.status.as_deref(), Some("in_qualifica"));
        assert_eq!(lead.extra["qualification_started"], true);

        let outcome = update_lead_field(&cfg, &ctx_for("ghost"), &env).await.unwrap();
        assert_eq!(outcome, NodeOutcome::failed(LEAD_NOT_FOUND));
    }
}
