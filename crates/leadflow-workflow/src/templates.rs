//! Built-in workflow templates.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::traits::CrmStore;
use leadflow_core::types::JsonMap;
use leadflow_core::workflow::{Workflow, WorkflowEdge, WorkflowNode};

pub const LEAD_QUALIFICATION: &str = "lead_qualification";

/// Catalog entry shown by the workflow picker.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub node_count: usize,
    pub edge_count: usize,
}

pub fn available_templates() -> Vec<TemplateInfo> {
    vec![TemplateInfo {
        id: LEAD_QUALIFICATION,
        name: "Qualificazione Lead Automatica",
        description: "Verifica l'unità del lead, invia un messaggio WhatsApp di benvenuto \
                      e, se il lead risponde positivamente, avvia la qualificazione con \
                      l'assistente AI.",
        category: "lead_management",
        node_count: 6,
        edge_count: 5,
    }]
}

fn object(value: serde_json::Value) -> JsonMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// trigger → assign unit → WhatsApp → positive reply? → AI conversation → update lead
pub fn lead_qualification_template(unit_id: &str) -> Workflow {
    let nodes = vec![
        WorkflowNode::trigger("trigger_1", "lead_created")
            .with_label("Nuovo Lead")
            .at(250.0, 50.0),
        WorkflowNode::action("action_assign", "assign_to_unit")
            .with_label("Assegna a Unità")
            .with_config(object(json!({ "unit_id": unit_id })))
            .at(250.0, 150.0),
        WorkflowNode::action("action_whatsapp", "send_whatsapp")
            .with_label("Invia WhatsApp di Benvenuto")
            .with_config(object(json!({
                "message_template": "Ciao {nome}! Sono l'assistente di {unit_name}. \
                                     Possiamo farti qualche domanda per capire come aiutarti?"
            })))
            .at(250.0, 250.0),
        WorkflowNode::condition("condition_response", "check_positive_response")
            .with_label("Risposta Positiva?")
            .at(250.0, 350.0),
        WorkflowNode::action("action_ai", "start_ai_conversation")
            .with_label("Avvia Conversazione AI")
            .with_config(object(json!({
                "initial_prompt": "Qualifica il lead raccogliendo nome, cognome, email, \
                                   telefono, città ed età."
            })))
            .at(250.0, 450.0),
        WorkflowNode::action("action_update", "update_lead_field")
            .with_label("Aggiorna Stato Lead")
            .with_config(object(json!({
                "updates": { "status": "in_qualificazione", "qualification_bot": true }
            })))
            .at(250.0, 550.0),
    ];

    let edges = vec![
        WorkflowEdge::new("trigger_1", "action_assign").with_id("e1"),
        WorkflowEdge::new("action_assign", "action_whatsapp").with_id("e2"),
        WorkflowEdge::new("action_whatsapp", "condition_response").with_id("e3"),
        WorkflowEdge::new("condition_response", "action_ai")
            .with_id("e4")
            .labeled("SI"),
        WorkflowEdge::new("action_ai", "action_update").with_id("e5"),
    ];

    let now = Utc::now();
    let mut workflow = Workflow::new(
        Uuid::new_v4().to_string(),
        "Qualificazione Lead Automatica",
    )
    .with_nodes(nodes)
    .with_edges(edges);
    workflow.description =
        "Workflow per la qualificazione automatica dei lead via WhatsApp e AI".to_string();
    workflow.unit_id = Some(unit_id.to_string());
    workflow.trigger_type = "lead_created".to_string();
    workflow.metadata = object(json!({
        "template": true,
        "template_id": LEAD_QUALIFICATION,
        "category": "lead_management",
    }));
    workflow.created_at = Some(now);
    workflow.updated_at = Some(now);
    workflow
}

/// Generate a workflow from a catalog template.
pub fn generate(template_id: &str, unit_id: &str) -> Result<Workflow> {
    match template_id {
        LEAD_QUALIFICATION => Ok(lead_qualification_template(unit_id)),
        other => Err(LeadflowError::TemplateNotFound(other.to_string())),
    }
}

/// Generate a template workflow and store it. Returns the new workflow id.
pub async fn install_template(
    store: &dyn CrmStore,
    template_id: &str,
    unit_id: &str,
) -> Result<String> {
    let workflow = generate(template_id, unit_id)?;
    store.insert_workflow(&workflow).await?;
    info!(workflow_id = %workflow.id, template_id, unit_id, "Template installed");
    Ok(workflow.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_execution_order;
    use leadflow_store::SqliteStore;

    #[test]
    fn test_lead_qualification_shape() {
        let wf = lead_qualification_template("u1");
        assert_eq!(wf.nodes.len(), 6);
        assert_eq!(wf.edges.len(), 5);
        assert!(!wf.is_active);
        assert!(!wf.is_published);
        assert_eq!(wf.metadata["template"], true);
        assert_eq!(wf.unit_id.as_deref(), Some("u1"));
        assert_eq!(wf.node("action_assign").unwrap().data.config["unit_id"], "u1");

        let yes_branch = wf.edges.iter().find(|e| e.label.is_some()).unwrap();
        assert_eq!(yes_branch.source, "condition_response");
        assert_eq!(yes_branch.label.as_deref(), Some("SI"));
    }

    #[test]
    fn test_template_runs_every_node_in_chain() {
        let wf = lead_qualification_template("u1");
        assert_eq!(
            build_execution_order(&wf.nodes, &wf.edges),
            vec![
                "trigger_1",
                "action_assign",
                "action_whatsapp",
                "condition_response",
                "action_ai",
                "action_update"
            ]
        );
    }

    #[test]
    fn test_template_ids_are_unique() {
        assert_ne!(
            lead_qualification_template("u1").id,
            lead_qualification_template("u1").id
        );
    }

    #[test]
    fn test_catalog_matches_template() {
        let catalog = available_templates();
        assert_eq!(catalog.len(), 1);
        let wf = generate(catalog[0].id, "u1").unwrap();
        assert_eq!(wf.nodes.len(), catalog[0].node_count);
        assert_eq!(wf.edges.len(), catalog[0].edge_count);
        assert!(matches!(
            generate("nurturing", "u1"),
            Err(LeadflowError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_install_template() {
        let store = SqliteStore::in_memory().unwrap();
        let id = install_template(&store, LEAD_QUALIFICATION, "u9")
            .await
            .unwrap();
        let stored = store.get_workflow(&id).await.unwrap().unwrap();
        assert_eq!(stored.unit_id.as_deref(), Some("u9"));
        assert_eq!(stored.trigger_type, "lead_created");
    }
}
