//! End-to-end runs of the lead qualification template against a seeded store.

use std::sync::Arc;

use serde_json::json;

use leadflow_core::traits::CrmStore;
use leadflow_core::types::{JsonMap, Lead, MessageDirection, Unit};
use leadflow_store::SqliteStore;
use leadflow_test_utils as fixtures;
use leadflow_workflow::templates::LEAD_QUALIFICATION;
use leadflow_workflow::{
    apply_extracted_fields, install_template, AiResponseParser, WorkflowExecutor,
};

fn trigger(lead_id: &str) -> JsonMap {
    let mut data = JsonMap::new();
    data.insert("lead_id".into(), json!(lead_id));
    data
}

async fn installed(store: &SqliteStore) -> String {
    install_template(store, LEAD_QUALIFICATION, fixtures::UNIT_ID)
        .await
        .expect("install template")
}

#[tokio::test]
async fn test_positive_reply_runs_whole_template() {
    let store = Arc::new(fixtures::seeded_store().await);
    let workflow_id = installed(&store).await;
    fixtures::lead_replies(&store, "m1", "Sì, certo!", 1).await;

    let result = WorkflowExecutor::new(store.clone())
        .execute_workflow(&workflow_id, trigger(fixtures::LEAD_ID))
        .await;

    assert!(result.success);
    assert_eq!(result.executed_nodes, 6);
    assert!(result.stopped_at.is_none());
    let ctx = result.context.expect("context");
    assert_eq!(ctx.results().len(), result.executed_nodes);
    assert!(ctx.results().values().all(|o| o.success));

    let welcome = ctx.result("action_whatsapp").unwrap();
    assert_eq!(
        welcome.get_str("message"),
        Some(
            "Ciao Mario! Sono l'assistente di Roma Centro. \
             Possiamo farti qualche domanda per capire come aiutarti?"
        )
    );

    let messages = store.messages_for_lead(fixtures::LEAD_ID).await.unwrap();
    assert_eq!(messages.len(), 2);
    let outgoing = messages
        .iter()
        .find(|m| m.direction == MessageDirection::Outgoing)
        .unwrap();
    assert_eq!(outgoing.status, "sent");
    assert!(outgoing.id.starts_with("msg_l1_"));

    let conversations = store.conversations_for_lead(fixtures::LEAD_ID).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].assistant_id, fixtures::ASSISTANT_ID);

    let lead = store.get_lead(fixtures::LEAD_ID).await.unwrap().unwrap();
    assert_eq!(lead.status.as_deref(), Some("in_qualificazione"));
    assert_eq!(lead.extra["qualification_bot"], json!(true));
}

#[tokio::test]
async fn test_no_reply_stops_after_welcome() {
    let store = Arc::new(fixtures::seeded_store().await);
    let workflow_id = installed(&store).await;

    let result = WorkflowExecutor::new(store.clone())
        .execute_workflow(&workflow_id, trigger(fixtures::LEAD_ID))
        .await;

    assert!(result.success);
    assert_eq!(result.executed_nodes, 4);
    assert_eq!(result.stopped_at.as_deref(), Some("condition_response"));

    let ctx = result.context.unwrap();
    let check = ctx.result("condition_response").unwrap();
    assert_eq!(check.get_str("reason"), Some("No response from lead"));
    assert!(ctx.result("action_ai").is_none());
    assert!(store
        .conversations_for_lead(fixtures::LEAD_ID)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_lead_without_unit_degrades_each_node() {
    let store = Arc::new(fixtures::seeded_store().await);
    store
        .insert_lead(&Lead::new("l2").with_name("Anna", "Bianchi"))
        .await
        .unwrap();
    let workflow_id = installed(&store).await;

    let result = WorkflowExecutor::new(store.clone())
        .execute_workflow(&workflow_id, trigger("l2"))
        .await;

    let ctx = result.context.unwrap();
    for node in ["action_assign", "action_whatsapp"] {
        let outcome = ctx.result(node).unwrap();
        assert!(!outcome.success);
        assert!(outcome.proceed);
        assert_eq!(outcome.error.as_deref(), Some("Lead has no unit assigned"));
    }
    assert_eq!(result.executed_nodes, 4);
    assert!(store.messages_for_lead("l2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_assistant_does_not_block_update() {
    let store = Arc::new(fixtures::seeded_store().await);
    store
        .insert_unit(
            &Unit::new(fixtures::UNIT_ID, "Roma Centro")
                .with_welcome_message("Benvenuto {nome} {cognome} da {unit_name}"),
        )
        .await
        .unwrap();
    let workflow_id = installed(&store).await;
    fixtures::lead_replies(&store, "m1", "ok", 1).await;

    let result = WorkflowExecutor::new(store.clone())
        .execute_workflow(&workflow_id, trigger(fixtures::LEAD_ID))
        .await;

    assert_eq!(result.executed_nodes, 6);
    let ctx = result.context.unwrap();
    assert_eq!(
        ctx.result("action_whatsapp").unwrap().get_str("message"),
        Some("Benvenuto Mario Rossi da Roma Centro")
    );
    assert_eq!(
        ctx.result("action_ai").unwrap().error.as_deref(),
        Some("Unit has no AI assistant configured")
    );
    assert!(ctx.result("action_update").unwrap().success);
}

#[tokio::test]
async fn test_extracted_fields_reach_the_lead() {
    let store = fixtures::seeded_store().await;
    fixtures::lead_replies(&store, "m1", "Mi chiamo Mario", 3).await;
    fixtures::lead_replies(&store, "m2", "abito a Roma, ho 30 anni", 1).await;

    let messages = store.incoming_messages(fixtures::LEAD_ID).await.unwrap();
    let fields = AiResponseParser::extract_from_conversation(&messages);
    assert!(apply_extracted_fields(&store, fixtures::LEAD_ID, &fields)
        .await
        .unwrap());

    let lead = store.get_lead(fixtures::LEAD_ID).await.unwrap().unwrap();
    assert_eq!(lead.extra["citta"], json!("Roma"));
    assert_eq!(lead.extra["eta"], json!("30"));
    assert!(!apply_extracted_fields(&store, "nobody", &fields).await.unwrap());
}
