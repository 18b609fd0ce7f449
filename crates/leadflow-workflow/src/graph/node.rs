use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::types::JsonMap;
use leadflow_core::workflow::{NodeType, WorkflowNode};

/// Resolved, typed form of a workflow node.
///
/// The editor stores nodes as `(nodeType, nodeSubtype, config)`; resolving
/// turns that triple into one of the handlers the runner knows, with its
/// configuration decoded. Anything else lands in `Unsupported`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Trigger { subtype: String },
    Action(Action),
    Condition(Condition),
    Unsupported { node_type: NodeType, subtype: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AssignToUnit(AssignToUnitConfig),
    SendWhatsapp(SendWhatsappConfig),
    StartAiConversation(StartAiConversationConfig),
    UpdateLeadField(UpdateLeadFieldConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    CheckPositiveResponse(PositiveResponseConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignToUnitConfig {
    /// Unit the workflow author expects the lead to be in.
    #[serde(default)]
    pub unit_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendWhatsappConfig {
    #[serde(default)]
    pub message_template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartAiConversationConfig {
    #[serde(default)]
    pub initial_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateLeadFieldConfig {
    #[serde(default)]
    pub updates: JsonMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositiveResponseConfig {
    /// Per-node keyword list, replacing the configured default.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl NodeKind {
    /// Resolve a stored node into its typed kind.
    ///
    /// Fails only when a known subtype carries a config that does not decode.
    pub fn resolve(node: &WorkflowNode) -> Result<Self> {
        let subtype = node.data.node_subtype.as_str();
        let kind = match (&node.data.node_type, subtype) {
            (NodeType::Triggers, _) => NodeKind::Trigger {
                subtype: subtype.to_string(),
            },
            (NodeType::Actions, "assign_to_unit") => {
                NodeKind::Action(Action::AssignToUnit(decode(node)?))
            }
            (NodeType::Actions, "send_whatsapp") => {
                NodeKind::Action(Action::SendWhatsapp(decode(node)?))
            }
            (NodeType::Actions, "start_ai_conversation") => {
                NodeKind::Action(Action::StartAiConversation(decode(node)?))
            }
            (NodeType::Actions, "update_lead_field") => {
                NodeKind::Action(Action::UpdateLeadField(decode(node)?))
            }
            (NodeType::Conditions, "check_positive_response") => {
                NodeKind::Condition(Condition::CheckPositiveResponse(decode(node)?))
            }
            (node_type, _) => NodeKind::Unsupported {
                node_type: node_type.clone(),
                subtype: subtype.to_string(),
            },
        };
        Ok(kind)
    }
}

fn decode<T: DeserializeOwned>(node: &WorkflowNode) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(node.data.config.clone())).map_err(|e| {
        LeadflowError::InvalidNodeConfig {
            node_id: node.id.clone(),
            message: e.to_string(),
        }
    })
}
