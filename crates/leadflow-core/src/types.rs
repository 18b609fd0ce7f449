use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form JSON object used for extra document fields and field updates.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A CRM lead.
///
/// Only the fields the workflow handlers read are typed; everything else the
/// surrounding CRM stores on the document survives in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Lead {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, nome: impl Into<String>, cognome: impl Into<String>) -> Self {
        self.nome = Some(nome.into());
        self.cognome = Some(cognome.into());
        self
    }

    pub fn with_unit(mut self, unit_id: impl Into<String>) -> Self {
        self.unit_id = Some(unit_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_agent_id = Some(agent_id.into());
        self
    }

    pub fn with_phone(mut self, telefono: impl Into<String>) -> Self {
        self.telefono = Some(telefono.into());
        self
    }
}

/// A business unit leads are routed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    /// AI assistant used for qualification conversations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl Unit {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_welcome_message(mut self, template: impl Into<String>) -> Self {
        self.welcome_message = Some(template.into());
        self
    }
}

/// WhatsApp number configuration of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsappConfiguration {
    pub id: String,
    pub unit_id: String,
    pub phone_number: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Direction of a WhatsApp message relative to the CRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

/// Who authored a WhatsApp message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Bot,
    Lead,
    Agent,
}

/// A stored WhatsApp message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatsappMessage {
    pub id: String,
    pub lead_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub message: String,
    pub direction: MessageDirection,
    pub sender: MessageSender,
    #[serde(default = "default_message_status")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

fn default_message_status() -> String {
    "received".to_string()
}

impl WhatsappMessage {
    /// An inbound message written by the lead.
    pub fn incoming(
        id: impl Into<String>,
        lead_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            lead_id: lead_id.into(),
            unit_id: None,
            phone_number: None,
            message: text.into(),
            direction: MessageDirection::Incoming,
            sender: MessageSender::Lead,
            status: default_message_status(),
            timestamp,
        }
    }
}

/// Status of an AI qualification conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
    Abandoned,
}

/// An AI assistant conversation opened for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConversation {
    pub id: String,
    pub lead_id: String,
    pub unit_id: String,
    pub assistant_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub status: ConversationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Events emitted while a workflow runs.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RunStarted {
        workflow_id: String,
        node_count: usize,
    },
    NodeCompleted {
        workflow_id: String,
        node_id: String,
        success: bool,
        proceed: bool,
    },
    RunFinished {
        workflow_id: String,
        executed_nodes: usize,
        success: bool,
    },
}
