use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::JsonMap;

/// A workflow document as stored in the `workflows` collection.
///
/// Authored in the visual editor or generated from a template; the runner
/// only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Business unit the workflow is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default = "default_trigger_type")]
    pub trigger_type: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_trigger_type() -> String {
    "manual".to_string()
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            unit_id: None,
            nodes: vec![],
            edges: vec![],
            trigger_type: default_trigger_type(),
            is_active: false,
            is_published: false,
            version: default_version(),
            metadata: JsonMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<WorkflowNode>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_edges(mut self, edges: Vec<WorkflowEdge>) -> Self {
        self.edges = edges;
        self
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Canvas position of a node in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Coarse node category. Categories the runner has no handlers for keep
/// their stored name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Triggers,
    Actions,
    Conditions,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Triggers => "triggers",
            Self::Actions => "actions",
            Self::Conditions => "conditions",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for NodeType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "triggers" => Self::Triggers,
            "actions" => Self::Actions,
            "conditions" => Self::Conditions,
            _ => Self::Other(raw),
        }
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

/// Editor payload of a node: category, subtype and free-form configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "nodeType")]
    pub node_type: NodeType,
    #[serde(rename = "nodeSubtype", default)]
    pub node_subtype: String,
    #[serde(default)]
    pub config: JsonMap,
}

/// A node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    /// Editor component used to render the node.
    #[serde(rename = "type", default = "default_editor_type")]
    pub editor_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub data: NodeData,
}

fn default_editor_type() -> String {
    "custom".to_string()
}

impl WorkflowNode {
    fn with_type(id: impl Into<String>, node_type: NodeType, subtype: impl Into<String>) -> Self {
        let subtype = subtype.into();
        Self {
            id: id.into(),
            editor_type: default_editor_type(),
            position: None,
            data: NodeData {
                label: subtype.clone(),
                node_type,
                node_subtype: subtype,
                config: JsonMap::new(),
            },
        }
    }

    pub fn trigger(id: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self::with_type(id, NodeType::Triggers, subtype)
    }

    pub fn action(id: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self::with_type(id, NodeType::Actions, subtype)
    }

    pub fn condition(id: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self::with_type(id, NodeType::Conditions, subtype)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = label.into();
        self
    }

    pub fn with_config(mut self, config: JsonMap) -> Self {
        self.data.config = config;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    pub fn is_trigger(&self) -> bool {
        self.data.node_type == NodeType::Triggers
    }
}

/// A directed edge between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// Branch label, e.g. "SI" on the positive branch of a condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e_{}_{}", source, target),
            source,
            target,
            label: None,
            edge_type: None,
            animated: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
