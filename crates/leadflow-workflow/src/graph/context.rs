use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadflow_core::types::JsonMap;

/// Result of running one node.
///
/// `proceed` is serialized as `continue`. Failures default to `proceed:
/// true`: a missing record degrades one node, it does not abort the lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub success: bool,
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler-specific output.
    #[serde(flatten)]
    pub data: JsonMap,
}

impl NodeOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            proceed: true,
            error: None,
            data: JsonMap::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            proceed: true,
            error: Some(error.into()),
            data: JsonMap::new(),
        }
    }

    /// Attach an output value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Set whether the run goes on after this node.
    pub fn proceed(mut self, proceed: bool) -> Self {
        self.proceed = proceed;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Per-run state shared between nodes.
///
/// Holds the trigger payload and every node's outcome. Outcomes are
/// write-once: the first result recorded for a node id is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub trigger_data: JsonMap,
    results: HashMap<String, NodeOutcome>,
    execution_order: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, trigger_data: JsonMap) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            trigger_data,
            results: HashMap::new(),
            execution_order: vec![],
            started_at: Utc::now(),
        }
    }

    /// The subject lead, if the trigger payload names one.
    pub fn lead_id(&self) -> Option<&str> {
        self.trigger_data.get("lead_id").and_then(|v| v.as_str())
    }

    /// Record a node's outcome. Returns `false` if the node already has one.
    pub fn record(&mut self, node_id: impl Into<String>, outcome: NodeOutcome) -> bool {
        let node_id = node_id.into();
        if self.results.contains_key(&node_id) {
            return false;
        }
        self.execution_order.push(node_id.clone());
        self.results.insert(node_id, outcome);
        true
    }

    pub fn result(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.results.get(node_id)
    }

    pub fn results(&self) -> &HashMap<String, NodeOutcome> {
        &self.results
    }

    /// Node ids in the order their outcomes were recorded.
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }
}
