use std::collections::{HashMap, HashSet, VecDeque};

use leadflow_core::workflow::{WorkflowEdge, WorkflowNode};

/// Compute the order in which a workflow's nodes run.
///
/// Breadth-first from every trigger node at once, following outgoing edges in
/// edge-list order. Each node id is emitted at most once; the visited set is
/// what breaks cycles and self-loops. Nodes no trigger reaches are left out,
/// as are edges whose target is not a node of the workflow.
///
/// A workflow without any trigger runs every node in its stored order.
pub fn build_execution_order(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Vec<String> {
    let triggers: Vec<&str> = nodes
        .iter()
        .filter(|n| n.is_trigger())
        .map(|n| n.id.as_str())
        .collect();

    if triggers.is_empty() {
        return nodes.iter().map(|n| n.id.clone()).collect();
    }

    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        if known.contains(edge.target.as_str()) {
            outgoing
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for id in triggers {
        if visited.insert(id) {
            queue.push_back(id);
        }
    }

    let mut order = Vec::with_capacity(known.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for &next in outgoing.get(id).into_iter().flatten() {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str) -> WorkflowEdge {
        WorkflowEdge::new(a, b)
    }

    #[test]
    fn test_linear_chain() {
        let nodes = vec![
            WorkflowNode::action("b", "send_whatsapp"),
            WorkflowNode::trigger("a", "lead_created"),
            WorkflowNode::action("c", "update_lead_field"),
        ];
        let edges = vec![edge("b", "c"), edge("a", "b")];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_no_triggers_keeps_stored_order() {
        let nodes = vec![
            WorkflowNode::action("z", "send_whatsapp"),
            WorkflowNode::action("y", "update_lead_field"),
        ];
        let edges = vec![edge("y", "z")];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["z", "y"]);
    }

    #[test]
    fn test_orphans_are_skipped() {
        let nodes = vec![
            WorkflowNode::trigger("t", "lead_created"),
            WorkflowNode::action("a", "assign_to_unit"),
            WorkflowNode::action("orphan", "send_whatsapp"),
        ];
        let edges = vec![edge("t", "a")];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["t", "a"]);
    }

    #[test]
    fn test_diamond_visits_join_once() {
        let nodes = vec![
            WorkflowNode::trigger("t", "lead_created"),
            WorkflowNode::action("l", "send_whatsapp"),
            WorkflowNode::action("r", "assign_to_unit"),
            WorkflowNode::action("j", "update_lead_field"),
        ];
        let edges = vec![
            edge("t", "l"),
            edge("t", "r"),
            edge("l", "j"),
            edge("r", "j"),
        ];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["t", "l", "r", "j"]);
    }

    #[test]
    fn test_cycle_and_self_loop_terminate() {
        let nodes = vec![
            WorkflowNode::trigger("t", "lead_created"),
            WorkflowNode::action("a", "send_whatsapp"),
            WorkflowNode::action("b", "update_lead_field"),
        ];
        let edges = vec![
            edge("t", "a"),
            edge("a", "a"),
            edge("a", "b"),
            edge("b", "t"),
        ];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["t", "a", "b"]);
    }

    #[test]
    fn test_multiple_triggers_interleave() {
        let nodes = vec![
            WorkflowNode::trigger("t1", "lead_created"),
            WorkflowNode::trigger("t2", "message_received"),
            WorkflowNode::action("a1", "assign_to_unit"),
            WorkflowNode::action("a2", "send_whatsapp"),
        ];
        let edges = vec![edge("t1", "a1"), edge("t2", "a2")];
        assert_eq!(
            build_execution_order(&nodes, &edges),
            vec!["t1", "t2", "a1", "a2"]
        );
    }

    #[test]
    fn test_edge_to_unknown_node_ignored() {
        let nodes = vec![WorkflowNode::trigger("t", "lead_created")];
        let edges = vec![edge("t", "ghost")];
        assert_eq!(build_execution_order(&nodes, &edges), vec!["t"]);
    }
}
