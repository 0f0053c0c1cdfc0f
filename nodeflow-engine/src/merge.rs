//! Reassembly of composite-node children (loop iterations, batch items).

use std::collections::{BTreeMap, HashSet};

use nodeflow_dto::dto::{NodeExecution, NodeStatus, TokenUsage};
use tracing::warn;

/// Merges the per-index executions of one inner node into a single logical
/// execution. Pure and independent of how the caller collected the children.
///
/// Base fields come from the lowest index. Duration is the maximum, tokens the
/// sum (absent when no child reported any), status is Failed if any child
/// failed, else Running if any is still running, else Success.
pub fn merge_composite_inner_nodes(
    children: &BTreeMap<i32, NodeExecution>,
) -> Option<NodeExecution> {
    let (_, base) = children.iter().next()?;
    let max_index = children.keys().copied().max().unwrap_or(0).max(0) as usize;

    let mut merged = NodeExecution::new_running(
        base.id,
        base.execute_id,
        base.node_id.clone(),
        base.node_name.clone(),
        base.node_type.clone(),
    );
    merged.created_at = base.created_at;
    merged.parent_node_id = base.parent_node_id.clone();
    merged.indexed_executions = vec![None; max_index + 1];

    let mut duration_ms = 0;
    let mut tokens: Option<TokenUsage> = None;
    let mut any_failed = false;
    let mut any_running = false;

    for (&index, child) in children {
        duration_ms = duration_ms.max(child.duration_ms);
        if let Some(usage) = &child.token_usage {
            tokens.get_or_insert_with(TokenUsage::default).add(usage);
        }
        match child.status {
            NodeStatus::Failed => any_failed = true,
            NodeStatus::Running => any_running = true,
            NodeStatus::Success => {}
        }

        match usize::try_from(index) {
            Ok(slot) => merged.indexed_executions[slot] = Some(child.clone()),
            Err(_) => warn!(node_id = %child.node_id, index, "negative composite index skipped"),
        }
    }

    merged.duration_ms = duration_ms;
    merged.token_usage = tokens;
    merged.status = if any_failed {
        NodeStatus::Failed
    } else if any_running {
        NodeStatus::Running
    } else {
        NodeStatus::Success
    };
    Some(merged)
}

/// Folds composite children into one merged entry per inner node.
///
/// A node counts as a composite child when its parent node id names another
/// node of the same execution. Other nodes keep their order; merged entries
/// follow, ordered by node id.
pub fn group_composite_children(nodes: Vec<NodeExecution>) -> Vec<NodeExecution> {
    let node_ids: HashSet<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
    let mut plain = Vec::new();
    let mut groups: BTreeMap<String, BTreeMap<i32, NodeExecution>> = BTreeMap::new();

    for node in nodes {
        let is_child = node
            .parent_node_id
            .as_ref()
            .is_some_and(|parent| node_ids.contains(parent));
        if is_child {
            groups
                .entry(node.node_id.clone())
                .or_default()
                .insert(node.index, node);
        } else {
            plain.push(node);
        }
    }

    plain.extend(groups.values().filter_map(merge_composite_inner_nodes));
    plain
}
