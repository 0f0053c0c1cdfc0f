use nodeflow_dto::dto::{NodeExecution, NodeStatus};
use tracing::warn;

use crate::traits::NodeOutputCache;

/// Whether the cached partial output should replace the durable one.
pub fn reads_cached_output(node: &NodeExecution) -> bool {
    node.status == NodeStatus::Running && node.node_type.capabilities().incremental_output
}

/// Replace the output of running streaming nodes with the cached copy.
/// Cache failures are logged and leave the durable output in place.
pub async fn overlay_streaming_output(cache: &dyn NodeOutputCache, nodes: &mut [NodeExecution]) {
    for node in nodes.iter_mut().filter(|n| reads_cached_output(n)) {
        match cache.get_node_output(node.id).await {
            Ok(Some(output)) => node.output = Some(output),
            Ok(None) => {}
            Err(e) => warn!(
                node_execute_id = node.id,
                error = %e,
                "⚠️ failed to read streaming output"
            ),
        }
    }
}
