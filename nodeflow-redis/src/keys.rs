//! Cache key layout and TTLs.

const DAY_SECS: u64 = 24 * 60 * 60;

pub const CANCEL_FLAG_TTL_SECS: u64 = DAY_SECS;
pub const NODE_OUTPUT_TTL_SECS: u64 = DAY_SECS;
pub const INTERRUPT_LIST_TTL_SECS: u64 = DAY_SECS;
pub const PREVIOUS_RESUMED_TTL_SECS: u64 = DAY_SECS;
pub const LATEST_EXECUTION_TTL_SECS: u64 = 7 * DAY_SECS;

pub fn cancel_flag(execute_id: i64) -> String {
    format!("workflow:cancel:status:{}", execute_id)
}

pub fn node_output(node_execute_id: i64) -> String {
    format!("wf:node_exec:output:{}", node_execute_id)
}

pub fn interrupt_list(execute_id: i64) -> String {
    format!("interrupt_event_list:{}", execute_id)
}

pub fn previous_resumed(execute_id: i64) -> String {
    format!("previous_resumed_event:{}", execute_id)
}

pub fn latest_test_run(workflow_id: i64, user_id: i64) -> String {
    format!("test_run_last_exe_id:{}:{}", workflow_id, user_id)
}

pub fn latest_node_debug(workflow_id: i64, node_id: &str, user_id: i64) -> String {
    format!("node_debug_last_exe_id:{}:{}:{}", workflow_id, node_id, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_patterns() {
        assert_eq!(cancel_flag(12), "workflow:cancel:status:12");
        assert_eq!(node_output(5), "wf:node_exec:output:5");
        assert_eq!(interrupt_list(12), "interrupt_event_list:12");
        assert_eq!(previous_resumed(12), "previous_resumed_event:12");
        assert_eq!(latest_test_run(3, 4), "test_run_last_exe_id:3:4");
        assert_eq!(latest_node_debug(3, "llm_1", 4), "node_debug_last_exe_id:3:llm_1:4");
    }

    #[test]
    fn ttls() {
        assert_eq!(INTERRUPT_LIST_TTL_SECS, 86_400);
        assert_eq!(LATEST_EXECUTION_TTL_SECS, 604_800);
    }
}
