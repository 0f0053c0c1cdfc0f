//! Placement rule for newly reported interrupt events, shared by every queue backend.
//!
//! Events already queued (by id) are skipped so re-delivery is idempotent. If the
//! previously resumed event's node raised one of the new events, that event goes to
//! the front so a node that keeps interrupting keeps its turn. Everything else is
//! appended in arrival order.

use std::collections::{HashSet, VecDeque};

use nodeflow_dto::dto::InterruptEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendPlan {
    pub front: Option<InterruptEvent>,
    pub back: Vec<InterruptEvent>,
}

impl AppendPlan {
    pub fn is_empty(&self) -> bool {
        self.front.is_none() && self.back.is_empty()
    }

    pub fn apply(self, queue: &mut VecDeque<InterruptEvent>) {
        if let Some(e) = self.front {
            queue.push_front(e);
        }
        queue.extend(self.back);
    }
}

pub fn plan_append(
    queued: &[InterruptEvent],
    previous_resumed: Option<&InterruptEvent>,
    incoming: &[InterruptEvent],
) -> AppendPlan {
    let mut seen: HashSet<i64> = queued.iter().map(|e| e.id).collect();
    let mut fresh: Vec<InterruptEvent> = incoming
        .iter()
        .filter(|e| seen.insert(e.id))
        .cloned()
        .collect();

    let front = previous_resumed
        .and_then(|prev| fresh.iter().position(|e| e.node_key == prev.node_key))
        .map(|pos| fresh.remove(pos));

    AppendPlan { front, back: fresh }
}
