use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use serde_json::Value;

/// Outcome of queueing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued { depth: usize },
    /// The port was full; its oldest message was dropped to make room.
    DroppedOldest { depth: usize },
}

/// Per-port bounded input queues for one node.
#[derive(Debug, Clone, Serialize)]
pub struct Mailbox {
    #[serde(skip)]
    capacity: usize,
    #[serde(flatten)]
    ports: BTreeMap<String, VecDeque<Value>>,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ports: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, port: &str, value: Value) -> Delivery {
        let queue = self.ports.entry(port.to_string()).or_default();
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(value);
        let depth = queue.len();
        if dropped {
            Delivery::DroppedOldest { depth }
        } else {
            Delivery::Queued { depth }
        }
    }

    /// Take every queued message, oldest first per port.
    pub fn drain(&mut self) -> BTreeMap<String, Vec<Value>> {
        std::mem::take(&mut self.ports)
            .into_iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(port, q)| (port, q.into_iter().collect()))
            .collect()
    }

    pub fn depth(&self, port: &str) -> usize {
        self.ports.get(port).map_or(0, VecDeque::len)
    }

    pub fn total(&self) -> usize {
        self.ports.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_port_drops_oldest() {
        let mut mailbox = Mailbox::new(2);
        assert_eq!(mailbox.push("in", json!(1)), Delivery::Queued { depth: 1 });
        assert_eq!(mailbox.push("in", json!(2)), Delivery::Queued { depth: 2 });
        assert_eq!(mailbox.push("in", json!(3)), Delivery::DroppedOldest { depth: 2 });
        // other ports have their own bound
        assert_eq!(mailbox.push("aux", json!("x")), Delivery::Queued { depth: 1 });

        let drained = mailbox.drain();
        assert_eq!(drained["in"], vec![json!(2), json!(3)]);
        assert_eq!(drained["aux"], vec![json!("x")]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_serializes_as_port_map() {
        let mut mailbox = Mailbox::new(4);
        mailbox.push("in", json!({"a": 1}));
        assert_eq!(serde_json::to_value(&mailbox).unwrap(), json!({"in": [{"a": 1}]}));
        assert_eq!(mailbox.depth("in"), 1);
        assert_eq!(mailbox.depth("missing"), 0);
    }
}
