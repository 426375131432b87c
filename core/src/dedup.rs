//! Single place implementing the extractor result dedup rule (spec §9
//! Design Notes, "Extractor result deduplication"): the first sighting of a
//! node id wins, but a later sighting upgrades `env` if the prior value was
//! empty.

use crate::types::Node;
use std::collections::HashMap;

/// Accumulates nodes for an in-progress extraction, applying the
/// keep-first/upgrade-env rule on every push.
#[derive(Debug, Default)]
pub struct NodeSink {
    by_id: HashMap<String, usize>,
    nodes: Vec<Node>,
}

impl NodeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) {
        if let Some(&idx) = self.by_id.get(&node.id) {
            if self.nodes[idx].env.is_none() {
                if let Some(env) = node.env {
                    self.nodes[idx].env = Some(env);
                }
            }
            return;
        }
        self.by_id.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.push(node);
        }
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.nodes
    }
}
