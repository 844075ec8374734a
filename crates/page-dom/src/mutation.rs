//! Mutation records published by a document

use ethoscan_core_types::NodeId;

/// Default capacity of a document's mutation channel
pub const MUTATION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added or removed
    ChildList,
    /// An attribute changed
    Attributes,
}

/// A single change to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute: None,
        }
    }

    pub fn attribute(target: NodeId, name: &str) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute: Some(name.to_ascii_lowercase()),
        }
    }
}

/// Records delivered together to every observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationBatch {
    /// Monotonic per-document batch number
    pub sequence: u64,
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
