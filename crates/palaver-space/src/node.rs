//! Node and address-space types.
//!
//! The address space is an id-keyed arena of nodes with non-owning parent
//! references and ordered child lists, which keeps the graph free of
//! reference cycles while preserving topology.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// Numeric identifier.
    Numeric(u64),
    /// String identifier.
    String(String),
}

/// A node identifier, unique within its owning namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Index into the server's namespace table.
    pub namespace: u16,
    /// The identifier within that namespace.
    pub identifier: Identifier,
}

impl NodeId {
    /// Create a numeric node id.
    #[must_use]
    pub fn numeric(namespace: u16, value: u64) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Create a string node id.
    #[must_use]
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// The numeric identifier, if this id is numeric.
    #[must_use]
    pub fn as_numeric(&self) -> Option<u64> {
        match self.identifier {
            Identifier::Numeric(value) => Some(value),
            Identifier::String(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(value) => write!(f, "ns={};i={}", self.namespace, value),
            Identifier::String(value) => write!(f, "ns={};s={}", self.namespace, value),
        }
    }
}

/// The well-known folder under which managers link their root objects.
///
/// Owned by the external core manager; referenced here only through the
/// cross-manager reference map.
#[must_use]
pub fn objects_folder() -> NodeId {
    NodeId::numeric(0, 85)
}

/// What kind of element a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    EventType,
}

/// A typed attribute or argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Boolean(bool),
    UInt32(u32),
    UInt64(u64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Variant {
    /// The contained string, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(value) => Some(value),
            _ => None,
        }
    }

    /// The contained u32, if this is a 32-bit unsigned value.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Variant::UInt32(value) => Some(*value),
            _ => None,
        }
    }
}

/// Behavioral state of a node.
///
/// Template nodes are loaded `Generic`; the behavior resolver replaces
/// them with the specialized representation matching their type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBody {
    /// A passive node with no model-specific behavior.
    Generic,
    /// The chat-logs container: callable Post, post counter, event source.
    ChatLogs,
    /// The chat-log event prototype.
    ChatLogEvent,
}

/// An addressable element of the object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Identifier, unique within its namespace for the manager's lifetime.
    pub id: NodeId,
    /// Human-readable name.
    pub display_name: String,
    /// Node class.
    pub class: NodeClass,
    /// Type definition this node is an instance of, if any.
    pub type_definition: Option<NodeId>,
    /// Parent node (non-owning).
    pub parent: Option<NodeId>,
    /// Ordered child list.
    pub children: Vec<NodeId>,
    /// Current value, for variable nodes.
    pub value: Option<Variant>,
    /// Behavioral state.
    pub body: NodeBody,
}

impl Node {
    /// Create a new generic node.
    #[must_use]
    pub fn new(id: NodeId, display_name: impl Into<String>, class: NodeClass) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            class,
            type_definition: None,
            parent: None,
            children: Vec::new(),
            value: None,
            body: NodeBody::Generic,
        }
    }

    /// Set the type definition.
    #[must_use]
    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        self.type_definition = Some(type_definition);
        self
    }

    /// Set the parent reference.
    #[must_use]
    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the value.
    #[must_use]
    pub fn with_value(mut self, value: Variant) -> Self {
        self.value = Some(value);
        self
    }
}

/// The id-keyed node arena.
#[derive(Debug, Default)]
pub struct AddressSpace {
    nodes: HashMap<NodeId, Node>,
}

impl AddressSpace {
    /// Create an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the space holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, replacing any node with the same id.
    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up a node mutably.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Whether a node with this id exists.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate over all nodes.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All node ids.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Replace `old` with `replacement` in `parent`'s child list, keeping
    /// the exact position, and store the replacement in the arena.
    ///
    /// Returns `false` if the parent or the old child entry is missing, in
    /// which case nothing changes.
    pub fn replace_child(&mut self, parent: &NodeId, old: &NodeId, replacement: Node) -> bool {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(position) = parent_node.children.iter().position(|child| child == old) else {
            return false;
        };

        parent_node.children[position] = replacement.id.clone();
        self.nodes.remove(old);
        self.nodes.insert(replacement.id.clone(), replacement);
        true
    }
}
