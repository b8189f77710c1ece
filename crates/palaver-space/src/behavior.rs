//! Node specialization.
//!
//! Template graphs arrive as generic nodes. The behavior registry decides,
//! per node, whether a specialized representation exists for its type tag
//! and splices the specialized node into the graph in place of the generic
//! one.

use crate::node::{AddressSpace, Node, NodeBody, NodeClass, NodeId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Checks whether a node already carries the specialized representation.
pub type MatchFn = Box<dyn Fn(&Node) -> bool + Send + Sync>;

/// Builds the specialized node from the generic one.
///
/// The returned node must keep the generic node's id, parent reference,
/// and children so the splice preserves topology.
pub type BuildFn = Box<dyn Fn(&Node) -> Node + Send + Sync>;

struct Specializer {
    matches: MatchFn,
    build: BuildFn,
}

/// Maps recognized numeric type tags to specialization constructors.
///
/// The table is open for extension: new tags are added with [`register`]
/// without touching [`specialize`]. Resolution is a pure function of the
/// node and this table; there is no hidden global state.
///
/// [`register`]: BehaviorRegistry::register
/// [`specialize`]: BehaviorRegistry::specialize
pub struct BehaviorRegistry {
    type_namespace: u16,
    specializers: HashMap<u64, Specializer>,
}

impl BehaviorRegistry {
    /// Create an empty registry for the given type namespace.
    #[must_use]
    pub fn new(type_namespace: u16) -> Self {
        Self {
            type_namespace,
            specializers: HashMap::new(),
        }
    }

    /// The namespace recognized type tags live in.
    #[must_use]
    pub fn type_namespace(&self) -> u16 {
        self.type_namespace
    }

    /// Register a specialization constructor for a type tag.
    pub fn register(
        &mut self,
        type_tag: u64,
        matches: impl Fn(&Node) -> bool + Send + Sync + 'static,
        build: impl Fn(&Node) -> Node + Send + Sync + 'static,
    ) {
        self.specializers.insert(
            type_tag,
            Specializer {
                matches: Box::new(matches),
                build: Box::new(build),
            },
        );
    }

    /// Specialize the node with id `id` in place, returning the resulting
    /// node (the original if no replacement applies, `None` if the id is
    /// unknown).
    ///
    /// The replacement keeps the generic node's id and position in its
    /// parent's child list; running this twice on the same node is a no-op.
    pub fn specialize<'a>(&self, space: &'a mut AddressSpace, id: &NodeId) -> Option<&'a Node> {
        let specialized = {
            let node = space.get(id)?;

            // Only generic object-shaped nodes with a numeric type tag in
            // our namespace are candidates.
            if node.class != NodeClass::Object {
                return space.get(id);
            }
            let Some(type_definition) = &node.type_definition else {
                return space.get(id);
            };
            if type_definition.namespace != self.type_namespace {
                return space.get(id);
            }
            let Some(type_tag) = type_definition.as_numeric() else {
                return space.get(id);
            };
            let Some(specializer) = self.specializers.get(&type_tag) else {
                return space.get(id);
            };

            // Already specialized: return the same instance unchanged.
            if (specializer.matches)(node) {
                return space.get(id);
            }

            debug!(node = %id, type_tag, "Specializing template node");
            (specializer.build)(node)
        };

        match specialized.parent.clone() {
            Some(parent) => {
                let linked = space
                    .get(&parent)
                    .is_some_and(|node| node.children.contains(id));
                if linked {
                    space.replace_child(&parent, id, specialized);
                } else {
                    // Malformed template: the node names a parent that does
                    // not list it. Keep the specialized node anyway.
                    warn!(node = %id, parent = %parent, "Parent link missing in template graph");
                    space.insert(specialized);
                }
            }
            None => {
                space.insert(specialized);
            }
        }
        space.get(id)
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("type_namespace", &self.type_namespace)
            .field("tags", &self.specializers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Marks a node's body, keeping everything else intact.
///
/// Convenience constructor for registrations whose specialized form is a
/// body tag on the same node shape.
#[must_use]
pub fn retag(body: NodeBody) -> impl Fn(&Node) -> Node + Send + Sync + 'static {
    move |generic: &Node| {
        let mut node = generic.clone();
        node.body = body;
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE_NS: u16 = 1;
    const TAG: u64 = 15;

    fn registry() -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new(TYPE_NS);
        registry.register(
            TAG,
            |node| node.body == NodeBody::ChatLogs,
            retag(NodeBody::ChatLogs),
        );
        registry
    }

    fn space_with(node: Node) -> (AddressSpace, NodeId) {
        let id = node.id.clone();
        let mut space = AddressSpace::new();
        space.insert(node);
        (space, id)
    }

    #[test]
    fn test_specializes_recognized_object() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "ChatLogs", NodeClass::Object)
            .with_type_definition(NodeId::numeric(TYPE_NS, TAG));
        let (mut space, id) = space_with(node);

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::ChatLogs);
        assert_eq!(resolved.id, id);
    }

    #[test]
    fn test_specialization_is_idempotent() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "ChatLogs", NodeClass::Object)
            .with_type_definition(NodeId::numeric(TYPE_NS, TAG));
        let (mut space, id) = space_with(node);

        registry.specialize(&mut space, &id);
        let first = space.get(&id).unwrap().clone();
        let second = registry.specialize(&mut space, &id).unwrap();

        assert_eq!(*second, first);
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn test_non_object_is_unchanged() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "V", NodeClass::Variable)
            .with_type_definition(NodeId::numeric(TYPE_NS, TAG));
        let (mut space, id) = space_with(node);

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::Generic);
    }

    #[test]
    fn test_foreign_namespace_is_unchanged() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "X", NodeClass::Object)
            .with_type_definition(NodeId::numeric(TYPE_NS + 1, TAG));
        let (mut space, id) = space_with(node);

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::Generic);
    }

    #[test]
    fn test_string_type_tag_is_unchanged() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "X", NodeClass::Object)
            .with_type_definition(NodeId::string(TYPE_NS, "ChatLogsType"));
        let (mut space, id) = space_with(node);

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::Generic);
    }

    #[test]
    fn test_unrecognized_tag_is_unchanged() {
        let registry = registry();
        let node = Node::new(NodeId::numeric(2, 10), "X", NodeClass::Object)
            .with_type_definition(NodeId::numeric(TYPE_NS, 9999));
        let (mut space, id) = space_with(node);

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::Generic);
    }

    #[test]
    fn test_missing_parent_link_still_specializes() {
        let registry = registry();
        let parent_id = NodeId::numeric(2, 1);
        let id = NodeId::numeric(2, 2);

        let mut space = AddressSpace::new();
        // Parent exists but does not list the node among its children.
        space.insert(Node::new(parent_id.clone(), "Parent", NodeClass::Object));
        space.insert(
            Node::new(id.clone(), "ChatLogs", NodeClass::Object)
                .with_type_definition(NodeId::numeric(TYPE_NS, TAG))
                .with_parent(parent_id.clone()),
        );

        let resolved = registry.specialize(&mut space, &id).unwrap();
        assert_eq!(resolved.body, NodeBody::ChatLogs);
        assert_eq!(space.get(&id).unwrap().body, NodeBody::ChatLogs);
        assert!(space.get(&parent_id).unwrap().children.is_empty());
    }

    #[test]
    fn test_specialization_preserves_topology() {
        let registry = registry();
        let parent_id = NodeId::numeric(2, 1);
        let target_id = NodeId::numeric(2, 2);
        let sibling_id = NodeId::numeric(2, 3);
        let child_id = NodeId::numeric(2, 4);

        let mut space = AddressSpace::new();
        let mut parent = Node::new(parent_id.clone(), "Parent", NodeClass::Object);
        parent.children = vec![sibling_id.clone(), target_id.clone()];
        space.insert(parent);
        space.insert(
            Node::new(sibling_id.clone(), "Sibling", NodeClass::Object)
                .with_parent(parent_id.clone()),
        );
        let mut target = Node::new(target_id.clone(), "ChatLogs", NodeClass::Object)
            .with_type_definition(NodeId::numeric(TYPE_NS, TAG))
            .with_parent(parent_id.clone());
        target.children = vec![child_id.clone()];
        space.insert(target);
        space.insert(
            Node::new(child_id.clone(), "Child", NodeClass::Method)
                .with_parent(target_id.clone()),
        );

        let resolved = registry.specialize(&mut space, &target_id).unwrap();
        assert_eq!(resolved.body, NodeBody::ChatLogs);
        assert_eq!(resolved.parent, Some(parent_id.clone()));
        assert_eq!(resolved.children, vec![child_id]);

        // Same position in the parent's child list.
        let parent = space.get(&parent_id).unwrap();
        assert_eq!(parent.children, vec![sibling_id, target_id]);
    }
}
