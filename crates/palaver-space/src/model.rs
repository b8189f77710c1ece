//! The chat information model.
//!
//! Namespace URIs, well-known identifiers, the predefined template graph,
//! and the behavior registrations for the chat model. The template mirrors
//! the published node-set resource: a `ChatLogs` container with a `Post`
//! method and a `PostCount` variable, plus the `ChatLogEvent` prototype.

use crate::behavior::{retag, BehaviorRegistry};
use crate::node::{Node, NodeBody, NodeClass, NodeId, Variant};
use crate::template::{NodeSet, TemplateError, TemplateSource};

/// Namespace URI for type definitions.
pub const NAMESPACE_URI: &str = "urn:palaver:chat";

/// Namespace URI for instance nodes.
pub const INSTANCE_NAMESPACE_URI: &str = "urn:palaver:chat/Instance";

/// Numeric tags of the model's object types.
pub mod object_types {
    pub const CHAT_LOGS: u64 = 15;
    pub const CHAT_LOG_EVENT: u64 = 23;
}

/// Identifiers of the model's predefined instance nodes.
pub mod objects {
    pub const CHAT_LOGS: u64 = 5001;
    pub const CHAT_LOG_EVENT: u64 = 5004;
}

/// Identifiers of the model's predefined method nodes.
pub mod methods {
    pub const POST: u64 = 5002;
}

/// Identifiers of the model's predefined variable nodes.
pub mod variables {
    pub const POST_COUNT: u64 = 5003;
}

/// The behavior registry for the chat model.
#[must_use]
pub fn chat_registry(type_namespace: u16) -> BehaviorRegistry {
    let mut registry = BehaviorRegistry::new(type_namespace);
    registry.register(
        object_types::CHAT_LOGS,
        |node| node.body == NodeBody::ChatLogs,
        retag(NodeBody::ChatLogs),
    );
    registry.register(
        object_types::CHAT_LOG_EVENT,
        |node| node.body == NodeBody::ChatLogEvent,
        retag(NodeBody::ChatLogEvent),
    );
    registry
}

/// In-memory template source holding the predefined chat node set.
///
/// Stands in for the published binary resource; the nodes come back
/// generic, exactly as a deserializer would produce them.
#[derive(Debug, Clone)]
pub struct ChatModelSource {
    type_namespace: u16,
}

impl ChatModelSource {
    /// Create a source emitting nodes in the given type namespace.
    #[must_use]
    pub fn new(type_namespace: u16) -> Self {
        Self { type_namespace }
    }
}

impl TemplateSource for ChatModelSource {
    fn load(&self) -> Result<NodeSet, TemplateError> {
        let ns = self.type_namespace;
        let chat_logs_id = NodeId::numeric(ns, objects::CHAT_LOGS);
        let post_id = NodeId::numeric(ns, methods::POST);
        let post_count_id = NodeId::numeric(ns, variables::POST_COUNT);
        let event_id = NodeId::numeric(ns, objects::CHAT_LOG_EVENT);

        let mut chat_logs = Node::new(chat_logs_id.clone(), "ChatLogs", NodeClass::Object)
            .with_type_definition(NodeId::numeric(ns, object_types::CHAT_LOGS));
        chat_logs.children = vec![post_id.clone(), post_count_id.clone()];

        let post = Node::new(post_id, "Post", NodeClass::Method).with_parent(chat_logs_id.clone());

        let post_count = Node::new(post_count_id, "PostCount", NodeClass::Variable)
            .with_parent(chat_logs_id)
            .with_value(Variant::UInt32(0));

        let event = Node::new(event_id, "ChatLogEvent", NodeClass::Object)
            .with_type_definition(NodeId::numeric(ns, object_types::CHAT_LOG_EVENT));

        Ok(NodeSet::from(vec![chat_logs, post, post_count, event]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AddressSpace;

    #[test]
    fn test_model_loads_expected_nodes() {
        let set = ChatModelSource::new(1).load().unwrap();
        assert_eq!(set.len(), 4);

        let chat_logs = set
            .nodes
            .iter()
            .find(|node| node.display_name == "ChatLogs")
            .unwrap();
        assert_eq!(chat_logs.class, NodeClass::Object);
        assert_eq!(chat_logs.children.len(), 2);
        assert_eq!(chat_logs.body, NodeBody::Generic);
    }

    #[test]
    fn test_registry_specializes_model() {
        let registry = chat_registry(1);
        let mut space = AddressSpace::new();
        for node in ChatModelSource::new(1).load().unwrap().nodes {
            space.insert(node);
        }

        for id in space.ids() {
            registry.specialize(&mut space, &id);
        }

        let containers = space
            .iter()
            .filter(|node| node.body == NodeBody::ChatLogs)
            .count();
        let events = space
            .iter()
            .filter(|node| node.body == NodeBody::ChatLogEvent)
            .count();
        assert_eq!(containers, 1);
        assert_eq!(events, 1);
    }
}
