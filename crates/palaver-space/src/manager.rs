//! The address-space manager.
//!
//! Owns the object graph, forwards the exposed `Post` operation into the
//! domain event bus, and translates bus notifications into graph-level
//! events and attribute changes for the external delivery engine.

use crate::event::{ChatEvent, DeliveryEngine, EventSeverity, LocalizedText};
use crate::ids::{NamespaceTable, NodeIdAllocator};
use crate::model::{self, chat_registry};
use crate::node::{objects_folder, AddressSpace, NodeBody, NodeClass, NodeId, Variant};
use crate::template::{TemplateError, TemplateSource};
use crate::BehaviorRegistry;
use dashmap::DashMap;
use palaver_core::ChatService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Address-space initialization errors.
///
/// All variants are fatal: initialization leaves no partial address space
/// behind.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// The template graph could not be loaded.
    #[error("failed to load template graph: {0}")]
    Template(#[from] TemplateError),

    /// The template graph contains no container node.
    #[error("no chat-logs container in template graph")]
    ContainerMissing,

    /// The template graph contains more than one container node.
    #[error("more than one chat-logs container in template graph")]
    ContainerDuplicated,

    /// The container node lacks its `Post` method child.
    #[error("container node {0} has no Post method")]
    PostMethodMissing(NodeId),

    /// The container node lacks its `PostCount` variable child.
    #[error("container node {0} has no PostCount variable")]
    PostCountMissing(NodeId),

    /// The address space was already created for this manager.
    #[error("address space already created")]
    AlreadyInitialized,
}

/// Failures of the exposed remote operation, delivered back through the
/// normal call-response path.
#[derive(Debug, Error)]
pub enum CallError {
    /// The method id is not served by this manager.
    #[error("unknown method: {0}")]
    UnknownMethod(NodeId),

    /// The method exists but not on the given object.
    #[error("method not available on object: {0}")]
    WrongObject(NodeId),

    /// Wrong number of input arguments.
    #[error("expected {expected} input arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    /// An input argument has the wrong type.
    #[error("input argument {index} must be a {expected}")]
    ArgumentType { index: usize, expected: &'static str },
}

type MethodFn = Box<dyn Fn(&[Variant]) -> Result<Vec<Variant>, CallError> + Send + Sync>;

/// Live state of the singleton chat-logs container.
///
/// The graph arena holds the node's topology; the attribute values remote
/// parties observe live here as atomics, so notification handlers never
/// take the structural lock.
#[derive(Debug)]
pub struct ContainerHandle {
    id: NodeId,
    display_name: String,
    post_count: AtomicU32,
    events_monitored: AtomicBool,
    change_epoch: AtomicU64,
}

impl ContainerHandle {
    fn new(id: NodeId, display_name: String, post_count: u32) -> Self {
        Self {
            id,
            display_name,
            post_count: AtomicU32::new(post_count),
            events_monitored: AtomicBool::new(false),
            change_epoch: AtomicU64::new(0),
        }
    }

    /// The container node's id.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The container node's display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The counter attribute value.
    #[must_use]
    pub fn post_count(&self) -> u32 {
        self.post_count.load(Ordering::Acquire)
    }

    /// Whether any remote party currently wants events from this node.
    #[must_use]
    pub fn events_monitored(&self) -> bool {
        self.events_monitored.load(Ordering::Acquire)
    }
}

/// The address-space manager.
///
/// Structural mutations happen under one manager-wide lock; that lock is
/// never held across calls into the delivery engine or the event bus.
pub struct NodeManager {
    service: Arc<ChatService>,
    delivery: Arc<dyn DeliveryEngine>,
    template: Arc<dyn TemplateSource>,
    registry: BehaviorRegistry,
    space: RwLock<AddressSpace>,
    ids: NodeIdAllocator,
    type_namespace: u16,
    instance_namespace: u16,
    methods: DashMap<NodeId, MethodFn>,
    container: OnceLock<Arc<ContainerHandle>>,
    events_composed: Arc<AtomicU64>,
}

impl NodeManager {
    /// Create a manager, registering its two namespace URIs.
    #[must_use]
    pub fn new(
        service: Arc<ChatService>,
        delivery: Arc<dyn DeliveryEngine>,
        template: Arc<dyn TemplateSource>,
        namespaces: &mut NamespaceTable,
    ) -> Self {
        let type_namespace = namespaces.get_or_append(model::NAMESPACE_URI);
        let instance_namespace = namespaces.get_or_append(model::INSTANCE_NAMESPACE_URI);

        Self {
            service,
            delivery,
            template,
            registry: chat_registry(type_namespace),
            space: RwLock::new(AddressSpace::new()),
            ids: NodeIdAllocator::new(instance_namespace),
            type_namespace,
            instance_namespace,
            methods: DashMap::new(),
            container: OnceLock::new(),
            events_composed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The namespace index of the manager's type definitions.
    #[must_use]
    pub fn type_namespace(&self) -> u16 {
        self.type_namespace
    }

    /// The namespace index of the manager's instance nodes.
    #[must_use]
    pub fn instance_namespace(&self) -> u16 {
        self.instance_namespace
    }

    /// Identifier-factory hook: a fresh id in the instance namespace.
    #[must_use]
    pub fn new_node_id(&self) -> NodeId {
        self.ids.allocate()
    }

    /// Build the address space from the template graph.
    ///
    /// Loads the template, specializes every node, locates the singleton
    /// container, wires its `Post` method to the event bus, links the
    /// container under the external Objects folder through
    /// `external_references`, and subscribes to the bus's notification
    /// channels. The manager-wide lock is held for the structural work and
    /// released before any notification wiring.
    ///
    /// # Errors
    ///
    /// Returns a [`SpaceError`] on load or shape failures; no partial
    /// address space remains usable afterwards.
    pub fn create_address_space(
        &self,
        external_references: &mut HashMap<NodeId, Vec<NodeId>>,
    ) -> Result<(), SpaceError> {
        if self.container.get().is_some() {
            return Err(SpaceError::AlreadyInitialized);
        }

        let (handle, post_method_id) = {
            let mut space = self.space.write().unwrap_or_else(|e| e.into_inner());

            let node_set = self.template.load()?;
            for node in node_set.nodes {
                space.insert(node);
            }

            for id in space.ids() {
                self.registry.specialize(&mut space, &id);
            }

            match self.setup_container(&space) {
                Ok(wired) => wired,
                Err(error) => {
                    // Fatal: leave nothing partially usable.
                    space.clear();
                    return Err(error);
                }
            }
        };

        external_references
            .entry(objects_folder())
            .or_default()
            .push(handle.id.clone());

        info!(
            container = %handle.id,
            post_method = %post_method_id,
            "Address space created"
        );

        // Lock released; wire the callable operation and the bus channels.
        let service = self.service.clone();
        self.methods.insert(
            post_method_id,
            Box::new(move |inputs| {
                let (name, content) = parse_post_inputs(inputs)?;
                service.post(name, content);
                Ok(Vec::new())
            }),
        );

        let posted_handle = handle.clone();
        let posted_delivery = self.delivery.clone();
        let composed = self.events_composed.clone();
        self.service.on_posted(move |record| {
            // Nobody watching: skip composition entirely.
            if !posted_handle.events_monitored() {
                return;
            }

            composed.fetch_add(1, Ordering::AcqRel);
            let event = ChatEvent {
                source: posted_handle.id.clone(),
                severity: EventSeverity::MediumLow,
                message: LocalizedText::english(format!(
                    "New chat log has been posted for '{}'.",
                    posted_handle.display_name
                )),
                record: record.clone(),
            };
            posted_delivery.report_event(&event);
        });

        let count_handle = handle.clone();
        let count_delivery = self.delivery.clone();
        self.service.on_count_changed(move |count| {
            // Handlers run on the posting thread, so stores can arrive out
            // of post order; the attribute must stay monotone.
            count_handle.post_count.fetch_max(count, Ordering::AcqRel);
            count_handle.change_epoch.fetch_add(1, Ordering::AcqRel);
            count_delivery.attribute_changed(&count_handle.id);
        });

        let _ = self.container.set(handle);
        Ok(())
    }

    /// Locate the container and its children; must run under the write lock.
    fn setup_container(
        &self,
        space: &AddressSpace,
    ) -> Result<(Arc<ContainerHandle>, NodeId), SpaceError> {
        let mut containers = space
            .iter()
            .filter(|node| node.body == NodeBody::ChatLogs)
            .map(|node| node.id.clone());
        let container_id = containers.next().ok_or(SpaceError::ContainerMissing)?;
        if containers.next().is_some() {
            return Err(SpaceError::ContainerDuplicated);
        }
        drop(containers);

        let container = space
            .get(&container_id)
            .ok_or(SpaceError::ContainerMissing)?;
        let display_name = container.display_name.clone();
        let children = container.children.clone();

        let find_child = |class: NodeClass, name: &str| {
            children.iter().find(|id| {
                space
                    .get(id)
                    .is_some_and(|node| node.class == class && node.display_name == name)
            })
        };

        let post_method_id = find_child(NodeClass::Method, "Post")
            .ok_or_else(|| SpaceError::PostMethodMissing(container_id.clone()))?
            .clone();
        let post_count_id = find_child(NodeClass::Variable, "PostCount")
            .ok_or_else(|| SpaceError::PostCountMissing(container_id.clone()))?
            .clone();

        let initial = space
            .get(&post_count_id)
            .and_then(|node| node.value.as_ref())
            .and_then(Variant::as_u32)
            .unwrap_or(0);

        debug!(container = %container_id, "Located chat-logs container");
        let handle = Arc::new(ContainerHandle::new(container_id, display_name, initial));
        Ok((handle, post_method_id))
    }

    /// The exposed remote operation entry point.
    ///
    /// # Errors
    ///
    /// Returns a structured [`CallError`] for unknown methods, wrong
    /// objects, or defective inputs; never panics across the boundary.
    pub fn call(
        &self,
        object: &NodeId,
        method: &NodeId,
        inputs: &[Variant],
    ) -> Result<Vec<Variant>, CallError> {
        let handler = self
            .methods
            .get(method)
            .ok_or_else(|| CallError::UnknownMethod(method.clone()))?;

        let serves_object = self
            .container
            .get()
            .is_some_and(|handle| handle.id == *object);
        if !serves_object {
            return Err(CallError::WrongObject(object.clone()));
        }

        handler(inputs)
    }

    /// The container handle, if the address space has been created.
    #[must_use]
    pub fn container(&self) -> Option<&Arc<ContainerHandle>> {
        self.container.get()
    }

    /// The counter attribute value remote parties read.
    #[must_use]
    pub fn post_count(&self) -> u32 {
        self.container.get().map_or(0, |handle| handle.post_count())
    }

    /// Set the container's interest flag.
    ///
    /// Called by the external subscription engine when event monitoring on
    /// the container starts or stops.
    pub fn set_events_monitored(&self, monitored: bool) {
        if let Some(handle) = self.container.get() {
            handle.events_monitored.store(monitored, Ordering::Release);
        }
    }

    /// Number of change-state bumps observed on the container.
    #[must_use]
    pub fn change_epoch(&self) -> u64 {
        self.container
            .get()
            .map_or(0, |handle| handle.change_epoch.load(Ordering::Acquire))
    }

    /// Number of events composed so far (composition, not delivery).
    #[must_use]
    pub fn events_composed(&self) -> u64 {
        self.events_composed.load(Ordering::Acquire)
    }

    /// Read access to the object graph.
    pub fn space(&self) -> RwLockReadGuard<'_, AddressSpace> {
        self.space.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeManager")
            .field("type_namespace", &self.type_namespace)
            .field("instance_namespace", &self.instance_namespace)
            .field("initialized", &self.container.get().is_some())
            .finish()
    }
}

fn parse_post_inputs(inputs: &[Variant]) -> Result<(&str, &str), CallError> {
    if inputs.len() != 2 {
        return Err(CallError::ArgumentCount {
            expected: 2,
            got: inputs.len(),
        });
    }
    let name = inputs[0].as_str().ok_or(CallError::ArgumentType {
        index: 0,
        expected: "string",
    })?;
    let content = inputs[1].as_str().ok_or(CallError::ArgumentType {
        index: 1,
        expected: "string",
    })?;
    Ok((name, content))
}
