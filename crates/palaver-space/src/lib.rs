//! # palaver-space
//!
//! The object graph exposed by the palaver server, and the manager that
//! bridges it to the domain event bus.
//!
//! This crate provides:
//!
//! - **Node / AddressSpace** - The addressable object graph
//! - **NodeIdAllocator** - Stable identifier allocation
//! - **BehaviorRegistry** - Specialization of generic template nodes
//! - **NodeManager** - Owns the graph, forwards remote calls into the
//!   domain layer, and translates bus notifications into graph changes
//! - **TemplateSource / DeliveryEngine** - Contracts for the external
//!   protocol runtime
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  call   ┌─────────────┐  post   ┌─────────────┐
//! │   Runtime    │────────▶│ NodeManager │────────▶│ ChatService │
//! └──────────────┘         └─────────────┘         └─────────────┘
//!        ▲                        │ events/attributes     │
//!        └────────────────────────┴───────◀───────────────┘
//! ```

pub mod behavior;
pub mod event;
pub mod ids;
pub mod manager;
pub mod model;
pub mod node;
pub mod template;

pub use behavior::BehaviorRegistry;
pub use event::{ChatEvent, DeliveryEngine, EventSeverity, LocalizedText};
pub use ids::{NamespaceTable, NodeIdAllocator};
pub use manager::{CallError, ContainerHandle, NodeManager, SpaceError};
pub use model::{ChatModelSource, INSTANCE_NAMESPACE_URI, NAMESPACE_URI};
pub use node::{AddressSpace, Identifier, Node, NodeBody, NodeClass, NodeId, Variant};
pub use template::{NodeSet, TemplateError, TemplateSource};
