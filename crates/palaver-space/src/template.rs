//! Template graph loading.
//!
//! The template graph is a versioned binary resource deserialized by the
//! external runtime; this module only defines the loader contract. The
//! loader must hand back the deserialized contents unchanged so existing
//! client tooling that understands the resource format keeps working.

use crate::node::Node;
use thiserror::Error;

/// A deserialized set of template nodes.
#[derive(Debug, Default, Clone)]
pub struct NodeSet {
    /// The loaded nodes, still generic.
    pub nodes: Vec<Node>,
}

impl NodeSet {
    /// Create an empty node set.
    ///
    /// An empty set is well-formed; it is not a load failure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl From<Vec<Node>> for NodeSet {
    fn from(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }
}

/// Template load errors.
///
/// Both variants are fatal to address-space initialization; a well-formed
/// but empty resource is not an error.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The resource could not be located or read.
    #[error("template resource unavailable: {0}")]
    Unavailable(String),

    /// The resource was read but could not be deserialized.
    #[error("template resource malformed: {0}")]
    Malformed(String),
}

/// Source of the template graph.
pub trait TemplateSource: Send + Sync {
    /// Load the template graph.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] if the resource cannot be read or
    /// deserialized.
    fn load(&self) -> Result<NodeSet, TemplateError>;
}

impl<F> TemplateSource for F
where
    F: Fn() -> Result<NodeSet, TemplateError> + Send + Sync,
{
    fn load(&self) -> Result<NodeSet, TemplateError> {
        self()
    }
}
