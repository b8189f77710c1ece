//! Identifier allocation.

use crate::node::NodeId;
use std::sync::atomic::{AtomicU64, Ordering};

/// The server-wide namespace URI table.
///
/// Managers register their URIs here and address nodes by the resulting
/// indices. Index 0 is reserved for the core namespace.
#[derive(Debug, Default)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl NamespaceTable {
    /// Create a table holding only the core namespace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uris: vec![String::from("urn:core")],
        }
    }

    /// Index of `uri`, appending it if not yet registered.
    pub fn get_or_append(&mut self, uri: &str) -> u16 {
        if let Some(index) = self.uris.iter().position(|existing| existing == uri) {
            return index as u16;
        }
        self.uris.push(uri.to_string());
        (self.uris.len() - 1) as u16
    }

    /// All registered URIs in index order.
    #[must_use]
    pub fn uris(&self) -> &[String] {
        &self.uris
    }
}

/// Issues unique numeric identifiers for dynamically created nodes.
///
/// Scoped to one manager's instance namespace. Allocation is a single
/// atomic fetch-add, safe under unlimited concurrent callers; values are
/// monotonically increasing and never reused for the manager's lifetime.
#[derive(Debug)]
pub struct NodeIdAllocator {
    namespace: u16,
    last_used: AtomicU64,
}

impl NodeIdAllocator {
    /// Create an allocator for the given instance namespace.
    #[must_use]
    pub fn new(namespace: u16) -> Self {
        Self {
            namespace,
            last_used: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh identifier.
    #[must_use]
    pub fn allocate(&self) -> NodeId {
        let value = self.last_used.fetch_add(1, Ordering::AcqRel) + 1;
        NodeId::numeric(self.namespace, value)
    }

    /// The namespace this allocator issues ids in.
    #[must_use]
    pub fn namespace(&self) -> u16 {
        self.namespace
    }

    /// The most recently issued identifier value, 0 if none yet.
    #[must_use]
    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_namespace_table_get_or_append() {
        let mut table = NamespaceTable::new();
        let first = table.get_or_append("urn:palaver:chat");
        let second = table.get_or_append("urn:palaver:chat/Instance");
        let again = table.get_or_append("urn:palaver:chat");

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(again, first);
        assert_eq!(table.uris().len(), 3);
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let allocator = NodeIdAllocator::new(2);
        let first = allocator.allocate();
        let second = allocator.allocate();

        assert_eq!(first.namespace, 2);
        assert_eq!(first.as_numeric(), Some(1));
        assert_eq!(second.as_numeric(), Some(2));
        assert_eq!(allocator.last_used(), 2);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let allocator = Arc::new(NodeIdAllocator::new(2));

        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    let mut issued = Vec::with_capacity(PER_THREAD);
                    for _ in 0..PER_THREAD {
                        issued.push(allocator.allocate().as_numeric().unwrap());
                    }
                    issued
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let issued = handle.join().unwrap();
            // Monotonically increasing in issuance order per thread.
            assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));
            all.extend(issued);
        }

        assert_eq!(all.len(), THREADS * PER_THREAD);
    }
}
