//! The process-wide resource tree.
//!
//! Structural mutation is serialized per parent scope: creates and removals
//! under one parent linearize on that parent's children lock, while
//! resolves walk per-node read locks and therefore observe either the
//! pre- or post-mutation tree, never a half-built node. No tree lock is
//! held across handler execution or any blocking wait.

use std::sync::Arc;

use coapling_core::{Error, Method, Path};
use tracing::debug;

use crate::node::{Handler, ResourceNode};

/// Per-method handler set used when registering a path.
#[derive(Default)]
pub struct Handlers {
    slots: [Option<Arc<dyn Handler>>; 4],
}

impl Handlers {
    pub fn new() -> Self {
        Handlers::default()
    }

    pub fn on(mut self, method: Method, handler: impl Handler + 'static) -> Self {
        self.slots[method.index()] = Some(Arc::new(handler));
        self
    }

    pub fn get(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::Get, handler)
    }

    pub fn post(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::Post, handler)
    }

    pub fn put(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::Put, handler)
    }

    pub fn delete(self, handler: impl Handler + 'static) -> Self {
        self.on(Method::Delete, handler)
    }

    fn apply(self, node: &ResourceNode) {
        for (index, slot) in self.slots.into_iter().enumerate() {
            if let Some(handler) = slot {
                node.set_handler(Method::ALL[index], ArcHandler(handler));
            }
        }
    }
}

/// Adapter so a pre-boxed handler can fill a slot.
struct ArcHandler(Arc<dyn Handler>);

impl Handler for ArcHandler {
    fn handle(&self, request: &mut crate::incoming::IncomingRequest) {
        self.0.handle(request)
    }
}

/// Owns the root node and serializes structural mutation.
pub struct ResourceTree {
    root: Arc<ResourceNode>,
}

impl ResourceTree {
    pub fn new() -> Self {
        ResourceTree {
            root: ResourceNode::new_root(),
        }
    }

    /// The well-known top-level node every app attaches under.
    pub fn root(&self) -> &Arc<ResourceNode> {
        &self.root
    }

    /// Resolve a path to its node.
    pub fn resolve(&self, path: &Path) -> Result<Arc<ResourceNode>, Error> {
        let mut current = Arc::clone(&self.root);
        for segment in path.segments() {
            let next = current.child(segment).ok_or_else(|| Error::NotFound {
                path: path.clone(),
            })?;
            current = next;
        }
        Ok(current)
    }

    /// Create a child under `parent`.
    ///
    /// Fails with `Conflict` carrying the existing child's path if `name`
    /// is already taken. Concurrent creates under the same parent
    /// linearize on the parent's children lock.
    pub fn create_child(
        &self,
        parent: &Arc<ResourceNode>,
        name: &str,
    ) -> Result<Arc<ResourceNode>, Error> {
        let path = parent.path().try_join(name)?;
        let mut children = parent.children.write().unwrap();
        if let Some(existing) = children.get(name) {
            return Err(Error::Conflict {
                existing: existing.path().clone(),
            });
        }
        let node = ResourceNode::new_child(parent, name, path);
        children.insert(name.to_string(), Arc::clone(&node));
        debug!(path = %node.path(), "created resource");
        Ok(node)
    }

    /// Detach `node` and all its descendants.
    ///
    /// Fails with `Forbidden` on the root. The subtree is unlinked by
    /// removing a single child edge under the parent's write lock, so a
    /// concurrent resolve sees the tree before or after the removal and
    /// never a partially detached subtree. Removing an already detached
    /// node is a no-op.
    pub fn remove(&self, node: &Arc<ResourceNode>) -> Result<(), Error> {
        let parent = match node.parent() {
            Some(parent) => parent,
            None => {
                return Err(Error::Forbidden {
                    message: "cannot remove the root resource".to_string(),
                })
            }
        };
        let removed = parent.children.write().unwrap().remove(node.name());
        if removed.is_some() {
            debug!(path = %node.path(), "removed resource subtree");
        }
        Ok(())
    }

    /// Pre-declare a path with its handlers, creating intermediate nodes
    /// as needed. Fails with `Conflict` if the leaf already exists.
    pub fn register(&self, path: &Path, handlers: Handlers) -> Result<Arc<ResourceNode>, Error> {
        if path.is_empty() {
            return Err(Error::Conflict {
                existing: Path::root(),
            });
        }

        let mut current = Arc::clone(&self.root);
        let segments = path.segments();
        for segment in &segments[..segments.len() - 1] {
            current = self.child_or_create(&current, segment)?;
        }

        let leaf = self.create_child(&current, &segments[segments.len() - 1])?;
        handlers.apply(&leaf);
        Ok(leaf)
    }

    fn child_or_create(
        &self,
        parent: &Arc<ResourceNode>,
        name: &str,
    ) -> Result<Arc<ResourceNode>, Error> {
        if let Some(child) = parent.child(name) {
            return Ok(child);
        }
        match self.create_child(parent, name) {
            Ok(child) => Ok(child),
            // Lost the race to a concurrent create; the child exists now.
            Err(Error::Conflict { .. }) => parent.child(name).ok_or_else(|| Error::NotFound {
                path: parent.path().join(name),
            }),
            Err(err) => Err(err),
        }
    }
}

impl Default for ResourceTree {
    fn default() -> Self {
        ResourceTree::new()
    }
}
