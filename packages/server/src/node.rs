//! A single addressable entry in the resource tree.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use bytes::Bytes;
use coapling_core::{Method, Path};

use crate::incoming::IncomingRequest;
use crate::notify::{self, NotifyOptions};
use crate::observe::ObserverRegistry;

/// A per-method request handler attached to a node.
///
/// Handlers run outside every tree lock, so they may resolve, create and
/// remove nodes and issue nested outgoing requests freely.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &mut IncomingRequest);
}

impl<F> Handler for F
where
    F: Fn(&mut IncomingRequest) + Send + Sync,
{
    fn handle(&self, request: &mut IncomingRequest) {
        self(request)
    }
}

/// One addressable node: per-method handler slots, opaque content, an
/// observer registry and owned child links.
///
/// The capability set is fixed at the four methods; an empty slot dispatches
/// to a MethodNotAllowed response rather than a dynamic lookup.
pub struct ResourceNode {
    name: String,
    path: Path,
    parent: Weak<ResourceNode>,
    pub(crate) children: RwLock<BTreeMap<String, Arc<ResourceNode>>>,
    handlers: RwLock<[Option<Arc<dyn Handler>>; 4]>,
    observable: AtomicBool,
    pub(crate) observers: RwLock<ObserverRegistry>,
    content: RwLock<Bytes>,
}

impl ResourceNode {
    /// Create the well-known root node. Its parent is absent and it can
    /// never be removed.
    pub(crate) fn new_root() -> Arc<ResourceNode> {
        Arc::new(ResourceNode {
            name: String::new(),
            path: Path::root(),
            parent: Weak::new(),
            children: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new([None, None, None, None]),
            observable: AtomicBool::new(false),
            observers: RwLock::new(ObserverRegistry::new()),
            content: RwLock::new(Bytes::new()),
        })
    }

    pub(crate) fn new_child(parent: &Arc<ResourceNode>, name: &str, path: Path) -> Arc<ResourceNode> {
        Arc::new(ResourceNode {
            name: name.to_string(),
            path,
            parent: Arc::downgrade(parent),
            children: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new([None, None, None, None]),
            observable: AtomicBool::new(false),
            observers: RwLock::new(ObserverRegistry::new()),
            content: RwLock::new(Bytes::new()),
        })
    }

    /// The node's name, unique among its siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root-to-node path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parent node; absent for the root and for detached subtrees.
    pub fn parent(&self) -> Option<Arc<ResourceNode>> {
        self.parent.upgrade()
    }

    /// True for the tree root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Look up a direct child by name.
    pub fn child(&self, name: &str) -> Option<Arc<ResourceNode>> {
        self.children.read().unwrap().get(name).cloned()
    }

    /// Names of all direct children, in order.
    pub fn child_names(&self) -> Vec<String> {
        self.children.read().unwrap().keys().cloned().collect()
    }

    /// Assign the handler slot for `method`, replacing any previous one.
    pub fn set_handler(&self, method: Method, handler: impl Handler + 'static) {
        self.handlers.write().unwrap()[method.index()] = Some(Arc::new(handler));
    }

    /// Clear the handler slot for `method`.
    pub fn clear_handler(&self, method: Method) {
        self.handlers.write().unwrap()[method.index()] = None;
    }

    /// The handler for `method`, if the slot is filled.
    pub fn handler(&self, method: Method) -> Option<Arc<dyn Handler>> {
        self.handlers.read().unwrap()[method.index()].clone()
    }

    /// The node's current content.
    pub fn content(&self) -> Bytes {
        self.content.read().unwrap().clone()
    }

    /// Replace the node's content. Does not notify observers; call
    /// [`ResourceNode::changed`] once the new state should be pushed.
    pub fn set_content(&self, content: impl Into<Bytes>) {
        *self.content.write().unwrap() = content.into();
    }

    pub fn set_observable(&self, observable: bool) {
        self.observable.store(observable, Ordering::SeqCst);
    }

    pub fn is_observable(&self) -> bool {
        self.observable.load(Ordering::SeqCst)
    }

    /// Push the current content to every registered observer.
    ///
    /// Uses the default delivery options (no retries). See
    /// [`NotifyOptions`] and [`ResourceNode::changed_with`].
    pub fn changed(self: &Arc<Self>) {
        self.changed_with(&NotifyOptions::default());
    }

    /// Push the current content to every registered observer with explicit
    /// delivery options.
    pub fn changed_with(self: &Arc<Self>, options: &NotifyOptions) {
        notify::notify_observers(self, options);
    }
}

impl std::fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceNode")
            .field("path", &self.path)
            .field("observable", &self.is_observable())
            .field("children", &self.child_names())
            .finish()
    }
}
