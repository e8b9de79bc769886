//! External-tree leaf adapters and the backend contract.
//!
//! The runtime never touches a concrete host tree (a DOM, a widget toolkit, a
//! scene graph). It drives an opaque [`TreeBackend`] through a four-call
//! contract — create a node, insert a child at a position, remove a child,
//! toggle a tag — and everything else about rendering stays on the host side.
//!
//! An [`ElementAdapter`] is the capsule-world wrapper around one backend
//! node: it exposes exactly one hook (where the element's children attach)
//! and one loop (the element's own attachment surface), plus tag pass-through
//! and attach/detach event callbacks.
//!
//! [`MemoryTree`] is the reference backend used by the test suite and by
//! embedders that only need the ordered-tree semantics without a host.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::id::{ElementId, ExtNodeId, HookId, LoopId};

/// Host-tree contract consumed by the attachment layer.
///
/// Calls arrive only after tie validation succeeds, and in an order that
/// keeps every parent's child list equal to the runtime's effective order.
pub trait TreeBackend {
    /// Create a fresh, unattached node.
    fn create_node(&mut self, tag: &str) -> ExtNodeId;

    /// Insert `child` under `parent` at `index` (shifting later children).
    fn insert_child(&mut self, parent: ExtNodeId, child: ExtNodeId, index: usize);

    /// Remove `child` from `parent`.
    fn remove_child(&mut self, parent: ExtNodeId, child: ExtNodeId);

    /// Apply or remove a styling tag on a node.
    fn set_tag(&mut self, node: ExtNodeId, tag: &str, on: bool);

    /// Downcast support for embedders that need their concrete backend back.
    fn as_any(&self) -> &dyn Any;
}

/// In-memory reference backend: an ordered tree of plain nodes.
#[derive(Debug, Default)]
pub struct MemoryTree {
    next: u64,
    names: HashMap<ExtNodeId, String>,
    children: HashMap<ExtNodeId, Vec<ExtNodeId>>,
    tags: HashMap<ExtNodeId, BTreeSet<String>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered children of a node (empty for unknown nodes).
    pub fn children_of(&self, node: ExtNodeId) -> Vec<ExtNodeId> {
        self.children.get(&node).cloned().unwrap_or_default()
    }

    /// Whether a styling tag is currently applied.
    pub fn has_tag(&self, node: ExtNodeId, tag: &str) -> bool {
        self.tags.get(&node).is_some_and(|t| t.contains(tag))
    }

    /// The tag the node was created with.
    pub fn name_of(&self, node: ExtNodeId) -> Option<&str> {
        self.names.get(&node).map(String::as_str)
    }

    /// Total number of created nodes.
    pub fn node_count(&self) -> usize {
        self.names.len()
    }
}

impl TreeBackend for MemoryTree {
    fn create_node(&mut self, tag: &str) -> ExtNodeId {
        self.next += 1;
        let id = ExtNodeId(self.next);
        self.names.insert(id, tag.to_string());
        self.children.insert(id, Vec::new());
        id
    }

    fn insert_child(&mut self, parent: ExtNodeId, child: ExtNodeId, index: usize) {
        let children = self.children.entry(parent).or_default();
        let index = index.min(children.len());
        children.insert(index, child);
    }

    fn remove_child(&mut self, parent: ExtNodeId, child: ExtNodeId) {
        if let Some(children) = self.children.get_mut(&parent) {
            children.retain(|c| *c != child);
        }
    }

    fn set_tag(&mut self, node: ExtNodeId, tag: &str, on: bool) {
        let tags = self.tags.entry(node).or_default();
        if on {
            tags.insert(tag.to_string());
        } else {
            tags.remove(tag);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Callback fired when an element enters or leaves a visible parent.
pub type TieHandler = Rc<dyn Fn(ElementId)>;

/// Capsule-world wrapper around one backend node.
pub struct ElementAdapter {
    pub id: ElementId,
    pub ext: ExtNodeId,
    pub tag: String,
    /// Where this element's children attach.
    pub hook: HookId,
    /// This element's own attachment surface.
    pub loop_id: LoopId,
    /// Last synchronized effective child list, in order.
    pub(crate) cached_children: Vec<ElementId>,
    pub(crate) on_attach: Option<TieHandler>,
    pub(crate) on_detach: Option<TieHandler>,
}

impl std::fmt::Debug for ElementAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementAdapter")
            .field("id", &self.id)
            .field("ext", &self.ext)
            .field("tag", &self.tag)
            .field("hook", &self.hook)
            .field("loop", &self.loop_id)
            .field("children", &self.cached_children.len())
            .finish()
    }
}
