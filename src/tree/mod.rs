//! The hook/loop attachment tree.
//!
//! Hooks and loops form an externally observable ordered tree: hooks are
//! multi-child attachment points, loops are single-target attachment points,
//! and a tie is the directed edge between them. The [`TreeManager`] owns the
//! node arenas, the element adapters, and the backend, and guarantees three
//! invariants across every mutation:
//!
//! 1. the tie graph stays acyclic (validated before any state changes);
//! 2. each hook's child order is total and mirrors into the external tree;
//! 3. backend synchronization is transactional — the host tree observes a
//!    change only after validation succeeds.
//!
//! Mutation operations live in [`ties`]; effective-order resolution and
//! backend synchronization live in [`sync`].

mod node;
mod sync;
mod ties;

use std::collections::HashMap;
use std::rc::Rc;

use crate::element::{ElementAdapter, MemoryTree, TieHandler, TreeBackend};
use crate::id::{CapsuleId, ElementId, ExtNodeId, HookId, IdAllocator, LoopId};

pub(crate) use node::{HookNode, LoopNode, NodeOwner, NodeRef};

/// Owner of all hooks, loops, and element adapters in a runtime.
pub struct TreeManager {
    alloc: Rc<IdAllocator>,
    pub(crate) hooks: HashMap<HookId, HookNode>,
    pub(crate) loops: HashMap<LoopId, LoopNode>,
    pub(crate) elements: HashMap<ElementId, ElementAdapter>,
    backend: Box<dyn TreeBackend>,
}

impl TreeManager {
    /// Create a manager over the in-memory reference backend.
    pub fn new(alloc: Rc<IdAllocator>) -> Self {
        Self::with_backend(alloc, Box::new(MemoryTree::new()))
    }

    /// Create a manager over a host-supplied backend.
    pub fn with_backend(alloc: Rc<IdAllocator>, backend: Box<dyn TreeBackend>) -> Self {
        Self {
            alloc,
            hooks: HashMap::new(),
            loops: HashMap::new(),
            elements: HashMap::new(),
            backend,
        }
    }

    /// Read access to the backend (downcast via `as_any` for a concrete type).
    pub fn backend(&self) -> &dyn TreeBackend {
        self.backend.as_ref()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn TreeBackend {
        self.backend.as_mut()
    }

    /// Create a hook owned by a capsule instance.
    pub(crate) fn create_hook(&mut self, owner: CapsuleId, name: impl Into<String>) -> HookId {
        let id = HookId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        self.hooks.insert(
            id,
            HookNode {
                id,
                owner: NodeOwner::Capsule(owner),
                name: name.into(),
                parent: None,
                children: Vec::new(),
                element: None,
            },
        );
        id
    }

    /// Create a loop owned by a capsule instance.
    pub(crate) fn create_loop(&mut self, owner: CapsuleId, name: impl Into<String>) -> LoopId {
        let id = LoopId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        self.loops.insert(
            id,
            LoopNode {
                id,
                owner: NodeOwner::Capsule(owner),
                name: name.into(),
                parent: None,
                child: None,
                element: None,
            },
        );
        id
    }

    /// Create an element leaf adapter: one backend node, one hook (children
    /// surface), one loop (self surface).
    pub fn create_element(&mut self, tag: impl Into<String>) -> ElementId {
        let tag = tag.into();
        let id = ElementId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        let ext = self.backend.create_node(&tag);

        let hook = HookId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        self.hooks.insert(
            hook,
            HookNode {
                id: hook,
                owner: NodeOwner::Element(id),
                name: "hook".into(),
                parent: None,
                children: Vec::new(),
                element: Some(id),
            },
        );

        let loop_id = LoopId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        self.loops.insert(
            loop_id,
            LoopNode {
                id: loop_id,
                owner: NodeOwner::Element(id),
                name: "loop".into(),
                parent: None,
                child: None,
                element: Some(id),
            },
        );

        self.elements.insert(
            id,
            ElementAdapter {
                id,
                ext,
                tag,
                hook,
                loop_id,
                cached_children: Vec::new(),
                on_attach: None,
                on_detach: None,
            },
        );
        tracing::debug!(element = %id, %ext, "element adapter created");
        id
    }

    /// The element's children-surface hook.
    pub fn element_hook(&self, element: ElementId) -> Option<HookId> {
        self.elements.get(&element).map(|e| e.hook)
    }

    /// The element's self-surface loop.
    pub fn element_loop(&self, element: ElementId) -> Option<LoopId> {
        self.elements.get(&element).map(|e| e.loop_id)
    }

    /// The backend node an element wraps.
    pub fn element_ext(&self, element: ElementId) -> Option<ExtNodeId> {
        self.elements.get(&element).map(|e| e.ext)
    }

    /// Remove a hook from the arena, detaching its children and its own tie.
    pub(crate) fn remove_hook(&mut self, h: HookId) {
        self.unhook_all(h).ok();
        self.untie(&crate::refs::Ref::Hook(h)).ok();
        self.hooks.remove(&h);
    }

    /// Remove a loop from the arena, detaching both ends.
    pub(crate) fn remove_loop(&mut self, l: LoopId) {
        self.set_loop(l, None).ok();
        self.untie(&crate::refs::Ref::Loop(l)).ok();
        self.loops.remove(&l);
    }

    /// Remove an element adapter and its surfaces. The backend node is left
    /// detached; node deletion is outside the backend contract.
    pub(crate) fn remove_element(&mut self, element: ElementId) {
        let Some(adapter) = self.elements.get(&element) else {
            return;
        };
        let (hook, loop_id) = (adapter.hook, adapter.loop_id);
        self.remove_loop(loop_id);
        self.remove_hook(hook);
        self.elements.remove(&element);
    }

    /// Pass-through styling: apply or remove a tag on the element's node.
    pub fn set_class(&mut self, element: ElementId, tag: &str, on: bool) {
        if let Some(ext) = self.element_ext(element) {
            self.backend.set_tag(ext, tag, on);
        }
    }

    /// Register attach/detach callbacks fired when this element enters or
    /// leaves a visible parent.
    pub fn set_event_handlers(
        &mut self,
        element: ElementId,
        on_attach: Option<TieHandler>,
        on_detach: Option<TieHandler>,
    ) {
        if let Some(adapter) = self.elements.get_mut(&element) {
            adapter.on_attach = on_attach;
            adapter.on_detach = on_detach;
        }
    }
}

impl std::fmt::Debug for TreeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeManager")
            .field("hooks", &self.hooks.len())
            .field("loops", &self.loops.len())
            .field("elements", &self.elements.len())
            .finish()
    }
}
