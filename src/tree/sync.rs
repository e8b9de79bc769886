//! Effective-order resolution and backend synchronization.
//!
//! The tie graph is richer than the external tree: capsule hooks splice their
//! children into the nearest element above them, and loop chains forward to a
//! single element-bound loop at the bottom. Resolution flattens one element's
//! hook into the ordered list of elements the host tree should actually show,
//! and [`TreeManager::resync`] diffs that list against the last synchronized
//! state, driving the backend with the minimal insert/remove sequence.

use std::collections::BTreeSet;

use crate::element::TieHandler;
use crate::id::{ElementId, HookId, LoopId};

use super::{NodeRef, TreeManager};

impl TreeManager {
    /// In-order flattening of a hook into the elements it presents.
    ///
    /// Child hooks splice (their own resolution is inlined in place); child
    /// loops contribute the element their forwarding chain bottoms out at, or
    /// nothing when the chain dangles.
    pub(crate) fn resolve_effective(&self, hook: HookId) -> Vec<ElementId> {
        let mut out = Vec::new();
        self.collect_effective(hook, &mut out);
        out
    }

    fn collect_effective(&self, hook: HookId, out: &mut Vec<ElementId>) {
        let Some(node) = self.hooks.get(&hook) else {
            return;
        };
        for child in &node.children {
            match *child {
                NodeRef::Hook(h) => self.collect_effective(h, out),
                NodeRef::Loop(l) => {
                    if let Some(e) = self.loop_element(l) {
                        out.push(e);
                    }
                }
            }
        }
    }

    /// Follow a loop's child chain down to an element-bound loop.
    fn loop_element(&self, l: LoopId) -> Option<ElementId> {
        let mut cur = l;
        loop {
            let node = self.loops.get(&cur)?;
            if let Some(e) = node.element {
                return Some(e);
            }
            cur = node.child?;
        }
    }

    /// The ordered element children currently presented under an element.
    pub fn effective_children(&self, element: ElementId) -> Vec<ElementId> {
        self.elements
            .get(&element)
            .map(|adapter| self.resolve_effective(adapter.hook))
            .unwrap_or_default()
    }

    pub(crate) fn resync_set(&mut self, affected: &BTreeSet<ElementId>) {
        for element in affected {
            self.resync(*element);
        }
    }

    /// Bring one element's backend children in line with its effective order.
    ///
    /// Emits removals first, then a positional pass that moves surviving
    /// children and inserts newcomers. Attach/detach callbacks fire after all
    /// backend mutation for this element completes.
    pub(crate) fn resync(&mut self, element: ElementId) {
        let Some(adapter) = self.elements.get(&element) else {
            return;
        };
        let parent_ext = adapter.ext;
        let hook = adapter.hook;
        let old = adapter.cached_children.clone();
        let new = self.resolve_effective(hook);
        if old == new {
            return;
        }
        tracing::trace!(
            element = %element,
            old = old.len(),
            new = new.len(),
            "resynchronizing element children",
        );

        let mut fired: Vec<(TieHandler, ElementId)> = Vec::new();
        for child in &old {
            if !new.contains(child) {
                if let Some(child_adapter) = self.elements.get(child) {
                    let child_ext = child_adapter.ext;
                    if let Some(f) = child_adapter.on_detach.clone() {
                        fired.push((f, *child));
                    }
                    self.backend.remove_child(parent_ext, child_ext);
                }
            }
        }

        let mut cur: Vec<ElementId> = old.iter().copied().filter(|c| new.contains(c)).collect();
        for (i, want) in new.iter().enumerate() {
            if cur.get(i) == Some(want) {
                continue;
            }
            let Some(child_adapter) = self.elements.get(want) else {
                continue;
            };
            let child_ext = child_adapter.ext;
            if let Some(pos) = cur.iter().position(|c| c == want) {
                // Surviving child in the wrong slot: move it.
                self.backend.remove_child(parent_ext, child_ext);
                cur.remove(pos);
            } else if let Some(f) = child_adapter.on_attach.clone() {
                fired.push((f, *want));
            }
            self.backend.insert_child(parent_ext, child_ext, i);
            cur.insert(i, *want);
        }

        if let Some(adapter) = self.elements.get_mut(&element) {
            adapter.cached_children = new;
        }
        for (f, id) in fired {
            f(id);
        }
    }
}
