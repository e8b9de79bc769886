//! Tie mutation algebra.
//!
//! Every mutation follows the same transactional shape: validate argument
//! kinds, validate existence, validate acyclicity — then, and only then,
//! mutate the tie state and resynchronize the affected external parents.
//! A rejected mutation leaves every existing tie untouched.

use std::collections::BTreeSet;

use crate::error::{CapletResult, TreeError};
use crate::id::{ElementId, HookId, LoopId};
use crate::refs::Ref;

use super::{NodeRef, TreeManager};

fn to_ref(n: NodeRef) -> Ref {
    match n {
        NodeRef::Hook(h) => Ref::Hook(h),
        NodeRef::Loop(l) => Ref::Loop(l),
    }
}

impl TreeManager {
    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    /// Accept only hook/loop handles; the argument-type contract of the tie
    /// algebra.
    fn end_ref(&self, r: &Ref) -> CapletResult<NodeRef> {
        match r {
            Ref::Hook(h) => Ok(NodeRef::Hook(*h)),
            Ref::Loop(l) => Ok(NodeRef::Loop(*l)),
            other => Err(TreeError::IllegalArgument {
                expected: "a hook or loop",
                got: other.kind().to_string(),
            }
            .into()),
        }
    }

    fn ensure_exists(&self, n: NodeRef) -> CapletResult<()> {
        let alive = match n {
            NodeRef::Hook(h) => self.hooks.contains_key(&h),
            NodeRef::Loop(l) => self.loops.contains_key(&l),
        };
        if alive {
            Ok(())
        } else {
            Err(TreeError::UnknownNode {
                node: n.to_string(),
            }
            .into())
        }
    }

    fn ensure_hook(&self, h: HookId) -> CapletResult<()> {
        self.ensure_exists(NodeRef::Hook(h))
    }

    pub(crate) fn parent_of_node(&self, n: NodeRef) -> Option<NodeRef> {
        match n {
            NodeRef::Hook(h) => self.hooks.get(&h)?.parent.map(NodeRef::Hook),
            NodeRef::Loop(l) => self.loops.get(&l)?.parent,
        }
    }

    /// Which element a node is a surface of, if any.
    fn element_of(&self, n: NodeRef) -> Option<ElementId> {
        match n {
            NodeRef::Hook(h) => self.hooks.get(&h)?.element,
            NodeRef::Loop(l) => self.loops.get(&l)?.element,
        }
    }

    /// Reject a tie whose child is the parent itself or any of the parent's
    /// ancestors; run before any mutation.
    ///
    /// The walk covers the combined graph, not just raw parent links: an
    /// element's hook sits wherever the element's own loop is attached, so
    /// reaching an element-bound hook continues through that element's loop.
    /// A visited node that is any surface of the child's element closes a
    /// cycle just as the child itself would.
    fn check_cycle(&self, parent: NodeRef, child: NodeRef) -> CapletResult<()> {
        let child_element = self.element_of(child);
        let cycle = || -> crate::error::CapletError {
            TreeError::TieCycle {
                parent: parent.to_string(),
                child: child.to_string(),
            }
            .into()
        };
        let mut cur = Some(parent);
        while let Some(n) = cur {
            if n == child || (child_element.is_some() && self.element_of(n) == child_element) {
                return Err(cycle());
            }
            cur = match n {
                NodeRef::Hook(h) => {
                    let Some(node) = self.hooks.get(&h) else {
                        break;
                    };
                    match node.element {
                        Some(e) => self.elements.get(&e).map(|a| NodeRef::Loop(a.loop_id)),
                        None => node.parent.map(NodeRef::Hook),
                    }
                }
                NodeRef::Loop(l) => self.loops.get(&l).and_then(|node| node.parent),
            };
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation primitives (callers have validated)
    // -----------------------------------------------------------------------

    /// Remove the child's current tie, returning the old parent end.
    fn detach_internal(&mut self, child: NodeRef) -> Option<NodeRef> {
        let old_parent = self.parent_of_node(child)?;
        match old_parent {
            NodeRef::Hook(h) => {
                if let Some(hook) = self.hooks.get_mut(&h) {
                    hook.children.retain(|c| *c != child);
                }
            }
            NodeRef::Loop(l) => {
                if let Some(parent_loop) = self.loops.get_mut(&l) {
                    parent_loop.child = None;
                }
            }
        }
        match child {
            NodeRef::Hook(h) => self.hooks.get_mut(&h).expect("validated").parent = None,
            NodeRef::Loop(l) => self.loops.get_mut(&l).expect("validated").parent = None,
        }
        Some(old_parent)
    }

    /// Insert a validated tie. For a hook parent, `index` positions the child
    /// (`None` appends); a loop parent holds a single child loop and a
    /// replaced child is detached.
    fn insert_internal(&mut self, parent: NodeRef, child: NodeRef, index: Option<usize>) {
        match parent {
            NodeRef::Hook(h) => {
                let hook = self.hooks.get_mut(&h).expect("validated");
                match index {
                    Some(i) => {
                        let i = i.min(hook.children.len());
                        hook.children.insert(i, child);
                    }
                    None => hook.children.push(child),
                }
                match child {
                    NodeRef::Hook(c) => {
                        self.hooks.get_mut(&c).expect("validated").parent = Some(h);
                    }
                    NodeRef::Loop(c) => {
                        self.loops.get_mut(&c).expect("validated").parent =
                            Some(NodeRef::Hook(h));
                    }
                }
            }
            NodeRef::Loop(l) => {
                let NodeRef::Loop(child_loop) = child else {
                    unreachable!("loop parents hold loop children; validated by callers");
                };
                let displaced = self
                    .loops
                    .get_mut(&l)
                    .expect("validated")
                    .child
                    .replace(child_loop);
                if let Some(old) = displaced
                    && old != child_loop
                    && let Some(node) = self.loops.get_mut(&old)
                {
                    node.parent = None;
                }
                self.loops.get_mut(&child_loop).expect("validated").parent =
                    Some(NodeRef::Loop(l));
            }
        }
    }

    fn attach_many(
        &mut self,
        h: HookId,
        index: Option<usize>,
        items: &[Ref],
    ) -> CapletResult<()> {
        self.ensure_hook(h)?;
        let mut ends = Vec::with_capacity(items.len());
        for r in items {
            let end = self.end_ref(r)?;
            self.ensure_exists(end)?;
            ends.push(end);
        }
        // Empty variadic call is a no-op, even with an odd index.
        if ends.is_empty() {
            return Ok(());
        }

        let hook_ref = NodeRef::Hook(h);
        if let Some(i) = index {
            let children = &self.hooks.get(&h).expect("checked above").children;
            let moving_within = ends.iter().filter(|e| children.contains(e)).count();
            let len = children.len() - moving_within;
            if i > len {
                return Err(TreeError::IndexOutOfBounds { index: i, len }.into());
            }
        }
        for end in &ends {
            self.check_cycle(hook_ref, *end)?;
        }

        // Validation done; mutate and then sync.
        let mut affected = BTreeSet::new();
        if let Some(e) = self.element_above(hook_ref) {
            affected.insert(e);
        }
        let mut at = index;
        for end in ends {
            if let Some(old) = self.detach_internal(end)
                && let Some(e) = self.element_above(old)
            {
                affected.insert(e);
            }
            self.insert_internal(hook_ref, end, at);
            at = at.map(|i| i + 1);
        }
        self.resync_set(&affected);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hook-side operations
    // -----------------------------------------------------------------------

    /// Append items as children, preserving caller order.
    pub fn hook(&mut self, h: HookId, items: &[Ref]) -> CapletResult<()> {
        self.attach_many(h, None, items)
    }

    /// Insert items contiguously at `index`, shifting later children right.
    pub fn hook_at(&mut self, h: HookId, index: usize, items: &[Ref]) -> CapletResult<()> {
        self.attach_many(h, Some(index), items)
    }

    /// Remove the given ties if present; absent ties are a no-op.
    pub fn unhook(&mut self, h: HookId, items: &[Ref]) -> CapletResult<()> {
        self.ensure_hook(h)?;
        let mut ends = Vec::with_capacity(items.len());
        for r in items {
            ends.push(self.end_ref(r)?);
        }

        let mut affected = BTreeSet::new();
        if let Some(e) = self.element_above(NodeRef::Hook(h)) {
            affected.insert(e);
        }
        let mut touched = false;
        for end in ends {
            let is_child = self
                .hooks
                .get(&h)
                .is_some_and(|hook| hook.children.contains(&end));
            if is_child {
                self.detach_internal(end);
                touched = true;
            }
        }
        if touched {
            self.resync_set(&affected);
        }
        Ok(())
    }

    /// Detach all children; the hook's own parent tie is untouched.
    pub fn unhook_all(&mut self, h: HookId) -> CapletResult<()> {
        self.ensure_hook(h)?;
        let mut affected = BTreeSet::new();
        if let Some(e) = self.element_above(NodeRef::Hook(h)) {
            affected.insert(e);
        }
        let children: Vec<NodeRef> = self.hooks.get(&h).expect("checked above").children.clone();
        for child in children {
            self.detach_internal(child);
        }
        self.resync_set(&affected);
        Ok(())
    }

    /// Replace the entire ordered child set with exactly the given items;
    /// an empty call clears all children.
    pub fn rehook(&mut self, h: HookId, items: &[Ref]) -> CapletResult<()> {
        self.ensure_hook(h)?;
        let hook_ref = NodeRef::Hook(h);
        let mut ends = Vec::with_capacity(items.len());
        for r in items {
            let end = self.end_ref(r)?;
            self.ensure_exists(end)?;
            self.check_cycle(hook_ref, end)?;
            ends.push(end);
        }

        let mut affected = BTreeSet::new();
        if let Some(e) = self.element_above(hook_ref) {
            affected.insert(e);
        }
        let old_children: Vec<NodeRef> =
            self.hooks.get(&h).expect("checked above").children.clone();
        for child in old_children {
            self.detach_internal(child);
        }
        for end in ends {
            if let Some(old) = self.detach_internal(end)
                && let Some(e) = self.element_above(old)
            {
                affected.insert(e);
            }
            self.insert_internal(hook_ref, end, None);
        }
        self.resync_set(&affected);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Symmetric tie constructors
    // -----------------------------------------------------------------------

    /// Create a single tie between a parent end and a child end.
    ///
    /// A hook parent accepts hook or loop children (appended at the end); a
    /// loop parent accepts a single loop child, atomically replacing any
    /// previous one.
    pub fn tie(&mut self, parent: &Ref, child: &Ref) -> CapletResult<()> {
        let parent = self.end_ref(parent)?;
        let child_end = self.end_ref(child)?;
        self.ensure_exists(parent)?;
        self.ensure_exists(child_end)?;
        if matches!(parent, NodeRef::Loop(_)) && matches!(child_end, NodeRef::Hook(_)) {
            return Err(TreeError::IllegalArgument {
                expected: "a loop child under a loop parent",
                got: "hook".to_string(),
            }
            .into());
        }
        self.check_cycle(parent, child_end)?;

        let mut affected = BTreeSet::new();
        if let Some(e) = self.element_above(parent) {
            affected.insert(e);
        }
        if let Some(old) = self.detach_internal(child_end)
            && let Some(e) = self.element_above(old)
        {
            affected.insert(e);
        }
        self.insert_internal(parent, child_end, None);
        self.resync_set(&affected);
        Ok(())
    }

    /// Remove the child end's current tie, if any.
    pub fn untie(&mut self, child: &Ref) -> CapletResult<()> {
        let child = self.end_ref(child)?;
        self.ensure_exists(child)?;
        let mut affected = BTreeSet::new();
        if let Some(old) = self.detach_internal(child)
            && let Some(e) = self.element_above(old)
        {
            affected.insert(e);
        }
        self.resync_set(&affected);
        Ok(())
    }

    /// Point the loop at a parent hook (`None` removes the tie).
    pub fn set_hook(&mut self, l: LoopId, hook: Option<&Ref>) -> CapletResult<()> {
        match hook {
            Some(r @ Ref::Hook(_)) => self.tie(r, &Ref::Loop(l)),
            Some(other) => Err(TreeError::IllegalArgument {
                expected: "a hook",
                got: other.kind().to_string(),
            }
            .into()),
            None => self.untie(&Ref::Loop(l)),
        }
    }

    /// Point the loop at a parent hook or outer loop (`None` removes the tie).
    pub fn set_parent(&mut self, l: LoopId, parent: Option<&Ref>) -> CapletResult<()> {
        match parent {
            Some(r) => self.tie(r, &Ref::Loop(l)),
            None => self.untie(&Ref::Loop(l)),
        }
    }

    /// Tie a child loop beneath this loop (`None` removes the existing child
    /// tie). The pass-through primitive behind public→private indirection.
    pub fn set_loop(&mut self, l: LoopId, child: Option<&Ref>) -> CapletResult<()> {
        match child {
            Some(r @ Ref::Loop(_)) => self.tie(&Ref::Loop(l), r),
            Some(other) => Err(TreeError::IllegalArgument {
                expected: "a loop",
                got: other.kind().to_string(),
            }
            .into()),
            None => {
                self.ensure_exists(NodeRef::Loop(l))?;
                let child = self.loops.get(&l).expect("checked above").child;
                if let Some(c) = child {
                    self.untie(&Ref::Loop(c))?;
                }
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    /// The hook this loop is directly tied into, if its parent is a hook.
    pub fn get_hook(&self, l: LoopId) -> Option<HookId> {
        match self.loops.get(&l)?.parent? {
            NodeRef::Hook(h) => Some(h),
            NodeRef::Loop(_) => None,
        }
    }

    /// The parent end of a hook or loop.
    pub fn get_parent(&self, node: &Ref) -> CapletResult<Option<Ref>> {
        let n = self.end_ref(node)?;
        self.ensure_exists(n)?;
        Ok(self.parent_of_node(n).map(to_ref))
    }

    /// The child loop tied beneath this loop, if any.
    pub fn get_loop(&self, l: LoopId) -> Option<LoopId> {
        self.loops.get(&l)?.child
    }

    /// All ties of a node: children for a hook; parent and child for a loop.
    pub fn get_ties(&self, node: &Ref) -> CapletResult<Vec<Ref>> {
        let n = self.end_ref(node)?;
        self.ensure_exists(n)?;
        Ok(match n {
            NodeRef::Hook(h) => self
                .hooks
                .get(&h)
                .expect("checked above")
                .children
                .iter()
                .copied()
                .map(to_ref)
                .collect(),
            NodeRef::Loop(l) => {
                let node = self.loops.get(&l).expect("checked above");
                let mut ties = Vec::new();
                if let Some(p) = node.parent {
                    ties.push(to_ref(p));
                }
                if let Some(c) = node.child {
                    ties.push(Ref::Loop(c));
                }
                ties
            }
        })
    }

    /// Whether a direct tie exists between the two ends.
    pub fn is_tied_to(&self, a: &Ref, b: &Ref) -> CapletResult<bool> {
        let a_end = self.end_ref(a)?;
        let b_end = self.end_ref(b)?;
        self.ensure_exists(a_end)?;
        self.ensure_exists(b_end)?;
        Ok(self.parent_of_node(a_end) == Some(b_end) || self.parent_of_node(b_end) == Some(a_end))
    }

    /// Ordered children of a hook.
    pub fn children(&self, h: HookId) -> Vec<Ref> {
        self.hooks
            .get(&h)
            .map(|hook| hook.children.iter().copied().map(to_ref).collect())
            .unwrap_or_default()
    }

    /// The nearest element at or above this node in the tie graph, walking
    /// parent links; element-bound hooks terminate the walk.
    pub(crate) fn element_above(&self, start: NodeRef) -> Option<ElementId> {
        let mut cur = start;
        loop {
            match cur {
                NodeRef::Hook(h) => {
                    let node = self.hooks.get(&h)?;
                    if let Some(e) = node.element {
                        return Some(e);
                    }
                    cur = NodeRef::Hook(node.parent?);
                }
                NodeRef::Loop(l) => {
                    cur = self.loops.get(&l)?.parent?;
                }
            }
        }
    }
}
