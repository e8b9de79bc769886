//! Arena records for hooks and loops.

use crate::id::{CapsuleId, ElementId, HookId, LoopId};

/// Internal edge endpoint: either side of a tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeRef {
    Hook(HookId),
    Loop(LoopId),
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRef::Hook(h) => write!(f, "{h}"),
            NodeRef::Loop(l) => write!(f, "{l}"),
        }
    }
}

/// Who a hook or loop belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeOwner {
    Capsule(CapsuleId),
    Element(ElementId),
}

/// Ordered multi-child attachment point (parent side).
///
/// A hook's children are loops (attachment of a subtree top) or other hooks
/// (splice: the child hook's own children materialize here). A hook itself
/// has at most one parent hook.
#[derive(Debug)]
pub(crate) struct HookNode {
    pub id: HookId,
    pub owner: NodeOwner,
    pub name: String,
    pub parent: Option<HookId>,
    pub children: Vec<NodeRef>,
    /// Set when this hook is an element's children surface.
    pub element: Option<ElementId>,
}

/// Single-target attachment point (child side).
///
/// A loop has at most one parent (a hook it is hooked into, or an outer loop
/// forwarding to it) and at most one child loop (the pass-through /
/// public→private indirection target). Chains of loops bottom out at an
/// element-bound loop, which is what actually appears in the external tree.
#[derive(Debug)]
pub(crate) struct LoopNode {
    pub id: LoopId,
    pub owner: NodeOwner,
    pub name: String,
    pub parent: Option<NodeRef>,
    pub child: Option<LoopId>,
    /// Set when this loop is an element's self surface.
    pub element: Option<ElementId>,
}
