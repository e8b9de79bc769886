//! Live capsule instances.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::class::CapsuleClass;
use crate::id::{CapsuleId, ClassId, ElementId, HookId, LoopId, OperationId};

/// What a named part points at after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartTarget {
    /// A nested capsule instance.
    Capsule(CapsuleId),
    /// An element leaf adapter.
    Element(ElementId),
}

/// A constructed instance of a capsule class.
///
/// Everything structural (parts, operations, hooks, loops) is laid down during
/// construction and fixed afterwards; only the data store mutates over the
/// instance's lifetime.
pub struct CapsuleInstance {
    pub id: CapsuleId,
    pub class: Rc<CapsuleClass>,
    /// The enclosing instance whose construction created this one; `None` for
    /// instances created from root context.
    pub owner: Option<CapsuleId>,
    pub(crate) parts: HashMap<String, PartTarget>,
    pub(crate) ops: HashMap<String, OperationId>,
    pub(crate) hooks: HashMap<String, HookId>,
    pub(crate) loops: HashMap<String, LoopId>,
    pub(crate) data: Map<String, Value>,
}

impl CapsuleInstance {
    pub fn part(&self, name: &str) -> Option<PartTarget> {
        self.parts.get(name).copied()
    }

    pub fn op(&self, name: &str) -> Option<OperationId> {
        self.ops.get(name).copied()
    }

    pub fn hook(&self, name: &str) -> Option<HookId> {
        self.hooks.get(name).copied()
    }

    pub fn loop_named(&self, name: &str) -> Option<LoopId> {
        self.loops.get(name).copied()
    }

    /// True for the instance's own class and every transitive base.
    pub fn is_instance_of(&self, class: ClassId) -> bool {
        self.class.ancestry.contains(&class)
    }
}

impl std::fmt::Debug for CapsuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleInstance")
            .field("id", &self.id)
            .field("class", &self.class.name)
            .field("owner", &self.owner)
            .field("parts", &self.parts.len())
            .field("ops", &self.ops.len())
            .finish()
    }
}
