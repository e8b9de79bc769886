//! Runtime value handles and introspection predicates.
//!
//! A [`Ref`] is the dynamic handle passed around the composition APIs: raw
//! values, classes, capsule instances, operations, hooks, and loops all
//! travel through the same type. Attachment operations validate the kinds
//! they accept at call time, which is what keeps the argument-validation
//! errors of the tie algebra observable through a typed API.

use serde_json::Value;

use crate::id::{CapsuleId, ClassId, HookId, LoopId, OperationId};

/// Dynamic handle to any runtime entity or raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum Ref {
    /// A plain JSON value.
    Value(Value),
    /// A defined capsule class.
    Class(ClassId),
    /// A live capsule instance.
    Capsule(CapsuleId),
    /// An operation bound to an instance.
    Operation(OperationId),
    /// A hook attachment point.
    Hook(HookId),
    /// A loop attachment point.
    Loop(LoopId),
}

impl Ref {
    /// Short kind name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Ref::Value(_) => "value",
            Ref::Class(_) => "class",
            Ref::Capsule(_) => "capsule",
            Ref::Operation(_) => "operation",
            Ref::Hook(_) => "hook",
            Ref::Loop(_) => "loop",
        }
    }
}

impl From<ClassId> for Ref {
    fn from(id: ClassId) -> Self {
        Ref::Class(id)
    }
}

impl From<CapsuleId> for Ref {
    fn from(id: CapsuleId) -> Self {
        Ref::Capsule(id)
    }
}

impl From<OperationId> for Ref {
    fn from(id: OperationId) -> Self {
        Ref::Operation(id)
    }
}

impl From<HookId> for Ref {
    fn from(id: HookId) -> Self {
        Ref::Hook(id)
    }
}

impl From<LoopId> for Ref {
    fn from(id: LoopId) -> Self {
        Ref::Loop(id)
    }
}

impl From<Value> for Ref {
    fn from(value: Value) -> Self {
        Ref::Value(value)
    }
}

/// Whether the handle refers to a live capsule instance.
pub fn is_capsule(r: &Ref) -> bool {
    matches!(r, Ref::Capsule(_))
}

/// Whether the handle refers to a defined capsule class.
pub fn is_capsule_class(r: &Ref) -> bool {
    matches!(r, Ref::Class(_))
}

/// Whether the handle refers to an operation.
pub fn is_operation(r: &Ref) -> bool {
    matches!(r, Ref::Operation(_))
}

/// Whether the handle refers to a hook.
pub fn is_hook(r: &Ref) -> bool {
    matches!(r, Ref::Hook(_))
}

/// Whether the handle refers to a loop.
pub fn is_loop(r: &Ref) -> bool {
    matches!(r, Ref::Loop(_))
}
