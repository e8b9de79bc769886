//! Operations: named, directional, visibility-scoped callables on a capsule.
//!
//! An [`Operation`] is created during instance construction from the class's
//! operation slots. Its identity (owner, name, direction, visibility) is
//! immutable; only the wire list may grow afterwards. The implementation
//! chain is ordered derived-most first, which is what makes
//! [`Runtime::superior`](crate::runtime::Runtime::superior) walk upward
//! through override levels.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapletResult;
use crate::id::{CapsuleId, OperationId};
use crate::runtime::Runtime;

/// Which way an operation communicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Incoming: invoked from outside the capsule (subject to visibility).
    In,
    /// Outgoing: fired from inside the capsule and delegated outward through
    /// wire edges and listeners.
    Out,
}

/// Who may invoke an incoming operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Callable by the capsule's direct owner (and the capsule itself).
    Public,
    /// Callable only from within the owning capsule's own method bodies.
    Private,
}

/// User-supplied implementation of an operation.
///
/// Bodies receive the runtime, a call descriptor, and the invocation
/// arguments; they execute inside the owning instance's context.
pub type OpBody = Rc<dyn Fn(&mut Runtime, OpCall, &[Value]) -> CapletResult<Value>>;

/// User-supplied initializer, run once at the end of instance construction.
pub type InitBody = Rc<dyn Fn(&mut Runtime, CapsuleId, &[Value]) -> CapletResult<()>>;

/// User-supplied recovery handler (see the `handle` propagation rules).
pub type HandleBody =
    Rc<dyn Fn(&mut Runtime, CapsuleId, &crate::error::CapletError) -> CapletResult<()>>;

/// Externally wired listener attached to an operation with
/// [`Runtime::wire`](crate::runtime::Runtime::wire).
pub type ListenerFn = Rc<dyn Fn(&mut Runtime, &[Value]) -> CapletResult<Value>>;

/// Descriptor handed to an operation body for the current invocation.
///
/// Carries enough identity for the body to call back into the runtime:
/// reading data, invoking part operations, or delegating to the base class
/// implementation via `superior`.
#[derive(Debug, Clone, Copy)]
pub struct OpCall {
    /// The instance whose operation is executing.
    pub capsule: CapsuleId,
    /// The executing operation.
    pub operation: OperationId,
    /// Position in the override chain (0 = derived-most implementation).
    pub(crate) depth: usize,
}

/// A wire edge created by a class binding: when the source operation fires,
/// `target` is invoked under the context of the instance whose class declared
/// the binding. Recording that context is what makes error propagation follow
/// the dynamic containment chain established at wiring time.
#[derive(Clone)]
pub(crate) struct WireEdge {
    pub target: OperationId,
    pub ctx: CapsuleId,
}

/// An externally attached listener, fired after wire edges in attachment
/// order, under the context that was active when it was wired.
#[derive(Clone)]
pub(crate) struct ListenerEdge {
    pub f: ListenerFn,
    pub ctx: Option<CapsuleId>,
}

/// A callable bound to a live capsule instance.
pub struct Operation {
    pub id: OperationId,
    /// The instance this operation belongs to.
    pub owner: CapsuleId,
    pub name: String,
    pub direction: Direction,
    pub visibility: Visibility,
    /// Event-style outgoing operations fan out to every wire target and
    /// always yield `Null`; non-multicast outgoing operations yield the last
    /// target's result.
    pub multicast: bool,
    /// Override chain, derived-most first. May be empty for outgoing
    /// operations that exist purely as wiring points.
    pub(crate) impls: Vec<OpBody>,
    pub(crate) wires: Vec<WireEdge>,
    pub(crate) listeners: Vec<ListenerEdge>,
}

impl Operation {
    /// Number of wire edges and listeners currently attached.
    pub fn fan_out(&self) -> usize {
        self.wires.len() + self.listeners.len()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("visibility", &self.visibility)
            .field("impls", &self.impls.len())
            .field("fan_out", &self.fan_out())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_counts_wires_and_listeners() {
        let op = Operation {
            id: OperationId::new(1).unwrap(),
            owner: CapsuleId::new(1).unwrap(),
            name: "click".into(),
            direction: Direction::Out,
            visibility: Visibility::Public,
            multicast: true,
            impls: Vec::new(),
            wires: vec![WireEdge {
                target: OperationId::new(2).unwrap(),
                ctx: CapsuleId::new(1).unwrap(),
            }],
            listeners: vec![ListenerEdge {
                f: Rc::new(|_, _| Ok(Value::Null)),
                ctx: None,
            }],
        };
        assert_eq!(op.fan_out(), 2);
    }
}
