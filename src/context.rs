//! Call-context tracking: which capsule instance is currently executing.
//!
//! Access control in this runtime is dynamic — it depends on *who is calling*,
//! not on what is declared at the call site. The [`ContextTracker`] is an
//! explicit stack of capsule identities maintained by the runtime around every
//! operation invocation: the top of the stack is the instance whose method
//! body is executing, and an empty stack means external (root) code.
//!
//! Push/pop symmetry is an invariant: every entered context is exited exactly
//! once, including on error returns. The runtime enforces this at each
//! operation boundary.

use crate::error::ContextError;
use crate::id::CapsuleId;

/// Explicit stack of executing capsule identities.
#[derive(Debug)]
pub struct ContextTracker {
    stack: Vec<CapsuleId>,
    max_depth: usize,
}

impl ContextTracker {
    /// Create a tracker with the given depth bound.
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_depth,
        }
    }

    /// The instance whose code is currently executing, or `None` for external
    /// (root) code.
    pub fn current(&self) -> Option<CapsuleId> {
        self.stack.last().copied()
    }

    /// Whether the tracker is at the root context.
    pub fn is_root(&self) -> bool {
        self.stack.is_empty()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enter the context of `capsule`.
    pub fn push(&mut self, capsule: CapsuleId) -> Result<(), ContextError> {
        if self.stack.len() >= self.max_depth {
            return Err(ContextError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.stack.push(capsule);
        Ok(())
    }

    /// Leave the innermost context.
    pub fn pop(&mut self) -> Option<CapsuleId> {
        self.stack.pop()
    }

    /// Snapshot the current stack for later resumption.
    pub fn capture(&self) -> ContextToken {
        ContextToken {
            stack: self.stack.clone(),
        }
    }

    /// Replace the stack with a snapshot, returning the displaced stack.
    ///
    /// Used by [`Runtime::resume`](crate::runtime::Runtime::resume) to re-enter
    /// a captured context for asynchronous continuations; the continuation is
    /// then validated by the ordinary access rules, exactly as a fresh call.
    pub(crate) fn swap(&mut self, token: ContextToken) -> ContextToken {
        let displaced = ContextToken {
            stack: std::mem::replace(&mut self.stack, token.stack),
        };
        displaced
    }
}

/// Snapshot of a context stack, captured by an operation that performs
/// asynchronous work and wants to re-enter the runtime later.
#[derive(Debug, Clone)]
pub struct ContextToken {
    stack: Vec<CapsuleId>,
}

impl ContextToken {
    /// The innermost instance of the captured context.
    pub fn current(&self) -> Option<CapsuleId> {
        self.stack.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(raw: u64) -> CapsuleId {
        CapsuleId::new(raw).unwrap()
    }

    #[test]
    fn push_pop_symmetry() {
        let mut ctx = ContextTracker::new(8);
        assert!(ctx.is_root());
        assert_eq!(ctx.current(), None);

        ctx.push(cap(1)).unwrap();
        ctx.push(cap(2)).unwrap();
        assert_eq!(ctx.current(), Some(cap(2)));
        assert_eq!(ctx.depth(), 2);

        assert_eq!(ctx.pop(), Some(cap(2)));
        assert_eq!(ctx.current(), Some(cap(1)));
        assert_eq!(ctx.pop(), Some(cap(1)));
        assert!(ctx.is_root());
        assert_eq!(ctx.pop(), None);
    }

    #[test]
    fn depth_bound() {
        let mut ctx = ContextTracker::new(2);
        ctx.push(cap(1)).unwrap();
        ctx.push(cap(2)).unwrap();
        let err = ctx.push(cap(3)).unwrap_err();
        assert!(matches!(err, ContextError::DepthExceeded { max_depth: 2 }));
        // Failed push did not grow the stack.
        assert_eq!(ctx.depth(), 2);
    }

    #[test]
    fn capture_and_swap() {
        let mut ctx = ContextTracker::new(8);
        ctx.push(cap(1)).unwrap();
        let token = ctx.capture();
        ctx.pop();
        assert!(ctx.is_root());

        let displaced = ctx.swap(token);
        assert_eq!(ctx.current(), Some(cap(1)));
        assert_eq!(displaced.current(), None);
    }
}
