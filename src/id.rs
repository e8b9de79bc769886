//! Arena identifiers for runtime entities.
//!
//! Every class, capsule instance, operation, hook, loop, and element adapter
//! is addressed by a niche-optimized id newtype. Ids are allocated by the
//! owning [`Runtime`](crate::runtime::Runtime) and are never reused.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        ///
        /// Uses `NonZeroU64` so that `Option<`
        #[doc = concat!("[`", stringify!($name), "`]")]
        /// `>` is the same size as the id itself.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Create an id from a raw `u64`. Returns `None` if `raw` is zero.
            pub fn new(raw: u64) -> Option<Self> {
                NonZeroU64::new(raw).map($name)
            }

            /// Get the underlying `u64` value.
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a resolved capsule class.
    ClassId,
    "cls"
);
define_id!(
    /// Identifier of a live capsule instance.
    CapsuleId,
    "cap"
);
define_id!(
    /// Identifier of an operation bound to a capsule instance.
    OperationId,
    "op"
);
define_id!(
    /// Identifier of a hook (ordered multi-child attachment point).
    HookId,
    "hook"
);
define_id!(
    /// Identifier of a loop (single-target attachment point).
    LoopId,
    "loop"
);
define_id!(
    /// Identifier of an element leaf adapter.
    ElementId,
    "elem"
);

/// Opaque handle to a node in the external tree, issued by a
/// [`TreeBackend`](crate::element::TreeBackend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ExtNodeId(pub u64);

impl std::fmt::Display for ExtNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ext:{}", self.0)
    }
}

/// Thread-safe id allocator shared by every arena in a runtime.
///
/// Starts at 1 so that all allocated ids fit the `NonZeroU64` niche.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first issued id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next raw id.
    pub fn fresh(&self) -> NonZeroU64 {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        NonZeroU64::new(raw).expect("id allocator starts at 1 and only increments")
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_niche_optimized() {
        assert_eq!(
            std::mem::size_of::<Option<CapsuleId>>(),
            std::mem::size_of::<CapsuleId>()
        );
        assert!(CapsuleId::new(0).is_none());
        assert_eq!(CapsuleId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(ClassId::new(1).unwrap().to_string(), "cls:1");
        assert_eq!(HookId::new(2).unwrap().to_string(), "hook:2");
        assert_eq!(LoopId::new(3).unwrap().to_string(), "loop:3");
        assert_eq!(ExtNodeId(4).to_string(), "ext:4");
    }

    #[test]
    fn allocator_is_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.fresh();
        let b = alloc.fresh();
        assert!(b.get() > a.get());
        assert_eq!(a.get(), 1);
    }
}
