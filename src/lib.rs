//! # caplet
//!
//! A capsule-composition runtime: encapsulated components ("capsules") with a
//! restricted public surface, composed into trees and mirrored into an
//! external ordered tree through hook/loop attachment points.
//!
//! The runtime provides four things:
//!
//! - **Dynamic access control** — whether an operation call is legal depends
//!   on *who is calling* (the current execution context), not on what is
//!   declared at the call site. Private operations are reachable only from
//!   their own instance; public operations only from the direct owner.
//! - **Definition resolution** — a declarative [`CapsuleSpec`] plus its base
//!   chain is flattened once, at define time, into an immutable class table
//!   with validated overrides, per-key data defaults, and typed bindings.
//! - **The attachment tree** — hooks (ordered multi-child points) and loops
//!   (single-target points) form an acyclic tie graph that is incrementally
//!   and transactionally mirrored into a host tree behind a small
//!   [`TreeBackend`] trait.
//! - **Structured recovery** — a failing operation propagates along the owner
//!   chain to the nearest ancestor declaring a `handle` function; which
//!   handler runs depends on where the instance sits in the composition.
//!
//! ## Quick start
//!
//! ```
//! use caplet::{CapsuleSpec, Runtime};
//! use serde_json::Value;
//! use std::rc::Rc;
//!
//! let mut rt = Runtime::new();
//! let greeter = rt
//!     .define(CapsuleSpec::new("Greeter").public_in(
//!         "greet",
//!         Rc::new(|_rt, _call, args| {
//!             let name = args.first().and_then(Value::as_str).unwrap_or("world");
//!             Ok(Value::from(format!("hello, {name}")))
//!         }),
//!     ))
//!     .unwrap();
//! let g = rt.instantiate(greeter, &[]).unwrap();
//! let out = rt.call(g, "greet", &[Value::from("caplet")]).unwrap();
//! assert_eq!(out, Value::from("hello, caplet"));
//! ```

pub mod capsule;
pub mod class;
pub mod context;
pub mod element;
pub mod error;
mod handle;
pub mod id;
pub mod ops;
pub mod refs;
pub mod runtime;
pub mod spec;
pub mod tree;

pub use capsule::{CapsuleInstance, PartTarget};
pub use class::{Binding, BindingKind, CapsuleClass, MemberKind, OpSlot, PartSlot};
pub use context::{ContextToken, ContextTracker};
pub use element::{ElementAdapter, MemoryTree, TieHandler, TreeBackend};
pub use error::{CapletError, CapletResult, ContextError, DefineError, TreeError};
pub use id::{CapsuleId, ClassId, ElementId, ExtNodeId, HookId, LoopId, OperationId};
pub use ops::{Direction, HandleBody, InitBody, ListenerFn, OpBody, OpCall, Visibility};
pub use refs::{Ref, is_capsule, is_capsule_class, is_hook, is_loop, is_operation};
pub use runtime::{Runtime, RuntimeConfig};
pub use spec::{BindingDecl, CapsuleSpec, Endpoint, OpDecl, PartArgs, PartDecl, PartKind, Target};
pub use tree::TreeManager;
