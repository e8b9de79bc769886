//! Rich diagnostic error types for the caplet runtime.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Error kinds split into two families that the handle propagator treats
//! differently (see [`CapletError::is_recoverable`]): application errors and
//! context violations raised inside an operation body may be consumed by an
//! ancestor capsule's `handle` function; argument-validation and structural
//! errors always surface to the caller.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// Top-level error type for the caplet runtime.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum CapletError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Define(#[from] DefineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),

    /// Error raised by a user-supplied operation, init, or handler body.
    #[error("{message}")]
    #[diagnostic(
        code(caplet::app::error),
        help(
            "An operation implementation reported a failure. If an ancestor \
             capsule declares a `handle` function it will intercept this error; \
             otherwise it surfaces to the original caller."
        )
    )]
    Application {
        message: String,
        /// Optional structured payload attached by the throwing body.
        payload: Option<Value>,
    },

    /// Propagation marker: the handle search for this error already walked the
    /// full owner chain, so enclosing operation boundaries must not run it
    /// again. Unwrapped before the error reaches external callers.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Escalated(Box<CapletError>),
}

impl CapletError {
    /// Build an application error with a plain message.
    pub fn app(message: impl Into<String>) -> Self {
        CapletError::Application {
            message: message.into(),
            payload: None,
        }
    }

    /// Build an application error carrying a structured payload.
    pub fn app_with(message: impl Into<String>, payload: Value) -> Self {
        CapletError::Application {
            message: message.into(),
            payload: Some(payload),
        }
    }

    /// Whether the handle propagator may intercept this error.
    ///
    /// Application errors and context violations raised while an operation body
    /// runs are recoverable; validation and structural errors are programmer
    /// errors in composition and always surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CapletError::Application { .. }
                | CapletError::Context(ContextError::OutOfContext { .. })
        )
    }

    /// Strip the propagation marker, if any, yielding the error that external
    /// callers observe.
    pub fn into_surfaced(self) -> Self {
        match self {
            CapletError::Escalated(inner) => inner.into_surfaced(),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Context errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    #[error("out of context: {operation} is not accessible from the current context")]
    #[diagnostic(
        code(caplet::context::out_of_context),
        help(
            "Private operations are callable only from within the owning \
             capsule's own method bodies; public operations only from the \
             capsule's direct owner (or the capsule itself). Reaching an \
             operation through part indirection does not grant access."
        )
    )]
    OutOfContext { operation: String },

    #[error("unknown operation '{name}' on capsule of class {class}")]
    #[diagnostic(
        code(caplet::context::unknown_operation),
        help(
            "The capsule's class declares no operation with this name. \
             Check the spelling against the class definition."
        )
    )]
    UnknownOperation { class: String, name: String },

    #[error("no base implementation above {class}.{operation}")]
    #[diagnostic(
        code(caplet::context::no_superior),
        help(
            "`superior` walks the override chain upward; this implementation \
             is already the most basic one. Guard the call or drop it."
        )
    )]
    NoSuperior { class: String, operation: String },

    #[error("context depth exceeded maximum of {max_depth}")]
    #[diagnostic(
        code(caplet::context::depth_exceeded),
        help(
            "The operation call chain is deeper than `max_context_depth`. \
             This usually means unbounded recursion between operations; \
             raise the limit in RuntimeConfig only if the depth is intended."
        )
    )]
    DepthExceeded { max_depth: usize },

    #[error("unknown capsule {capsule}")]
    #[diagnostic(
        code(caplet::context::unknown_capsule),
        help("The capsule id does not refer to a live instance. It may have been disposed.")
    )]
    UnknownCapsule { capsule: String },
}

// ---------------------------------------------------------------------------
// Definition errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DefineError {
    #[error("illegal methods visibility: {class} overrides {operation} with a different signature")]
    #[diagnostic(
        code(caplet::define::illegal_methods_visibility),
        help(
            "An override must keep the inherited operation's direction and \
             visibility. Declare the override with the same markers as the \
             base class, or pick a fresh operation name."
        )
    )]
    IllegalMethodsVisibility { class: String, operation: String },

    #[error("unknown class {class}")]
    #[diagnostic(
        code(caplet::define::unknown_class),
        help("The class id is not registered with this runtime.")
    )]
    UnknownClass { class: String },

    #[error("unknown base class for {class}")]
    #[diagnostic(
        code(caplet::define::unknown_base),
        help("The `base` class id is not registered with this runtime. Define the base first.")
    )]
    UnknownBase { class: String },

    #[error("part '{part}' of {class} names an unregistered class")]
    #[diagnostic(
        code(caplet::define::unknown_part_class),
        help("Define the part's class with this runtime before using it in a part slot.")
    )]
    UnknownPartClass { class: String, part: String },

    #[error("unknown part '{part}' referenced by a binding in {class}")]
    #[diagnostic(
        code(caplet::define::unknown_part),
        help("Binding endpoints may only name `this` or a declared part of the class.")
    )]
    UnknownPart { class: String, part: String },

    #[error("unknown endpoint '{endpoint}' in {class}")]
    #[diagnostic(
        code(caplet::define::unknown_endpoint),
        help(
            "The named member is not an operation, hook, or loop on the \
             endpoint's target. For element parts the members are `hook` and \
             `loop`."
        )
    )]
    UnknownEndpoint { class: String, endpoint: String },

    #[error("invalid binding in {class}: {reason}")]
    #[diagnostic(
        code(caplet::define::invalid_binding),
        help(
            "Legal binding shapes: this.hook -> part.hook (delegation), \
             hook -> loop (attachment), this.loop -> part.loop (indirection), \
             and outgoing-operation -> operation (wiring to a public or own \
             operation)."
        )
    )]
    InvalidBinding { class: String, reason: String },

    #[error("duplicate declaration '{name}' in {class}")]
    #[diagnostic(
        code(caplet::define::duplicate_declaration),
        help("Each part, operation, hook, and loop name may be declared once per class.")
    )]
    DuplicateDeclaration { class: String, name: String },
}

// ---------------------------------------------------------------------------
// Attachment-tree errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TreeError {
    #[error("illegal argument: expected {expected}, got {got}")]
    #[diagnostic(
        code(caplet::tree::illegal_argument),
        help(
            "Attachment operations accept only hook and loop handles. \
             Check the `Ref` you are passing with `is_hook` / `is_loop`."
        )
    )]
    IllegalArgument { expected: &'static str, got: String },

    #[error("index out of bounds: {index} > {len}")]
    #[diagnostic(
        code(caplet::tree::index_out_of_bounds),
        help("Insertion positions range from 0 to the current child count, inclusive.")
    )]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("tie would create a cycle: {child} is already above {parent}")]
    #[diagnostic(
        code(caplet::tree::tie_cycle),
        help(
            "The hook/loop graph must stay acyclic. Untie the child from its \
             current position before restructuring, or attach it elsewhere. \
             No existing tie was modified."
        )
    )]
    TieCycle { parent: String, child: String },

    #[error("unknown attachment node {node}")]
    #[diagnostic(
        code(caplet::tree::unknown_node),
        help("The hook or loop id does not refer to a live node.")
    )]
    UnknownNode { node: String },
}

/// Convenience alias for functions returning caplet results.
pub type CapletResult<T> = std::result::Result<T, CapletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_converts_to_caplet_error() {
        let err = ContextError::OutOfContext {
            operation: "Widget.render".into(),
        };
        let top: CapletError = err.into();
        assert!(matches!(
            top,
            CapletError::Context(ContextError::OutOfContext { .. })
        ));
    }

    #[test]
    fn tree_error_converts_to_caplet_error() {
        let err = TreeError::IndexOutOfBounds { index: 9, len: 2 };
        let top: CapletError = err.into();
        assert!(matches!(
            top,
            CapletError::Tree(TreeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn display_messages_carry_fields() {
        let err = TreeError::IndexOutOfBounds { index: 9, len: 2 };
        let msg = format!("{err}");
        assert!(msg.contains('9'));
        assert!(msg.contains('2'));

        let err = ContextError::OutOfContext {
            operation: "Widget.render".into(),
        };
        assert!(format!("{err}").contains("Widget.render"));
    }

    #[test]
    fn recoverability_gate() {
        assert!(CapletError::app("boom").is_recoverable());
        assert!(
            CapletError::Context(ContextError::OutOfContext {
                operation: "X.y".into()
            })
            .is_recoverable()
        );

        assert!(
            !CapletError::Tree(TreeError::IllegalArgument {
                expected: "a hook or loop",
                got: "value".into()
            })
            .is_recoverable()
        );
        assert!(
            !CapletError::Define(DefineError::IllegalMethodsVisibility {
                class: "C".into(),
                operation: "op".into()
            })
            .is_recoverable()
        );
        // Escalated errors never re-enter the propagator.
        assert!(!CapletError::Escalated(Box::new(CapletError::app("boom"))).is_recoverable());
    }

    #[test]
    fn surfaced_error_keeps_identity() {
        let original = CapletError::app_with("boom", Value::from(7));
        let escalated = CapletError::Escalated(Box::new(original));
        match escalated.into_surfaced() {
            CapletError::Application { message, payload } => {
                assert_eq!(message, "boom");
                assert_eq!(payload, Some(Value::from(7)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
