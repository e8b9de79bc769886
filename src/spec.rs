//! Declarative capsule specifications.
//!
//! A [`CapsuleSpec`] describes everything a capsule class is made of: parts,
//! operations with their direction and visibility, default data, hooks and
//! loops, wiring bindings, and the optional `base`, `init`, and `handle`
//! entries. Submitting a spec to [`Runtime::define`](crate::runtime::Runtime::define)
//! resolves it against its base chain into an immutable
//! [`CapsuleClass`](crate::class::CapsuleClass).
//!
//! Wiring is declared through typed [`Endpoint`] descriptors rather than
//! parsed strings, so every binding is validated once, at definition time.

use serde_json::{Map, Value};

use crate::id::ClassId;
use crate::ops::{Direction, HandleBody, InitBody, OpBody, Visibility};

/// One side of a binding: a member (operation, hook, or loop) on `this` or on
/// a named part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub target: Target,
    pub member: String,
}

/// What an endpoint is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The capsule being defined.
    This,
    /// A declared part, by name.
    Part(String),
}

impl Endpoint {
    /// Endpoint on the capsule being defined.
    pub fn this(member: impl Into<String>) -> Self {
        Endpoint {
            target: Target::This,
            member: member.into(),
        }
    }

    /// Endpoint on a declared part.
    pub fn part(part: impl Into<String>, member: impl Into<String>) -> Self {
        Endpoint {
            target: Target::Part(part.into()),
            member: member.into(),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Target::This => write!(f, "this.{}", self.member),
            Target::Part(p) => write!(f, "{}.{}", p, self.member),
        }
    }
}

/// A wiring declaration: when `from` is an outgoing operation the targets are
/// wired calls; when it is a hook or loop the targets are ties created at
/// construction. Multi-target bindings keep declaration order.
#[derive(Debug, Clone)]
pub struct BindingDecl {
    pub from: Endpoint,
    pub to: Vec<Endpoint>,
}

/// What a part slot constructs.
#[derive(Clone)]
pub enum PartKind {
    /// A nested capsule of the given class.
    Class(ClassId),
    /// An element leaf adapter wrapping a fresh backend node with this tag.
    Element { tag: String },
}

impl std::fmt::Debug for PartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartKind::Class(id) => write!(f, "Class({id})"),
            PartKind::Element { tag } => write!(f, "Element({tag})"),
        }
    }
}

/// Constructor arguments for a part.
#[derive(Debug, Clone)]
pub enum PartArgs {
    /// No arguments.
    None,
    /// A fixed argument list.
    Literal(Vec<Value>),
    /// Forward the arguments the enclosing capsule was instantiated with.
    Deferred,
}

/// A declared part slot.
#[derive(Debug, Clone)]
pub struct PartDecl {
    pub name: String,
    pub kind: PartKind,
    pub args: PartArgs,
}

/// A declared operation.
#[derive(Clone)]
pub struct OpDecl {
    pub name: String,
    pub direction: Direction,
    pub visibility: Visibility,
    pub multicast: bool,
    /// Implementation; optional for outgoing operations (and for overrides
    /// that keep the inherited implementation).
    pub body: Option<OpBody>,
}

impl std::fmt::Debug for OpDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDecl")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("visibility", &self.visibility)
            .field("multicast", &self.multicast)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Declarative specification of a capsule class.
///
/// Built with the fluent methods below and submitted to
/// [`Runtime::define`](crate::runtime::Runtime::define).
#[derive(Default)]
pub struct CapsuleSpec {
    pub name: String,
    pub base: Option<ClassId>,
    pub parts: Vec<PartDecl>,
    pub ops: Vec<OpDecl>,
    pub hooks: Vec<String>,
    pub loops: Vec<String>,
    pub data: Map<String, Value>,
    pub bindings: Vec<BindingDecl>,
    pub init: Option<InitBody>,
    pub handle: Option<HandleBody>,
}

impl CapsuleSpec {
    /// Start a spec for a class with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        CapsuleSpec {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Inherit from a previously defined class.
    pub fn base(mut self, base: ClassId) -> Self {
        self.base = Some(base);
        self
    }

    /// Declare a nested capsule part.
    pub fn part(mut self, name: impl Into<String>, class: ClassId) -> Self {
        self.parts.push(PartDecl {
            name: name.into(),
            kind: PartKind::Class(class),
            args: PartArgs::None,
        });
        self
    }

    /// Declare a nested capsule part constructed with a fixed argument list.
    pub fn part_with_args(
        mut self,
        name: impl Into<String>,
        class: ClassId,
        args: Vec<Value>,
    ) -> Self {
        self.parts.push(PartDecl {
            name: name.into(),
            kind: PartKind::Class(class),
            args: PartArgs::Literal(args),
        });
        self
    }

    /// Declare a nested capsule part that receives the enclosing capsule's
    /// own instantiation arguments.
    pub fn part_deferred(mut self, name: impl Into<String>, class: ClassId) -> Self {
        self.parts.push(PartDecl {
            name: name.into(),
            kind: PartKind::Class(class),
            args: PartArgs::Deferred,
        });
        self
    }

    /// Declare an element leaf-adapter part with the given backend tag.
    pub fn element(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.parts.push(PartDecl {
            name: name.into(),
            kind: PartKind::Element { tag: tag.into() },
            args: PartArgs::None,
        });
        self
    }

    /// Declare hooks by name, in order.
    pub fn hooks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hooks.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare loops by name, in order.
    pub fn loops<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loops.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a default data entry.
    pub fn data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Declare a public incoming operation.
    pub fn public_in(mut self, name: impl Into<String>, body: OpBody) -> Self {
        self.ops.push(OpDecl {
            name: name.into(),
            direction: Direction::In,
            visibility: Visibility::Public,
            multicast: false,
            body: Some(body),
        });
        self
    }

    /// Declare a private incoming operation.
    pub fn private_in(mut self, name: impl Into<String>, body: OpBody) -> Self {
        self.ops.push(OpDecl {
            name: name.into(),
            direction: Direction::In,
            visibility: Visibility::Private,
            multicast: false,
            body: Some(body),
        });
        self
    }

    /// Declare a request-style outgoing operation (yields the last wired
    /// target's result).
    pub fn public_out(mut self, name: impl Into<String>) -> Self {
        self.ops.push(OpDecl {
            name: name.into(),
            direction: Direction::Out,
            visibility: Visibility::Public,
            multicast: false,
            body: None,
        });
        self
    }

    /// Declare an event-style outgoing operation (fans out, yields `Null`).
    pub fn event_out(mut self, name: impl Into<String>) -> Self {
        self.ops.push(OpDecl {
            name: name.into(),
            direction: Direction::Out,
            visibility: Visibility::Public,
            multicast: true,
            body: None,
        });
        self
    }

    /// Declare an operation from a full descriptor.
    pub fn op(mut self, decl: OpDecl) -> Self {
        self.ops.push(decl);
        self
    }

    /// Declare a single-target binding.
    pub fn bind(mut self, from: Endpoint, to: Endpoint) -> Self {
        self.bindings.push(BindingDecl {
            from,
            to: vec![to],
        });
        self
    }

    /// Declare a multi-target binding; targets keep their order.
    pub fn bind_many<I>(mut self, from: Endpoint, to: I) -> Self
    where
        I: IntoIterator<Item = Endpoint>,
    {
        self.bindings.push(BindingDecl {
            from,
            to: to.into_iter().collect(),
        });
        self
    }

    /// Set the initializer, fully replacing any inherited one.
    pub fn init(mut self, body: InitBody) -> Self {
        self.init = Some(body);
        self
    }

    /// Set the recovery handler.
    pub fn handle(mut self, body: HandleBody) -> Self {
        self.handle = Some(body);
        self
    }
}

impl std::fmt::Debug for CapsuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleSpec")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("parts", &self.parts.len())
            .field("ops", &self.ops.len())
            .field("hooks", &self.hooks)
            .field("loops", &self.loops)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::this("click").to_string(), "this.click");
        assert_eq!(Endpoint::part("body", "hook").to_string(), "body.hook");
    }

    #[test]
    fn builder_accumulates_declarations() {
        let spec = CapsuleSpec::new("Widget")
            .hooks(["children"])
            .loops(["self"])
            .data("title", Value::from("untitled"))
            .event_out("clicked")
            .bind(Endpoint::this("self"), Endpoint::part("root", "loop"));

        assert_eq!(spec.name, "Widget");
        assert_eq!(spec.hooks, vec!["children"]);
        assert_eq!(spec.loops, vec!["self"]);
        assert_eq!(spec.ops.len(), 1);
        assert_eq!(spec.bindings.len(), 1);
        assert!(spec.ops[0].multicast);
    }
}
