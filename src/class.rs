//! The capsule definition resolver.
//!
//! A [`CapsuleSpec`] plus its base chain is compiled once, at definition time,
//! into a flattened [`CapsuleClass`] table: parts, operations with their full
//! override chains, hooks, loops, per-key data defaults, and validated
//! bindings. Instantiation and every later access read the flattened table —
//! no live chain walking.
//!
//! Override rules:
//! - an operation override must keep the inherited direction and visibility;
//! - a part override replaces the slot in place (the class part count does
//!   not grow);
//! - a declared data key shadows the ancestor's entry entirely;
//! - `init` and `handle` replace the inherited ones wholesale;
//! - a binding with the same `from` endpoint replaces the inherited binding.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::{CapletResult, DefineError};
use crate::id::ClassId;
use crate::ops::{Direction, HandleBody, InitBody, OpBody, Visibility};
use crate::spec::{BindingDecl, CapsuleSpec, Endpoint, OpDecl, PartDecl, PartKind, Target};

/// A resolved operation slot.
#[derive(Clone)]
pub struct OpSlot {
    pub name: String,
    pub direction: Direction,
    pub visibility: Visibility,
    pub multicast: bool,
    /// Override chain, derived-most first.
    pub(crate) impls: Vec<OpBody>,
}

impl std::fmt::Debug for OpSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpSlot")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("visibility", &self.visibility)
            .field("impls", &self.impls.len())
            .finish()
    }
}

/// A resolved part slot.
#[derive(Debug, Clone)]
pub struct PartSlot {
    pub decl: PartDecl,
}

/// How a validated binding is applied at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `out-op -> op`: wire edges on the source operation.
    Wire,
    /// `this.hook -> part.hook`: the capsule hook is spliced into the inner
    /// hook, so children hooked here materialize inside the part.
    HookDelegation,
    /// `hook -> loop`: ordinary tie, targets keep binding order.
    Attachment,
    /// `this.loop -> part.loop`: public surface forwarding to the internal
    /// attachment target.
    LoopIndirection,
}

/// A define-time validated binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub from: Endpoint,
    pub to: Vec<Endpoint>,
    pub kind: BindingKind,
}

/// What a member name resolves to on a class surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Op(Direction, Visibility),
    Hook,
    Loop,
}

/// An immutable, fully resolved capsule class.
pub struct CapsuleClass {
    pub id: ClassId,
    pub name: String,
    /// Self first, then base, then base's base, and so on.
    pub ancestry: Vec<ClassId>,
    pub parts: Vec<PartSlot>,
    pub ops: Vec<OpSlot>,
    pub hooks: Vec<String>,
    pub loops: Vec<String>,
    pub data: Map<String, Value>,
    pub bindings: Vec<Binding>,
    pub(crate) init: Option<InitBody>,
    pub(crate) handle: Option<HandleBody>,
}

impl CapsuleClass {
    /// Look up an operation slot by name.
    pub fn op(&self, name: &str) -> Option<&OpSlot> {
        self.ops.iter().find(|o| o.name == name)
    }

    /// Look up a part slot by name.
    pub fn part(&self, name: &str) -> Option<&PartSlot> {
        self.parts.iter().find(|p| p.decl.name == name)
    }

    /// Classify a member name on this class's surface.
    pub fn member(&self, name: &str) -> Option<MemberKind> {
        if let Some(op) = self.op(name) {
            return Some(MemberKind::Op(op.direction, op.visibility));
        }
        if self.hooks.iter().any(|h| h == name) {
            return Some(MemberKind::Hook);
        }
        if self.loops.iter().any(|l| l == name) {
            return Some(MemberKind::Loop);
        }
        None
    }

    /// Whether this class declares (or inherits) a recovery handler.
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }
}

impl std::fmt::Debug for CapsuleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ancestry", &self.ancestry)
            .field("parts", &self.parts.len())
            .field("ops", &self.ops.len())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Resolve a spec against the registered classes into a flattened class.
pub(crate) fn resolve(
    spec: CapsuleSpec,
    id: ClassId,
    classes: &HashMap<ClassId, Rc<CapsuleClass>>,
) -> CapletResult<CapsuleClass> {
    let class_name = spec.name.clone();

    let base = match spec.base {
        Some(base_id) => Some(classes.get(&base_id).cloned().ok_or(
            DefineError::UnknownBase {
                class: class_name.clone(),
            },
        )?),
        None => None,
    };

    // Start from the base's flattened tables.
    let mut ancestry = vec![id];
    let mut parts: Vec<PartSlot> = Vec::new();
    let mut ops: Vec<OpSlot> = Vec::new();
    let mut hooks: Vec<String> = Vec::new();
    let mut loops: Vec<String> = Vec::new();
    let mut data: Map<String, Value> = Map::new();
    let mut bindings: Vec<Binding> = Vec::new();
    let mut init: Option<InitBody> = None;
    let mut handle: Option<HandleBody> = None;

    if let Some(ref b) = base {
        ancestry.extend(&b.ancestry);
        parts = b.parts.clone();
        ops = b.ops.clone();
        hooks = b.hooks.clone();
        loops = b.loops.clone();
        data = b.data.clone();
        bindings = b.bindings.clone();
        init = b.init.clone();
        handle = b.handle.clone();
    }

    // Parts: override replaces the slot in place.
    let mut seen = Vec::new();
    for decl in spec.parts {
        if seen.contains(&decl.name) {
            return Err(DefineError::DuplicateDeclaration {
                class: class_name,
                name: decl.name,
            }
            .into());
        }
        seen.push(decl.name.clone());
        if let PartKind::Class(part_class) = decl.kind
            && !classes.contains_key(&part_class)
        {
            return Err(DefineError::UnknownPartClass {
                class: class_name,
                part: decl.name,
            }
            .into());
        }
        match parts.iter_mut().find(|p| p.decl.name == decl.name) {
            Some(slot) => slot.decl = decl,
            None => parts.push(PartSlot { decl }),
        }
    }

    // Operations: overrides must keep the inherited signature; the override's
    // implementation is prepended so it wins at call time.
    let mut seen = Vec::new();
    for decl in spec.ops {
        if seen.contains(&decl.name) {
            return Err(DefineError::DuplicateDeclaration {
                class: class_name,
                name: decl.name,
            }
            .into());
        }
        seen.push(decl.name.clone());
        merge_op(&mut ops, decl, &class_name)?;
    }

    // Hooks and loops: union by name.
    for name in spec.hooks {
        if !hooks.contains(&name) {
            hooks.push(name);
        }
    }
    for name in spec.loops {
        if !loops.contains(&name) {
            loops.push(name);
        }
    }

    // Data: per-key shadowing, derived-most wins.
    for (key, value) in spec.data {
        data.insert(key, value);
    }

    if let Some(body) = spec.init {
        init = Some(body);
    }
    if let Some(body) = spec.handle {
        handle = Some(body);
    }

    let class = CapsuleClass {
        id,
        name: class_name,
        ancestry,
        parts,
        ops,
        hooks,
        loops,
        data,
        bindings: Vec::new(),
        init,
        handle,
    };

    // Bindings: a declaration with the same `from` endpoint replaces the
    // inherited one; then every binding (inherited included) is re-validated
    // against the final surface, so an overridden part must still satisfy the
    // wiring that targets it.
    for decl in spec.bindings {
        let binding = validate_binding(&class, decl, classes)?;
        match bindings.iter_mut().find(|b| b.from == binding.from) {
            Some(slot) => *slot = binding,
            None => bindings.push(binding),
        }
    }
    let mut revalidated = Vec::with_capacity(bindings.len());
    for b in bindings {
        revalidated.push(validate_binding(
            &class,
            BindingDecl {
                from: b.from,
                to: b.to,
            },
            classes,
        )?);
    }

    let mut class = class;
    class.bindings = revalidated;

    tracing::debug!(
        class = %class.name,
        parts = class.parts.len(),
        ops = class.ops.len(),
        bindings = class.bindings.len(),
        "class resolved"
    );

    Ok(class)
}

fn merge_op(ops: &mut Vec<OpSlot>, decl: OpDecl, class_name: &str) -> CapletResult<()> {
    match ops.iter_mut().find(|o| o.name == decl.name) {
        Some(slot) => {
            if slot.direction != decl.direction
                || slot.visibility != decl.visibility
                || slot.multicast != decl.multicast
            {
                return Err(DefineError::IllegalMethodsVisibility {
                    class: class_name.to_string(),
                    operation: decl.name,
                }
                .into());
            }
            if let Some(body) = decl.body {
                slot.impls.insert(0, body);
            }
            Ok(())
        }
        None => {
            ops.push(OpSlot {
                name: decl.name,
                direction: decl.direction,
                visibility: decl.visibility,
                multicast: decl.multicast,
                impls: decl.body.into_iter().collect(),
            });
            Ok(())
        }
    }
}

/// Classify an endpoint against the class surface it targets.
fn endpoint_kind(
    class: &CapsuleClass,
    ep: &Endpoint,
    classes: &HashMap<ClassId, Rc<CapsuleClass>>,
) -> CapletResult<MemberKind> {
    let unknown = || -> crate::error::CapletError {
        DefineError::UnknownEndpoint {
            class: class.name.clone(),
            endpoint: ep.to_string(),
        }
        .into()
    };
    match &ep.target {
        Target::This => class.member(&ep.member).ok_or_else(unknown),
        Target::Part(part_name) => {
            let slot = class.part(part_name).ok_or(DefineError::UnknownPart {
                class: class.name.clone(),
                part: part_name.clone(),
            })?;
            match &slot.decl.kind {
                PartKind::Class(cid) => {
                    let part_class = classes.get(cid).expect("part classes checked during merge");
                    part_class.member(&ep.member).ok_or_else(unknown)
                }
                PartKind::Element { .. } => match ep.member.as_str() {
                    "hook" => Ok(MemberKind::Hook),
                    "loop" => Ok(MemberKind::Loop),
                    _ => Err(unknown()),
                },
            }
        }
    }
}

fn validate_binding(
    class: &CapsuleClass,
    decl: BindingDecl,
    classes: &HashMap<ClassId, Rc<CapsuleClass>>,
) -> CapletResult<Binding> {
    let invalid = |reason: String| -> crate::error::CapletError {
        DefineError::InvalidBinding {
            class: class.name.clone(),
            reason,
        }
        .into()
    };

    if decl.to.is_empty() {
        return Err(invalid(format!("binding from {} has no targets", decl.from)));
    }

    let from_kind = endpoint_kind(class, &decl.from, classes)?;
    let kind = match from_kind {
        MemberKind::Op(Direction::Out, _) => {
            for to in &decl.to {
                match endpoint_kind(class, to, classes)? {
                    MemberKind::Op(dir, vis) => match &to.target {
                        Target::This => {}
                        Target::Part(_) => {
                            if dir != Direction::In || vis != Visibility::Public {
                                return Err(invalid(format!(
                                    "wire target {to} must be a public incoming operation"
                                )));
                            }
                        }
                    },
                    _ => {
                        return Err(invalid(format!(
                            "wire target {to} is not an operation"
                        )));
                    }
                }
            }
            BindingKind::Wire
        }
        MemberKind::Op(Direction::In, _) => {
            return Err(invalid(format!(
                "{} is an incoming operation; only outgoing operations can be wired",
                decl.from
            )));
        }
        MemberKind::Hook => {
            // Either delegation into a single part hook, or attachment of
            // loops (uniform target kinds).
            let first = endpoint_kind(class, &decl.to[0], classes)?;
            match first {
                MemberKind::Hook => {
                    if decl.from.target != Target::This {
                        return Err(invalid(format!(
                            "hook delegation {} must start from this",
                            decl.from
                        )));
                    }
                    if decl.to.len() != 1 || !matches!(decl.to[0].target, Target::Part(_)) {
                        return Err(invalid(
                            "hook delegation takes exactly one part hook target".into(),
                        ));
                    }
                    BindingKind::HookDelegation
                }
                MemberKind::Loop => {
                    for to in &decl.to {
                        if endpoint_kind(class, to, classes)? != MemberKind::Loop {
                            return Err(invalid(format!("attachment target {to} is not a loop")));
                        }
                    }
                    BindingKind::Attachment
                }
                MemberKind::Op(..) => {
                    return Err(invalid(format!(
                        "hook {} cannot be bound to an operation",
                        decl.from
                    )));
                }
            }
        }
        MemberKind::Loop => {
            if decl.from.target != Target::This
                || decl.to.len() != 1
                || !matches!(decl.to[0].target, Target::Part(_))
                || endpoint_kind(class, &decl.to[0], classes)? != MemberKind::Loop
            {
                return Err(invalid(format!(
                    "loop indirection must bind this-level loop {} to exactly one part loop",
                    decl.from
                )));
            }
            BindingKind::LoopIndirection
        }
    };

    Ok(Binding {
        from: decl.from,
        to: decl.to,
        kind,
    })
}
