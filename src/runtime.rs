//! The runtime facade: class registry, instance arenas, and the call machinery.
//!
//! A [`Runtime`] owns everything: resolved classes, live instances, their
//! operations, the attachment tree, and the context tracker. All entry points
//! take `&mut self`; user bodies receive the same `&mut Runtime` back, so the
//! whole composition runs on one logical thread with no locking.
//!
//! The call path is the heart of the access model. Every invocation checks
//! the caller's context against the operation's visibility, pushes the owning
//! instance, runs the implementation chain, fires wire edges and listeners,
//! pops on every exit path, and routes recoverable failures through the
//! handle propagator before they reach the caller.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::Value;

use crate::capsule::{CapsuleInstance, PartTarget};
use crate::class::{self, BindingKind, CapsuleClass};
use crate::context::{ContextToken, ContextTracker};
use crate::element::TreeBackend;
use crate::error::{CapletError, CapletResult, ContextError, DefineError};
use crate::id::{CapsuleId, ClassId, HookId, IdAllocator, LoopId, OperationId};
use crate::ops::{
    Direction, ListenerEdge, ListenerFn, OpBody, OpCall, Operation, Visibility, WireEdge,
};
use crate::refs::Ref;
use crate::spec::{CapsuleSpec, Endpoint, PartArgs, PartKind, Target};
use crate::tree::TreeManager;

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on the context-tracker stack; exceeding it fails the call
    /// with a non-recoverable error.
    pub max_context_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_context_depth: 256,
        }
    }
}

/// A capsule-composition runtime.
pub struct Runtime {
    alloc: Rc<IdAllocator>,
    classes: HashMap<ClassId, Rc<CapsuleClass>>,
    class_names: HashMap<String, ClassId>,
    pub(crate) instances: HashMap<CapsuleId, CapsuleInstance>,
    pub(crate) operations: HashMap<OperationId, Operation>,
    tree: TreeManager,
    pub(crate) ctx: ContextTracker,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let alloc = Rc::new(IdAllocator::new());
        Runtime {
            classes: HashMap::new(),
            class_names: HashMap::new(),
            instances: HashMap::new(),
            operations: HashMap::new(),
            tree: TreeManager::new(alloc.clone()),
            ctx: ContextTracker::new(config.max_context_depth),
            alloc,
        }
    }

    /// Build a runtime whose attachment tree drives a host-supplied backend.
    pub fn with_backend(config: RuntimeConfig, backend: Box<dyn TreeBackend>) -> Self {
        let alloc = Rc::new(IdAllocator::new());
        Runtime {
            classes: HashMap::new(),
            class_names: HashMap::new(),
            instances: HashMap::new(),
            operations: HashMap::new(),
            tree: TreeManager::with_backend(alloc.clone(), backend),
            ctx: ContextTracker::new(config.max_context_depth),
            alloc,
        }
    }

    /// The attachment tree.
    pub fn tree(&self) -> &TreeManager {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TreeManager {
        &mut self.tree
    }

    // -----------------------------------------------------------------------
    // Definition
    // -----------------------------------------------------------------------

    /// Resolve a spec against its base chain and register the class.
    pub fn define(&mut self, spec: CapsuleSpec) -> CapletResult<ClassId> {
        let id = ClassId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
        let resolved = class::resolve(spec, id, &self.classes)?;
        self.class_names.insert(resolved.name.clone(), id);
        tracing::debug!(class = %resolved.name, id = %id, "class defined");
        self.classes.insert(id, Rc::new(resolved));
        Ok(id)
    }

    /// Look up a class id by name.
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    /// The resolved class of a live instance.
    pub fn class_of(&self, capsule: CapsuleId) -> Option<&Rc<CapsuleClass>> {
        self.instances.get(&capsule).map(|i| &i.class)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Construct an instance of a class. The instance is owned by the caller's
    /// current context (root-owned when called from outside any operation).
    ///
    /// At the root boundary, escalation markers on initialization failures are
    /// stripped so external callers observe the original error identity.
    pub fn instantiate(&mut self, class: ClassId, args: &[Value]) -> CapletResult<CapsuleId> {
        let owner = self.ctx.current();
        let result = self.construct(class, args, owner);
        if self.ctx.is_root() {
            result.map_err(CapletError::into_surfaced)
        } else {
            result
        }
    }

    fn construct(
        &mut self,
        class_id: ClassId,
        args: &[Value],
        owner: Option<CapsuleId>,
    ) -> CapletResult<CapsuleId> {
        let class = self
            .classes
            .get(&class_id)
            .cloned()
            .ok_or_else(|| DefineError::UnknownClass {
                class: class_id.to_string(),
            })?;

        let id = CapsuleId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");

        let mut hooks = HashMap::new();
        for name in &class.hooks {
            hooks.insert(name.clone(), self.tree.create_hook(id, name.clone()));
        }
        let mut loops = HashMap::new();
        for name in &class.loops {
            loops.insert(name.clone(), self.tree.create_loop(id, name.clone()));
        }

        let mut ops = HashMap::new();
        for slot in &class.ops {
            let op_id =
                OperationId::new(self.alloc.fresh().get()).expect("allocator yields non-zero ids");
            self.operations.insert(
                op_id,
                Operation {
                    id: op_id,
                    owner: id,
                    name: slot.name.clone(),
                    direction: slot.direction,
                    visibility: slot.visibility,
                    multicast: slot.multicast,
                    impls: slot.impls.clone(),
                    wires: Vec::new(),
                    listeners: Vec::new(),
                },
            );
            ops.insert(slot.name.clone(), op_id);
        }

        self.instances.insert(
            id,
            CapsuleInstance {
                id,
                class: class.clone(),
                owner,
                parts: HashMap::new(),
                ops,
                hooks,
                loops,
                data: class.data.clone(),
            },
        );

        // Parts, bindings, and init all run inside the new instance's context.
        let entered = self.ctx.push(id).map_err(CapletError::from);
        let built = entered.and_then(|()| {
            let result = self.build_members(id, &class, args);
            self.ctx.pop();
            result
        });
        if let Err(e) = built {
            self.dispose(id).ok();
            return Err(e);
        }

        tracing::debug!(capsule = %id, class = %class.name, "capsule constructed");
        Ok(id)
    }

    fn build_members(
        &mut self,
        id: CapsuleId,
        class: &Rc<CapsuleClass>,
        args: &[Value],
    ) -> CapletResult<()> {
        for slot in class.parts.clone() {
            let target = match slot.decl.kind {
                PartKind::Element { tag } => PartTarget::Element(self.tree.create_element(tag)),
                PartKind::Class(part_class) => {
                    let part_args: Vec<Value> = match slot.decl.args {
                        PartArgs::None => Vec::new(),
                        PartArgs::Literal(values) => values,
                        PartArgs::Deferred => args.to_vec(),
                    };
                    PartTarget::Capsule(self.construct(part_class, &part_args, Some(id))?)
                }
            };
            if let Some(inst) = self.instances.get_mut(&id) {
                inst.parts.insert(slot.decl.name, target);
            }
        }

        self.apply_bindings(id, class)?;

        if let Some(init) = class.init.clone() {
            init(self, id, args)?;
        }
        Ok(())
    }

    fn apply_bindings(&mut self, id: CapsuleId, class: &Rc<CapsuleClass>) -> CapletResult<()> {
        for binding in &class.bindings {
            match binding.kind {
                BindingKind::Wire => {
                    let source = self.endpoint_op(id, &binding.from)?;
                    for to in &binding.to {
                        let target = self.endpoint_op(id, to)?;
                        self.operations
                            .get_mut(&source)
                            .expect("resolved operation is live")
                            .wires
                            .push(WireEdge { target, ctx: id });
                    }
                }
                BindingKind::HookDelegation => {
                    // The capsule-level hook is spliced into the part's hook,
                    // so whatever is hooked on the outside materializes inside.
                    let outer = self.endpoint_hook(id, &binding.from)?;
                    let inner = self.endpoint_hook(id, &binding.to[0])?;
                    self.tree.tie(&Ref::Hook(inner), &Ref::Hook(outer))?;
                }
                BindingKind::Attachment => {
                    let hook = self.endpoint_hook(id, &binding.from)?;
                    let mut targets = Vec::with_capacity(binding.to.len());
                    for to in &binding.to {
                        targets.push(Ref::Loop(self.endpoint_loop(id, to)?));
                    }
                    self.tree.hook(hook, &targets)?;
                }
                BindingKind::LoopIndirection => {
                    let outer = self.endpoint_loop(id, &binding.from)?;
                    let inner = self.endpoint_loop(id, &binding.to[0])?;
                    self.tree.set_loop(outer, Some(&Ref::Loop(inner)))?;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Endpoint resolution against a live instance
    // -----------------------------------------------------------------------

    fn instance(&self, capsule: CapsuleId) -> CapletResult<&CapsuleInstance> {
        self.instances
            .get(&capsule)
            .ok_or_else(|| {
                ContextError::UnknownCapsule {
                    capsule: capsule.to_string(),
                }
                .into()
            })
    }

    fn unknown_endpoint(&self, capsule: CapsuleId, ep: &Endpoint) -> CapletError {
        let class = self
            .instances
            .get(&capsule)
            .map(|i| i.class.name.clone())
            .unwrap_or_default();
        DefineError::UnknownEndpoint {
            class,
            endpoint: ep.to_string(),
        }
        .into()
    }

    fn endpoint_hook(&self, capsule: CapsuleId, ep: &Endpoint) -> CapletResult<HookId> {
        let inst = self.instance(capsule)?;
        match &ep.target {
            Target::This => inst.hook(&ep.member),
            Target::Part(part) => match inst.part(part) {
                Some(PartTarget::Capsule(c)) => self.instance(c)?.hook(&ep.member),
                Some(PartTarget::Element(e)) => self.tree.element_hook(e),
                None => None,
            },
        }
        .ok_or_else(|| self.unknown_endpoint(capsule, ep))
    }

    fn endpoint_loop(&self, capsule: CapsuleId, ep: &Endpoint) -> CapletResult<LoopId> {
        let inst = self.instance(capsule)?;
        match &ep.target {
            Target::This => inst.loop_named(&ep.member),
            Target::Part(part) => match inst.part(part) {
                Some(PartTarget::Capsule(c)) => self.instance(c)?.loop_named(&ep.member),
                Some(PartTarget::Element(e)) => self.tree.element_loop(e),
                None => None,
            },
        }
        .ok_or_else(|| self.unknown_endpoint(capsule, ep))
    }

    fn endpoint_op(&self, capsule: CapsuleId, ep: &Endpoint) -> CapletResult<OperationId> {
        let inst = self.instance(capsule)?;
        match &ep.target {
            Target::This => inst.op(&ep.member),
            Target::Part(part) => match inst.part(part) {
                Some(PartTarget::Capsule(c)) => self.instance(c)?.op(&ep.member),
                _ => None,
            },
        }
        .ok_or_else(|| self.unknown_endpoint(capsule, ep))
    }

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------

    /// Invoke an operation by name on an instance.
    ///
    /// Access is checked against the caller's current context before anything
    /// runs. At the root boundary, escalation markers are stripped so external
    /// callers observe the original error identity.
    pub fn call(&mut self, capsule: CapsuleId, operation: &str, args: &[Value]) -> CapletResult<Value> {
        let op_id = self.lookup_op(capsule, operation)?;
        self.check_access(op_id)?;
        let result = self.invoke(op_id, args);
        if self.ctx.is_root() {
            result.map_err(CapletError::into_surfaced)
        } else {
            result
        }
    }

    fn lookup_op(&self, capsule: CapsuleId, name: &str) -> CapletResult<OperationId> {
        let inst = self.instance(capsule)?;
        inst.op(name).ok_or_else(|| {
            ContextError::UnknownOperation {
                class: inst.class.name.clone(),
                name: name.to_string(),
            }
            .into()
        })
    }

    fn check_access(&self, op_id: OperationId) -> CapletResult<()> {
        let op = self
            .operations
            .get(&op_id)
            .expect("operation ids are swept on dispose");
        let inst = self.instance(op.owner)?;
        let caller = self.ctx.current();
        let allowed = match op.direction {
            // Outgoing operations fire from inside their owner only.
            Direction::Out => caller == Some(op.owner),
            Direction::In => match op.visibility {
                Visibility::Private => caller == Some(op.owner),
                Visibility::Public => caller == Some(op.owner) || caller == inst.owner,
            },
        };
        if allowed {
            Ok(())
        } else {
            Err(ContextError::OutOfContext {
                operation: format!("{}.{}", inst.class.name, op.name),
            }
            .into())
        }
    }

    /// The operation boundary: enter the owner's context, run, leave on every
    /// path, route failures through the handle propagator.
    fn invoke(&mut self, op_id: OperationId, args: &[Value]) -> CapletResult<Value> {
        let (owner, direction, multicast, body, wires, listeners) = {
            let op = self
                .operations
                .get(&op_id)
                .expect("operation ids are swept on dispose");
            (
                op.owner,
                op.direction,
                op.multicast,
                op.impls.first().cloned(),
                op.wires.clone(),
                op.listeners.clone(),
            )
        };

        self.ctx.push(owner).map_err(CapletError::from)?;
        let result = self.run_operation(op_id, owner, direction, multicast, body, wires, listeners, args);
        self.ctx.pop();

        match result {
            Ok(v) => Ok(v),
            Err(e) => self.propagate(owner, e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_operation(
        &mut self,
        op_id: OperationId,
        owner: CapsuleId,
        direction: Direction,
        multicast: bool,
        body: Option<OpBody>,
        wires: Vec<WireEdge>,
        listeners: Vec<ListenerEdge>,
        args: &[Value],
    ) -> CapletResult<Value> {
        let own = match body {
            Some(f) => f(
                self,
                OpCall {
                    capsule: owner,
                    operation: op_id,
                    depth: 0,
                },
                args,
            )?,
            None => Value::Null,
        };

        let mut last = own.clone();
        for edge in wires {
            // Wire edges run under the context of the instance whose class
            // declared the binding; that is what routes their failures along
            // the containment chain established at wiring time.
            self.ctx.push(edge.ctx).map_err(CapletError::from)?;
            let wired = self.check_access(edge.target).and_then(|()| self.invoke(edge.target, args));
            self.ctx.pop();
            last = wired?;
        }
        for listener in listeners {
            let fired = match listener.ctx {
                Some(c) => {
                    self.ctx.push(c).map_err(CapletError::from)?;
                    let r = (listener.f)(self, args);
                    self.ctx.pop();
                    r
                }
                None => (listener.f)(self, args),
            };
            last = fired?;
        }

        Ok(match direction {
            Direction::In => own,
            Direction::Out if multicast => Value::Null,
            Direction::Out => last,
        })
    }

    /// From inside an overriding implementation, invoke the next one up the
    /// override chain for the same operation and instance.
    pub fn superior(&mut self, call: OpCall, args: &[Value]) -> CapletResult<Value> {
        let (body, class_name, op_name) = {
            let op = self
                .operations
                .get(&call.operation)
                .expect("operation ids are swept on dispose");
            let inst = self.instance(call.capsule)?;
            (
                op.impls.get(call.depth + 1).cloned(),
                inst.class.name.clone(),
                op.name.clone(),
            )
        };
        let Some(body) = body else {
            return Err(ContextError::NoSuperior {
                class: class_name,
                operation: op_name,
            }
            .into());
        };
        body(
            self,
            OpCall {
                capsule: call.capsule,
                operation: call.operation,
                depth: call.depth + 1,
            },
            args,
        )
    }

    /// Attach an external listener to an outgoing or public operation. The
    /// listener records the context active now and fires under it later.
    pub fn wire(&mut self, capsule: CapsuleId, operation: &str, f: ListenerFn) -> CapletResult<()> {
        let op_id = self.lookup_op(capsule, operation)?;
        {
            let op = &self.operations[&op_id];
            if op.direction == Direction::In && op.visibility == Visibility::Private {
                let inst = self.instance(capsule)?;
                return Err(ContextError::OutOfContext {
                    operation: format!("{}.{}", inst.class.name, op.name),
                }
                .into());
            }
        }
        let ctx = self.ctx.current();
        self.operations
            .get_mut(&op_id)
            .expect("operation ids are swept on dispose")
            .listeners
            .push(ListenerEdge { f, ctx });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Data store
    // -----------------------------------------------------------------------

    /// Read a data entry. Data is private: only the owning instance's own
    /// bodies may read it.
    pub fn data_get(&self, capsule: CapsuleId, key: &str) -> CapletResult<Value> {
        let inst = self.instance(capsule)?;
        if self.ctx.current() != Some(capsule) {
            return Err(ContextError::OutOfContext {
                operation: format!("{}.data[{key}]", inst.class.name),
            }
            .into());
        }
        Ok(inst.data.get(key).cloned().unwrap_or(Value::Null))
    }

    /// Write a data entry, same access rule as [`Runtime::data_get`].
    pub fn data_set(&mut self, capsule: CapsuleId, key: &str, value: Value) -> CapletResult<()> {
        if self.ctx.current() != Some(capsule) {
            let inst = self.instance(capsule)?;
            return Err(ContextError::OutOfContext {
                operation: format!("{}.data[{key}]", inst.class.name),
            }
            .into());
        }
        let inst = self.instances.get_mut(&capsule).ok_or_else(|| {
            CapletError::from(ContextError::UnknownCapsule {
                capsule: capsule.to_string(),
            })
        })?;
        inst.data.insert(key.to_string(), value);
        Ok(())
    }

    /// Diagnostic read of a data entry, bypassing the context check.
    pub fn peek_data(&self, capsule: CapsuleId, key: &str) -> Option<Value> {
        self.instances.get(&capsule)?.data.get(key).cloned()
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// The instance that owns `capsule`, or `None` for root-owned instances.
    pub fn owner(&self, capsule: CapsuleId) -> CapletResult<Option<CapsuleId>> {
        Ok(self.instance(capsule)?.owner)
    }

    /// True for the instance's own class and every transitive base.
    pub fn is_instance_of(&self, capsule: CapsuleId, class: ClassId) -> bool {
        self.instances
            .get(&capsule)
            .is_some_and(|i| i.is_instance_of(class))
    }

    /// What a named part of an instance points at.
    pub fn part(&self, capsule: CapsuleId, name: &str) -> Option<PartTarget> {
        self.instances.get(&capsule)?.part(name)
    }

    /// A named hook of an instance.
    pub fn hook_of(&self, capsule: CapsuleId, name: &str) -> Option<HookId> {
        self.instances.get(&capsule)?.hook(name)
    }

    /// A named loop of an instance.
    pub fn loop_of(&self, capsule: CapsuleId, name: &str) -> Option<LoopId> {
        self.instances.get(&capsule)?.loop_named(name)
    }

    // -----------------------------------------------------------------------
    // Asynchronous continuations
    // -----------------------------------------------------------------------

    /// Snapshot the current context for later resumption.
    pub fn capture_context(&self) -> ContextToken {
        self.ctx.capture()
    }

    /// Re-enter a captured context and invoke an operation in it. The call is
    /// validated by the ordinary access rules, exactly as a fresh call.
    pub fn resume(
        &mut self,
        token: &ContextToken,
        capsule: CapsuleId,
        operation: &str,
        args: &[Value],
    ) -> CapletResult<Value> {
        let displaced = self.ctx.swap(token.clone());
        let result = self.call(capsule, operation, args);
        self.ctx.swap(displaced);
        if self.ctx.is_root() {
            result.map_err(CapletError::into_surfaced)
        } else {
            result
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Tear down an instance and everything it constructed: parts, elements,
    /// operations, hooks, and loops. Ties into surviving parents are removed
    /// and mirrored out of the external tree.
    pub fn dispose(&mut self, capsule: CapsuleId) -> CapletResult<()> {
        let inst = self.instances.remove(&capsule).ok_or_else(|| {
            CapletError::from(ContextError::UnknownCapsule {
                capsule: capsule.to_string(),
            })
        })?;
        let class_name = inst.class.name.clone();

        let mut removed_ops: HashSet<OperationId> = HashSet::new();
        for op_id in inst.ops.values() {
            self.operations.remove(op_id);
            removed_ops.insert(*op_id);
        }
        for hook in inst.hooks.values() {
            self.tree.remove_hook(*hook);
        }
        for l in inst.loops.values() {
            self.tree.remove_loop(*l);
        }
        for target in inst.parts.values() {
            match target {
                PartTarget::Capsule(c) => {
                    self.dispose(*c).ok();
                }
                PartTarget::Element(e) => self.tree.remove_element(*e),
            }
        }

        // Sweep dangling wire edges left on surviving operations.
        for op in self.operations.values_mut() {
            op.wires.retain(|w| !removed_ops.contains(&w.target));
        }

        tracing::debug!(capsule = %capsule, class = %class_name, "capsule disposed");
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("classes", &self.classes.len())
            .field("instances", &self.instances.len())
            .field("operations", &self.operations.len())
            .field("tree", &self.tree)
            .finish()
    }
}
