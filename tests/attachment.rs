//! Attachment-tree scenarios driven through the full runtime: delegation and
//! indirection bindings, ordering guarantees, cycle rejection, and backend
//! mirroring.

use std::rc::Rc;

use serde_json::Value;

use caplet::{
    CapletError, CapsuleSpec, ClassId, Endpoint, ExtNodeId, MemoryTree, PartTarget, Ref, Runtime,
    TreeError,
};

fn backend(rt: &Runtime) -> &MemoryTree {
    rt.tree().backend().as_any().downcast_ref().unwrap()
}

/// A widget wrapping one backend element: its `items` hook delegates into the
/// element's children, its `surface` loop forwards to the element itself.
fn widget(rt: &mut Runtime, name: &str, tag: &str) -> ClassId {
    rt.define(
        CapsuleSpec::new(name)
            .hooks(["items"])
            .loops(["surface"])
            .element("root", tag)
            .bind(Endpoint::this("items"), Endpoint::part("root", "hook"))
            .bind(Endpoint::this("surface"), Endpoint::part("root", "loop")),
    )
    .unwrap()
}

fn ext_of(rt: &Runtime, capsule: caplet::CapsuleId) -> ExtNodeId {
    let Some(PartTarget::Element(e)) = rt.part(capsule, "root") else {
        panic!("root element part missing");
    };
    rt.tree().element_ext(e).unwrap()
}

#[test]
fn composed_widgets_mirror_into_backend() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");

    let l = rt.instantiate(list, &[]).unwrap();
    let a = rt.instantiate(item, &[]).unwrap();
    let b = rt.instantiate(item, &[]).unwrap();

    let items = rt.hook_of(l, "items").unwrap();
    let a_surface = rt.loop_of(a, "surface").unwrap();
    let b_surface = rt.loop_of(b, "surface").unwrap();

    rt.tree_mut()
        .hook(items, &[Ref::Loop(a_surface), Ref::Loop(b_surface)])
        .unwrap();

    // Hooking capsule surfaces onto the capsule hook lands the wrapped
    // elements under the wrapped parent element, in hook order.
    assert_eq!(
        backend(&rt).children_of(ext_of(&rt, l)),
        vec![ext_of(&rt, a), ext_of(&rt, b)]
    );
    assert_eq!(backend(&rt).name_of(ext_of(&rt, l)), Some("ul"));
    assert_eq!(backend(&rt).name_of(ext_of(&rt, a)), Some("li"));
}

#[test]
fn hook_at_and_rehook_preserve_order() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");

    let l = rt.instantiate(list, &[]).unwrap();
    let items = rt.hook_of(l, "items").unwrap();
    let kids: Vec<_> = (0..4).map(|_| rt.instantiate(item, &[]).unwrap()).collect();
    let surfaces: Vec<_> = kids
        .iter()
        .map(|k| Ref::Loop(rt.loop_of(*k, "surface").unwrap()))
        .collect();

    rt.tree_mut()
        .hook(items, &[surfaces[0].clone(), surfaces[1].clone()])
        .unwrap();
    rt.tree_mut()
        .hook_at(items, 1, &[surfaces[2].clone(), surfaces[3].clone()])
        .unwrap();
    let expect: Vec<_> = [0, 2, 3, 1].iter().map(|i| ext_of(&rt, kids[*i])).collect();
    assert_eq!(backend(&rt).children_of(ext_of(&rt, l)), expect);

    // rehook replaces the whole ordered set.
    rt.tree_mut()
        .rehook(items, &[surfaces[3].clone(), surfaces[0].clone()])
        .unwrap();
    let expect: Vec<_> = [3, 0].iter().map(|i| ext_of(&rt, kids[*i])).collect();
    assert_eq!(backend(&rt).children_of(ext_of(&rt, l)), expect);

    // unhook of an absent tie is a no-op; of a present one, removal.
    rt.tree_mut().unhook(items, &[surfaces[1].clone()]).unwrap();
    assert_eq!(backend(&rt).children_of(ext_of(&rt, l)).len(), 2);
    rt.tree_mut().unhook(items, &[surfaces[3].clone()]).unwrap();
    assert_eq!(
        backend(&rt).children_of(ext_of(&rt, l)),
        vec![ext_of(&rt, kids[0])]
    );
}

#[test]
fn moving_a_child_between_parents_is_atomic() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");

    let l1 = rt.instantiate(list, &[]).unwrap();
    let l2 = rt.instantiate(list, &[]).unwrap();
    let a = rt.instantiate(item, &[]).unwrap();
    let surface = Ref::Loop(rt.loop_of(a, "surface").unwrap());

    let h1 = rt.hook_of(l1, "items").unwrap();
    let h2 = rt.hook_of(l2, "items").unwrap();
    rt.tree_mut().hook(h1, &[surface.clone()]).unwrap();
    rt.tree_mut().hook(h2, &[surface]).unwrap();

    assert!(backend(&rt).children_of(ext_of(&rt, l1)).is_empty());
    assert_eq!(
        backend(&rt).children_of(ext_of(&rt, l2)),
        vec![ext_of(&rt, a)]
    );
}

#[test]
fn cycle_rejection_leaves_ties_untouched() {
    let mut rt = Runtime::new();
    let panel = rt
        .define(CapsuleSpec::new("Panel").hooks(["top", "bottom"]))
        .unwrap();
    let p = rt.instantiate(panel, &[]).unwrap();
    let top = rt.hook_of(p, "top").unwrap();
    let bottom = rt.hook_of(p, "bottom").unwrap();

    rt.tree_mut().hook(top, &[Ref::Hook(bottom)]).unwrap();

    // bottom is now below top; tying top under bottom would close a cycle.
    let err = rt.tree_mut().hook(bottom, &[Ref::Hook(top)]).unwrap_err();
    assert!(matches!(
        err,
        CapletError::Tree(TreeError::TieCycle { .. })
    ));
    assert_eq!(
        rt.tree().children(top),
        vec![Ref::Hook(bottom)],
        "existing tie survives the rejected mutation"
    );
    assert!(rt.tree().children(bottom).is_empty());

    // Self-ties are cycles of length zero.
    let err = rt.tree_mut().hook(top, &[Ref::Hook(top)]).unwrap_err();
    assert!(matches!(
        err,
        CapletError::Tree(TreeError::TieCycle { .. })
    ));
}

#[test]
fn non_attachment_refs_are_rejected() {
    let mut rt = Runtime::new();
    let panel = rt.define(CapsuleSpec::new("Panel").hooks(["top"])).unwrap();
    let p = rt.instantiate(panel, &[]).unwrap();
    let top = rt.hook_of(p, "top").unwrap();

    for bad in [Ref::Value(Value::from(3)), Ref::Capsule(p), Ref::Class(panel)] {
        let err = rt.tree_mut().hook(top, &[bad]).unwrap_err();
        assert!(matches!(
            err,
            CapletError::Tree(TreeError::IllegalArgument { .. })
        ));
    }
}

#[test]
fn loop_indirection_reaches_the_inner_element() {
    let mut rt = Runtime::new();
    let inner = widget(&mut rt, "Inner", "span");
    // Outer exposes a public surface that forwards to the inner part's
    // surface, which itself forwards to the wrapped element.
    let outer = rt
        .define(
            CapsuleSpec::new("Outer")
                .loops(["surface"])
                .part("core", inner)
                .bind(Endpoint::this("surface"), Endpoint::part("core", "surface")),
        )
        .unwrap();
    let list = widget(&mut rt, "List", "ul");

    let l = rt.instantiate(list, &[]).unwrap();
    let o = rt.instantiate(outer, &[]).unwrap();
    let items = rt.hook_of(l, "items").unwrap();
    let surface = Ref::Loop(rt.loop_of(o, "surface").unwrap());

    rt.tree_mut().hook(items, &[surface]).unwrap();

    let Some(PartTarget::Capsule(core)) = rt.part(o, "core") else {
        panic!("core part missing");
    };
    assert_eq!(
        backend(&rt).children_of(ext_of(&rt, l)),
        vec![ext_of(&rt, core)]
    );
}

#[test]
fn retargeting_a_loop_replaces_the_tie() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");

    let l1 = rt.instantiate(list, &[]).unwrap();
    let l2 = rt.instantiate(list, &[]).unwrap();
    let a = rt.instantiate(item, &[]).unwrap();
    let surface = rt.loop_of(a, "surface").unwrap();

    let h1 = rt.hook_of(l1, "items").unwrap();
    let h2 = rt.hook_of(l2, "items").unwrap();

    rt.tree_mut().set_hook(surface, Some(&Ref::Hook(h1))).unwrap();
    assert_eq!(rt.tree().get_hook(surface), Some(h1));

    rt.tree_mut().set_hook(surface, Some(&Ref::Hook(h2))).unwrap();
    assert_eq!(rt.tree().get_hook(surface), Some(h2));
    assert!(backend(&rt).children_of(ext_of(&rt, l1)).is_empty());
    assert_eq!(
        backend(&rt).children_of(ext_of(&rt, l2)),
        vec![ext_of(&rt, a)]
    );

    rt.tree_mut().set_hook(surface, None).unwrap();
    assert!(backend(&rt).children_of(ext_of(&rt, l2)).is_empty());
    assert_eq!(rt.tree().get_hook(surface), None);
}

#[test]
fn index_out_of_bounds_is_reported() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");
    let l = rt.instantiate(list, &[]).unwrap();
    let a = rt.instantiate(item, &[]).unwrap();

    let items = rt.hook_of(l, "items").unwrap();
    let surface = Ref::Loop(rt.loop_of(a, "surface").unwrap());
    let err = rt.tree_mut().hook_at(items, 2, &[surface]).unwrap_err();
    assert!(matches!(
        err,
        CapletError::Tree(TreeError::IndexOutOfBounds { index: 2, len: 0 })
    ));
}

#[test]
fn set_class_and_adapter_events() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");
    let l = rt.instantiate(list, &[]).unwrap();
    let a = rt.instantiate(item, &[]).unwrap();

    let Some(PartTarget::Element(root)) = rt.part(a, "root") else {
        panic!("root element part missing");
    };
    rt.tree_mut().set_class(root, "selected", true);
    assert!(backend(&rt).has_tag(ext_of(&rt, a), "selected"));
    rt.tree_mut().set_class(root, "selected", false);
    assert!(!backend(&rt).has_tag(ext_of(&rt, a), "selected"));

    let events: Rc<std::cell::RefCell<Vec<&'static str>>> = Rc::default();
    let on_attach: caplet::TieHandler = {
        let events = events.clone();
        Rc::new(move |_| events.borrow_mut().push("attach"))
    };
    let on_detach: caplet::TieHandler = {
        let events = events.clone();
        Rc::new(move |_| events.borrow_mut().push("detach"))
    };
    rt.tree_mut()
        .set_event_handlers(root, Some(on_attach), Some(on_detach));

    let items = rt.hook_of(l, "items").unwrap();
    let surface = Ref::Loop(rt.loop_of(a, "surface").unwrap());
    rt.tree_mut().hook(items, &[surface]).unwrap();
    rt.tree_mut().unhook_all(items).unwrap();
    assert_eq!(*events.borrow(), vec!["attach", "detach"]);
}

#[test]
fn introspection_predicates_distinguish_kinds() {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let l = rt.instantiate(list, &[]).unwrap();

    let refs = [
        Ref::Class(list),
        Ref::Capsule(l),
        Ref::Hook(rt.hook_of(l, "items").unwrap()),
        Ref::Loop(rt.loop_of(l, "surface").unwrap()),
    ];
    assert!(caplet::is_capsule_class(&refs[0]));
    assert!(caplet::is_capsule(&refs[1]));
    assert!(caplet::is_hook(&refs[2]));
    assert!(caplet::is_loop(&refs[3]));
    for r in &refs {
        let hits = [
            caplet::is_capsule(r),
            caplet::is_capsule_class(r),
            caplet::is_operation(r),
            caplet::is_hook(r),
            caplet::is_loop(r),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        assert_eq!(hits, 1);
    }
}
