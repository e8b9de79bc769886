//! Benchmarks for the composition hot paths.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::Value;

use caplet::{CapsuleSpec, ClassId, Endpoint, Ref, Runtime};

fn widget(rt: &mut Runtime, name: &str, tag: &str) -> ClassId {
    rt.define(
        CapsuleSpec::new(name)
            .hooks(["items"])
            .loops(["surface"])
            .element("root", tag)
            .bind(Endpoint::this("items"), Endpoint::part("root", "hook"))
            .bind(Endpoint::this("surface"), Endpoint::part("root", "loop"))
            .public_in("ping", Rc::new(|_, _, _| Ok(Value::from(1)))),
    )
    .unwrap()
}

fn bench_instantiate(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let class = widget(&mut rt, "Widget", "div");

    c.bench_function("instantiate_widget", |bench| {
        bench.iter(|| black_box(rt.instantiate(class, &[]).unwrap()))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let class = widget(&mut rt, "Widget", "div");
    let w = rt.instantiate(class, &[]).unwrap();

    c.bench_function("call_public_op", |bench| {
        bench.iter(|| black_box(rt.call(w, "ping", &[]).unwrap()))
    });
}

fn bench_tie_churn(c: &mut Criterion) {
    let mut rt = Runtime::new();
    let list = widget(&mut rt, "List", "ul");
    let item = widget(&mut rt, "Item", "li");
    let l = rt.instantiate(list, &[]).unwrap();
    let items = rt.hook_of(l, "items").unwrap();
    let surfaces: Vec<Ref> = (0..32)
        .map(|_| {
            let k = rt.instantiate(item, &[]).unwrap();
            Ref::Loop(rt.loop_of(k, "surface").unwrap())
        })
        .collect();

    c.bench_function("rehook_32", |bench| {
        bench.iter(|| {
            rt.tree_mut().rehook(items, black_box(&surfaces)).unwrap();
            rt.tree_mut().unhook_all(items).unwrap();
        })
    });
}

criterion_group!(benches, bench_instantiate, bench_dispatch, bench_tie_churn);
criterion_main!(benches);
