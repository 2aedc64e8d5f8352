//! Discovery and Planning Benchmarks
//!
//! Benchmarks for classification, tree construction and plan iteration.
//!
//! Run with: `cargo bench --bench plan_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ensayo::{ClassifierChain, FunctionRef, Plan, TreeBuilder};
use std::sync::Arc;

/// `files` compile units with `tests` tests each, plus setup and teardown
fn synthetic_functions(files: usize, tests: usize) -> Vec<FunctionRef> {
    let mut functions = Vec::with_capacity(files * (tests + 3));
    let mut address = 0x1000;
    for f in 0..files {
        let unit = format!("src/module_{}/file_{f}.c", f % 8);
        for name in ["setup", "teardown", "helper"] {
            functions.push(FunctionRef::new(name, &unit, address));
            address += 0x10;
        }
        for t in 0..tests {
            functions.push(FunctionRef::new(format!("test_case_{t}"), &unit, address));
            address += 0x10;
        }
    }
    functions
}

fn bench_classify(c: &mut Criterion) {
    let chain = ClassifierChain::with_defaults();
    let names = ["test_parse_header", "TestParseHeader", "setup", "cleanup", "helper_fn"];

    c.bench_function("classify_default_chain", |bench| {
        bench.iter(|| {
            for name in names {
                black_box(chain.classify(black_box(name)));
            }
        });
    });
}

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    let chain = ClassifierChain::with_defaults();

    for (files, tests) in [(10, 10), (50, 20), (200, 25)] {
        let functions = synthetic_functions(files, tests);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{files}x{tests}")),
            &functions,
            |bench, functions| {
                bench.iter(|| {
                    let (tree, report) = TreeBuilder::new(&chain).build(functions.iter().cloned());
                    black_box((tree, report));
                });
            },
        );
    }

    group.finish();
}

fn bench_plan_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_iteration");
    let chain = ClassifierChain::with_defaults();

    for (files, tests) in [(10, 10), (200, 25)] {
        let (tree, _) = TreeBuilder::new(&chain)
            .without_collapse()
            .build(synthetic_functions(files, tests));
        let tree = Arc::new(tree);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{files}x{tests}")),
            &tree,
            |bench, tree| {
                bench.iter(|| black_box(Plan::all(tree).count()));
            },
        );
    }

    let (tree, _) = TreeBuilder::new(&chain)
        .without_collapse()
        .build(synthetic_functions(200, 25));
    let tree = Arc::new(tree);
    let specs = ["src.module_0", "src.module_3.file_3", "src"];
    group.bench_function("overlapping_specs", |bench| {
        bench.iter(|| {
            let plan = Plan::new(&tree, black_box(&specs[..])).map(Iterator::count);
            black_box(plan)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_tree_build, bench_plan_iteration);
criterion_main!(benches);
