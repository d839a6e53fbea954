//! This bench test simulates a full breadth-first allocation over a wide
//! three-level hardware breakdown structure.

#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use relalloc::{
    AllocationConfig, AllocationEngine, AllocationNode, AllocationTree, HardwareId, Method,
};

/// Builds a tree with one root, `fanout` subsystems, and `fanout` assemblies
/// under each subsystem.
fn preseed_tree(fanout: u32) -> AllocationTree {
    let mut tree = AllocationTree::new();

    let mut root = AllocationNode::new(HardwareId::new(1));
    root.method = Method::Equal;
    root.reliability_goal = 0.95;
    tree.insert(root).unwrap();

    let mut next_id = 2;
    for _ in 0..fanout {
        let subsystem = next_id;
        next_id += 1;
        tree.insert(AllocationNode::new(HardwareId::new(subsystem)))
            .unwrap();
        tree.link(HardwareId::new(subsystem), HardwareId::new(1))
            .unwrap();

        for _ in 0..fanout {
            let assembly = next_id;
            next_id += 1;
            tree.insert(AllocationNode::new(HardwareId::new(assembly)))
                .unwrap();
            tree.link(HardwareId::new(assembly), HardwareId::new(subsystem))
                .unwrap();
        }
    }
    tree
}

fn cascade_wide_tree(c: &mut Criterion) {
    let config = AllocationConfig::default();

    c.bench_function("cascade 32x32", |b| {
        b.iter_batched(
            || preseed_tree(32),
            |mut tree| {
                AllocationEngine::new(&mut tree, &config)
                    .cascade(HardwareId::new(1))
                    .unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, cascade_wide_tree);
criterion_main!(benches);
