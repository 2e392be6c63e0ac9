use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strix_core::{ConceptExpr, ConceptRef, KnowledgeBase};
use strix_dl::TableauReasoner;

fn chain_terminology(size: usize) -> (KnowledgeBase, Vec<ConceptRef>) {
    let mut kb = KnowledgeBase::new();
    let mut refs = Vec::with_capacity(size);
    for i in 0..size {
        let class = format!("Class{i}");
        refs.push(kb.declare_concept(&class));
        if i > 0 {
            kb.add_inclusion(
                &ConceptExpr::name(&class),
                &ConceptExpr::name(&format!("Class{}", i - 1)),
            )
            .unwrap();
        }
    }
    kb.add_disjointness(&[
        ConceptExpr::name("Class0"),
        ConceptExpr::name("Outsider"),
    ])
    .unwrap();
    kb.finalize();
    (kb, refs)
}

fn cyclic_terminology() -> (KnowledgeBase, ConceptRef) {
    let mut kb = KnowledgeBase::new();
    kb.add_equivalence(
        "Tree",
        &ConceptExpr::and(vec![
            ConceptExpr::name("Node"),
            ConceptExpr::exists("branch", ConceptExpr::name("Tree")),
            ConceptExpr::at_most(2, "branch", None),
        ]),
    )
    .unwrap();
    let tree = kb.graph.lookup_concept("Tree").unwrap();
    kb.finalize();
    (kb, tree)
}

fn benchmark_satisfiability(c: &mut Criterion) {
    let sizes = vec![5, 10, 20];

    for size in sizes {
        let (kb, refs) = chain_terminology(size);
        c.bench_function(&format!("tableau_sat_chain_{}_classes", size), |b| {
            b.iter(|| {
                let mut reasoner = TableauReasoner::with_defaults(&kb);
                for &class in &refs {
                    let _result = reasoner.check_sat(black_box(class)).unwrap();
                }
            });
        });
    }
}

fn benchmark_subsumption(c: &mut Criterion) {
    let sizes = vec![5, 10, 20];

    for size in sizes {
        let (kb, refs) = chain_terminology(size);
        let root = refs[0];
        c.bench_function(&format!("tableau_subsumption_{}_classes", size), |b| {
            b.iter(|| {
                let mut reasoner = TableauReasoner::with_defaults(&kb);
                for &class in &refs {
                    let _result = reasoner
                        .check_subsumption(black_box(class), black_box(root))
                        .unwrap();
                }
            });
        });
    }
}

fn benchmark_cyclic_blocking(c: &mut Criterion) {
    let (kb, tree) = cyclic_terminology();
    c.bench_function("tableau_sat_cyclic_definition", |b| {
        b.iter(|| {
            let mut reasoner = TableauReasoner::with_defaults(&kb);
            let _result = reasoner.check_sat(black_box(tree)).unwrap();
        });
    });
}

criterion_group!(
    benches,
    benchmark_satisfiability,
    benchmark_subsumption,
    benchmark_cyclic_blocking
);
criterion_main!(benches);
