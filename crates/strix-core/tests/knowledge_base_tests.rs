use proptest::prelude::*;
use strix_core::{ConceptExpr, ConceptRef, DependencySet, KnowledgeBase, NodeKind};

#[test]
fn equivalence_attaches_a_definition() {
    let mut kb = KnowledgeBase::new();
    kb.add_equivalence(
        "Parent",
        &ConceptExpr::and(vec![
            ConceptExpr::name("Person"),
            ConceptExpr::exists("hasChild", ConceptExpr::name("Person")),
        ]),
    )
    .unwrap();
    kb.finalize();

    let parent = kb.graph.lookup_concept("Parent").unwrap();
    let node = kb.graph.node_of(parent);
    let def = node.description.unwrap();
    assert!(matches!(kb.graph.node_of(def).kind, NodeKind::And));
    assert!(!kb.graph.meta_constraint().is_defined());
}

#[test]
fn disjointness_absorbs_into_every_member() {
    let mut kb = KnowledgeBase::new();
    kb.add_disjointness(&[
        ConceptExpr::name("Cat"),
        ConceptExpr::name("Dog"),
        ConceptExpr::name("Bird"),
    ])
    .unwrap();
    kb.finalize();

    let cat = kb.graph.lookup_concept("Cat").unwrap();
    let dog = kb.graph.lookup_concept("Dog").unwrap();
    let bird = kb.graph.lookup_concept("Bird").unwrap();

    // Cat ⊑ ¬Dog ⊓ ¬Bird, accumulated in the sub-description.
    let sub = kb.graph.node_of(cat).sub_description;
    let expected = kb.graph.and(vec![dog.neg(), bird.neg()]);
    assert_eq!(sub, expected);
    // Nothing spills into the global meta-constraint.
    assert!(!kb.graph.meta_constraint().is_defined());
}

#[test]
fn unabsorbable_inclusions_accumulate_in_the_meta_constraint() {
    let mut kb = KnowledgeBase::new();
    kb.add_inclusion(
        &ConceptExpr::exists("owns", ConceptExpr::name("Pet")),
        &ConceptExpr::name("Owner"),
    )
    .unwrap();
    kb.add_inclusion(
        &ConceptExpr::or(vec![ConceptExpr::name("Cat"), ConceptExpr::name("Dog")]),
        &ConceptExpr::name("Animal"),
    )
    .unwrap();
    kb.finalize();

    let meta = kb.graph.meta_constraint();
    assert!(meta.is_defined());
    assert!(matches!(kb.graph.node_of(meta).kind, NodeKind::And));
}

#[test]
fn exact_restrictions_intern_as_both_bounds() {
    let mut kb = KnowledgeBase::new();
    let exact = kb
        .intern(&ConceptExpr::exactly(
            2,
            "hasWheel",
            Some(ConceptExpr::name("Wheel")),
        ))
        .unwrap();
    let node = kb.graph.node_of(exact);
    assert!(matches!(node.kind, NodeKind::And));
    let kinds: Vec<_> = node
        .children
        .iter()
        .map(|&c| kb.graph.node_of(c).kind.clone())
        .collect();
    assert!(kinds.iter().any(|k| matches!(k, NodeKind::MinCard(_, 2))));
    assert!(kinds.iter().any(|k| matches!(k, NodeKind::MaxCard(_, 2))));

    // =0 degenerates to the upper bound alone
    let none = kb
        .intern(&ConceptExpr::exactly(0, "hasWheel", None))
        .unwrap();
    assert!(matches!(
        kb.graph.node_of(none).kind,
        NodeKind::MaxCard(_, 0)
    ));
}

#[test]
fn role_characteristics_survive_the_closure() {
    let mut kb = KnowledgeBase::new();
    let has_parent = kb.declare_role("hasParent").unwrap();
    let has_ancestor = kb.declare_role("hasAncestor").unwrap();
    let related = kb.declare_role("relatedTo").unwrap();
    kb.roles.add_sub_role(has_parent, has_ancestor).unwrap();
    kb.roles.add_sub_role(has_ancestor, related).unwrap();
    kb.roles.set_transitive(has_ancestor).unwrap();
    kb.roles.set_functional(has_parent).unwrap();
    let person = kb.declare_concept("Person");
    kb.roles.set_range(has_parent, person).unwrap();
    kb.finalize();

    assert!(kb.roles.is_subrole_of(has_parent, related));
    assert!(!kb.roles.is_subrole_of(related, has_parent));
    assert_eq!(
        kb.roles.transitive_between(has_parent, related),
        Some(has_ancestor)
    );
    assert!(kb.roles.role(has_parent).functional);
    assert_eq!(kb.roles.role(has_parent).range, person);
}

#[test]
fn abox_assertions_are_recorded_verbatim() {
    let mut kb = KnowledgeBase::new();
    kb.assert_instance("alice", &ConceptExpr::name("Person"))
        .unwrap();
    kb.assert_role("alice", "hasChild", "bob").unwrap();
    kb.assert_distinct("alice", "bob");
    kb.finalize();

    assert_eq!(kb.assertions.len(), 1);
    assert_eq!(kb.role_assertions.len(), 1);
    assert_eq!(kb.role_assertions[0].subject, "alice");
    assert_eq!(kb.role_assertions[0].object, "bob");
    assert_eq!(kb.distinct, vec![("alice".to_string(), "bob".to_string())]);
}

fn dependency_set() -> impl Strategy<Value = DependencySet> {
    prop::collection::vec(1u32..32, 0..8).prop_map(|v| v.into_iter().collect())
}

proptest! {
    #[test]
    fn union_is_commutative_and_idempotent(a in dependency_set(), b in dependency_set()) {
        let ab = a.clone().unioned(&b);
        let ba = b.clone().unioned(&a);
        prop_assert_eq!(&ab, &ba);
        prop_assert_eq!(ab.clone().unioned(&ab), ab);
    }

    #[test]
    fn union_preserves_membership(a in dependency_set(), b in dependency_set()) {
        let u = a.clone().unioned(&b);
        for level in a.iter().chain(b.iter()) {
            prop_assert!(u.contains(level));
        }
        prop_assert!(u.len() <= a.len() + b.len());
        prop_assert_eq!(u.max_level(), a.max_level().max(b.max_level()));
    }

    #[test]
    fn restrict_below_commutes_with_union(a in dependency_set(), b in dependency_set(), cut in 1u32..32) {
        let mut whole = a.clone().unioned(&b);
        whole.restrict_below(cut);
        let (mut ra, mut rb) = (a, b);
        ra.restrict_below(cut);
        rb.restrict_below(cut);
        prop_assert_eq!(whole, ra.unioned(&rb));
    }
}
