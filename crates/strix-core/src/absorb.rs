//! Absorption of general inclusion axioms.
//!
//! A GCI `C ⊑ D` checked directly would force the disjunction `¬C ⊔ D` onto
//! every individual of every model, one nondeterministic branch per axiom.
//! Absorption rewrites as many GCIs as possible into conditions attached to
//! atomic concepts, so they fire only when the concept itself is asserted
//! (lazy unfolding). Only the residue that fits neither pattern stays
//! global, AND-accumulated into the meta-constraint.

use crate::concept::ConceptRef;
use crate::graph::ConstraintGraph;
use crate::StrixCoreError;

/// Route one inclusion `lhs ⊑ rhs` into the graph.
///
/// Three cases:
/// - `A ⊑ D`, `A` atomic positive: `D` joins `A`'s sub-description.
/// - `¬A ⊑ D`, `A` atomic: `D` joins `A`'s negative description.
/// - anything else: `¬lhs ⊔ rhs` joins the meta-constraint.
pub fn absorb_inclusion(
    graph: &mut ConstraintGraph,
    lhs: ConceptRef,
    rhs: ConceptRef,
) -> Result<(), StrixCoreError> {
    if !lhs.is_defined() || !rhs.is_defined() {
        return Err(StrixCoreError::UndefinedConcept);
    }
    // Trivial axioms carry no information.
    if rhs == ConceptRef::TOP || lhs == ConceptRef::BOTTOM || lhs == rhs {
        return Ok(());
    }

    if graph.node_of(lhs).is_atomic_concept() {
        if lhs.is_negated() {
            graph.conjoin_negative_description(lhs.abs(), rhs);
        } else {
            graph.conjoin_sub_description(lhs, rhs);
        }
        return Ok(());
    }

    let residual = graph.or(vec![lhs.neg(), rhs]);
    if residual != ConceptRef::TOP {
        graph.conjoin_meta(residual);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnowledgeBase;

    #[test]
    fn atomic_lhs_is_absorbed_into_sub_description() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        absorb_inclusion(&mut kb.graph, a, b).unwrap();
        assert_eq!(kb.graph.node_of(a).sub_description, b);
        assert!(!kb.graph.meta_constraint().is_defined());
    }

    #[test]
    fn negated_atomic_lhs_uses_negative_description() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        absorb_inclusion(&mut kb.graph, a.neg(), b).unwrap();
        assert_eq!(kb.graph.node_of(a).negative_description, b);
        assert!(!kb.graph.node_of(a).sub_description.is_defined());
    }

    #[test]
    fn complex_lhs_becomes_meta_constraint() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let c = kb.declare_concept("C");
        let lhs = kb.graph.and(vec![a, b]);
        absorb_inclusion(&mut kb.graph, lhs, c).unwrap();
        let meta = kb.graph.meta_constraint();
        assert!(meta.is_defined());
        // meta is ¬(A ⊓ B) ⊔ C
        let expected = kb.graph.or(vec![lhs.neg(), c]);
        assert_eq!(meta, expected);
    }

    #[test]
    fn successive_absorptions_accumulate() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let c = kb.declare_concept("C");
        absorb_inclusion(&mut kb.graph, a, b).unwrap();
        absorb_inclusion(&mut kb.graph, a, c).unwrap();
        let sub = kb.graph.node_of(a).sub_description;
        let expected = kb.graph.and(vec![b, c]);
        assert_eq!(sub, expected);
    }

    #[test]
    fn trivial_axioms_are_dropped() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        absorb_inclusion(&mut kb.graph, a, ConceptRef::TOP).unwrap();
        absorb_inclusion(&mut kb.graph, ConceptRef::BOTTOM, a).unwrap();
        assert!(!kb.graph.node_of(a).sub_description.is_defined());
        assert!(!kb.graph.meta_constraint().is_defined());
    }
}
