//! Concept references and constraint-graph nodes.
//!
//! A `ConceptRef` is a signed index into the constraint graph: the absolute
//! value addresses a node, the sign encodes logical negation. Index 0 is
//! reserved (undefined), index 1 is the universal concept, so `-1` is the
//! empty concept. Sharing one signed handle per sub-expression keeps the
//! graph a DAG and makes negation free.

use crate::roles::RoleId;
use serde::{Deserialize, Serialize};

/// Signed reference to a constraint-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptRef(pub i32);

impl ConceptRef {
    /// The undefined reference. Never addresses a real node.
    pub const UNDEF: ConceptRef = ConceptRef(0);
    /// The universal concept (everything).
    pub const TOP: ConceptRef = ConceptRef(1);
    /// The empty concept (nothing); the negation of `TOP`.
    pub const BOTTOM: ConceptRef = ConceptRef(-1);

    pub fn new(index: usize, negated: bool) -> Self {
        let v = index as i32;
        ConceptRef(if negated { -v } else { v })
    }

    /// Logical negation: flips the sign, shares the node.
    #[inline]
    pub fn neg(self) -> Self {
        ConceptRef(-self.0)
    }

    /// Arena index of the referenced node.
    #[inline]
    pub fn index(self) -> usize {
        self.0.unsigned_abs() as usize
    }

    #[inline]
    pub fn is_negated(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn is_defined(self) -> bool {
        self.0 != 0
    }

    /// The positive-polarity reference to the same node.
    #[inline]
    pub fn abs(self) -> Self {
        ConceptRef(self.0.abs())
    }
}

/// Structural variant of a constraint-graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// The universal concept (⊤). Exactly one node, at index 1.
    Top,
    /// Conjunction over the node's children.
    And,
    /// Disjunction over the node's children.
    Or,
    /// Existential restriction ∃R.C; the single child is the filler.
    Exists(RoleId),
    /// Universal restriction ∀R.C; the single child is the filler.
    Forall(RoleId),
    /// At-least restriction ≥n R.C.
    MinCard(RoleId, u32),
    /// At-most restriction ≤n R.C.
    MaxCard(RoleId, u32),
    /// Exact restriction =n R.C.
    ExactCard(RoleId, u32),
    /// Named atomic concept.
    Concept(String),
    /// Nominal (a named individual used as a concept).
    Individual(String),
    /// Concrete data value.
    Literal(String),
    /// Named datatype.
    Datatype(String),
    /// Local reflexivity ∃R.Self.
    HasSelf(RoleId),
}

impl NodeKind {
    /// Role carried by quantified and cardinality variants.
    pub fn role(&self) -> Option<RoleId> {
        match self {
            NodeKind::Exists(r)
            | NodeKind::Forall(r)
            | NodeKind::MinCard(r, _)
            | NodeKind::MaxCard(r, _)
            | NodeKind::ExactCard(r, _)
            | NodeKind::HasSelf(r) => Some(*r),
            _ => None,
        }
    }

    /// Numeric bound carried by cardinality variants.
    pub fn bound(&self) -> Option<u32> {
        match self {
            NodeKind::MinCard(_, n) | NodeKind::MaxCard(_, n) | NodeKind::ExactCard(_, n) => {
                Some(*n)
            }
            _ => None,
        }
    }

    /// Single-letter tag used by the automorphism labeler.
    pub fn tag(&self) -> char {
        match self {
            NodeKind::Top => 't',
            NodeKind::And => 'a',
            NodeKind::Or => 'o',
            NodeKind::Exists(_) => 'e',
            NodeKind::Forall(_) => 'f',
            NodeKind::MinCard(_, _) => 'm',
            NodeKind::MaxCard(_, _) => 'x',
            NodeKind::ExactCard(_, _) => 'q',
            NodeKind::Concept(_) => 'c',
            NodeKind::Individual(_) => 'i',
            NodeKind::Literal(_) => 'l',
            NodeKind::Datatype(_) => 'd',
            NodeKind::HasSelf(_) => 's',
        }
    }
}

/// One node of the constraint graph.
///
/// Nodes are created during knowledge-base load and are immutable afterwards,
/// except for the lazy-unfolding back-links (`description`,
/// `sub_description`, `negative_description`) attached to atomic concepts by
/// absorption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintNode {
    pub kind: NodeKind,
    /// Ordered signed children. Fillers for quantified nodes, conjuncts or
    /// disjuncts for the boolean nodes, empty for leaves.
    pub children: Vec<ConceptRef>,
    /// Equivalence definition of a named concept, if any.
    pub description: Option<ConceptRef>,
    /// Accumulated necessary conditions from absorbed inclusion axioms.
    /// `UNDEF` when none.
    pub sub_description: ConceptRef,
    /// Conditions inherited through absorbed negated inclusions (¬A ⊑ D).
    /// `UNDEF` when none.
    pub negative_description: ConceptRef,
}

impl ConstraintNode {
    pub fn new(kind: NodeKind, children: Vec<ConceptRef>) -> Self {
        Self {
            kind,
            children,
            description: None,
            sub_description: ConceptRef::UNDEF,
            negative_description: ConceptRef::UNDEF,
        }
    }

    /// Filler of a quantified or cardinality node. `TOP` for unqualified
    /// cardinality restrictions written without an explicit filler.
    pub fn filler(&self) -> ConceptRef {
        self.children.first().copied().unwrap_or(ConceptRef::TOP)
    }

    pub fn is_atomic_concept(&self) -> bool {
        matches!(self.kind, NodeKind::Concept(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_sign_and_shares_index() {
        let c = ConceptRef::new(7, false);
        assert_eq!(c.neg().index(), 7);
        assert!(c.neg().is_negated());
        assert_eq!(c.neg().neg(), c);
    }

    #[test]
    fn top_and_bottom_share_the_universal_node() {
        assert_eq!(ConceptRef::TOP.neg(), ConceptRef::BOTTOM);
        assert_eq!(ConceptRef::BOTTOM.index(), 1);
        assert!(!ConceptRef::UNDEF.is_defined());
    }
}
