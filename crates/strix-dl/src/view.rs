//! Sign-resolved view of a constraint-graph node.
//!
//! The graph stores each expression once and encodes negation in the sign
//! of the reference, so both the engine and the oracle need the effective
//! top-level connective after the sign is pushed through: a negated AND is
//! an OR over negated children, a negated existential is a universal over
//! the negated filler, negated cardinalities flip around their bound.

use strix_core::{ConceptRef, ConstraintGraph, NodeKind, RoleId};

/// Effective connective of a signed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum View {
    Top,
    Bottom,
    And(Vec<ConceptRef>),
    Or(Vec<ConceptRef>),
    /// ≥n R.C with n ≥ 1; existentials appear as n = 1.
    MinCard(RoleId, u32, ConceptRef),
    /// ≤n R.C.
    MaxCard(RoleId, u32, ConceptRef),
    Forall(RoleId, ConceptRef),
    Atom { index: usize, negated: bool },
    HasSelf(RoleId, bool),
    Nominal { index: usize, negated: bool },
    /// Literal or datatype marker; shallow consistency filter only.
    Data { index: usize, negated: bool },
}

pub(crate) fn view(graph: &ConstraintGraph, c: ConceptRef) -> View {
    let node = graph.node_of(c);
    let neg = c.is_negated();
    match (&node.kind, neg) {
        (NodeKind::Top, false) => View::Top,
        (NodeKind::Top, true) => View::Bottom,
        (NodeKind::And, false) => View::And(node.children.clone()),
        (NodeKind::And, true) => View::Or(neg_all(&node.children)),
        (NodeKind::Or, false) => View::Or(node.children.clone()),
        (NodeKind::Or, true) => View::And(neg_all(&node.children)),
        (NodeKind::Exists(r), false) => View::MinCard(*r, 1, node.filler()),
        (NodeKind::Exists(r), true) => View::Forall(*r, node.filler().neg()),
        (NodeKind::Forall(r), false) => View::Forall(*r, node.filler()),
        (NodeKind::Forall(r), true) => View::MinCard(*r, 1, node.filler().neg()),
        (NodeKind::MinCard(r, n), false) => View::MinCard(*r, *n, node.filler()),
        // ¬(≥n) = ≤n-1; the graph never interns ≥0
        (NodeKind::MinCard(r, n), true) => View::MaxCard(*r, n.saturating_sub(1), node.filler()),
        (NodeKind::MaxCard(r, n), false) => View::MaxCard(*r, *n, node.filler()),
        (NodeKind::MaxCard(r, n), true) => View::MinCard(*r, n + 1, node.filler()),
        // exact restrictions are normalized to ≥n ⊓ ≤n at interning; an
        // exact node reaching the engine would be a construction bug, so
        // fall back to the conjunction semantics of its halves
        (NodeKind::ExactCard(r, n), false) => View::MinCard(*r, *n, node.filler()),
        (NodeKind::ExactCard(r, n), true) => View::MaxCard(*r, n.saturating_sub(1), node.filler()),
        (NodeKind::Concept(_), negated) => View::Atom {
            index: c.index(),
            negated,
        },
        (NodeKind::HasSelf(r), negated) => View::HasSelf(*r, negated),
        (NodeKind::Individual(_), negated) => View::Nominal {
            index: c.index(),
            negated,
        },
        (NodeKind::Literal(_), negated) | (NodeKind::Datatype(_), negated) => View::Data {
            index: c.index(),
            negated,
        },
    }
}

/// Whether a reference belongs on the cardinality queue rather than the
/// general to-do list.
pub(crate) fn is_cardinality(graph: &ConstraintGraph, c: ConceptRef) -> bool {
    matches!(
        view(graph, c),
        View::MinCard(_, _, _) | View::MaxCard(_, _, _)
    )
}

fn neg_all(children: &[ConceptRef]) -> Vec<ConceptRef> {
    children.iter().map(|c| c.neg()).collect()
}
