//! Structural disjointness oracle.
//!
//! Answers "are C and D provably disjoint?" without opening a tableau.
//! The answer is sound in one direction only: `true` means C ⊓ D is
//! unsatisfiable, `false` means nothing. Every guard (recursion depth,
//! cycles through unfolding, unknown shapes) therefore fails toward
//! `false`. The engine uses the oracle to drop OR-branches before they
//! become choice points and to disqualify merge candidates whose labels
//! can never coexist.

use crate::view::{view, View};
use itertools::Itertools;
use std::collections::HashMap;
use strix_core::{ConceptRef, ConstraintGraph, NodeKind, RoleHierarchy, RoleId};

/// Memoized disjointness checker over one constraint graph.
#[derive(Debug)]
pub struct DisjointnessOracle {
    /// Ordered signed pair → verdict. A pair is seeded `false` before its
    /// own recursion so unfolding cycles resolve to "not provably".
    memo: HashMap<(i32, i32), bool>,
    depth_bound: usize,
    memo_limit: usize,
}

impl DisjointnessOracle {
    pub fn new(depth_bound: usize, memo_limit: usize) -> Self {
        Self {
            memo: HashMap::new(),
            depth_bound,
            memo_limit,
        }
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }

    /// `true` iff `a ⊓ b` is provably unsatisfiable.
    pub fn disjoint(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        a: ConceptRef,
        b: ConceptRef,
    ) -> bool {
        if self.memo.len() > self.memo_limit {
            self.memo.clear();
        }
        self.check(graph, roles, a, b, 0)
    }

    /// `true` iff `c` alone is provably unsatisfiable.
    pub fn unsatisfiable(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        c: ConceptRef,
    ) -> bool {
        self.disjoint(graph, roles, c, ConceptRef::TOP)
    }

    fn check(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        a: ConceptRef,
        b: ConceptRef,
        depth: usize,
    ) -> bool {
        if a == ConceptRef::BOTTOM || b == ConceptRef::BOTTOM {
            return true;
        }
        if a == b.neg() {
            return true;
        }
        // C ⊓ ⊤ and C ⊓ C are unsat only through C's own structure
        if a == ConceptRef::TOP || a == b {
            return self.structurally_unsat(graph, roles, b, depth);
        }
        if b == ConceptRef::TOP {
            return self.structurally_unsat(graph, roles, a, depth);
        }
        if depth >= self.depth_bound {
            return false;
        }
        let key = ordered(a, b);
        if let Some(&verdict) = self.memo.get(&key) {
            return verdict;
        }
        self.memo.insert(key, false);
        let verdict = self.check_views(graph, roles, a, b, depth)
            || self.structurally_unsat(graph, roles, a, depth)
            || self.structurally_unsat(graph, roles, b, depth);
        if verdict {
            self.memo.insert(key, true);
        }
        verdict
    }

    fn check_views(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        a: ConceptRef,
        b: ConceptRef,
        depth: usize,
    ) -> bool {
        let (va, vb) = (view(graph, a), view(graph, b));
        // boolean structure first, symmetric in both operands
        if let Some(v) = self.boolean_case(graph, roles, &va, b, depth) {
            return v;
        }
        if let Some(v) = self.boolean_case(graph, roles, &vb, a, depth) {
            return v;
        }
        if self.unfold_case(graph, roles, &va, b, depth)
            || self.unfold_case(graph, roles, &vb, a, depth)
        {
            return true;
        }
        self.quantified_case(graph, roles, &va, &vb, depth)
            || self.quantified_case(graph, roles, &vb, &va, depth)
            || data_case(graph, &va, &vb)
    }

    /// AND distributes, OR requires all branches refuted. `None` when the
    /// view is not boolean.
    fn boolean_case(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        v: &View,
        other: ConceptRef,
        depth: usize,
    ) -> Option<bool> {
        match v {
            View::And(xs) => Some(
                xs.iter()
                    .any(|&x| self.check(graph, roles, x, other, depth + 1)),
            ),
            View::Or(xs) => Some(
                !xs.is_empty()
                    && xs
                        .iter()
                        .all(|&x| self.check(graph, roles, x, other, depth + 1)),
            ),
            View::Bottom => Some(true),
            _ => None,
        }
    }

    /// Lazy unfolding: a defined atom stands for its definition, a
    /// primitive atom implies its absorbed necessary conditions.
    fn unfold_case(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        v: &View,
        other: ConceptRef,
        depth: usize,
    ) -> bool {
        let View::Atom { index, negated } = *v else {
            return false;
        };
        let node = graph.node(index);
        if let Some(def) = node.description {
            let unfolded = if negated { def.neg() } else { def };
            if self.check(graph, roles, unfolded, other, depth + 1) {
                return true;
            }
        }
        if !negated && node.sub_description.is_defined() {
            if self.check(graph, roles, node.sub_description, other, depth + 1) {
                return true;
            }
        }
        if negated && node.negative_description.is_defined() {
            if self.check(graph, roles, node.negative_description, other, depth + 1) {
                return true;
            }
        }
        false
    }

    /// Role-restriction interactions: a required successor that can never
    /// satisfy the other side's universal or at-most restriction.
    fn quantified_case(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        va: &View,
        vb: &View,
        depth: usize,
    ) -> bool {
        let View::MinCard(r, n, f) = *va else {
            return false;
        };
        match *vb {
            // ≥n R.C vs ∀S.D with R ⊑ S: every required successor gets D
            View::Forall(s, d) if roles.is_subrole_of(r, s) => {
                self.check(graph, roles, f, d, depth + 1)
            }
            // ≥n R.C vs ≤m S.D with R ⊑ S and C ⊑ D forces n ≤ m
            View::MaxCard(s, m, d) if n > m && roles.is_subrole_of(r, s) => {
                self.implies(graph, roles, f, d, depth)
            }
            _ => false,
        }
    }

    /// `sub ⊑ sup`, proven as disjointness of `sub` and `¬sup`.
    fn implies(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        sub: ConceptRef,
        sup: ConceptRef,
        depth: usize,
    ) -> bool {
        sup == ConceptRef::TOP || self.check(graph, roles, sub, sup.neg(), depth + 1)
    }

    /// Unsatisfiability of a single concept through its own restrictions:
    /// functional-role overflow, empty effective fillers, and at-least
    /// demands that overrun an at-most bound inside one conjunction.
    fn structurally_unsat(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        c: ConceptRef,
        depth: usize,
    ) -> bool {
        if depth >= self.depth_bound {
            return false;
        }
        match view(graph, c) {
            View::Bottom => true,
            View::MinCard(r, n, f) => self.min_card_unsat(graph, roles, r, n, f, depth),
            View::And(xs) => {
                for &x in &xs {
                    if let View::MinCard(r, n, f) = view(graph, x) {
                        if self.min_card_unsat(graph, roles, r, n, f, depth) {
                            return true;
                        }
                    }
                }
                self.card_overflow(graph, roles, &xs, depth)
            }
            View::Or(xs) => xs
                .iter()
                .all(|&x| self.structurally_unsat(graph, roles, x, depth + 1)),
            _ => false,
        }
    }

    fn min_card_unsat(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        r: RoleId,
        n: u32,
        f: ConceptRef,
        depth: usize,
    ) -> bool {
        if n >= 2 && is_functional(roles, r) {
            return true;
        }
        // filler incompatible with the role's range
        let range = roles.role(r).range;
        if range.is_defined() && self.check(graph, roles, f, range, depth + 1) {
            return true;
        }
        self.structurally_unsat(graph, roles, f, depth + 1)
    }

    /// Inside one conjunction, pick the at-least restrictions governed by
    /// an at-most restriction and ask whether any set of pairwise-disjoint
    /// fillers already demands more successors than the bound allows. The
    /// demands form an n-partite compatibility problem; a max-weight clique
    /// in the disjointness graph is a lower bound on distinct successors.
    fn card_overflow(
        &mut self,
        graph: &ConstraintGraph,
        roles: &RoleHierarchy,
        conjuncts: &[ConceptRef],
        depth: usize,
    ) -> bool {
        for &cap in conjuncts {
            let View::MaxCard(s, m, d) = view(graph, cap) else {
                continue;
            };
            // counted demands: ≥n R.C with R ⊑ S and C ⊑ D
            let mut demands: Vec<(u32, ConceptRef)> = Vec::new();
            for &x in conjuncts {
                if let View::MinCard(r, n, f) = view(graph, x) {
                    if roles.is_subrole_of(r, s) && self.implies(graph, roles, f, d, depth) {
                        demands.push((n, f));
                    }
                }
            }
            if demands.iter().map(|&(n, _)| n).sum::<u32>() <= m {
                continue;
            }
            let k = demands.len();
            let mut adj = vec![vec![false; k]; k];
            for (i, j) in (0..k).tuple_combinations() {
                if self.check(graph, roles, demands[i].1, demands[j].1, depth + 1) {
                    adj[i][j] = true;
                    adj[j][i] = true;
                }
            }
            let weights: Vec<u32> = demands.iter().map(|&(n, _)| n).collect();
            if max_clique_weight(&adj, &weights, &(0..k).collect::<Vec<_>>()) > m {
                return true;
            }
        }
        false
    }
}

/// Functional either directly or through a functional super-role.
fn is_functional(roles: &RoleHierarchy, r: RoleId) -> bool {
    roles
        .super_roles(r)
        .iter()
        .any(|&s| roles.role(s).functional)
}

/// Distinct concrete values never coincide.
fn data_case(graph: &ConstraintGraph, va: &View, vb: &View) -> bool {
    let (View::Data { index: i, negated: false }, View::Data { index: j, negated: false }) =
        (va, vb)
    else {
        return false;
    };
    matches!(
        (&graph.node(*i).kind, &graph.node(*j).kind),
        (NodeKind::Literal(x), NodeKind::Literal(y)) if x != y
    )
}

/// Maximum total weight over cliques of the pairwise-disjointness graph.
/// Demand lists are tiny; plain branch-and-include is enough.
fn max_clique_weight(adj: &[Vec<bool>], weights: &[u32], candidates: &[usize]) -> u32 {
    let mut best = 0;
    for (pos, &v) in candidates.iter().enumerate() {
        let rest: Vec<usize> = candidates[pos + 1..]
            .iter()
            .copied()
            .filter(|&u| adj[v][u])
            .collect();
        let w = weights[v] + max_clique_weight(adj, weights, &rest);
        best = best.max(w);
    }
    best
}

fn ordered(a: ConceptRef, b: ConceptRef) -> (i32, i32) {
    if a.0 <= b.0 {
        (a.0, b.0)
    } else {
        (b.0, a.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strix_core::{ConceptExpr, KnowledgeBase};

    fn oracle() -> DisjointnessOracle {
        DisjointnessOracle::new(64, 1 << 16)
    }

    #[test]
    fn complement_pair_is_disjoint() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        kb.finalize();
        assert!(oracle().disjoint(&kb.graph, &kb.roles, a, a.neg()));
        assert!(!oracle().disjoint(&kb.graph, &kb.roles, a, a));
    }

    #[test]
    fn unfolding_reaches_a_stated_disjointness() {
        let mut kb = KnowledgeBase::new();
        kb.add_inclusion(&ConceptExpr::name("Cat"), &ConceptExpr::not(ConceptExpr::name("Dog")))
            .unwrap();
        let cat = kb.graph.lookup_concept("Cat").unwrap();
        let dog = kb.graph.lookup_concept("Dog").unwrap();
        kb.finalize();
        assert!(oracle().disjoint(&kb.graph, &kb.roles, cat, dog));
        assert!(!oracle().disjoint(&kb.graph, &kb.roles, cat, cat));
    }

    #[test]
    fn conjunction_distributes_disjunction_requires_all() {
        let mut kb = KnowledgeBase::new();
        kb.add_disjointness(&[ConceptExpr::name("A"), ConceptExpr::name("B")])
            .unwrap();
        let a = kb.graph.lookup_concept("A").unwrap();
        let b = kb.graph.lookup_concept("B").unwrap();
        let c = kb.declare_concept("C");
        let and_ac = kb.graph.and(vec![a, c]);
        let or_bc = kb.graph.or(vec![b, c]);
        kb.finalize();
        let mut o = oracle();
        assert!(o.disjoint(&kb.graph, &kb.roles, and_ac, b));
        // B ⊔ C is compatible with A through the C branch
        assert!(!o.disjoint(&kb.graph, &kb.roles, or_bc, a));
    }

    #[test]
    fn min_card_clashes_with_universal_over_disjoint_filler() {
        let mut kb = KnowledgeBase::new();
        kb.add_disjointness(&[ConceptExpr::name("A"), ConceptExpr::name("B")])
            .unwrap();
        let r = kb.declare_role("r").unwrap();
        let a = kb.graph.lookup_concept("A").unwrap();
        let b = kb.graph.lookup_concept("B").unwrap();
        let ex = kb.graph.exists(r, a);
        let fa = kb.graph.forall(r, b);
        kb.finalize();
        assert!(oracle().disjoint(&kb.graph, &kb.roles, ex, fa));
    }

    #[test]
    fn two_on_a_functional_role_is_unsatisfiable() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        kb.roles.set_functional(r).unwrap();
        let two = kb.graph.min_card(r, 2, ConceptRef::TOP);
        kb.finalize();
        assert!(oracle().unsatisfiable(&kb.graph, &kb.roles, two));
    }

    #[test]
    fn demands_overflow_an_at_most_bound() {
        let mut kb = KnowledgeBase::new();
        kb.add_disjointness(&[ConceptExpr::name("A"), ConceptExpr::name("B")])
            .unwrap();
        let r = kb.declare_role("r").unwrap();
        let a = kb.graph.lookup_concept("A").unwrap();
        let b = kb.graph.lookup_concept("B").unwrap();
        let ex_a = kb.graph.exists(r, a);
        let ex_b = kb.graph.exists(r, b);
        let at_most_one = kb.graph.max_card(r, 1, ConceptRef::TOP);
        let both = kb.graph.and(vec![ex_a, ex_b, at_most_one]);
        kb.finalize();
        let mut o = oracle();
        assert!(o.unsatisfiable(&kb.graph, &kb.roles, both));
        // with compatible fillers the two successors can merge
        let ex_a2 = kb.graph.exists(r, a);
        let ex_top = kb.graph.exists(r, ConceptRef::TOP);
        let merged = kb.graph.and(vec![ex_a2, ex_top, at_most_one]);
        assert!(!o.unsatisfiable(&kb.graph, &kb.roles, merged));
    }

    #[test]
    fn distinct_literals_are_disjoint() {
        let mut kb = KnowledgeBase::new();
        let one = kb.graph.literal("1");
        let two = kb.graph.literal("2");
        kb.finalize();
        assert!(oracle().disjoint(&kb.graph, &kb.roles, one, two));
        assert!(!oracle().disjoint(&kb.graph, &kb.roles, one, one));
    }

    #[test]
    fn cyclic_definitions_fail_closed() {
        let mut kb = KnowledgeBase::new();
        kb.add_equivalence("A", &ConceptExpr::exists("r", ConceptExpr::name("A")))
            .unwrap();
        let a = kb.graph.lookup_concept("A").unwrap();
        let b = kb.declare_concept("B");
        kb.finalize();
        assert!(!oracle().disjoint(&kb.graph, &kb.roles, a, b));
    }
}
