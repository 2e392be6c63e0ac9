//! Canonical structural labeling of constraint-graph nodes.
//!
//! Two sub-expressions that differ only in the names of the atomic concepts
//! they are built from can still be told apart; two that are images of one
//! another under a graph automorphism cannot, and should hit the same cache
//! entries. The labeler assigns every node reachable from a root an
//! equivalence-class id such that structurally interchangeable nodes share
//! an id. Ids are drawn from an interner that lives as long as the labeler,
//! so the labelings of different roots stay comparable: equal ids mean
//! equal structure no matter which check produced them.

use crate::concept::ConceptRef;
use crate::graph::ConstraintGraph;
use std::collections::HashMap;

/// Depth guard for the height DFS. Expression DAGs are shallow; anything
/// deeper is labeled by raw index, which is sound (only weakens sharing).
const MAX_DEPTH: usize = 4096;

/// Interner size cap. Shapes past the cap stay unlabeled (class 0) and
/// fall back to node identity in the cache layer, which is sound.
const CLASS_LIMIT: usize = 1 << 24;

/// Computes structural equivalence classes for the sub-DAG under a root.
/// Interned class ids persist across `compute` calls; dropping them
/// invalidates every cache entry keyed on them.
#[derive(Debug)]
pub struct AutomorphismLabeler {
    classes: HashMap<String, u32>,
    next_class: u32,
}

impl Default for AutomorphismLabeler {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomorphismLabeler {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            next_class: 1,
        }
    }

    /// Forget every interned class. Ids issued earlier become meaningless,
    /// so caches keyed on them must be dropped at the same time.
    pub fn clear(&mut self) {
        self.classes.clear();
        self.next_class = 1;
    }

    fn intern(&mut self, key: String) -> u32 {
        if let Some(&c) = self.classes.get(&key) {
            return c;
        }
        if self.classes.len() >= CLASS_LIMIT {
            return 0;
        }
        let c = self.next_class;
        self.next_class += 1;
        self.classes.insert(key, c);
        c
    }

    /// Returns a dense table, indexed by node index, of equivalence-class
    /// ids. Unreachable nodes get 0; real classes start at 1.
    pub fn compute(&mut self, graph: &ConstraintGraph, root: ConceptRef) -> Vec<u32> {
        let n = graph.len();
        let mut heights: Vec<i32> = vec![-1; n];
        let mut order: Vec<usize> = Vec::new();
        if root.is_defined() {
            Self::heights(graph, root.index(), 0, &mut heights, &mut order);
        }

        // Bottom-up pass: leaves label by kind, inner nodes by kind plus the
        // multiset of signed child classes. Processing in ascending height
        // guarantees children are classed first. The key spells out the
        // whole shape recursively, so equal ids mean equal sub-DAGs even
        // across separate computations.
        order.sort_by_key(|&i| heights[i]);
        let mut up: Vec<u32> = vec![0; n];
        for &i in &order {
            let node = graph.node(i);
            let mut child_keys: Vec<(u32, bool)> = node
                .children
                .iter()
                .map(|c| (up[c.index()], c.is_negated()))
                .collect();
            child_keys.sort_unstable();
            // an unclassed child leaves the parent unclassed
            if child_keys.iter().any(|&(cls, _)| cls == 0) {
                continue;
            }
            // An atom carrying a definition or absorbed conditions behaves
            // like no other atom; pin it to its own class by name. Bare
            // atoms stay interchangeable, which is the whole point.
            let pinned = match node.kind {
                crate::concept::NodeKind::Concept(ref name)
                    if node.description.is_some()
                        || node.sub_description.is_defined()
                        || node.negative_description.is_defined() =>
                {
                    name.as_str()
                }
                crate::concept::NodeKind::Individual(ref name)
                | crate::concept::NodeKind::Literal(ref name)
                | crate::concept::NodeKind::Datatype(ref name) => name.as_str(),
                _ => "",
            };
            let key = format!(
                "{}:{}:{}:{}:{:?}",
                node.kind.tag(),
                node.kind.role().map(|r| r.0).unwrap_or(u32::MAX),
                node.kind.bound().unwrap_or(u32::MAX),
                pinned,
                child_keys
            );
            up[i] = self.intern(key);
        }

        // Top-down pass: refine with the multiset of (parent class, edge
        // sign) pairs, so two bottom-up-identical nodes in different
        // contexts, or referenced under different polarities, split apart.
        let mut parents: Vec<Vec<(usize, bool)>> = vec![Vec::new(); n];
        for &i in &order {
            for c in &graph.node(i).children {
                if heights[c.index()] >= 0 {
                    parents[c.index()].push((i, c.is_negated()));
                }
            }
        }
        order.sort_by_key(|&i| std::cmp::Reverse(heights[i]));
        let mut down: Vec<u32> = vec![0; n];
        for &i in &order {
            if up[i] == 0 {
                continue;
            }
            let mut parent_keys: Vec<(u32, bool)> =
                parents[i].iter().map(|&(p, neg)| (down[p], neg)).collect();
            parent_keys.sort_unstable();
            if parent_keys.iter().any(|&(cls, _)| cls == 0) {
                continue;
            }
            let key = format!("{}@{:?}", up[i], parent_keys);
            down[i] = self.intern(key);
        }
        down
    }

    fn heights(
        graph: &ConstraintGraph,
        index: usize,
        depth: usize,
        heights: &mut Vec<i32>,
        order: &mut Vec<usize>,
    ) -> i32 {
        if heights[index] >= 0 {
            return heights[index];
        }
        if depth >= MAX_DEPTH {
            heights[index] = 0;
            order.push(index);
            return 0;
        }
        // mark before recursing; structural children form a DAG but this
        // keeps the traversal safe even against a malformed graph
        heights[index] = 0;
        let children = graph.node(index).children.clone();
        let mut h = 0;
        for c in children {
            let ch = Self::heights(graph, c.index(), depth + 1, heights, order);
            h = h.max(ch + 1);
        }
        heights[index] = h;
        order.push(index);
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnowledgeBase;

    #[test]
    fn isomorphic_subtrees_share_a_class() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        // ∃r.A ⊓ ∃r.B : the two existentials are NOT interchangeable
        // (different atoms), but A and B as leaves of the same shape are.
        let ea = kb.graph.exists(r, a);
        let eb = kb.graph.exists(r, b);
        let root = kb.graph.and(vec![ea, eb]);

        let classes = AutomorphismLabeler::new().compute(&kb.graph, root);
        assert_eq!(classes[a.index()], classes[b.index()]);
        assert_eq!(classes[ea.index()], classes[eb.index()]);
        assert_ne!(classes[root.index()], classes[ea.index()]);
    }

    #[test]
    fn context_splits_bottom_up_twins() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        let s = kb.declare_role("s").unwrap();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        // A under ∃r, B under ∀s: same bottom-up leaf shape, different
        // parents, so the top-down pass separates them.
        let ea = kb.graph.exists(r, a);
        let fb = kb.graph.forall(s, b);
        let root = kb.graph.and(vec![ea, fb]);

        let classes = AutomorphismLabeler::new().compute(&kb.graph, root);
        assert_ne!(classes[a.index()], classes[b.index()]);
    }

    #[test]
    fn edge_polarity_splits_classes() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        // A ⊓ ¬B: A and B are bare atoms, but one is used positively and
        // the other negatively, so they must not share a class. Otherwise
        // the conflict set of A ⊓ ¬A would subset-match this one.
        let root = kb.graph.and(vec![a, b.neg()]);
        let classes = AutomorphismLabeler::new().compute(&kb.graph, root);
        assert_ne!(classes[a.index()], classes[b.index()]);
    }

    #[test]
    fn defined_atoms_are_pinned_to_their_name() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let c = kb.declare_concept("C");
        kb.graph.conjoin_sub_description(a, c);
        let root = kb.graph.and(vec![a, b]);
        let classes = AutomorphismLabeler::new().compute(&kb.graph, root);
        // A carries an absorbed condition, B does not; never interchangeable
        assert_ne!(classes[a.index()], classes[b.index()]);
    }

    #[test]
    fn class_ids_are_stable_across_roots() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        let s = kb.declare_role("s").unwrap();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let root_a = kb.graph.exists(r, a);
        let root_b = kb.graph.exists(r, b);
        let other = kb.graph.exists(s, b);

        // one interner across computations: isomorphic structure labeled
        // in separate runs shares ids, distinct structure never does
        let mut labeler = AutomorphismLabeler::new();
        let first = labeler.compute(&kb.graph, root_a);
        let second = labeler.compute(&kb.graph, root_b);
        assert_eq!(first[root_a.index()], second[root_b.index()]);
        assert_eq!(first[a.index()], second[b.index()]);
        let third = labeler.compute(&kb.graph, other);
        assert_ne!(first[root_a.index()], third[other.index()]);
        // recomputing a root reproduces its ids exactly
        let again = labeler.compute(&kb.graph, root_a);
        assert_eq!(first[root_a.index()], again[root_a.index()]);
        assert_eq!(first[a.index()], again[a.index()]);
    }

    #[test]
    fn unreachable_nodes_stay_unlabeled() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let classes = AutomorphismLabeler::new().compute(&kb.graph, a);
        assert_ne!(classes[a.index()], 0);
        assert_eq!(classes[b.index()], 0);
    }
}
