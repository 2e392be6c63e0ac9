//! The hash-consed constraint graph.
//!
//! Every axiom and sub-expression of the knowledge base is represented as a
//! node in one shared DAG. Content-addressed interning guarantees that two
//! structurally identical sub-expressions (same kind, role and multiset of
//! signed children) share a single node, which is what makes the
//! satisfiability caches and the automorphism labeler effective. Insertion
//! also probes the structural dual (AND↔OR over negated children,
//! FORALL↔EXISTS with negated filler) and returns the negated reference to
//! an existing dual node instead of allocating a twin.

use crate::absorb;
use crate::concept::{ConceptRef, ConstraintNode, NodeKind};
use crate::roles::{RoleHierarchy, RoleId};
use crate::StrixCoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structural interning key: kind tag, role, bound, name, sorted signed
/// children. Two nodes with equal keys are the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    tag: char,
    role: u32,
    bound: u32,
    name: String,
    children: Vec<i32>,
}

impl NodeKey {
    fn of(kind: &NodeKind, children: &[ConceptRef]) -> Self {
        let mut child_keys: Vec<i32> = children.iter().map(|c| c.0).collect();
        // AND/OR children form a multiset; quantified nodes have one child.
        if matches!(kind, NodeKind::And | NodeKind::Or) {
            child_keys.sort_unstable();
        }
        let name = match kind {
            NodeKind::Concept(n)
            | NodeKind::Individual(n)
            | NodeKind::Literal(n)
            | NodeKind::Datatype(n) => n.clone(),
            _ => String::new(),
        };
        NodeKey {
            tag: kind.tag(),
            role: kind.role().map(|r| r.0).unwrap_or(u32::MAX),
            bound: kind.bound().unwrap_or(u32::MAX),
            name,
            children: child_keys,
        }
    }
}

/// Arena of constraint nodes plus the interner and the meta-constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintGraph {
    nodes: Vec<ConstraintNode>,
    #[serde(skip)]
    interner: HashMap<NodeKey, u32>,
    concepts_by_name: HashMap<String, ConceptRef>,
    /// Conjunction of all inclusion axioms that absorption could not attach
    /// to an atomic concept; applied to every individual. `UNDEF` when no
    /// residual axioms exist.
    meta: ConceptRef,
}

impl Default for ConstraintGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraph {
    pub fn new() -> Self {
        // Index 0 is the reserved undefined slot; index 1 is TOP.
        let mut graph = Self {
            nodes: Vec::with_capacity(16),
            interner: HashMap::new(),
            concepts_by_name: HashMap::new(),
            meta: ConceptRef::UNDEF,
        };
        graph.nodes.push(ConstraintNode::new(NodeKind::Top, Vec::new()));
        let top = ConstraintNode::new(NodeKind::Top, Vec::new());
        graph.interner.insert(NodeKey::of(&top.kind, &[]), 1);
        graph.nodes.push(top);
        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn node(&self, index: usize) -> &ConstraintNode {
        &self.nodes[index]
    }

    /// Node addressed by a reference, ignoring its sign.
    pub fn node_of(&self, c: ConceptRef) -> &ConstraintNode {
        &self.nodes[c.index()]
    }

    /// The residual-axiom conjunction applied to every individual.
    pub fn meta_constraint(&self) -> ConceptRef {
        self.meta
    }

    pub fn lookup_concept(&self, name: &str) -> Option<ConceptRef> {
        self.concepts_by_name.get(name).copied()
    }

    fn insert(&mut self, node: ConstraintNode) -> ConceptRef {
        let key = NodeKey::of(&node.kind, &node.children);
        if let Some(&idx) = self.interner.get(&key) {
            return ConceptRef(idx as i32);
        }
        if let Some(dual) = self.dual_key(&node) {
            if let Some(&idx) = self.interner.get(&dual) {
                return ConceptRef(idx as i32).neg();
            }
        }
        let idx = self.nodes.len() as u32;
        self.interner.insert(key, idx);
        self.nodes.push(node);
        ConceptRef(idx as i32)
    }

    /// Key of the structurally dual node: `A ⊓ B` vs `¬(¬A ⊔ ¬B)`,
    /// `∀R.C` vs `¬∃R.¬C`. Collapsing the pair halves the arena and lets
    /// both polarities hit the same cache entries.
    fn dual_key(&self, node: &ConstraintNode) -> Option<NodeKey> {
        let (kind, children) = match &node.kind {
            NodeKind::And => (NodeKind::Or, neg_all(&node.children)),
            NodeKind::Or => (NodeKind::And, neg_all(&node.children)),
            NodeKind::Exists(r) => (NodeKind::Forall(*r), neg_all(&node.children)),
            NodeKind::Forall(r) => (NodeKind::Exists(*r), neg_all(&node.children)),
            _ => return None,
        };
        Some(NodeKey::of(&kind, &children))
    }

    /// Intern a named atomic concept.
    pub fn concept(&mut self, name: &str) -> ConceptRef {
        if let Some(c) = self.concepts_by_name.get(name) {
            return *c;
        }
        let c = self.insert(ConstraintNode::new(
            NodeKind::Concept(name.to_string()),
            Vec::new(),
        ));
        self.concepts_by_name.insert(name.to_string(), c);
        c
    }

    pub fn individual(&mut self, name: &str) -> ConceptRef {
        self.insert(ConstraintNode::new(
            NodeKind::Individual(name.to_string()),
            Vec::new(),
        ))
    }

    pub fn literal(&mut self, value: &str) -> ConceptRef {
        self.insert(ConstraintNode::new(
            NodeKind::Literal(value.to_string()),
            Vec::new(),
        ))
    }

    pub fn datatype(&mut self, name: &str) -> ConceptRef {
        self.insert(ConstraintNode::new(
            NodeKind::Datatype(name.to_string()),
            Vec::new(),
        ))
    }

    /// Intern a conjunction, normalizing as it goes: nested conjunctions are
    /// flattened, duplicates dropped, `⊤` conjuncts removed, and a
    /// complementary pair or `⊥` conjunct collapses the whole node to `⊥`.
    pub fn and(&mut self, children: Vec<ConceptRef>) -> ConceptRef {
        let mut flat: Vec<ConceptRef> = Vec::with_capacity(children.len());
        let mut queue = children;
        queue.reverse();
        while let Some(c) = queue.pop() {
            if c == ConceptRef::TOP {
                continue;
            }
            if c == ConceptRef::BOTTOM {
                return ConceptRef::BOTTOM;
            }
            let node = self.node_of(c);
            let splice = match node.kind {
                NodeKind::And if !c.is_negated() => Some(node.children.clone()),
                NodeKind::Or if c.is_negated() => Some(neg_all(&node.children)),
                _ => None,
            };
            match splice {
                Some(inner) => {
                    for i in inner.into_iter().rev() {
                        queue.push(i);
                    }
                }
                None => flat.push(c),
            }
        }
        flat.sort_unstable();
        flat.dedup();
        for c in &flat {
            if flat.binary_search(&c.neg()).is_ok() {
                return ConceptRef::BOTTOM;
            }
        }
        match flat.len() {
            0 => ConceptRef::TOP,
            1 => flat[0],
            _ => self.insert(ConstraintNode::new(NodeKind::And, flat)),
        }
    }

    /// Intern a disjunction; same normalization as `and`, dualized.
    pub fn or(&mut self, children: Vec<ConceptRef>) -> ConceptRef {
        let mut flat: Vec<ConceptRef> = Vec::with_capacity(children.len());
        let mut queue = children;
        queue.reverse();
        while let Some(c) = queue.pop() {
            if c == ConceptRef::BOTTOM {
                continue;
            }
            if c == ConceptRef::TOP {
                return ConceptRef::TOP;
            }
            let node = self.node_of(c);
            let splice = match node.kind {
                NodeKind::Or if !c.is_negated() => Some(node.children.clone()),
                NodeKind::And if c.is_negated() => Some(neg_all(&node.children)),
                _ => None,
            };
            match splice {
                Some(inner) => {
                    for i in inner.into_iter().rev() {
                        queue.push(i);
                    }
                }
                None => flat.push(c),
            }
        }
        flat.sort_unstable();
        flat.dedup();
        for c in &flat {
            if flat.binary_search(&c.neg()).is_ok() {
                return ConceptRef::TOP;
            }
        }
        match flat.len() {
            0 => ConceptRef::BOTTOM,
            1 => flat[0],
            _ => self.insert(ConstraintNode::new(NodeKind::Or, flat)),
        }
    }

    pub fn exists(&mut self, role: RoleId, filler: ConceptRef) -> ConceptRef {
        if filler == ConceptRef::BOTTOM {
            return ConceptRef::BOTTOM;
        }
        self.insert(ConstraintNode::new(NodeKind::Exists(role), vec![filler]))
    }

    pub fn forall(&mut self, role: RoleId, filler: ConceptRef) -> ConceptRef {
        if filler == ConceptRef::TOP {
            return ConceptRef::TOP;
        }
        self.insert(ConstraintNode::new(NodeKind::Forall(role), vec![filler]))
    }

    pub fn min_card(&mut self, role: RoleId, n: u32, filler: ConceptRef) -> ConceptRef {
        if n == 0 {
            return ConceptRef::TOP;
        }
        if filler == ConceptRef::BOTTOM {
            return ConceptRef::BOTTOM;
        }
        self.insert(ConstraintNode::new(NodeKind::MinCard(role, n), vec![filler]))
    }

    pub fn max_card(&mut self, role: RoleId, n: u32, filler: ConceptRef) -> ConceptRef {
        if filler == ConceptRef::BOTTOM {
            return ConceptRef::TOP;
        }
        self.insert(ConstraintNode::new(NodeKind::MaxCard(role, n), vec![filler]))
    }

    /// Exact restrictions are normalized to `≥n R.C ⊓ ≤n R.C` at interning,
    /// so the engine only ever sees the two cardinality halves.
    pub fn exact_card(&mut self, role: RoleId, n: u32, filler: ConceptRef) -> ConceptRef {
        if n == 0 {
            // =0 R.C is just ≤0 R.C
            return self.max_card(role, 0, filler);
        }
        let min = self.min_card(role, n, filler);
        let max = self.max_card(role, n, filler);
        self.and(vec![min, max])
    }

    pub fn has_self(&mut self, role: RoleId) -> ConceptRef {
        self.insert(ConstraintNode::new(NodeKind::HasSelf(role), Vec::new()))
    }

    /// Attach an equivalence definition to a named concept. Absorption-time
    /// back-link; the only mutation nodes see after creation.
    pub(crate) fn set_description(
        &mut self,
        atom: ConceptRef,
        description: ConceptRef,
    ) -> Result<(), StrixCoreError> {
        let idx = atom.index();
        if !self.nodes[idx].is_atomic_concept() {
            return Err(StrixCoreError::MalformedExpression(
                "definition target is not an atomic concept".into(),
            ));
        }
        if self.nodes[idx].description.is_some() {
            let name = match &self.nodes[idx].kind {
                NodeKind::Concept(n) => n.clone(),
                _ => unreachable!(),
            };
            return Err(StrixCoreError::DuplicateDefinition(name));
        }
        self.nodes[idx].description = Some(description);
        Ok(())
    }

    /// AND-accumulate an absorbed necessary condition onto a named concept.
    pub(crate) fn conjoin_sub_description(&mut self, atom: ConceptRef, cond: ConceptRef) {
        let idx = atom.index();
        let old = self.nodes[idx].sub_description;
        let merged = if old.is_defined() {
            self.and(vec![old, cond])
        } else {
            cond
        };
        self.nodes[idx].sub_description = merged;
    }

    /// AND-accumulate a condition inherited through a negated inclusion.
    pub(crate) fn conjoin_negative_description(&mut self, atom: ConceptRef, cond: ConceptRef) {
        let idx = atom.index();
        let old = self.nodes[idx].negative_description;
        let merged = if old.is_defined() {
            self.and(vec![old, cond])
        } else {
            cond
        };
        self.nodes[idx].negative_description = merged;
    }

    /// AND-accumulate a residual axiom into the meta-constraint.
    pub(crate) fn conjoin_meta(&mut self, residual: ConceptRef) {
        let merged = if self.meta.is_defined() {
            self.and(vec![self.meta, residual])
        } else {
            residual
        };
        self.meta = merged;
    }
}

fn neg_all(children: &[ConceptRef]) -> Vec<ConceptRef> {
    children.iter().map(|c| c.neg()).collect()
}

/// Source-level concept expression, the input shape of knowledge-base load.
/// Interning turns it into `ConceptRef`s; it never reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConceptExpr {
    Top,
    Bottom,
    Name(String),
    Not(Box<ConceptExpr>),
    And(Vec<ConceptExpr>),
    Or(Vec<ConceptExpr>),
    Exists(String, Box<ConceptExpr>),
    Forall(String, Box<ConceptExpr>),
    AtLeast(u32, String, Option<Box<ConceptExpr>>),
    AtMost(u32, String, Option<Box<ConceptExpr>>),
    Exactly(u32, String, Option<Box<ConceptExpr>>),
    HasSelf(String),
    Individual(String),
    Literal(String),
    Datatype(String),
}

impl ConceptExpr {
    pub fn name(n: &str) -> Self {
        ConceptExpr::Name(n.to_string())
    }

    pub fn not(c: ConceptExpr) -> Self {
        ConceptExpr::Not(Box::new(c))
    }

    pub fn and(children: Vec<ConceptExpr>) -> Self {
        ConceptExpr::And(children)
    }

    pub fn or(children: Vec<ConceptExpr>) -> Self {
        ConceptExpr::Or(children)
    }

    pub fn exists(role: &str, filler: ConceptExpr) -> Self {
        ConceptExpr::Exists(role.to_string(), Box::new(filler))
    }

    pub fn forall(role: &str, filler: ConceptExpr) -> Self {
        ConceptExpr::Forall(role.to_string(), Box::new(filler))
    }

    pub fn at_least(n: u32, role: &str, filler: Option<ConceptExpr>) -> Self {
        ConceptExpr::AtLeast(n, role.to_string(), filler.map(Box::new))
    }

    pub fn at_most(n: u32, role: &str, filler: Option<ConceptExpr>) -> Self {
        ConceptExpr::AtMost(n, role.to_string(), filler.map(Box::new))
    }

    pub fn exactly(n: u32, role: &str, filler: Option<ConceptExpr>) -> Self {
        ConceptExpr::Exactly(n, role.to_string(), filler.map(Box::new))
    }
}

/// An ABox role assertion between two named individuals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssertion {
    pub subject: String,
    pub role: RoleId,
    pub object: String,
}

/// The frozen input of the tableau engine: constraint graph, role
/// hierarchy, and the individual assertions loaded as forest roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub graph: ConstraintGraph,
    pub roles: RoleHierarchy,
    /// `individual : concept` assertions.
    pub assertions: Vec<(String, ConceptRef)>,
    /// `(subject, role, object)` assertions.
    pub role_assertions: Vec<RoleAssertion>,
    /// Pairs of individuals that may never be merged.
    pub distinct: Vec<(String, String)>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            graph: ConstraintGraph::new(),
            roles: RoleHierarchy::new(),
            assertions: Vec::new(),
            role_assertions: Vec::new(),
            distinct: Vec::new(),
        }
    }

    pub fn declare_concept(&mut self, name: &str) -> ConceptRef {
        self.graph.concept(name)
    }

    pub fn declare_role(&mut self, name: &str) -> Result<RoleId, StrixCoreError> {
        self.roles.declare(name)
    }

    /// Intern a source expression into the shared graph.
    pub fn intern(&mut self, expr: &ConceptExpr) -> Result<ConceptRef, StrixCoreError> {
        Ok(match expr {
            ConceptExpr::Top => ConceptRef::TOP,
            ConceptExpr::Bottom => ConceptRef::BOTTOM,
            ConceptExpr::Name(n) => self.graph.concept(n),
            ConceptExpr::Not(inner) => self.intern(inner)?.neg(),
            ConceptExpr::And(children) => {
                let refs = children
                    .iter()
                    .map(|c| self.intern(c))
                    .collect::<Result<Vec<_>, _>>()?;
                self.graph.and(refs)
            }
            ConceptExpr::Or(children) => {
                let refs = children
                    .iter()
                    .map(|c| self.intern(c))
                    .collect::<Result<Vec<_>, _>>()?;
                self.graph.or(refs)
            }
            ConceptExpr::Exists(role, filler) => {
                let r = self.roles.declare(role)?;
                let f = self.intern(filler)?;
                self.graph.exists(r, f)
            }
            ConceptExpr::Forall(role, filler) => {
                let r = self.roles.declare(role)?;
                let f = self.intern(filler)?;
                self.graph.forall(r, f)
            }
            ConceptExpr::AtLeast(n, role, filler) => {
                let r = self.roles.declare(role)?;
                let f = match filler {
                    Some(f) => self.intern(f)?,
                    None => ConceptRef::TOP,
                };
                self.graph.min_card(r, *n, f)
            }
            ConceptExpr::AtMost(n, role, filler) => {
                let r = self.roles.declare(role)?;
                let f = match filler {
                    Some(f) => self.intern(f)?,
                    None => ConceptRef::TOP,
                };
                self.graph.max_card(r, *n, f)
            }
            ConceptExpr::Exactly(n, role, filler) => {
                let r = self.roles.declare(role)?;
                let f = match filler {
                    Some(f) => self.intern(f)?,
                    None => ConceptRef::TOP,
                };
                self.graph.exact_card(r, *n, f)
            }
            ConceptExpr::HasSelf(role) => {
                let r = self.roles.declare(role)?;
                self.graph.has_self(r)
            }
            ConceptExpr::Individual(name) => self.graph.individual(name),
            ConceptExpr::Literal(value) => self.graph.literal(value),
            ConceptExpr::Datatype(name) => self.graph.datatype(name),
        })
    }

    /// `name ≡ definition`. Falls back to a pair of inclusions when the
    /// concept is already defined.
    pub fn add_equivalence(
        &mut self,
        name: &str,
        definition: &ConceptExpr,
    ) -> Result<(), StrixCoreError> {
        let atom = self.graph.concept(name);
        let def = self.intern(definition)?;
        match self.graph.set_description(atom, def) {
            Ok(()) => Ok(()),
            Err(StrixCoreError::DuplicateDefinition(_)) => {
                absorb::absorb_inclusion(&mut self.graph, atom, def)?;
                absorb::absorb_inclusion(&mut self.graph, def, atom)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// General inclusion `lhs ⊑ rhs`, routed through absorption.
    pub fn add_inclusion(
        &mut self,
        lhs: &ConceptExpr,
        rhs: &ConceptExpr,
    ) -> Result<(), StrixCoreError> {
        let l = self.intern(lhs)?;
        let r = self.intern(rhs)?;
        absorb::absorb_inclusion(&mut self.graph, l, r)
    }

    /// Pairwise disjointness: every pair `(Cᵢ, Cⱼ)` yields `Cᵢ ⊑ ¬Cⱼ`.
    pub fn add_disjointness(&mut self, exprs: &[ConceptExpr]) -> Result<(), StrixCoreError> {
        let refs = exprs
            .iter()
            .map(|e| self.intern(e))
            .collect::<Result<Vec<_>, _>>()?;
        for (i, &a) in refs.iter().enumerate() {
            for &b in &refs[i + 1..] {
                absorb::absorb_inclusion(&mut self.graph, a, b.neg())?;
            }
        }
        Ok(())
    }

    pub fn assert_instance(
        &mut self,
        individual: &str,
        expr: &ConceptExpr,
    ) -> Result<(), StrixCoreError> {
        let c = self.intern(expr)?;
        self.assertions.push((individual.to_string(), c));
        Ok(())
    }

    pub fn assert_role(
        &mut self,
        subject: &str,
        role: &str,
        object: &str,
    ) -> Result<(), StrixCoreError> {
        let r = self.roles.declare(role)?;
        self.role_assertions.push(RoleAssertion {
            subject: subject.to_string(),
            role: r,
            object: object.to_string(),
        });
        Ok(())
    }

    pub fn assert_distinct(&mut self, a: &str, b: &str) {
        self.distinct.push((a.to_string(), b.to_string()));
    }

    /// Freeze the knowledge base. Must run before any check.
    pub fn finalize(&mut self) {
        self.roles.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_expressions_share_one_node() {
        let mut kb = KnowledgeBase::new();
        let e = ConceptExpr::exists(
            "r",
            ConceptExpr::and(vec![ConceptExpr::name("A"), ConceptExpr::name("B")]),
        );
        let c1 = kb.intern(&e).unwrap();
        let c2 = kb.intern(&e).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn dual_nodes_collapse_to_one_index() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        let and_ab = kb.graph.and(vec![a, b]);
        let or_neg = kb.graph.or(vec![a.neg(), b.neg()]);
        assert_eq!(or_neg, and_ab.neg());
    }

    #[test]
    fn forall_is_the_dual_of_exists() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        let a = kb.declare_concept("A");
        let ex = kb.graph.exists(r, a);
        let fa = kb.graph.forall(r, a.neg());
        assert_eq!(fa, ex.neg());
    }

    #[test]
    fn conjunction_normalization() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        let b = kb.declare_concept("B");
        // flattening and dedup
        let nested = kb.graph.and(vec![a, b]);
        let flat = kb.graph.and(vec![nested, a]);
        assert_eq!(flat, nested);
        // complement pair collapses to BOTTOM
        assert_eq!(kb.graph.and(vec![a, a.neg()]), ConceptRef::BOTTOM);
        // TOP unit
        assert_eq!(kb.graph.and(vec![a, ConceptRef::TOP]), a);
        assert_eq!(kb.graph.and(vec![]), ConceptRef::TOP);
    }

    #[test]
    fn disjunction_normalization() {
        let mut kb = KnowledgeBase::new();
        let a = kb.declare_concept("A");
        assert_eq!(kb.graph.or(vec![a, a.neg()]), ConceptRef::TOP);
        assert_eq!(kb.graph.or(vec![a, ConceptRef::BOTTOM]), a);
        assert_eq!(kb.graph.or(vec![]), ConceptRef::BOTTOM);
    }

    #[test]
    fn zero_min_cardinality_is_trivial() {
        let mut kb = KnowledgeBase::new();
        let r = kb.declare_role("r").unwrap();
        assert_eq!(kb.graph.min_card(r, 0, ConceptRef::TOP), ConceptRef::TOP);
    }

    #[test]
    fn duplicate_definition_degrades_to_inclusions() {
        let mut kb = KnowledgeBase::new();
        kb.add_equivalence("A", &ConceptExpr::name("B")).unwrap();
        // second definition must not fail, it becomes two inclusions
        kb.add_equivalence("A", &ConceptExpr::name("C")).unwrap();
        let a = kb.graph.lookup_concept("A").unwrap();
        let node = kb.graph.node_of(a);
        assert!(node.description.is_some());
        assert!(node.sub_description.is_defined());
    }
}
