//! The tableau expansion engine.
//!
//! One engine instance runs one check: it owns the interpretation forest
//! and the choice-point stack, and borrows the frozen constraint graph,
//! the role hierarchy, the oracle and the model cache from the reasoner.
//! Contradictions are not errors; every rule returns its conflict as a
//! dependency set and the driver turns that into a backjump. Only budget
//! exhaustion surfaces as an error, leaving the outcome unknown.

use crate::cache::{ModelCache, ModelSignature};
use crate::config::ReasonerConfig;
use crate::forest::{AddLabel, CreationMarker, Forest, NodeId, Obligation, UniversalObligation};
use crate::oracle::DisjointnessOracle;
use crate::stack::{ChoiceAlternatives, ChoiceStack};
use crate::view::{is_cardinality, view, View};
use crate::StrixDlError;
use itertools::Itertools;
use smallvec::{smallvec, SmallVec};
use std::time::Instant;
use strix_core::{
    ConceptRef, ConstraintGraph, DependencySet, NodeKind, RoleHierarchy, RoleId,
};
use tracing::{debug, trace};

/// Why a rule application stopped.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// Logical contradiction; the set names the choice points involved.
    Clash(DependencySet),
    /// Time or node budget exhausted; aborts the whole check.
    Budget(StrixDlError),
}

type RuleResult = Result<(), Interrupt>;

pub(crate) struct TableauEngine<'a> {
    graph: &'a ConstraintGraph,
    roles: &'a RoleHierarchy,
    config: &'a ReasonerConfig,
    oracle: &'a mut DisjointnessOracle,
    model_cache: &'a mut ModelCache,
    /// Automorphism classes of the checked root's sub-DAG, for cache keys.
    classes: &'a [u32],
    forest: Forest,
    stack: ChoiceStack,
    deadline: Option<Instant>,
    /// Root pairs that may never merge (ABox distinctness).
    distinct: Vec<(NodeId, NodeId)>,
}

impl<'a> TableauEngine<'a> {
    pub(crate) fn new(
        graph: &'a ConstraintGraph,
        roles: &'a RoleHierarchy,
        config: &'a ReasonerConfig,
        oracle: &'a mut DisjointnessOracle,
        model_cache: &'a mut ModelCache,
        classes: &'a [u32],
    ) -> Self {
        let deadline = config.time_budget.map(|b| Instant::now() + b);
        Self {
            graph,
            roles,
            config,
            oracle,
            model_cache,
            classes,
            forest: Forest::new(),
            stack: ChoiceStack::new(),
            deadline,
            distinct: Vec::new(),
        }
    }

    /// Create a root individual carrying the residual-axiom constraint.
    pub(crate) fn add_root(&mut self) -> Result<NodeId, Interrupt> {
        let id = self.forest.add_root();
        let meta = self.graph.meta_constraint();
        if meta.is_defined() {
            self.assert_label(id, meta, DependencySet::new(), 0)?;
        }
        Ok(id)
    }

    /// Unconditional root obligation (the checked concept, ABox facts).
    pub(crate) fn seed(&mut self, id: NodeId, concept: ConceptRef) -> RuleResult {
        self.assert_label(id, concept, DependencySet::new(), 0)
    }

    /// Unconditional edge between two roots (ABox role assertion).
    pub(crate) fn seed_edge(&mut self, from: NodeId, to: NodeId, role: RoleId) -> RuleResult {
        self.connect(from, to, smallvec![role], DependencySet::new(), 0)
    }

    pub(crate) fn add_distinct(&mut self, a: NodeId, b: NodeId) {
        self.distinct.push((a, b));
    }

    /// The search loop: sweep until a full pass makes no progress (SAT) or
    /// the conflict dependency set empties out (UNSAT).
    pub(crate) fn run(&mut self) -> Result<bool, StrixDlError> {
        let root_signature = if self.config.use_model_cache && self.forest.len() == 1 {
            Some(self.signature_of(NodeId(0)))
        } else {
            None
        };
        loop {
            match self.sweep() {
                Ok(true) => {}
                Ok(false) => {
                    self.record_model();
                    return Ok(true);
                }
                Err(Interrupt::Budget(e)) => return Err(e),
                Err(Interrupt::Clash(deps)) => match self.backjump(deps)? {
                    true => {}
                    false => {
                        if let Some(sig) = root_signature {
                            self.model_cache.record(sig, false);
                        }
                        return Ok(false);
                    }
                },
            }
        }
    }

    fn check_budget(&self) -> RuleResult {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Interrupt::Budget(StrixDlError::TimeBudgetExceeded));
            }
        }
        Ok(())
    }

    /// One pass over the forest, draining obligation queues. Returns
    /// whether any rule fired.
    fn sweep(&mut self) -> Result<bool, Interrupt> {
        self.check_budget()?;
        let mut progress = false;
        let mut i = 0;
        while i < self.forest.len() {
            let id = NodeId(i as u32);
            i += 1;
            if !self.expandable(id) {
                continue;
            }
            loop {
                let node = self.forest.node_mut(id);
                if node.todo_cursor >= node.todo.len() {
                    break;
                }
                let ob = node.todo[node.todo_cursor].clone();
                node.todo_cursor += 1;
                self.process(id, ob)?;
                progress = true;
            }
            let node = self.forest.node(id);
            if node.card_cursor >= node.card.len() {
                continue;
            }
            // data values take no role successors: at-least bounds clash,
            // at-most bounds hold vacuously
            if node.data_vertex {
                self.data_vertex_bounds(id)?;
                progress = true;
                continue;
            }
            // generating rules are pending: blocking and cache lookups
            // apply before any successor is built
            if let Some(blocker) = self.find_blocker(id) {
                trace!(node = id.0, blocker = blocker.0, "blocked");
                self.forest.node_mut(id).blocked_by = Some(blocker);
                progress = true;
                continue;
            }
            if self.config.use_model_cache && self.forest.node(id).edges.is_empty() {
                let sig = self.signature_of(id);
                match self.model_cache.lookup(&sig) {
                    Some(true) => {
                        trace!(node = id.0, "model cache hit");
                        let node = self.forest.node_mut(id);
                        node.cached = true;
                        // the cached model answers the pending bounds
                        node.card_cursor = node.card.len();
                        progress = true;
                        continue;
                    }
                    Some(false) => {
                        return Err(Interrupt::Clash(self.all_deps_of(id)));
                    }
                    None => {}
                }
            }
            loop {
                let node = self.forest.node_mut(id);
                if node.card_cursor >= node.card.len() {
                    break;
                }
                let ob = node.card[node.card_cursor].clone();
                node.card_cursor += 1;
                self.process(id, ob)?;
                progress = true;
            }
        }
        Ok(progress)
    }

    /// Whether this individual takes part in the current sweep. Clears a
    /// blocking or cache mark that new facts have invalidated.
    fn expandable(&mut self, id: NodeId) -> bool {
        let node = self.forest.node(id);
        if node.skip || node.merged_into.is_some() {
            return false;
        }
        if let Some(parent) = node.parent {
            if !self.forest.is_active(parent) {
                return false;
            }
        }
        if let Some(blocker) = node.blocked_by {
            if self.blocking_holds(id, blocker) {
                return false;
            }
            self.forest.node_mut(id).blocked_by = None;
        }
        if self.forest.node(id).cached {
            if !self.forest.node(id).has_pending() {
                return false;
            }
            self.forest.node_mut(id).cached = false;
        }
        true
    }

    // ----- expansion rules ---------------------------------------------

    fn process(&mut self, id: NodeId, ob: Obligation) -> RuleResult {
        self.check_budget()?;
        let Obligation {
            concept,
            deps,
            level,
        } = ob;
        match view(self.graph, concept) {
            View::Top => Ok(()),
            View::Bottom => Err(Interrupt::Clash(deps)),
            View::And(xs) => {
                for x in xs {
                    self.assert_label(id, x, deps.clone(), level)?;
                }
                Ok(())
            }
            View::Or(xs) => self.or_rule(id, &xs, deps, level),
            View::Forall(role, filler) => self.apply_universal(id, role, filler, deps, level),
            View::MinCard(role, n, filler) => {
                self.min_rule(id, concept, role, n, filler, deps, level)
            }
            View::MaxCard(role, n, filler) => self.max_rule(id, role, n, filler, deps, level),
            View::Atom { index, negated } => self.unfold(id, index, negated, deps, level),
            View::HasSelf(role, false) => self.self_loop(id, role, deps, level),
            View::HasSelf(role, true) => self.no_self_loop(id, role, deps),
            View::Nominal { .. } => Ok(()),
            View::Data { .. } => Ok(()),
        }
    }

    /// Lazy unfolding: pull the asserted atom's definition and absorbed
    /// conditions into this individual's obligations.
    fn unfold(
        &mut self,
        id: NodeId,
        index: usize,
        negated: bool,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let node = self.graph.node(index);
        if let Some(def) = node.description {
            let unfolded = if negated { def.neg() } else { def };
            self.assert_label(id, unfolded, deps.clone(), level)?;
        }
        if !negated && node.sub_description.is_defined() {
            self.assert_label(id, node.sub_description, deps.clone(), level)?;
        }
        if negated && node.negative_description.is_defined() {
            self.assert_label(id, node.negative_description, deps, level)?;
        }
        Ok(())
    }

    /// OR-rule with oracle pruning: disjuncts refuted by present labels are
    /// dropped before a choice point is created, their refuters' deps
    /// folded into the branch context. A single survivor is deterministic.
    fn or_rule(
        &mut self,
        id: NodeId,
        disjuncts: &[ConceptRef],
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let node = self.forest.node(id);
        if disjuncts.iter().any(|&d| node.has_label(d)) {
            return Ok(());
        }
        let labels: Vec<(ConceptRef, DependencySet)> = node
            .labels()
            .map(|(c, d, _)| (*c, d.clone()))
            .collect();
        let mut context = DependencySet::new();
        let mut live: Vec<ConceptRef> = Vec::new();
        'disjunct: for &d in disjuncts {
            for (label, ldeps) in &labels {
                if *label == d.neg() {
                    context.union(ldeps);
                    continue 'disjunct;
                }
                if self.config.use_oracle
                    && self.oracle.disjoint(self.graph, self.roles, d, *label)
                {
                    context.union(ldeps);
                    continue 'disjunct;
                }
            }
            live.push(d);
        }
        let base = deps.unioned(&context);
        match live.len() {
            0 => Err(Interrupt::Clash(base)),
            1 => self.assert_label(id, live[0], base, level),
            _ => self.push_and_apply(id, ChoiceAlternatives::Disjuncts(live), base),
        }
    }

    /// ≥n R.C: reuse successors already carrying the filler, shortcut
    /// through functional roles, then create the missing individuals.
    fn min_rule(
        &mut self,
        id: NodeId,
        origin: ConceptRef,
        role: RoleId,
        n: u32,
        filler: ConceptRef,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let existing = self.matching_successors(id, role, filler);
        if existing.len() >= n as usize {
            return Ok(());
        }
        if let Some(functional) = self.functional_super(role) {
            if n >= 2 {
                return Err(Interrupt::Clash(deps));
            }
            // the successor over a functional role is unique: route the
            // filler into it instead of creating a twin
            if let Some((target, edeps)) = self.matching_successors(id, functional, ConceptRef::TOP)
                .into_iter()
                .next()
            {
                let d = deps.unioned(&edeps);
                self.connect(id, target, smallvec![role], d.clone(), level)?;
                return self.assert_label(target, filler, d, level);
            }
        }
        let missing = n as usize - existing.len();
        for _ in 0..missing {
            if self.forest.len() >= self.config.max_nodes {
                return Err(Interrupt::Budget(StrixDlError::NodeLimitExceeded(
                    self.config.max_nodes,
                )));
            }
            let child = self.forest.add_child(
                id,
                smallvec![role],
                deps.clone(),
                CreationMarker {
                    node: id,
                    concept: origin,
                    deps: DependencySet::new(),
                },
            );
            trace!(parent = id.0, child = child.0, "successor created");
            let meta = self.graph.meta_constraint();
            if meta.is_defined() {
                self.assert_label(child, meta, DependencySet::new(), level)?;
            }
            self.assert_label(child, filler, deps.clone(), level)?;
            self.edge_obligations(id, child, &[role], deps.clone(), level)?;
        }
        // at-most bounds already checked must see the new successors
        self.forest.node_mut(id).card_cursor = 0;
        Ok(())
    }

    /// ≤n R.C: split undecided successors over the filler, then merge
    /// counted successors until the bound holds or no legal pair remains.
    fn max_rule(
        &mut self,
        id: NodeId,
        role: RoleId,
        bound: u32,
        filler: ConceptRef,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        loop {
            self.check_budget()?;
            let candidates = self.matching_successors(id, role, ConceptRef::TOP);
            if filler != ConceptRef::TOP {
                let undecided = candidates.iter().find(|(y, _)| {
                    let yn = self.forest.node(*y);
                    !yn.has_label(filler) && !yn.has_label(filler.neg())
                });
                if let Some((target, edeps)) = undecided {
                    let (target, edeps) = (*target, edeps.clone());
                    let base = deps.clone().unioned(&edeps);
                    self.push_and_apply(
                        id,
                        ChoiceAlternatives::FillerSplit {
                            target,
                            filler,
                            tried_positive: false,
                        },
                        base,
                    )?;
                    continue;
                }
            }
            let counted: Vec<(NodeId, DependencySet)> = candidates
                .into_iter()
                .filter(|(y, _)| {
                    filler == ConceptRef::TOP || self.forest.node(*y).has_label(filler)
                })
                .collect();
            if counted.len() <= bound as usize {
                return Ok(());
            }
            let mut base = deps.clone();
            for (y, edeps) in &counted {
                base.union(edeps);
                if filler != ConceptRef::TOP {
                    if let Some(ldeps) = self.forest.node(*y).label_deps(filler) {
                        base.union(ldeps);
                    }
                }
            }
            let (pairs, disqualified) = self.legal_merge_pairs(&counted);
            base.union(&disqualified);
            if pairs.is_empty() {
                return Err(Interrupt::Clash(base));
            }
            self.push_and_apply(id, ChoiceAlternatives::MergePairs(pairs), base)?;
        }
    }

    /// Pairs of counted successors a merge may identify. Also returns the
    /// dependencies of the facts that disqualified the rest, since
    /// revising those could legalize a pair.
    fn legal_merge_pairs(
        &mut self,
        counted: &[(NodeId, DependencySet)],
    ) -> (Vec<(NodeId, NodeId)>, DependencySet) {
        let mut pairs = Vec::new();
        let mut disqualified = DependencySet::new();
        for ((a, _), (b, _)) in counted.iter().tuple_combinations() {
            let (a, b) = (*a, *b);
            if self.is_distinct_pair(a, b) {
                continue;
            }
            if let Some(marker_deps) = self.shared_marker(a, b) {
                disqualified.union(&marker_deps);
                continue;
            }
            if let Some(conflict) = self.label_conflict(a, b) {
                disqualified.union(&conflict);
                continue;
            }
            pairs.push((a, b));
        }
        (pairs, disqualified)
    }

    fn is_distinct_pair(&self, a: NodeId, b: NodeId) -> bool {
        self.distinct.iter().any(|&(x, y)| {
            let (x, y) = (self.forest.resolve(x), self.forest.resolve(y));
            (x == a && y == b) || (x == b && y == a)
        })
    }

    /// A creation marker both successors carry: they answer for the same
    /// at-least obligation and must stay distinct.
    fn shared_marker(&self, a: NodeId, b: NodeId) -> Option<DependencySet> {
        let an = self.forest.node(a);
        let bn = self.forest.node(b);
        for ma in &an.created_by {
            for mb in &bn.created_by {
                if ma.node == mb.node && ma.concept == mb.concept {
                    return Some(ma.deps.clone().unioned(&mb.deps));
                }
            }
        }
        None
    }

    /// A complementary or oracle-disjoint label pair across the two
    /// successors; merging would clash immediately.
    fn label_conflict(&mut self, a: NodeId, b: NodeId) -> Option<DependencySet> {
        let a_labels: Vec<(ConceptRef, DependencySet)> = self
            .forest
            .node(a)
            .labels()
            .map(|(c, d, _)| (*c, d.clone()))
            .collect();
        let b_labels: Vec<(ConceptRef, DependencySet)> = self
            .forest
            .node(b)
            .labels()
            .map(|(c, d, _)| (*c, d.clone()))
            .collect();
        for (ca, da) in &a_labels {
            for (cb, db) in &b_labels {
                if *ca == cb.neg() {
                    return Some(da.clone().unioned(db));
                }
                if self.config.use_oracle
                    && self.oracle.disjoint(self.graph, self.roles, *ca, *cb)
                {
                    return Some(da.clone().unioned(db));
                }
            }
        }
        None
    }

    /// Merge `victim` into `survivor`: every label of the victim is
    /// re-asserted on the survivor and the victim's subtree goes inactive.
    /// The survivor's re-expansion rebuilds whatever the subtree provided.
    fn merge(
        &mut self,
        victim: NodeId,
        survivor: NodeId,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        debug!(victim = victim.0, survivor = survivor.0, "merging successors");
        let labels: Vec<(ConceptRef, DependencySet)> = self
            .forest
            .node(victim)
            .labels()
            .map(|(c, d, _)| (*c, d.clone()))
            .collect();
        let universals = self.forest.node(victim).universals.clone();
        let markers = self.forest.node(victim).created_by.clone();
        let roles: SmallVec<[RoleId; 2]> = self.forest.node(victim).parent_roles.clone();

        {
            let v = self.forest.node_mut(victim);
            v.skip = true;
            v.merged_into = Some(survivor);
        }
        {
            let s = self.forest.node_mut(survivor);
            for marker in markers {
                let known = s
                    .created_by
                    .iter()
                    .any(|m| m.node == marker.node && m.concept == marker.concept);
                if !known {
                    s.created_by.push(CreationMarker {
                        node: marker.node,
                        concept: marker.concept,
                        deps: marker.deps.unioned(&deps),
                    });
                }
            }
            for role in roles {
                if !s.parent_roles.contains(&role) {
                    s.parent_roles.push(role);
                }
            }
            s.card_cursor = 0;
        }
        // the parent re-verifies its own cardinality queue: counts both
        // rose (survivor gained labels) and fell (victim vanished)
        if let Some(parent) = self.forest.node(survivor).parent {
            self.forest.node_mut(parent).card_cursor = 0;
        }
        for (concept, ldeps) in labels {
            self.assert_label(survivor, concept, ldeps.unioned(&deps), level)?;
        }
        for u in universals {
            self.apply_universal(survivor, u.role, u.filler, u.deps.unioned(&deps), level)?;
        }
        Ok(())
    }

    // ----- universals and edges ----------------------------------------

    /// Register a universal restriction and propagate it to every current
    /// successor over an equal-or-sub role, re-deriving it along
    /// transitive roles. Future successors pick it up at edge creation.
    fn apply_universal(
        &mut self,
        id: NodeId,
        role: RoleId,
        filler: ConceptRef,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let mut work: Vec<(NodeId, RoleId, ConceptRef, DependencySet)> =
            vec![(id, role, filler, deps)];
        while let Some((n, s, g, d)) = work.pop() {
            let n = self.forest.resolve(n);
            if !self.register_universal(n, s, g, &d, level) {
                continue;
            }
            let edges: Vec<(NodeId, SmallVec<[RoleId; 2]>, DependencySet)> = self
                .forest
                .node(n)
                .edges
                .iter()
                .map(|e| (e.target, e.roles.clone(), e.deps.clone()))
                .collect();
            for (target, edge_roles, edeps) in edges {
                let target = self.forest.resolve(target);
                if self.forest.node(target).skip {
                    continue;
                }
                for &r in &edge_roles {
                    if !self.roles.is_subrole_of(r, s) {
                        continue;
                    }
                    let pd = d.clone().unioned(&edeps);
                    self.assert_label(target, g, pd.clone(), level)?;
                    if let Some(t) = self.roles.transitive_between(r, s) {
                        work.push((target, t, g, pd));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns false when an identical restriction is already registered.
    fn register_universal(
        &mut self,
        id: NodeId,
        role: RoleId,
        filler: ConceptRef,
        deps: &DependencySet,
        level: u32,
    ) -> bool {
        let node = self.forest.node_mut(id);
        if node
            .universals
            .iter()
            .any(|u| u.role == role && u.filler == filler)
        {
            return false;
        }
        node.universals.push(UniversalObligation {
            role,
            filler,
            deps: deps.clone(),
            level,
        });
        true
    }

    fn self_loop(
        &mut self,
        id: NodeId,
        role: RoleId,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        // a negated self-restriction over a super-role forbids the loop
        let forbidden = self.forest.node(id).labels().find_map(|(c, d, _)| {
            match view(self.graph, *c) {
                View::HasSelf(sup, true) if self.roles.is_subrole_of(role, sup) => {
                    Some(deps.clone().unioned(d))
                }
                _ => None,
            }
        });
        if let Some(conflict) = forbidden {
            return Err(Interrupt::Clash(conflict));
        }
        let present = self
            .forest
            .node(id)
            .edges
            .iter()
            .any(|e| e.target == id && e.roles.contains(&role));
        if present {
            return Ok(());
        }
        self.connect(id, id, smallvec![role], deps, level)
    }

    /// ¬∃R.Self: a loop edge over R or a sub-role is a contradiction.
    /// Checked against the edges present when the restriction is processed;
    /// ABox loops are seeded before the run, and loops created afterwards
    /// clash at the complementary label or in `self_loop`.
    fn no_self_loop(&self, id: NodeId, role: RoleId, deps: DependencySet) -> RuleResult {
        for edge in &self.forest.node(id).edges {
            if self.forest.resolve(edge.target) != id {
                continue;
            }
            if edge.roles.iter().any(|&r| self.roles.is_subrole_of(r, role)) {
                return Err(Interrupt::Clash(deps.unioned(&edge.deps)));
            }
        }
        Ok(())
    }

    /// Add an edge between existing individuals and fire its obligations.
    fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        roles: SmallVec<[RoleId; 2]>,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        self.forest.add_edge(from, to, roles.clone(), deps.clone());
        // new successor: at-most bounds need re-verification
        self.forest.node_mut(from).card_cursor = 0;
        self.edge_obligations(from, to, &roles, deps, level)
    }

    /// Domain/range conditions of every super-role, plus the source's
    /// registered universal restrictions, land on the edge's endpoints.
    fn edge_obligations(
        &mut self,
        from: NodeId,
        to: NodeId,
        edge_roles: &[RoleId],
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let hierarchy = self.roles;
        for &r in edge_roles {
            for &s in hierarchy.super_roles(r) {
                let role = hierarchy.role(s);
                if role.domain.is_defined() {
                    self.assert_label(from, role.domain, deps.clone(), level)?;
                }
                if role.range.is_defined() {
                    self.assert_label(to, role.range, deps.clone(), level)?;
                }
            }
        }
        let universals = self.forest.node(from).universals.clone();
        for u in universals {
            for &r in edge_roles {
                if !hierarchy.is_subrole_of(r, u.role) {
                    continue;
                }
                let d = u.deps.clone().unioned(&deps);
                self.assert_label(to, u.filler, d.clone(), level)?;
                if let Some(t) = hierarchy.transitive_between(r, u.role) {
                    self.apply_universal(to, t, u.filler, d, level)?;
                }
            }
        }
        Ok(())
    }

    // ----- labels --------------------------------------------------------

    /// Assert a concept on an individual: clash detection, the shallow
    /// data-value filter, and routing into the right obligation queue.
    fn assert_label(
        &mut self,
        id: NodeId,
        concept: ConceptRef,
        deps: DependencySet,
        level: u32,
    ) -> RuleResult {
        let id = self.forest.resolve(id);
        if concept == ConceptRef::TOP {
            return Ok(());
        }
        if concept == ConceptRef::BOTTOM {
            return Err(Interrupt::Clash(deps));
        }
        match self.forest.add_label(id, concept, deps.clone(), level) {
            AddLabel::Present => Ok(()),
            AddLabel::Clash(conflict) => {
                trace!(node = id.0, concept = concept.0, "clash");
                Err(Interrupt::Clash(conflict))
            }
            AddLabel::Added => {
                if !concept.is_negated() {
                    if let NodeKind::Literal(_) = self.graph.node_of(concept).kind {
                        if let Some(conflict) = self.literal_conflict(id, concept, &deps) {
                            return Err(Interrupt::Clash(conflict));
                        }
                        self.forest.node_mut(id).data_vertex = true;
                    } else if let NodeKind::Datatype(_) = self.graph.node_of(concept).kind {
                        self.forest.node_mut(id).data_vertex = true;
                    }
                }
                let ob = Obligation {
                    concept,
                    deps,
                    level,
                };
                let node = self.forest.node_mut(id);
                if is_cardinality(self.graph, concept) {
                    node.card.push(ob);
                } else {
                    node.todo.push(ob);
                }
                Ok(())
            }
        }
    }

    /// Drain the cardinality queue of a data vertex. A data value takes no
    /// role successors, so an at-least bound can never be met and an
    /// at-most bound holds vacuously. The conflict folds in the deps of the
    /// concrete labels that made the node a data vertex.
    fn data_vertex_bounds(&mut self, id: NodeId) -> RuleResult {
        loop {
            let node = self.forest.node_mut(id);
            if node.card_cursor >= node.card.len() {
                return Ok(());
            }
            let ob = node.card[node.card_cursor].clone();
            node.card_cursor += 1;
            if let View::MinCard(_, _, _) = view(self.graph, ob.concept) {
                let mut conflict = ob.deps;
                for (c, d, _) in self.forest.node(id).labels() {
                    if !c.is_negated()
                        && matches!(
                            self.graph.node_of(*c).kind,
                            NodeKind::Literal(_) | NodeKind::Datatype(_)
                        )
                    {
                        conflict.union(d);
                    }
                }
                return Err(Interrupt::Clash(conflict));
            }
        }
    }

    /// Two distinct concrete values on one vertex can never be realized.
    fn literal_conflict(
        &self,
        id: NodeId,
        concept: ConceptRef,
        deps: &DependencySet,
    ) -> Option<DependencySet> {
        for (other, odeps, _) in self.forest.node(id).labels() {
            if *other == concept || other.is_negated() {
                continue;
            }
            if matches!(self.graph.node_of(*other).kind, NodeKind::Literal(_)) {
                return Some(deps.clone().unioned(odeps));
            }
        }
        None
    }

    /// Live successors of `id` over `sup` or a sub-role, carrying `filler`
    /// (`TOP` counts all), deduplicated through merge forwarding. The
    /// dependency set per successor is the union of its matching edges'.
    fn matching_successors(
        &self,
        id: NodeId,
        sup: RoleId,
        filler: ConceptRef,
    ) -> Vec<(NodeId, DependencySet)> {
        let mut out: Vec<(NodeId, DependencySet)> = Vec::new();
        for edge in &self.forest.node(id).edges {
            if !edge
                .roles
                .iter()
                .any(|&r| self.roles.is_subrole_of(r, sup))
            {
                continue;
            }
            let target = self.forest.resolve(edge.target);
            if self.forest.node(target).skip {
                continue;
            }
            if filler != ConceptRef::TOP && !self.forest.node(target).has_label(filler) {
                continue;
            }
            match out.iter_mut().find(|(t, _)| *t == target) {
                Some((_, d)) => d.union(&edge.deps),
                None => out.push((target, edge.deps.clone())),
            }
        }
        out
    }

    /// A functional role at or above `role`, if any.
    fn functional_super(&self, role: RoleId) -> Option<RoleId> {
        self.roles
            .super_roles(role)
            .iter()
            .copied()
            .find(|&s| self.roles.role(s).functional)
    }

    // ----- blocking ------------------------------------------------------

    /// Nearest ancestor that blocks `x`, by the pairwise subset test.
    fn find_blocker(&self, x: NodeId) -> Option<NodeId> {
        let mut y = self.forest.node(x).parent?;
        loop {
            if self.blocking_holds(x, y) {
                return Some(y);
            }
            y = self.forest.node(y).parent?;
        }
    }

    /// Double blocking: the blocker covers the blocked node's labels and
    /// universals, and their parents stand in the same relation over a
    /// covering role set. Guarantees the blocked node can reuse the
    /// blocker's (possibly cyclic) model.
    fn blocking_holds(&self, x: NodeId, y: NodeId) -> bool {
        if x == y {
            return false;
        }
        let xn = self.forest.node(x);
        let yn = self.forest.node(y);
        if yn.skip || yn.merged_into.is_some() || yn.blocked_by.is_some() {
            return false;
        }
        let (Some(px), Some(py)) = (xn.parent, yn.parent) else {
            return false;
        };
        self.labels_subset(x, y)
            && self.universals_subset(x, y)
            && self.labels_subset(px, py)
            && xn
                .parent_roles
                .iter()
                .all(|r| yn.parent_roles.contains(r))
    }

    fn labels_subset(&self, a: NodeId, b: NodeId) -> bool {
        let bn = self.forest.node(b);
        self.forest.node(a).labels().all(|(c, _, _)| bn.has_label(*c))
    }

    fn universals_subset(&self, a: NodeId, b: NodeId) -> bool {
        let bn = self.forest.node(b);
        self.forest.node(a).universals.iter().all(|u| {
            bn.universals
                .iter()
                .any(|v| v.role == u.role && v.filler == u.filler)
        })
    }

    // ----- choice points and backjumping --------------------------------

    /// Open a choice point and apply its first alternative.
    fn push_and_apply(
        &mut self,
        node: NodeId,
        alternatives: ChoiceAlternatives,
        base_deps: DependencySet,
    ) -> RuleResult {
        let snapshots = self.forest.snapshot();
        let forest_len = self.forest.len();
        let level = self
            .stack
            .push(node, alternatives, base_deps, forest_len, snapshots);
        trace!(level, node = node.0, "choice point");
        self.apply_alternative(level)
    }

    /// Apply the next untried alternative of the frame at `level`. Every
    /// fact it derives depends on the frame's premise, the accumulated
    /// context, and the frame's own level.
    fn apply_alternative(&mut self, level: u32) -> RuleResult {
        enum Action {
            Assert(NodeId, ConceptRef),
            Merge(NodeId, NodeId),
        }
        let (action, deps, reverify) = {
            let Some(frame) = self.stack.frame_mut(level) else {
                return Err(Interrupt::Clash(DependencySet::new()));
            };
            let mut deps = frame.base_deps.clone().unioned(&frame.context);
            deps.add(level);
            let (action, reverify) = match &mut frame.alternatives {
                ChoiceAlternatives::Disjuncts(ds) => {
                    let d = ds[frame.next];
                    (Action::Assert(frame.node, d), false)
                }
                ChoiceAlternatives::MergePairs(ps) => {
                    let (a, b) = ps[frame.next];
                    (Action::Merge(a, b), true)
                }
                ChoiceAlternatives::FillerSplit {
                    target,
                    filler,
                    tried_positive,
                } => {
                    let c = if *tried_positive {
                        filler.neg()
                    } else {
                        *filler
                    };
                    *tried_positive = true;
                    (Action::Assert(*target, c), true)
                }
            };
            frame.next += 1;
            (action, deps, reverify)
        };
        let owner = self.stack.frame_mut(level).map(|f| f.node);
        match action {
            Action::Assert(node, concept) => {
                let node = self.forest.resolve(node);
                self.assert_label(node, concept, deps, level)?;
            }
            Action::Merge(a, b) => {
                let (a, b) = (self.forest.resolve(a), self.forest.resolve(b));
                self.merge(a, b, deps, level)?;
            }
        }
        if reverify {
            if let Some(owner) = owner {
                let owner = self.forest.resolve(owner);
                self.forest.node_mut(owner).card_cursor = 0;
            }
        }
        Ok(())
    }

    /// Dependency-directed backjumping. Returns false when the conflict no
    /// longer depends on any open choice: the check is UNSAT.
    fn backjump(&mut self, mut conflict: DependencySet) -> Result<bool, StrixDlError> {
        loop {
            let target = if self.config.use_backjumping {
                match conflict.max_level() {
                    Some(level) => level,
                    None => return Ok(false),
                }
            } else {
                // chronological fallback: always the most recent frame
                if conflict.is_empty() || self.stack.is_empty() {
                    return Ok(false);
                }
                self.stack.depth()
            };
            debug!(target, "backjump");
            self.stack.cut_to(target);
            conflict.remove(target);
            let (forest_len, exhausted) = {
                let Some(frame) = self.stack.top_mut() else {
                    return Ok(false);
                };
                frame.context.union(&conflict);
                (frame.forest_len, frame.next >= frame.alternatives.total())
            };
            if exhausted {
                // fold this frame's premise and context into the conflict
                // and keep walking down
                let Some(frame) = self.stack.pop() else {
                    return Ok(false);
                };
                conflict = frame.base_deps.unioned(&frame.context);
                conflict.restrict_below(frame.level);
                continue;
            }
            {
                let Some(frame) = self.stack.top() else {
                    return Ok(false);
                };
                self.forest.restore(forest_len, &frame.snapshots);
            }
            match self.apply_alternative(target) {
                Ok(()) => return Ok(true),
                Err(Interrupt::Clash(deps)) => {
                    conflict = deps;
                }
                Err(Interrupt::Budget(e)) => return Err(e),
            }
        }
    }

    // ----- model cache ---------------------------------------------------

    fn signature_of(&self, id: NodeId) -> ModelSignature {
        let node = self.forest.node(id);
        ModelSignature::build(
            self.classes,
            node.labels().map(|(c, _, _)| *c),
            node.universals.iter().map(|u| (u.role, u.filler)),
        )
    }

    /// Union of everything known about a node, for conservative conflict
    /// reporting on negative cache hits.
    fn all_deps_of(&self, id: NodeId) -> DependencySet {
        let node = self.forest.node(id);
        let mut deps = DependencySet::new();
        for (_, d, _) in node.labels() {
            deps.union(d);
        }
        for u in &node.universals {
            deps.union(&u.deps);
        }
        deps
    }

    /// A full model was found: every live individual's label set is
    /// realizable, so each signature earns a positive entry.
    fn record_model(&mut self) {
        if !self.config.use_model_cache {
            return;
        }
        for id in self.forest.ids().collect::<Vec<_>>() {
            if self.forest.is_live(id) {
                let sig = self.signature_of(id);
                self.model_cache.record(sig, true);
            }
        }
    }
}
