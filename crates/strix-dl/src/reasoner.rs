//! Public entry point of the decision procedure.
//!
//! A `TableauReasoner` borrows a frozen knowledge base and answers
//! satisfiability, subsumption and ABox-consistency questions. It owns the
//! state that outlives a single check: the per-concept verdict cache, the
//! model cache with the class interner its signatures are keyed on, and
//! the disjointness oracle's memo table. Each question spins up a fresh
//! engine over that shared state.

use crate::cache::{ConceptCache, ModelCache};
use crate::config::ReasonerConfig;
use crate::engine::{Interrupt, TableauEngine};
use crate::forest::NodeId;
use crate::oracle::DisjointnessOracle;
use crate::StrixDlError;
use std::collections::HashMap;
use strix_core::{AutomorphismLabeler, ConceptRef, KnowledgeBase, StrixCoreError};
use tracing::debug;

pub struct TableauReasoner<'kb> {
    kb: &'kb KnowledgeBase,
    config: ReasonerConfig,
    oracle: DisjointnessOracle,
    concepts: ConceptCache,
    models: ModelCache,
    labeler: AutomorphismLabeler,
}

impl<'kb> TableauReasoner<'kb> {
    pub fn new(kb: &'kb KnowledgeBase, config: ReasonerConfig) -> Self {
        let oracle = DisjointnessOracle::new(config.oracle_depth_bound, config.oracle_memo_limit);
        let models = ModelCache::new(config.cache_entry_limit);
        Self {
            kb,
            config,
            oracle,
            concepts: ConceptCache::new(),
            models,
            labeler: AutomorphismLabeler::new(),
        }
    }

    pub fn with_defaults(kb: &'kb KnowledgeBase) -> Self {
        Self::new(kb, ReasonerConfig::default())
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    /// Satisfiability of a single (possibly negated) concept reference.
    pub fn check_sat(&mut self, concept: ConceptRef) -> Result<bool, StrixDlError> {
        if !concept.is_defined() {
            return Err(StrixCoreError::UndefinedConcept.into());
        }
        if self.config.use_global_cache {
            if let Some(verdict) = self.concepts.get(concept) {
                return Ok(verdict);
            }
        }
        debug!(concept = concept.0, "checking satisfiability");
        let verdict = self.run_root_check(&[concept])?;
        if self.config.use_global_cache {
            self.concepts.set(concept, verdict);
        }
        Ok(verdict)
    }

    /// Satisfiability of a named concept, honoring the `negate` switch the
    /// classification layer uses for both polarities of a subsumption test.
    pub fn check_named_sat(&mut self, name: &str, negate: bool) -> Result<bool, StrixDlError> {
        let concept = self
            .kb
            .graph
            .lookup_concept(name)
            .ok_or(StrixCoreError::UndefinedConcept)?;
        self.check_sat(if negate { concept.neg() } else { concept })
    }

    /// `p ⊑ q`, decided as unsatisfiability of `p ⊓ ¬q`.
    pub fn check_subsumption(
        &mut self,
        p: ConceptRef,
        q: ConceptRef,
    ) -> Result<bool, StrixDlError> {
        if !p.is_defined() || !q.is_defined() {
            return Err(StrixCoreError::UndefinedConcept.into());
        }
        debug!(sub = p.0, sup = q.0, "checking subsumption");
        Ok(!self.run_root_check(&[p, q.neg()])?)
    }

    /// Consistency of every individual assertion in the knowledge base.
    pub fn check_abox_sat(&mut self) -> Result<bool, StrixDlError> {
        debug!(
            assertions = self.kb.assertions.len(),
            role_assertions = self.kb.role_assertions.len(),
            "checking abox consistency"
        );
        let classes: Vec<u32> = Vec::new();
        let mut engine = TableauEngine::new(
            &self.kb.graph,
            &self.kb.roles,
            &self.config,
            &mut self.oracle,
            &mut self.models,
            &classes,
        );

        let mut roots: HashMap<&str, NodeId> = HashMap::new();
        let names = self
            .kb
            .assertions
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(
                self.kb
                    .role_assertions
                    .iter()
                    .flat_map(|ra| [ra.subject.as_str(), ra.object.as_str()]),
            )
            .chain(
                self.kb
                    .distinct
                    .iter()
                    .flat_map(|(a, b)| [a.as_str(), b.as_str()]),
            );
        for name in names {
            if roots.contains_key(name) {
                continue;
            }
            match engine.add_root() {
                Ok(id) => {
                    roots.insert(name, id);
                }
                Err(Interrupt::Clash(_)) => return Ok(false),
                Err(Interrupt::Budget(e)) => return Err(e),
            }
        }
        for (name, concept) in &self.kb.assertions {
            let root = roots[name.as_str()];
            match engine.seed(root, *concept) {
                Ok(()) => {}
                Err(Interrupt::Clash(_)) => return Ok(false),
                Err(Interrupt::Budget(e)) => return Err(e),
            }
        }
        for ra in &self.kb.role_assertions {
            let (from, to) = (roots[ra.subject.as_str()], roots[ra.object.as_str()]);
            match engine.seed_edge(from, to, ra.role) {
                Ok(()) => {}
                Err(Interrupt::Clash(_)) => return Ok(false),
                Err(Interrupt::Budget(e)) => return Err(e),
            }
        }
        for (a, b) in &self.kb.distinct {
            engine.add_distinct(roots[a.as_str()], roots[b.as_str()]);
        }
        engine.run()
    }

    /// The per-concept verdict slot, if a previous check filled it. The
    /// classification layer reads this to skip redundant checks.
    pub fn cached_sat(&self, concept: ConceptRef) -> Option<bool> {
        self.concepts.get(concept)
    }

    /// Reset per-branch state (the oracle memo) between independent
    /// checks. Knowledge-base-scoped caches survive.
    pub fn clear(&mut self) {
        self.oracle.clear();
    }

    /// Drop everything learned so far, including the verdict and model
    /// caches. Results after this are as from a fresh reasoner.
    pub fn clear_caches(&mut self) {
        self.oracle.clear();
        self.concepts.clear();
        self.models.clear();
        // model signatures are keyed on the interned class ids; the two
        // only stay meaningful together
        self.labeler.clear();
    }

    /// One tableau over a single root seeded with `seeds`. A structural
    /// refutation by the oracle answers without building any individual.
    fn run_root_check(&mut self, seeds: &[ConceptRef]) -> Result<bool, StrixDlError> {
        if self.config.use_oracle {
            let graph = &self.kb.graph;
            let roles = &self.kb.roles;
            let refuted = match seeds {
                [single] => self.oracle.unsatisfiable(graph, roles, *single),
                [a, b] => self.oracle.disjoint(graph, roles, *a, *b),
                _ => false,
            };
            if refuted {
                debug!("refuted structurally, no expansion needed");
                return Ok(false);
            }
        }
        let classes = match seeds.first() {
            Some(&root) => self.labeler.compute(&self.kb.graph, root),
            None => Vec::new(),
        };
        let mut engine = TableauEngine::new(
            &self.kb.graph,
            &self.kb.roles,
            &self.config,
            &mut self.oracle,
            &mut self.models,
            &classes,
        );
        let root = match engine.add_root() {
            Ok(root) => root,
            Err(Interrupt::Clash(_)) => return Ok(false),
            Err(Interrupt::Budget(e)) => return Err(e),
        };
        for &seed in seeds {
            match engine.seed(root, seed) {
                Ok(()) => {}
                Err(Interrupt::Clash(_)) => return Ok(false),
                Err(Interrupt::Budget(e)) => return Err(e),
            }
        }
        engine.run()
    }
}
