//! Satisfiability caches.
//!
//! Two layers. The concept cache is a dense per-polarity verdict table
//! indexed by constraint-graph node, answering repeated top-level checks
//! for free. The model cache works below the root: it keys fully expanded
//! tableau individuals by a canonical signature built from automorphism
//! classes, so a subtree proven (un)satisfiable once is recognized again
//! even when it reappears under renamed atoms.

use std::collections::HashSet;
use strix_core::{ConceptRef, RoleId};

/// Class ids start at 1; nodes outside the labeled sub-DAG fall back to
/// their raw index, displaced past any real class id.
const UNLABELED_BASE: i64 = 1 << 32;

/// One signature component: a label, or a pending universal restriction.
/// The sign of `class` carries the polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct SignatureEntry {
    /// `u32::MAX` for plain labels, the role id for universals.
    role: u32,
    class: i64,
}

/// Canonical description of a tableau individual: the sorted set of its
/// label classes plus its registered universal restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSignature {
    entries: Vec<SignatureEntry>,
}

impl ModelSignature {
    pub fn build(
        classes: &[u32],
        labels: impl Iterator<Item = ConceptRef>,
        universals: impl Iterator<Item = (RoleId, ConceptRef)>,
    ) -> Self {
        let mut entries: Vec<SignatureEntry> = labels
            .map(|c| SignatureEntry {
                role: u32::MAX,
                class: signed_class(classes, c),
            })
            .chain(universals.map(|(r, f)| SignatureEntry {
                role: r.0,
                class: signed_class(classes, f),
            }))
            .collect();
        entries.sort_unstable();
        entries.dedup();
        ModelSignature { entries }
    }

    /// Both sides are sorted and deduplicated; one merge walk suffices.
    fn contains_all(&self, other: &ModelSignature) -> bool {
        let mut i = 0;
        for e in &other.entries {
            loop {
                match self.entries.get(i) {
                    Some(mine) if mine < e => i += 1,
                    Some(mine) if mine == e => break,
                    _ => return false,
                }
            }
        }
        true
    }
}

fn signed_class(classes: &[u32], c: ConceptRef) -> i64 {
    let cls = match classes.get(c.index()).copied() {
        Some(cl) if cl != 0 => cl as i64,
        _ => UNLABELED_BASE + c.index() as i64,
    };
    if c.is_negated() {
        -cls
    } else {
        cls
    }
}

/// Per-concept verdicts, one slot per graph node and polarity.
#[derive(Debug, Default)]
pub struct ConceptCache {
    positive: Vec<Option<bool>>,
    negative: Vec<Option<bool>>,
}

impl ConceptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, c: ConceptRef) -> Option<bool> {
        let side = if c.is_negated() {
            &self.negative
        } else {
            &self.positive
        };
        side.get(c.index()).copied().flatten()
    }

    pub fn set(&mut self, c: ConceptRef, satisfiable: bool) {
        let side = if c.is_negated() {
            &mut self.negative
        } else {
            &mut self.positive
        };
        if side.len() <= c.index() {
            side.resize(c.index() + 1, None);
        }
        side[c.index()] = Some(satisfiable);
    }

    pub fn clear(&mut self) {
        self.positive.clear();
        self.negative.clear();
    }
}

/// Signature-keyed cache of expanded-subtree verdicts.
///
/// Satisfiable signatures match exactly: the stored model realizes exactly
/// those constraints. Unsatisfiable ones match by inclusion: a node whose
/// signature contains a known-bad core is doomed no matter what else it
/// carries.
#[derive(Debug)]
pub struct ModelCache {
    satisfiable: HashSet<ModelSignature>,
    unsatisfiable: Vec<ModelSignature>,
    entry_limit: usize,
}

impl ModelCache {
    pub fn new(entry_limit: usize) -> Self {
        Self {
            satisfiable: HashSet::new(),
            unsatisfiable: Vec::new(),
            entry_limit,
        }
    }

    pub fn lookup(&self, sig: &ModelSignature) -> Option<bool> {
        if self.satisfiable.contains(sig) {
            return Some(true);
        }
        if self.unsatisfiable.iter().any(|core| sig.contains_all(core)) {
            return Some(false);
        }
        None
    }

    pub fn record(&mut self, sig: ModelSignature, satisfiable: bool) {
        if satisfiable {
            if self.satisfiable.len() < self.entry_limit {
                self.satisfiable.insert(sig);
            }
        } else if self.unsatisfiable.len() < self.entry_limit {
            self.unsatisfiable.push(sig);
        }
    }

    pub fn clear(&mut self) {
        self.satisfiable.clear();
        self.unsatisfiable.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(classes: &[u32], labels: &[ConceptRef]) -> ModelSignature {
        ModelSignature::build(classes, labels.iter().copied(), std::iter::empty())
    }

    #[test]
    fn concept_cache_keeps_polarities_apart() {
        let mut cache = ConceptCache::new();
        let c = ConceptRef(4);
        cache.set(c, true);
        cache.set(c.neg(), false);
        assert_eq!(cache.get(c), Some(true));
        assert_eq!(cache.get(c.neg()), Some(false));
        assert_eq!(cache.get(ConceptRef(5)), None);
    }

    #[test]
    fn signatures_identify_class_renamings() {
        // nodes 2 and 3 share class 7: labels {2} and {3} are the same model
        let classes = vec![0, 1, 7, 7];
        assert_eq!(
            sig(&classes, &[ConceptRef(2)]),
            sig(&classes, &[ConceptRef(3)])
        );
        // opposite polarity never collides
        assert_ne!(
            sig(&classes, &[ConceptRef(2)]),
            sig(&classes, &[ConceptRef(-2)])
        );
    }

    #[test]
    fn unsatisfiable_cores_match_by_inclusion() {
        let classes = vec![0, 1, 2, 3, 4];
        let mut cache = ModelCache::new(16);
        cache.record(sig(&classes, &[ConceptRef(2), ConceptRef(-3)]), false);

        let superset = sig(&classes, &[ConceptRef(2), ConceptRef(-3), ConceptRef(4)]);
        assert_eq!(cache.lookup(&superset), Some(false));
        let disjoint_other = sig(&classes, &[ConceptRef(2), ConceptRef(3)]);
        assert_eq!(cache.lookup(&disjoint_other), None);
    }

    #[test]
    fn satisfiable_entries_match_exactly() {
        let classes = vec![0, 1, 2, 3];
        let mut cache = ModelCache::new(16);
        cache.record(sig(&classes, &[ConceptRef(2)]), true);
        assert_eq!(cache.lookup(&sig(&classes, &[ConceptRef(2)])), Some(true));
        // a larger label set is not covered by the stored model
        assert_eq!(
            cache.lookup(&sig(&classes, &[ConceptRef(2), ConceptRef(3)])),
            None
        );
    }

    #[test]
    fn entry_limit_caps_growth() {
        let classes = vec![0, 1, 2, 3];
        let mut cache = ModelCache::new(1);
        cache.record(sig(&classes, &[ConceptRef(2)]), false);
        cache.record(sig(&classes, &[ConceptRef(3)]), false);
        assert_eq!(cache.lookup(&sig(&classes, &[ConceptRef(3)])), None);
    }

    #[test]
    fn unlabeled_nodes_fall_back_to_their_index() {
        let classes = vec![0, 1, 0, 0];
        assert_ne!(
            sig(&classes, &[ConceptRef(2)]),
            sig(&classes, &[ConceptRef(3)])
        );
    }
}
