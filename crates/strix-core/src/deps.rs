//! Dependency sets for dependency-directed backjumping.
//!
//! Every derived fact carries the set of choice-point levels it depends on.
//! A fact is valid only while none of those choices are revised; on a clash
//! the union of the involved sets names exactly the choice points worth
//! revisiting.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Sorted set of choice-point stack depths (1-based; depth 0 facts are
/// unconditional and carry an empty set).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    levels: SmallVec<[u32; 8]>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(level: u32) -> Self {
        let mut levels = SmallVec::new();
        levels.push(level);
        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn contains(&self, level: u32) -> bool {
        self.levels.binary_search(&level).is_ok()
    }

    /// Deepest choice point this set depends on.
    pub fn max_level(&self) -> Option<u32> {
        self.levels.last().copied()
    }

    pub fn add(&mut self, level: u32) {
        if let Err(pos) = self.levels.binary_search(&level) {
            self.levels.insert(pos, level);
        }
    }

    /// Set union; the merge operation of the backjumping calculus.
    pub fn union(&mut self, other: &DependencySet) {
        if other.levels.is_empty() {
            return;
        }
        if self.levels.is_empty() {
            self.levels = other.levels.clone();
            return;
        }
        let mut merged = SmallVec::with_capacity(self.levels.len() + other.levels.len());
        let (mut i, mut j) = (0, 0);
        while i < self.levels.len() && j < other.levels.len() {
            match self.levels[i].cmp(&other.levels[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(self.levels[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(other.levels[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(self.levels[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.levels[i..]);
        merged.extend_from_slice(&other.levels[j..]);
        self.levels = merged;
    }

    pub fn unioned(mut self, other: &DependencySet) -> Self {
        self.union(other);
        self
    }

    /// Drop every level at or above `level`; used when a choice point is
    /// revised and facts recorded under it are folded into its context.
    pub fn restrict_below(&mut self, level: u32) {
        let cut = self.levels.partition_point(|&l| l < level);
        self.levels.truncate(cut);
    }

    pub fn remove(&mut self, level: u32) {
        if let Ok(pos) = self.levels.binary_search(&level) {
            self.levels.remove(pos);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.levels.iter().copied()
    }
}

impl FromIterator<u32> for DependencySet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = DependencySet::new();
        for level in iter {
            set.add(level);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let a: DependencySet = [3, 1, 7].into_iter().collect();
        let b: DependencySet = [2, 3, 9].into_iter().collect();
        let u = a.unioned(&b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![1, 2, 3, 7, 9]);
        assert_eq!(u.max_level(), Some(9));
    }

    #[test]
    fn restrict_below_drops_revised_levels() {
        let mut d: DependencySet = [1, 4, 5, 8].into_iter().collect();
        d.restrict_below(5);
        assert_eq!(d.iter().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn empty_set_means_unconditional() {
        let d = DependencySet::new();
        assert!(d.is_empty());
        assert_eq!(d.max_level(), None);
    }
}
