//! Choice points and the backtracking stack.
//!
//! Every nondeterministic rule pushes a frame recording the untried
//! alternatives and the engine state needed to restore the forest before
//! the choice was made. Frames are numbered from 1; the frame number is
//! the level that appears in dependency sets.

use crate::forest::{NodeId, NodeSnapshot};
use strix_core::{ConceptRef, DependencySet};

/// The untried alternatives of one nondeterministic rule application.
#[derive(Debug, Clone)]
pub enum ChoiceAlternatives {
    /// OR-rule: the disjuncts still worth trying.
    Disjuncts(Vec<ConceptRef>),
    /// MAX-rule: candidate successor pairs to merge, as forest node ids.
    MergePairs(Vec<(NodeId, NodeId)>),
    /// MAX-rule precondition: for each counted successor, whether it
    /// satisfies the filler or its negation.
    FillerSplit {
        target: NodeId,
        filler: ConceptRef,
        /// Second round asserts the negated filler.
        tried_positive: bool,
    },
}

impl ChoiceAlternatives {
    /// How many alternatives the frame carries in total; compared against
    /// the frame's `next` cursor to detect exhaustion.
    pub fn total(&self) -> usize {
        match self {
            ChoiceAlternatives::Disjuncts(v) => v.len(),
            ChoiceAlternatives::MergePairs(v) => v.len(),
            ChoiceAlternatives::FillerSplit { .. } => 2,
        }
    }
}

/// One frame of the backtracking stack.
#[derive(Debug)]
pub struct ChoicePoint {
    /// 1-based stack depth; the level recorded in dependency sets.
    pub level: u32,
    /// Individual the rule fired on.
    pub node: NodeId,
    pub alternatives: ChoiceAlternatives,
    /// Index of the next alternative to try.
    pub next: usize,
    /// Dependencies of the rule's premise, shared by every alternative.
    pub base_deps: DependencySet,
    /// Conflict levels accumulated from alternatives already refuted at
    /// this frame; folded into each retry and into the frame's own
    /// failure when the alternatives run out.
    pub context: DependencySet,
    /// Forest geometry at push time, for restore-by-truncation.
    pub forest_len: usize,
    pub snapshots: Vec<NodeSnapshot>,
}

/// The stack of open choice points.
#[derive(Debug, Default)]
pub struct ChoiceStack {
    frames: Vec<ChoicePoint>,
}

impl ChoiceStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current depth; also the level of the most recent frame.
    pub fn depth(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Push a frame and return its level.
    pub fn push(
        &mut self,
        node: NodeId,
        alternatives: ChoiceAlternatives,
        base_deps: DependencySet,
        forest_len: usize,
        snapshots: Vec<NodeSnapshot>,
    ) -> u32 {
        let level = self.frames.len() as u32 + 1;
        self.frames.push(ChoicePoint {
            level,
            node,
            alternatives,
            next: 0,
            base_deps,
            context: DependencySet::new(),
            forest_len,
            snapshots,
        });
        level
    }

    pub fn top(&self) -> Option<&ChoicePoint> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ChoicePoint> {
        self.frames.last_mut()
    }

    pub fn frame_mut(&mut self, level: u32) -> Option<&mut ChoicePoint> {
        self.frames.get_mut(level as usize - 1)
    }

    pub fn pop(&mut self) -> Option<ChoicePoint> {
        self.frames.pop()
    }

    /// Discard every frame above `level`, keeping the frame at `level`
    /// itself. The backjump target becomes the new top.
    pub fn cut_to(&mut self, level: u32) {
        self.frames.truncate(level as usize);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_count_from_one() {
        let mut stack = ChoiceStack::new();
        assert_eq!(stack.depth(), 0);
        let l1 = stack.push(
            NodeId(0),
            ChoiceAlternatives::Disjuncts(vec![ConceptRef(2), ConceptRef(3)]),
            DependencySet::new(),
            1,
            Vec::new(),
        );
        let l2 = stack.push(
            NodeId(0),
            ChoiceAlternatives::Disjuncts(vec![ConceptRef(4)]),
            DependencySet::new(),
            1,
            Vec::new(),
        );
        assert_eq!((l1, l2), (1, 2));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn cut_to_keeps_the_target_frame() {
        let mut stack = ChoiceStack::new();
        for _ in 0..4 {
            stack.push(
                NodeId(0),
                ChoiceAlternatives::Disjuncts(vec![ConceptRef(2)]),
                DependencySet::new(),
                1,
                Vec::new(),
            );
        }
        stack.cut_to(2);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top().map(|f| f.level), Some(2));
    }

    #[test]
    fn filler_split_counts_two_rounds() {
        let alt = ChoiceAlternatives::FillerSplit {
            target: NodeId(1),
            filler: ConceptRef(5),
            tried_positive: false,
        };
        assert_eq!(alt.total(), 2);
    }
}
