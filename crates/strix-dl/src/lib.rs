//! Tableau decision procedure for the Strix description-logic reasoner.
//!
//! Given a frozen [`strix_core::KnowledgeBase`], this crate answers
//! satisfiability and subsumption questions by building an interpretation
//! forest under the tableau expansion rules, with dependency-directed
//! backjumping, double blocking for termination, a disjointness oracle for
//! branch pruning, and per-concept/per-model satisfiability caches.

pub mod cache;
pub mod config;
pub mod engine;
pub mod forest;
pub mod oracle;
pub mod reasoner;
pub mod stack;
mod view;

pub use config::ReasonerConfig;
pub use oracle::DisjointnessOracle;
pub use reasoner::TableauReasoner;

use thiserror::Error;

/// Errors surfaced by the decision procedure. Logical contradictions are
/// never errors; they drive backtracking and end up as a `false` result.
#[derive(Error, Debug)]
pub enum StrixDlError {
    /// The wall-clock budget was exhausted before the search finished.
    /// The outcome is unknown and nothing was cached for this check.
    #[error("time budget exceeded")]
    TimeBudgetExceeded,

    #[error("interpretation forest exceeded {0} nodes")]
    NodeLimitExceeded(usize),

    #[error("knowledge base error: {0}")]
    Core(#[from] strix_core::StrixCoreError),
}
