//! Engine configuration.

use std::time::Duration;

/// All knobs of one reasoning session, passed at construction.
#[derive(Debug, Clone)]
pub struct ReasonerConfig {
    /// Consult the disjointness oracle to prune OR-branches and to
    /// disqualify cardinality merge pairs.
    pub use_oracle: bool,
    /// Dependency-directed backjumping; when off, conflicts backtrack
    /// chronologically to the most recent choice point.
    pub use_backjumping: bool,
    /// Positive/negative model caches keyed on automorphism-class labels.
    pub use_model_cache: bool,
    /// Per-concept satisfiability slots shared across checks.
    pub use_global_cache: bool,
    /// Recursion bound for the oracle; past it, "not provably disjoint".
    pub oracle_depth_bound: usize,
    /// Memo-table size that triggers a branch-local oracle reset.
    pub oracle_memo_limit: usize,
    /// Upper bound on stored model-cache entries.
    pub cache_entry_limit: usize,
    /// Hard ceiling on interpretation-forest size.
    pub max_nodes: usize,
    /// Wall-clock budget per check; `None` means unbounded.
    pub time_budget: Option<Duration>,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            use_oracle: true,
            use_backjumping: true,
            use_model_cache: true,
            use_global_cache: true,
            oracle_depth_bound: 64,
            oracle_memo_limit: 1 << 16,
            cache_entry_limit: 1 << 14,
            max_nodes: 100_000,
            time_budget: None,
        }
    }
}
