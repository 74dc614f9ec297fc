//! Token budget monitoring.
//!
//! Uses a character-based heuristic: ~4 characters per token, accurate
//! within ~10% for BPE tokenizers on English text. The monitor is a pure
//! function over the context log — no side effects, recomputed after
//! every assistant text outcome.

use std::sync::Arc;

use palaver_core::{ContextEntry, ContextLog, TokenEstimator};

/// Per-entry overhead for role name, delimiters, and wire formatting.
const ENTRY_OVERHEAD: usize = 4;

/// Estimate the token count for a string. 1 token ≈ 4 characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// The default character-heuristic estimator.
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, entries: &[ContextEntry]) -> usize {
        entries
            .iter()
            .map(|e| ENTRY_OVERHEAD + estimate_tokens(&e.content))
            .sum()
    }
}

/// The result of a budget check.
#[derive(Debug, Clone, Copy)]
pub struct BudgetStatus {
    /// Estimated token count of the context log
    pub estimated: usize,

    /// Configured ceiling
    pub ceiling: usize,

    /// Whether the estimate exceeds the ceiling
    pub exceeded: bool,
}

/// Watches a context log against a configured token ceiling.
pub struct BudgetMonitor {
    estimator: Arc<dyn TokenEstimator>,
    ceiling: usize,
}

impl BudgetMonitor {
    pub fn new(estimator: Arc<dyn TokenEstimator>, ceiling: usize) -> Self {
        Self { estimator, ceiling }
    }

    /// Estimate the log's token count and compare it to the ceiling.
    pub fn check(&self, log: &ContextLog) -> BudgetStatus {
        let estimated = self.estimator.estimate(log.entries());
        BudgetStatus {
            estimated,
            ceiling: self.ceiling,
            exceeded: estimated > self.ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn entry_estimate_includes_overhead() {
        let entries = vec![ContextEntry::user_text("test")]; // 4 chars → 1 + 4 overhead
        assert_eq!(HeuristicEstimator.estimate(&entries), 5);
    }

    #[test]
    fn monitor_flags_exceeded_ceiling() {
        let monitor = BudgetMonitor::new(Arc::new(HeuristicEstimator), 10);

        let mut log = ContextLog::new();
        log.append(ContextEntry::user_text("1234")); // 5 tokens
        let status = monitor.check(&log);
        assert_eq!(status.estimated, 5);
        assert!(!status.exceeded);

        log.append(ContextEntry::assistant_text("a".repeat(40))); // +14 tokens
        let status = monitor.check(&log);
        assert_eq!(status.estimated, 19);
        assert!(status.exceeded);
    }

    #[test]
    fn check_is_pure() {
        let monitor = BudgetMonitor::new(Arc::new(HeuristicEstimator), 100);
        let mut log = ContextLog::new();
        log.append(ContextEntry::user_text("hello"));

        let first = monitor.check(&log);
        let second = monitor.check(&log);
        assert_eq!(first.estimated, second.estimated);
        assert_eq!(log.len(), 1);
    }
}
