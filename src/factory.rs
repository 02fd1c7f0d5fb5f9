//! Strategy selection.

use crate::algo::{self, Heuristic};
use crate::core::{Strategy, StrategyKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Problems with more tasks always use the heuristic.
const LARGE_TASK_COUNT: usize = 100;
/// Smallest task count for which CP-SAT is chosen automatically.
const CPSAT_TASK_COUNT: usize = 30;
/// Smallest task count for which MILP is chosen automatically.
const MILP_TASK_COUNT: usize = 20;

/// Resolves strategy variants to implementations.
#[derive(Clone)]
pub struct StrategyFactory {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("StrategyFactory").field("strategies", &names).finish()
    }
}

impl StrategyFactory {
    /// Creates a factory over the registered strategies.
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategies(algo::strategies().into_iter().map(Arc::from).collect())
    }

    /// Creates a factory over the given strategies.
    /// The heuristic is added when missing.
    #[must_use]
    pub fn with_strategies(mut strategies: Vec<Arc<dyn Strategy>>) -> Self {
        strategies.sort_by_key(|s| s.kind());
        strategies.dedup_by_key(|s| s.kind());
        if strategies.first().map(|s| s.kind()) != Some(StrategyKind::Heuristic) {
            strategies.insert(0, Arc::new(Heuristic));
        }
        Self { strategies }
    }

    /// Returns the strategy of the given kind if it is available.
    #[must_use]
    pub fn available(&self, kind: StrategyKind) -> Option<Arc<dyn Strategy>> {
        self.strategies
            .iter()
            .find(|s| s.kind() == kind && s.is_available())
            .cloned()
    }

    fn heuristic(&self) -> Arc<dyn Strategy> {
        self.available(StrategyKind::Heuristic)
            .unwrap_or_else(|| Arc::new(Heuristic))
    }

    /// Returns the strategy of the given kind.
    /// An unavailable strategy degrades along CP-SAT, MILP, Heuristic.
    #[must_use]
    pub fn create(&self, kind: StrategyKind) -> Arc<dyn Strategy> {
        let mut next = Some(kind);
        while let Some(kind) = next {
            if let Some(strategy) = self.available(kind) {
                return strategy;
            }
            next = match kind {
                StrategyKind::Cpsat => Some(StrategyKind::Milp),
                StrategyKind::Milp | StrategyKind::Hybrid => Some(StrategyKind::Heuristic),
                StrategyKind::Heuristic => None,
            };
            if let Some(to) = next {
                warn!(requested = %kind, fallback = %to, "strategy not available, degrading");
            }
        }
        self.heuristic()
    }

    /// Selects a strategy by problem size.
    #[must_use]
    pub fn create_best_for(&self, task_count: usize, slot_count: usize) -> Arc<dyn Strategy> {
        let usable = |kind| {
            self.available(kind)
                .filter(|strategy| strategy.can_handle(task_count, slot_count))
        };

        let chosen = if task_count > LARGE_TASK_COUNT {
            None
        } else if task_count > CPSAT_TASK_COUNT {
            usable(StrategyKind::Cpsat)
        } else if task_count >= MILP_TASK_COUNT {
            usable(StrategyKind::Milp)
        } else {
            None
        };

        let strategy = chosen.unwrap_or_else(|| self.heuristic());
        debug!(task_count, slot_count, strategy = strategy.name(), "selected strategy");
        strategy
    }

    /// Available strategies in fallback order: CP-SAT, MILP, then the heuristic.
    #[must_use]
    pub fn fallback_chain(&self) -> Vec<Arc<dyn Strategy>> {
        [StrategyKind::Cpsat, StrategyKind::Milp]
            .into_iter()
            .filter_map(|kind| self.available(kind))
            .chain(std::iter::once(self.heuristic()))
            .collect()
    }
}
