//! The individual optimization rules.
//!
//! `ordered_strategies` is the authoritative pipeline order. Constant
//! folding runs twice: the first pass handles what the user wrote, the
//! second folds what earlier rewrites exposed. Empty-table elimination
//! runs after the second fold so contradictions discovered by compaction
//! collapse whole subtrees, and predicate flattening/ordering run last so
//! they see the plan's final filter placement.

mod boolean_simplification;
mod constant_folding;
mod correlated_filters;
mod distinct_pushdown;
mod empty_table;
mod join_ordering;
mod join_rewriter;
mod limit_pushdown;
mod operator_fusion;
mod predicate_compaction;
mod predicate_flatten;
mod predicate_ordering;
mod predicate_pushdown;
mod predicate_rewriter;
mod projection_pushdown;
mod redundant_operators;
mod split_conjunctive_predicates;

pub use boolean_simplification::BooleanSimplificationStrategy;
pub use constant_folding::ConstantFoldingStrategy;
pub use correlated_filters::CorrelatedFiltersStrategy;
pub use distinct_pushdown::DistinctPushdownStrategy;
pub use empty_table::EmptyTableStrategy;
pub use join_ordering::JoinOrderingStrategy;
pub use join_rewriter::JoinRewriteStrategy;
pub use limit_pushdown::LimitPushdownStrategy;
pub use operator_fusion::OperatorFusionStrategy;
pub use predicate_compaction::PredicateCompactionStrategy;
pub use predicate_flatten::PredicateFlatteningStrategy;
pub use predicate_ordering::PredicateOrderingStrategy;
pub use predicate_pushdown::PredicatePushdownStrategy;
pub use predicate_rewriter::PredicateRewriteStrategy;
pub use projection_pushdown::ProjectionPushdownStrategy;
pub use redundant_operators::RedundantOperationsStrategy;
pub use split_conjunctive_predicates::SplitConjunctivePredicatesStrategy;

use crate::optimizer::OptimizationStrategy;
use crate::statistics::QueryStatistics;

/// The full pipeline in execution order.
pub fn ordered_strategies(statistics: QueryStatistics) -> Vec<Box<dyn OptimizationStrategy>> {
    vec![
        Box::new(ConstantFoldingStrategy::new(statistics.clone())),
        Box::new(BooleanSimplificationStrategy::new(statistics.clone())),
        Box::new(PredicateCompactionStrategy::new(statistics.clone())),
        Box::new(SplitConjunctivePredicatesStrategy::new(statistics.clone())),
        Box::new(PredicateRewriteStrategy::new(statistics.clone())),
        Box::new(PredicatePushdownStrategy::new(statistics.clone())),
        Box::new(CorrelatedFiltersStrategy::new(statistics.clone())),
        Box::new(ProjectionPushdownStrategy::new(statistics.clone())),
        Box::new(JoinOrderingStrategy::new(statistics.clone())),
        Box::new(JoinRewriteStrategy::new(statistics.clone())),
        Box::new(DistinctPushdownStrategy::new(statistics.clone())),
        Box::new(OperatorFusionStrategy::new(statistics.clone())),
        Box::new(LimitPushdownStrategy::new(statistics.clone())),
        Box::new(RedundantOperationsStrategy::new(statistics.clone())),
        Box::new(ConstantFoldingStrategy::new(statistics.clone())),
        Box::new(EmptyTableStrategy::new(statistics.clone())),
        Box::new(PredicateFlatteningStrategy::new(statistics.clone())),
        Box::new(PredicateOrderingStrategy::new(statistics)),
    ]
}
