//! # The Optimizer
//!
//! A fixed, ordered pipeline of strategies, each a visitor over the
//! logical plan. Traversal starts at the plan's single exit point and
//! walks down towards the scans; this top-down approach suits the primary
//! activities involved: splitting nodes, rewriting individual nodes, and
//! pushing predicates, projections, limits and distincts towards the
//! reads.
//!
//! Each strategy sees a fresh [`OptimizerContext`]: the plan as it stood
//! before the strategy (`pre_optimized_tree`), the plan being built
//! (`optimized_plan`, seeded with a copy), and the collections that
//! accumulate pushdown candidates across the traversal. `complete` flushes
//! whatever is still pending and hands the next strategy its input.

pub mod strategies;

use std::collections::HashSet;

use tracing::debug;

use crate::errors::Result;
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType, Nid};
use crate::statistics::QueryStatistics;

/// State carried through one strategy's traversal of the plan.
pub struct OptimizerContext {
    pub node_id: Nid,
    pub parent_nid: Option<Nid>,
    pub last_nid: Option<Nid>,
    pub pre_optimized_tree: LogicalPlan,
    pub optimized_plan: LogicalPlan,

    pub seen_projections: usize,
    pub seen_unions: usize,
    pub seen_distincts: usize,

    /// Predicates lifted out of the plan, waiting for a scan or join to
    /// accept them
    pub collected_predicates: Vec<LogicalPlanNode>,
    /// Column identities referenced by operators already visited
    pub collected_identities: HashSet<String>,
    /// Distinct nodes waiting for an unnest to absorb them
    pub collected_distincts: Vec<LogicalPlanNode>,
    /// Limit / heap-sort nodes waiting to move below projections or into
    /// scans
    pub collected_limits: Vec<LogicalPlanNode>,
    /// Left-outer joins noted for the join rewriter
    pub collected_joins: Vec<LogicalPlanNode>,
    /// FILTER(FALSE) nodes noted for empty-table elimination
    pub false_filters: Vec<Nid>,

    pub statistics: QueryStatistics,
}

impl OptimizerContext {
    pub fn new(plan: &LogicalPlan, statistics: QueryStatistics) -> Self {
        OptimizerContext {
            node_id: String::new(),
            parent_nid: None,
            last_nid: None,
            pre_optimized_tree: plan.clone(),
            optimized_plan: plan.clone(),
            seen_projections: 0,
            seen_unions: 0,
            seen_distincts: 0,
            collected_predicates: Vec::new(),
            collected_identities: HashSet::new(),
            collected_distincts: Vec::new(),
            collected_limits: Vec::new(),
            collected_joins: Vec::new(),
            false_filters: Vec::new(),
            statistics,
        }
    }
}

/// One optimization rule.
pub trait OptimizationStrategy {
    fn name(&self) -> &'static str;

    /// Called for every node, top-down from the exit point. The node is a
    /// copy from the pre-optimized tree; mutations go to
    /// `context.optimized_plan`.
    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()>;

    /// Flush per-strategy state and return the finished plan.
    fn complete(&self, context: OptimizerContext) -> Result<LogicalPlan> {
        Ok(context.optimized_plan)
    }

    /// Skip the traversal entirely when the plan has no candidate nodes.
    fn should_i_run(&self, _plan: &LogicalPlan) -> bool {
        true
    }
}

/// Node ids of all steps matching `types`, in plan insertion order.
pub fn get_nodes_of_type(plan: &LogicalPlan, types: &[LogicalPlanStepType]) -> Vec<Nid> {
    plan.nodes()
        .filter(|(_, node)| types.contains(&node.step))
        .map(|(nid, _)| nid.clone())
        .collect()
}

/// The rule pipeline, applied in a fixed order.
pub struct CostBasedOptimizer {
    strategies: Vec<Box<dyn OptimizationStrategy>>,
    statistics: QueryStatistics,
    disabled: bool,
}

impl CostBasedOptimizer {
    pub fn new(statistics: QueryStatistics, disabled: bool) -> Self {
        let strategies = strategies::ordered_strategies(statistics.clone());
        CostBasedOptimizer {
            strategies,
            statistics,
            disabled,
        }
    }

    /// Run every strategy in sequence, each producing a new plan.
    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        if self.disabled {
            debug!("optimizer disabled, plan passed through unchanged");
            return Ok(plan);
        }
        let mut current = plan;
        for strategy in &self.strategies {
            if !strategy.should_i_run(&current) {
                continue;
            }
            debug!(strategy = strategy.name(), "applying optimization strategy");
            current = apply_strategy(&current, strategy.as_ref(), self.statistics.clone())?;
        }
        Ok(current)
    }
}

/// Apply a single strategy to a plan: traverse depth-first from the exit
/// point, then run the strategy's `complete` hook.
pub fn apply_strategy(
    plan: &LogicalPlan,
    strategy: &dyn OptimizationStrategy,
    statistics: QueryStatistics,
) -> Result<LogicalPlan> {
    let root = plan.exit_point()?;
    let mut context = OptimizerContext::new(plan, statistics);
    visit_down(&root, None, strategy, &mut context)?;
    strategy.complete(context)
}

fn visit_down(
    nid: &str,
    parent: Option<&str>,
    strategy: &dyn OptimizationStrategy,
    context: &mut OptimizerContext,
) -> Result<()> {
    let Some(node) = context.pre_optimized_tree.get(nid).cloned() else {
        return Ok(());
    };
    context.node_id = nid.to_string();
    context.parent_nid = parent.map(str::to_string);
    strategy.visit(&node, context)?;
    context.last_nid = Some(nid.to_string());

    for (child, _, _) in context.pre_optimized_tree.ingoing_edges(nid) {
        visit_down(&child, Some(nid), strategy, context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::LogicalPlanNode;

    struct NullStrategy;

    impl OptimizationStrategy for NullStrategy {
        fn name(&self) -> &'static str {
            "Null"
        }

        fn visit(&self, _node: &LogicalPlanNode, _context: &mut OptimizerContext) -> Result<()> {
            Ok(())
        }
    }

    fn two_node_plan() -> LogicalPlan {
        let mut plan = LogicalPlan::new();
        plan.add_node("scan", LogicalPlanNode::new(LogicalPlanStepType::Scan));
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "exit", None).expect("acyclic");
        plan
    }

    #[test]
    fn null_strategy_preserves_plan() {
        let plan = two_node_plan();
        let optimized = apply_strategy(&plan, &NullStrategy, QueryStatistics::new())
            .expect("traversal succeeds");
        assert_eq!(optimized.node_count(), 2);
    }

    #[test]
    fn disabled_optimizer_passes_through() {
        let optimizer = CostBasedOptimizer::new(QueryStatistics::new(), true);
        let plan = two_node_plan();
        let optimized = optimizer.optimize(plan).expect("pass-through succeeds");
        assert_eq!(optimized.node_count(), 2);
    }

    #[test]
    fn node_type_filter_finds_steps() {
        let plan = two_node_plan();
        let scans = get_nodes_of_type(&plan, &[LogicalPlanStepType::Scan]);
        assert_eq!(scans, vec!["scan".to_string()]);
    }
}
