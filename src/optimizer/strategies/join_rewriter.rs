//! Optimization Rule - Join Rewriter
//!
//! Goal: faster joins.
//!
//! Collects LEFT OUTER JOINs and the filters above them as the plan is
//! traversed; patterns that would allow a rewrite (a filter on the
//! preserved side implying INNER, IS NULL implying ANTI, IS NOT NULL
//! implying SEMI) are recognised and logged. The rewrites themselves are
//! not performed yet; this is the recognised extension point.

use tracing::warn;

use crate::errors::Result;
use crate::expression::{CompareOp, NodeValue, UnaryOp};
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct JoinRewriteStrategy {
    statistics: QueryStatistics,
}

impl JoinRewriteStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        JoinRewriteStrategy { statistics }
    }
}

impl OptimizationStrategy for JoinRewriteStrategy {
    fn name(&self) -> &'static str {
        "JoinRewriter"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step == LogicalPlanStepType::Filter {
            context.collected_predicates.push(node.clone());
        }
        if node.step == LogicalPlanStepType::Join
            && node.join_type == Some(JoinType::LeftOuter)
        {
            context.collected_joins.push(node.clone());
        }
        Ok(())
    }

    fn complete(&self, context: OptimizerContext) -> Result<LogicalPlan> {
        for join in &context.collected_joins {
            for predicate in &context.collected_predicates {
                let Some(condition) = &predicate.condition else {
                    continue;
                };
                let touches_left = join
                    .left_relation_names
                    .iter()
                    .any(|name| predicate.all_relations.contains(name));
                if !touches_left {
                    continue;
                }
                match &condition.value {
                    NodeValue::Comparison(
                        CompareOp::Eq
                        | CompareOp::Gt
                        | CompareOp::Lt
                        | CompareOp::GtEq
                        | CompareOp::LtEq,
                    ) => {
                        self.statistics
                            .increment("optimization_join_rewriter_candidate", 1);
                        warn!("LEFT OUTER JOIN -> INNER JOIN rewriter not implemented");
                    }
                    NodeValue::Unary(UnaryOp::IsNull) => {
                        self.statistics
                            .increment("optimization_join_rewriter_candidate", 1);
                        warn!("LEFT OUTER JOIN -> ANTI JOIN rewriter not implemented");
                    }
                    NodeValue::Unary(UnaryOp::IsNotNull) => {
                        self.statistics
                            .increment("optimization_join_rewriter_candidate", 1);
                        warn!("LEFT OUTER JOIN -> SEMI JOIN rewriter not implemented");
                    }
                    _ => {}
                }
            }
        }
        Ok(context.optimized_plan)
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Join]).is_empty()
    }
}
