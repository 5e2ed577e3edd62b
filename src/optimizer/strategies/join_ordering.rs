//! Optimization Rule - Join Ordering
//!
//! Goal: faster joins.
//!
//! Tiny build sides don't justify building a hash table, so inner joins
//! whose smaller leg is estimated under a thousand rows run as nested
//! loop joins instead. Full join-order enumeration is a future extension;
//! today the planner's left-deep order stands.

use crate::errors::Result;
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

const NESTED_LOOP_THRESHOLD: usize = 1000;

pub struct JoinOrderingStrategy {
    statistics: QueryStatistics,
}

impl JoinOrderingStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        JoinOrderingStrategy { statistics }
    }
}

impl OptimizationStrategy for JoinOrderingStrategy {
    fn name(&self) -> &'static str {
        "JoinOrdering"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step == LogicalPlanStepType::Join && node.join_type == Some(JoinType::Inner) {
            if let (Some(left_size), Some(right_size)) = (node.left_size, node.right_size) {
                if left_size.min(right_size) < NESTED_LOOP_THRESHOLD {
                    let mut node = node.clone();
                    node.join_type = Some(JoinType::NestedInner);
                    self.statistics
                        .increment("optimization_join_ordering_nested_loop", 1);
                    context
                        .optimized_plan
                        .add_node(context.node_id.clone(), node);
                }
            }
        }
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Join]).is_empty()
    }
}
