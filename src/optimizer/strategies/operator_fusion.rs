//! Optimization Rule - Operator Fusion
//!
//! Goal: choose more efficient physical implementations.
//!
//! 'Fused' operators are physical operations performing multiple logical
//! operations. An ORDER BY whose only consumer is a LIMIT without offset
//! becomes a single HEAPSORT, which keeps only the top-K rows instead of
//! sorting everything. The pushdown rules fuse in their own way too,
//! folding filters and column selection into reads and join conditions.

use crate::errors::Result;
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct OperatorFusionStrategy {
    statistics: QueryStatistics,
}

impl OperatorFusionStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        OperatorFusionStrategy { statistics }
    }
}

impl OptimizationStrategy for OperatorFusionStrategy {
    fn name(&self) -> &'static str {
        "OperatorFusion"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step != LogicalPlanStepType::Order {
            return Ok(());
        }
        let consumers = context.optimized_plan.outgoing_edges(&context.node_id);
        if consumers.len() != 1 {
            return Ok(());
        }
        let consumer_nid = consumers[0].1.clone();
        let Some(consumer) = context.optimized_plan.get(&consumer_nid) else {
            return Ok(());
        };
        if consumer.step == LogicalPlanStepType::Limit && consumer.offset.is_none() {
            let mut fused = LogicalPlanNode::new(LogicalPlanStepType::HeapSort);
            fused.limit = consumer.limit;
            fused.order_by = node.order_by.clone();
            fused.all_relations = node.all_relations.clone();
            context.optimized_plan.add_node(consumer_nid, fused);
            context.optimized_plan.remove_node(&context.node_id, true)?;
            self.statistics
                .increment("optimization_fuse_operators_heap_sort", 1);
        }
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Order]).is_empty()
    }
}
