//! Optimization Rule - Distinct Pushdown
//!
//! Goal: reduce rows.
//!
//! A very specific rule: on a CROSS JOIN UNNEST, if the unnested column is
//! the only thing a DISTINCT above it needs, the distinct is folded into
//! the unnest, which then emits each element value once. Written as an
//! optimization rule rather than in the join code as other instances of
//! pushing DISTINCT are expected.
//!
//! Must run after projection pushdown, which records each node's
//! `pre_update_columns`.

use crate::errors::Result;
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct DistinctPushdownStrategy {
    statistics: QueryStatistics,
}

impl DistinctPushdownStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        DistinctPushdownStrategy { statistics }
    }
}

impl OptimizationStrategy for DistinctPushdownStrategy {
    fn name(&self) -> &'static str {
        "DistinctPushdown"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step == LogicalPlanStepType::Distinct && node.distinct_on.is_none() {
            let mut node = node.clone();
            node.nid = Some(context.node_id.clone());
            context.collected_distincts.push(node);
            return Ok(());
        }

        if node.step == LogicalPlanStepType::Unnest && !context.collected_distincts.is_empty() {
            let target_identity = node
                .unnest_target
                .as_ref()
                .map(|c| c.identity.clone())
                .unwrap_or_default();
            // only when the DISTINCT needs the unnested column and nothing
            // else: the distinct then applies to the expanded values, so
            // the cross join builds smaller intermediate tables
            if node.pre_update_columns.len() == 1
                && node.pre_update_columns.contains(&target_identity)
            {
                let mut node = node.clone();
                node.distinct = true;
                context
                    .optimized_plan
                    .add_node(context.node_id.clone(), node);
                for distinct in std::mem::take(&mut context.collected_distincts) {
                    if let Some(nid) = &distinct.nid {
                        self.statistics.increment(
                            "optimization_distinct_pushdown_into_cross_join_unnest",
                            1,
                        );
                        context.optimized_plan.remove_node(nid, true)?;
                    }
                }
                return Ok(());
            }
        }

        if matches!(
            node.step,
            LogicalPlanStepType::Aggregate
                | LogicalPlanStepType::AggregateAndGroup
                | LogicalPlanStepType::Join
                | LogicalPlanStepType::Limit
                | LogicalPlanStepType::Scan
                | LogicalPlanStepType::Subquery
                | LogicalPlanStepType::Union
                | LogicalPlanStepType::Unnest
        ) {
            // we don't push past here
            context.collected_distincts.clear();
        }

        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Distinct]).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Node;
    use crate::optimizer::apply_strategy;
    use crate::schema::SchemaColumn;
    use crate::value::ValueType;

    #[test]
    fn distinct_on_unnest_target_folds_into_unnest() {
        let target = SchemaColumn::new("m", ValueType::Varchar);
        let mut unnest = LogicalPlanNode::new(LogicalPlanStepType::Unnest);
        unnest.unnest_column = Some(Node::identifier(
            "missions",
            Some("$astronauts".to_string()),
        ));
        unnest.pre_update_columns = [target.identity.clone()].into_iter().collect();
        unnest.unnest_target = Some(target);

        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$astronauts".to_string());
        plan.add_node("scan", scan);
        plan.add_node("unnest", unnest);
        plan.add_node(
            "distinct",
            LogicalPlanNode::new(LogicalPlanStepType::Distinct),
        );
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "unnest", None).expect("acyclic");
        plan.add_edge("unnest", "distinct", None).expect("acyclic");
        plan.add_edge("distinct", "exit", None).expect("acyclic");

        let strategy = DistinctPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");

        assert!(!optimized.contains("distinct"));
        assert!(optimized.get("unnest").expect("unnest survives").distinct);
    }

    #[test]
    fn distinct_does_not_cross_joins() {
        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        plan.add_node("scan", scan);
        let mut join = LogicalPlanNode::new(LogicalPlanStepType::Join);
        join.join_type = Some(crate::plan::JoinType::CrossJoin);
        plan.add_node("join", join);
        plan.add_node(
            "distinct",
            LogicalPlanNode::new(LogicalPlanStepType::Distinct),
        );
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "join", None).expect("acyclic");
        plan.add_edge("join", "distinct", None).expect("acyclic");
        plan.add_edge("distinct", "exit", None).expect("acyclic");

        let strategy = DistinctPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");
        assert!(optimized.contains("distinct"));
    }
}
