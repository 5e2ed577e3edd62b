//! Optimization Rule - Empty Table Elimination
//!
//! Goal: replace FILTER(FALSE) and its subtree with an empty data source.
//!
//! When predicate compaction or constant folding discovers a
//! contradiction, the plan is left with a filter whose condition is the
//! FALSE literal. Rather than executing the whole subtree below it and
//! then discarding every row, the filter and its subtree are replaced by
//! a FunctionDataset emitting an empty table with the same columns.
//!
//! During `visit` the FALSE filters are only recorded; the graph surgery
//! happens in `complete` where the traversal can no longer be disturbed.

use crate::errors::Result;
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType, Nid};
use crate::schema::SchemaColumn;
use crate::statistics::QueryStatistics;

pub struct EmptyTableStrategy {
    statistics: QueryStatistics,
}

impl EmptyTableStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        EmptyTableStrategy { statistics }
    }
}

fn is_false_filter(node: &LogicalPlanNode) -> bool {
    node.step == LogicalPlanStepType::Filter
        && node.condition.as_ref().is_some_and(|c| c.is_literal_false())
}

/// Every node reachable downwards (producer side) from `nid`.
fn collect_descendants(plan: &LogicalPlan, nid: &str) -> Vec<Nid> {
    let mut descendants = Vec::new();
    let mut stack: Vec<Nid> = plan
        .ingoing_edges(nid)
        .into_iter()
        .map(|(source, _, _)| source)
        .collect();
    while let Some(current) = stack.pop() {
        if descendants.contains(&current) {
            continue;
        }
        stack.extend(
            plan.ingoing_edges(&current)
                .into_iter()
                .map(|(source, _, _)| source),
        );
        descendants.push(current);
    }
    descendants
}

impl OptimizationStrategy for EmptyTableStrategy {
    fn name(&self) -> &'static str {
        "EmptyTable"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if is_false_filter(node) {
            context.false_filters.push(context.node_id.clone());
        }
        Ok(())
    }

    fn complete(&self, mut context: OptimizerContext) -> Result<LogicalPlan> {
        for filter_nid in context.false_filters.clone() {
            if !context.optimized_plan.contains(&filter_nid) {
                continue;
            }
            let descendants = collect_descendants(&context.optimized_plan, &filter_nid);

            // the empty replacement carries the columns the removed scans
            // were bound to, so operators above still resolve
            let mut schema_columns: Vec<SchemaColumn> = Vec::new();
            for nid in &descendants {
                if let Some(node) = context.optimized_plan.get(nid) {
                    if matches!(
                        node.step,
                        LogicalPlanStepType::Scan | LogicalPlanStepType::FunctionDataset
                    ) {
                        schema_columns.extend(
                            node.columns
                                .iter()
                                .filter_map(|c| c.schema_column.clone()),
                        );
                    }
                }
            }

            for nid in descendants {
                context.optimized_plan.remove_node(&nid, false)?;
            }

            let mut replacement = LogicalPlanNode::new(LogicalPlanStepType::FunctionDataset);
            replacement.function = Some("EMPTY".to_string());
            replacement.columns = schema_columns
                .into_iter()
                .map(crate::expression::Node::bound_identifier)
                .collect();
            context.optimized_plan.add_node(filter_nid, replacement);
            self.statistics
                .increment("optimization_empty_table_elimination", 1);
        }
        Ok(context.optimized_plan)
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        plan.nodes().any(|(_, node)| is_false_filter(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Node;
    use crate::optimizer::apply_strategy;
    use crate::value::Value;

    #[test]
    fn false_filter_subtree_collapses_to_empty_dataset() {
        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        plan.add_node("scan", scan);
        plan.add_node(
            "filter",
            LogicalPlanNode::filter(Node::literal(Value::Boolean(false))),
        );
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "filter", None).expect("acyclic");
        plan.add_edge("filter", "exit", None).expect("acyclic");

        let strategy = EmptyTableStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");

        assert!(!optimized.contains("scan"));
        let replacement = optimized.get("filter").expect("replacement in place");
        assert_eq!(replacement.step, LogicalPlanStepType::FunctionDataset);
        assert_eq!(replacement.function.as_deref(), Some("EMPTY"));
    }

    #[test]
    fn true_filters_are_untouched() {
        let mut plan = LogicalPlan::new();
        plan.add_node("scan", LogicalPlanNode::new(LogicalPlanStepType::Scan));
        plan.add_node(
            "filter",
            LogicalPlanNode::filter(Node::literal(Value::Boolean(true))),
        );
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "filter", None).expect("acyclic");
        plan.add_edge("filter", "exit", None).expect("acyclic");

        let strategy = EmptyTableStrategy::new(QueryStatistics::new());
        assert!(!strategy.should_i_run(&plan));
    }
}
