//! Optimization Rule - Correlated Filters
//!
//! Goal: reduce rows.
//!
//! When two columns are equi-joined, the join key on one side can't take
//! values outside the other side's observed range. Where the source keeps
//! min/max statistics we synthesise range filters on the opposite leg and
//! attach them directly above that leg's readers, so fewer rows ever
//! reach the join.

use crate::errors::Result;
use crate::expression::{CompareOp, Node, NodeType};
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{random_nid, JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType, Nid};
use crate::statistics::QueryStatistics;

pub struct CorrelatedFiltersStrategy {
    statistics: QueryStatistics,
}

impl CorrelatedFiltersStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        CorrelatedFiltersStrategy { statistics }
    }
}

/// Bounds from `bounded`'s statistics become range filters on `target`.
fn write_filters(bounded: &Node, target: &Node) -> Vec<LogicalPlanNode> {
    let Some(column) = &bounded.schema_column else {
        return Vec::new();
    };
    let mut filters = Vec::new();
    if let Some(highest) = &column.highest_value {
        filters.push(LogicalPlanNode::filter(Node::comparison(
            CompareOp::LtEq,
            target.clone(),
            Node::literal(highest.clone()),
        )));
    }
    if let Some(lowest) = &column.lowest_value {
        filters.push(LogicalPlanNode::filter(Node::comparison(
            CompareOp::GtEq,
            target.clone(),
            Node::literal(lowest.clone()),
        )));
    }
    filters
}

/// Which leg's readers should receive this filter?
fn readers_for(filter: &LogicalPlanNode, join: &LogicalPlanNode) -> Vec<Nid> {
    let Some(target_relation) = filter.relations.iter().next() else {
        return Vec::new();
    };
    if join.left_relation_names.contains(target_relation) {
        join.left_readers.clone()
    } else if join.right_relation_names.contains(target_relation) {
        join.right_readers.clone()
    } else {
        Vec::new()
    }
}

impl OptimizationStrategy for CorrelatedFiltersStrategy {
    fn name(&self) -> &'static str {
        "CorrelatedFilters"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step != LogicalPlanStepType::Join
            || !matches!(
                node.join_type,
                Some(JoinType::Inner | JoinType::NestedInner)
            )
        {
            return Ok(());
        }
        let Some(on) = &node.on else {
            return Ok(());
        };
        // only the simple single-equality shape is handled
        if on.node_type != NodeType::ComparisonOperator
            || on.value.as_comparison() != Some(CompareOp::Eq)
        {
            return Ok(());
        }
        let (Some(left_column), Some(right_column)) = (on.left.as_deref(), on.right.as_deref())
        else {
            return Ok(());
        };
        if left_column.node_type != NodeType::Identifier
            || right_column.node_type != NodeType::Identifier
        {
            return Ok(());
        }
        // we need exactly two distinct relation sources
        let sources: std::collections::HashSet<&String> = left_column
            .source
            .iter()
            .chain(right_column.source.iter())
            .collect();
        if sources.len() != 2 {
            return Ok(());
        }

        let mut new_filters = write_filters(left_column, right_column);
        new_filters.extend(write_filters(right_column, left_column));

        for filter in new_filters {
            for reader_nid in readers_for(&filter, node) {
                if !context.optimized_plan.contains(&reader_nid) {
                    continue;
                }
                self.statistics
                    .increment("optimization_inner_join_correlated_filter", 1);
                context.optimized_plan.insert_node_after(
                    random_nid(),
                    filter.clone(),
                    &reader_nid,
                )?;
            }
        }
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Join]).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::apply_strategy;
    use crate::schema::SchemaColumn;
    use crate::value::{Value, ValueType};

    #[test]
    fn range_filters_attach_above_readers() {
        let planets_id = SchemaColumn::new("id", ValueType::Integer)
            .with_origin("$planets")
            .with_range(Value::Integer(1), Value::Integer(9));
        let satellites_planet_id = SchemaColumn::new("planetId", ValueType::Integer)
            .with_origin("$satellites")
            .with_range(Value::Integer(3), Value::Integer(9));

        let mut plan = LogicalPlan::new();
        let mut left_scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        left_scan.relation = Some("$satellites".to_string());
        plan.add_node("left_scan", left_scan);
        let mut right_scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        right_scan.relation = Some("$planets".to_string());
        plan.add_node("right_scan", right_scan);

        let mut join = LogicalPlanNode::new(LogicalPlanStepType::Join);
        join.join_type = Some(JoinType::Inner);
        join.on = Some(Node::comparison(
            CompareOp::Eq,
            Node::bound_identifier(satellites_planet_id),
            Node::bound_identifier(planets_id),
        ));
        join.left_relation_names = vec!["$satellites".to_string()];
        join.right_relation_names = vec!["$planets".to_string()];
        join.left_readers = vec!["left_scan".to_string()];
        join.right_readers = vec!["right_scan".to_string()];
        plan.add_node("join", join);
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("left_scan", "join", Some(crate::plan::JoinLeg::Left))
            .expect("acyclic");
        plan.add_edge("right_scan", "join", Some(crate::plan::JoinLeg::Right))
            .expect("acyclic");
        plan.add_edge("join", "exit", None).expect("acyclic");

        let strategy = CorrelatedFiltersStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");

        // each leg received the opposite leg's bounds as two filters
        let filters = get_nodes_of_type(&optimized, &[LogicalPlanStepType::Filter]);
        assert_eq!(filters.len(), 4);
        // the left scan's consumer is now a filter, not the join
        let consumer = optimized.outgoing_edges("left_scan")[0].1.clone();
        assert!(filters.contains(&consumer));
    }
}
