//! Optimization Rule - Predicate Flattening
//!
//! Goal: fewer operations.
//!
//! After pushdown has settled each filter's final position, chains of
//! adjacent filters are merged into a single filtering step holding the
//! ANDed conditions, so one operator makes one pass over each morsel. The
//! cost-based ordering rule then arranges the merged conditions.

use crate::errors::Result;
use crate::expression::Node;
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{random_nid, LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct PredicateFlatteningStrategy {
    statistics: QueryStatistics,
}

impl PredicateFlatteningStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        PredicateFlatteningStrategy { statistics }
    }

    fn flush(&self, context: &mut OptimizerContext) -> Result<()> {
        let collected = std::mem::take(&mut context.collected_predicates);
        if collected.len() < 2 {
            return Ok(());
        }

        let mut merged = LogicalPlanNode::new(LogicalPlanStepType::Filter);
        let mut conditions = Vec::new();
        for predicate in &collected {
            if let Some(condition) = &predicate.condition {
                conditions.push(condition.clone());
            }
            merged.columns.extend(predicate.columns.iter().cloned());
            merged.relations.extend(predicate.relations.iter().cloned());
            merged
                .all_relations
                .extend(predicate.all_relations.iter().cloned());
            self.statistics.increment("optimization_flatten_filters", 1);
        }
        merged.condition = Some(Node::dnf(conditions));

        // the chain is contiguous, so removing every member and inserting
        // the merged filter above the current node is position-preserving
        for predicate in &collected {
            if let Some(nid) = &predicate.nid {
                context.optimized_plan.remove_node(nid, true)?;
            }
        }
        context
            .optimized_plan
            .insert_node_after(random_nid(), merged, &context.node_id)?;
        Ok(())
    }
}

impl OptimizationStrategy for PredicateFlatteningStrategy {
    fn name(&self) -> &'static str {
        "PredicateFlatten"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step == LogicalPlanStepType::Filter {
            let mut node = node.clone();
            node.nid = Some(context.node_id.clone());
            context.collected_predicates.push(node);
            return Ok(());
        }
        if !context.collected_predicates.is_empty() {
            self.flush(context)?;
        }
        Ok(())
    }

    fn complete(&self, mut context: OptimizerContext) -> Result<LogicalPlan> {
        context.collected_predicates.clear();
        Ok(context.optimized_plan)
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        get_nodes_of_type(plan, &[LogicalPlanStepType::Filter]).len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{CompareOp, NodeType};
    use crate::optimizer::apply_strategy;
    use crate::schema::SchemaColumn;
    use crate::value::{Value, ValueType};

    fn predicate(value: i64) -> Node {
        Node::comparison(
            CompareOp::NotEq,
            Node::bound_identifier(SchemaColumn::new("id", ValueType::Integer)),
            Node::literal(Value::Integer(value)),
        )
    }

    #[test]
    fn adjacent_filters_merge_into_one_dnf_filter() {
        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        plan.add_node("scan", scan);
        plan.add_node("f1", LogicalPlanNode::filter(predicate(9)));
        plan.add_node("f2", LogicalPlanNode::filter(predicate(8)));
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "f1", None).expect("acyclic");
        plan.add_edge("f1", "f2", None).expect("acyclic");
        plan.add_edge("f2", "exit", None).expect("acyclic");

        let strategy = PredicateFlatteningStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");

        let filters = get_nodes_of_type(&optimized, &[LogicalPlanStepType::Filter]);
        assert_eq!(filters.len(), 1);
        let merged = optimized.get(&filters[0]).expect("merged filter");
        let condition = merged.condition.as_ref().expect("condition present");
        assert_eq!(condition.node_type, NodeType::Dnf);
        assert_eq!(condition.parameters.len(), 2);
    }

    #[test]
    fn lone_filters_are_left_alone() {
        let mut plan = LogicalPlan::new();
        plan.add_node("scan", LogicalPlanNode::new(LogicalPlanStepType::Scan));
        plan.add_node("f1", LogicalPlanNode::filter(predicate(9)));
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "f1", None).expect("acyclic");
        plan.add_edge("f1", "exit", None).expect("acyclic");

        let strategy = PredicateFlatteningStrategy::new(QueryStatistics::new());
        assert!(!strategy.should_i_run(&plan));
    }
}
