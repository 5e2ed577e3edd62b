//! Optimization Rule - Predicate Ordering
//!
//! Goal: faster execution.
//!
//! Orders the conditions inside a flattened filter chain so the cheapest
//! comparisons run first, using per-type cost estimates for a basic
//! comparison. This doesn't yet account for selectivity, or for complex
//! ORed sub-conditions, so a pathological ordering is still possible; the
//! estimates only consider the operand type.

use crate::errors::Result;
use crate::expression::operator_map::comparison_cost;
use crate::expression::{Node, NodeType};
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;
use crate::value::ValueType;

pub struct PredicateOrderingStrategy {
    statistics: QueryStatistics,
}

impl PredicateOrderingStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        PredicateOrderingStrategy { statistics }
    }
}

fn predicate_cost(predicate: &Node) -> f64 {
    let value_type = predicate
        .left
        .as_ref()
        .and_then(|left| left.schema_column.as_ref())
        .map_or(ValueType::Missing, |column| column.value_type);
    comparison_cost(value_type)
}

/// Stable sort cheapest-first; returns whether anything moved.
pub fn order_predicates(predicates: &mut Vec<Node>) -> bool {
    let mut indexed: Vec<(f64, usize)> = predicates
        .iter()
        .enumerate()
        .map(|(i, p)| (predicate_cost(p), i))
        .collect();
    indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let changed = indexed.iter().enumerate().any(|(position, (_, original))| {
        position > 0 && indexed[position - 1].1 > *original
    });
    let reordered: Vec<Node> = indexed
        .into_iter()
        .map(|(_, i)| predicates[i].clone())
        .collect();
    *predicates = reordered;
    changed
}

impl OptimizationStrategy for PredicateOrderingStrategy {
    fn name(&self) -> &'static str {
        "PredicateOrdering"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step != LogicalPlanStepType::Filter {
            return Ok(());
        }
        let Some(condition) = &node.condition else {
            return Ok(());
        };
        if condition.node_type != NodeType::Dnf {
            return Ok(());
        }
        let mut node = node.clone();
        let mut condition = condition.clone();
        if order_predicates(&mut condition.parameters) {
            self.statistics
                .increment("optimization_cost_based_predicate_ordering", 1);
        }
        node.condition = Some(condition);
        context
            .optimized_plan
            .add_node(context.node_id.clone(), node);
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Filter]).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::CompareOp;
    use crate::schema::SchemaColumn;
    use crate::value::Value;

    fn typed_predicate(value_type: ValueType) -> Node {
        Node::comparison(
            CompareOp::Eq,
            Node::bound_identifier(SchemaColumn::new("c", value_type)),
            Node::literal(Value::Integer(0)),
        )
    }

    #[test]
    fn cheap_comparisons_move_to_the_front() {
        let mut predicates = vec![
            typed_predicate(ValueType::Varchar),
            typed_predicate(ValueType::Integer),
            typed_predicate(ValueType::Boolean),
        ];
        let changed = order_predicates(&mut predicates);
        assert!(changed);
        let types: Vec<ValueType> = predicates
            .iter()
            .map(|p| {
                p.left
                    .as_ref()
                    .and_then(|l| l.schema_column.as_ref())
                    .map(|c| c.value_type)
                    .expect("typed predicate")
            })
            .collect();
        assert_eq!(
            types,
            vec![ValueType::Integer, ValueType::Boolean, ValueType::Varchar]
        );
    }

    #[test]
    fn already_ordered_predicates_report_no_change() {
        let mut predicates = vec![
            typed_predicate(ValueType::Integer),
            typed_predicate(ValueType::Varchar),
        ];
        assert!(!order_predicates(&mut predicates));
    }
}
