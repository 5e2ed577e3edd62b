//! Optimization Rule - Boolean Simplification
//!
//! Goal: preposition for following actions.
//!
//! Rewrites boolean expressions into forms other strategies can act on,
//! chiefly long AND chains which predicate pushdown can split and move:
//!
//! - De Morgan, binary and n-ary: `NOT (A OR B OR ...)` becomes
//!   `(NOT A) AND (NOT B) AND ...`
//! - De Morgan for IN lists: `NOT (col IN (a, b))` becomes
//!   `col != a AND col != b`
//! - Inversion: `NOT (A = B)` becomes `A != B`, via the closed table
//! - Double negation: `NOT NOT A` becomes `A`
//! - `A AND TRUE` => `A`, `A AND FALSE` => `FALSE`, `A OR TRUE` => `TRUE`,
//!   `A OR FALSE` => `A`
//! - AND chains longer than two are flattened with literal duplicates
//!   (same expression id) removed

use crate::errors::Result;
use crate::expression::{CompareOp, Node, NodeType};
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;
use crate::value::Value;

pub struct BooleanSimplificationStrategy {
    statistics: QueryStatistics,
}

impl BooleanSimplificationStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        BooleanSimplificationStrategy { statistics }
    }
}

fn flatten_chain(node: Node, node_type: NodeType, out: &mut Vec<Node>) {
    if node.node_type == node_type {
        if let Some(left) = node.left {
            flatten_chain(*left, node_type, out);
        }
        if let Some(right) = node.right {
            flatten_chain(*right, node_type, out);
        }
    } else {
        out.push(node);
    }
}

fn rebuild_and_chain(mut conditions: Vec<Node>) -> Node {
    let mut result = conditions.remove(0);
    for condition in conditions {
        result = Node::and(result, condition);
    }
    result
}

pub fn update_expression_tree(node: Node, statistics: &QueryStatistics) -> Node {
    // break out of nests
    if node.node_type == NodeType::Nested {
        if let Some(inner) = node.centre {
            return update_expression_tree(*inner, statistics);
        }
        return node;
    }

    if node.node_type == NodeType::Not {
        let Some(mut centre) = node.centre.clone().map(|c| *c) else {
            return node;
        };
        if centre.node_type == NodeType::Nested {
            if let Some(inner) = centre.centre {
                centre = *inner;
            }
        }

        // NOT (A OR B OR ...) => (NOT A) AND (NOT B) AND ...
        if centre.node_type == NodeType::Or {
            let mut or_conditions = Vec::new();
            flatten_chain(centre.clone(), NodeType::Or, &mut or_conditions);
            if or_conditions.len() >= 2 {
                if or_conditions.len() > 2 {
                    statistics.increment("optimization_boolean_rewrite_demorgan_nary", 1);
                } else {
                    statistics.increment("optimization_boolean_rewrite_demorgan", 1);
                }
                let negated: Vec<Node> = or_conditions.into_iter().map(Node::not).collect();
                return update_expression_tree(rebuild_and_chain(negated), statistics);
            }
        }

        // NOT (A = B) => A != B
        if let Some(op) = centre.value.as_comparison() {
            if let Some(inverse) = op.inverse() {
                statistics.increment("optimization_boolean_rewrite_inversion", 1);
                let mut inverted = centre;
                inverted.value = crate::expression::NodeValue::Comparison(inverse);
                return update_expression_tree(inverted, statistics);
            }

            // NOT (col IN (a, b, ...)) => col != a AND col != b AND ...
            if op == CompareOp::InList {
                if let Some(Value::Array(items)) = centre
                    .right
                    .as_ref()
                    .and_then(|r| r.value.as_literal())
                    .cloned()
                {
                    if items.len() > 1 {
                        if let Some(column) = centre.left.clone().map(|l| *l) {
                            statistics.increment(
                                "optimization_boolean_rewrite_demorgan_in_expansion",
                                1,
                            );
                            let predicates: Vec<Node> = items
                                .into_iter()
                                .map(|item| {
                                    Node::comparison(
                                        CompareOp::NotEq,
                                        column.clone(),
                                        Node::literal(item),
                                    )
                                })
                                .collect();
                            return update_expression_tree(
                                rebuild_and_chain(predicates),
                                statistics,
                            );
                        }
                    }
                }
            }
        }

        // NOT (NOT A) => A
        if centre.node_type == NodeType::Not {
            statistics.increment("optimization_boolean_rewrite_double_not", 1);
            if let Some(inner) = centre.centre {
                return update_expression_tree(*inner, statistics);
            }
        }
    }

    // traverse the expression tree
    let mut node = node;
    node.left = node
        .left
        .map(|n| Box::new(update_expression_tree(*n, statistics)));
    node.centre = node
        .centre
        .map(|n| Box::new(update_expression_tree(*n, statistics)));
    node.right = node
        .right
        .map(|n| Box::new(update_expression_tree(*n, statistics)));
    node.parameters = node
        .parameters
        .into_iter()
        .map(|p| update_expression_tree(p, statistics))
        .collect();

    if node.node_type == NodeType::And {
        if let (Some(left), Some(right)) = (node.left.clone(), node.right.clone()) {
            if right.is_literal_true() {
                statistics.increment("optimization_boolean_rewrite_and_true", 1);
                return *left;
            }
            if left.is_literal_true() {
                statistics.increment("optimization_boolean_rewrite_and_true", 1);
                return *right;
            }
            if right.is_literal_false() {
                statistics.increment("optimization_boolean_rewrite_and_false", 1);
                return *right;
            }
            if left.is_literal_false() {
                statistics.increment("optimization_boolean_rewrite_and_false", 1);
                return *left;
            }
        }

        // flatten chains longer than two, removing duplicate conjuncts
        let mut conditions = Vec::new();
        flatten_chain(node.clone(), NodeType::And, &mut conditions);
        if conditions.len() > 2 {
            let mut unique: Vec<Node> = Vec::new();
            for condition in conditions.iter() {
                if unique.iter().any(|existing| existing.uuid == condition.uuid) {
                    statistics.increment("optimization_boolean_rewrite_and_redundant", 1);
                } else {
                    unique.push(condition.clone());
                }
            }
            if unique.len() < conditions.len() || unique.len() > 2 {
                statistics.increment("optimization_boolean_rewrite_and_flatten", 1);
                return rebuild_and_chain(unique);
            }
        }
    }

    node
}

impl OptimizationStrategy for BooleanSimplificationStrategy {
    fn name(&self) -> &'static str {
        "BooleanSimplification"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step == LogicalPlanStepType::Filter {
            let mut node = node.clone();
            if let Some(condition) = node.condition.take() {
                node.condition = Some(update_expression_tree(condition, &self.statistics));
            }
            context.optimized_plan.add_node(context.node_id.clone(), node);
        }
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(plan, &[LogicalPlanStepType::Filter]).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;
    use crate::value::ValueType;

    fn id_column() -> Node {
        Node::bound_identifier(SchemaColumn::new("id", ValueType::Integer))
    }

    #[test]
    fn not_over_or_becomes_and_of_nots() {
        // NOT (id = 9 OR id = 8) => id != 9 AND id != 8
        let expr = Node::not(Node::or(
            Node::comparison(CompareOp::Eq, id_column(), Node::literal(Value::Integer(9))),
            Node::comparison(CompareOp::Eq, id_column(), Node::literal(Value::Integer(8))),
        ));
        let rewritten = update_expression_tree(expr, &QueryStatistics::new());
        assert_eq!(rewritten.node_type, NodeType::And);
        let left = rewritten.left.expect("AND left");
        let right = rewritten.right.expect("AND right");
        assert_eq!(left.value.as_comparison(), Some(CompareOp::NotEq));
        assert_eq!(right.value.as_comparison(), Some(CompareOp::NotEq));
    }

    #[test]
    fn double_negation_cancels() {
        let inner = Node::comparison(CompareOp::Gt, id_column(), Node::literal(Value::Integer(1)));
        let expr = Node::not(Node::not(inner.clone()));
        let rewritten = update_expression_tree(expr, &QueryStatistics::new());
        assert_eq!(rewritten.value.as_comparison(), Some(CompareOp::Gt));
    }

    #[test]
    fn not_in_list_expands() {
        let expr = Node::not(Node::comparison(
            CompareOp::InList,
            id_column(),
            Node::literal(Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ])),
        ));
        let rewritten = update_expression_tree(expr, &QueryStatistics::new());
        let mut conjuncts = Vec::new();
        flatten_chain(rewritten, NodeType::And, &mut conjuncts);
        assert_eq!(conjuncts.len(), 3);
        assert!(conjuncts
            .iter()
            .all(|c| c.value.as_comparison() == Some(CompareOp::NotEq)));
    }

    #[test]
    fn duplicate_conjuncts_removed_from_long_chains() {
        let a = Node::comparison(CompareOp::Gt, id_column(), Node::literal(Value::Integer(1)));
        let b = Node::comparison(CompareOp::Lt, id_column(), Node::literal(Value::Integer(9)));
        let chain = Node::and(Node::and(a.clone(), b), a.clone());
        let rewritten = update_expression_tree(chain, &QueryStatistics::new());
        let mut conjuncts = Vec::new();
        flatten_chain(rewritten, NodeType::And, &mut conjuncts);
        assert_eq!(conjuncts.len(), 2);
    }

    #[test]
    fn and_true_is_identity() {
        let a = Node::comparison(CompareOp::Gt, id_column(), Node::literal(Value::Integer(1)));
        let expr = Node::and(a.clone(), Node::literal(Value::Boolean(true)));
        let rewritten = update_expression_tree(expr, &QueryStatistics::new());
        assert_eq!(rewritten.uuid, a.uuid);
    }
}
