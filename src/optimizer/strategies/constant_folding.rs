//! Optimization Rule - Constant Folding
//!
//! Goal: evaluate once.
//!
//! Branches with no identifiers can be evaluated during optimization and
//! replaced with a literal, removing work from the execution phase. This
//! rule runs twice: once at the start of the pipeline for what the user
//! wrote, and again near the end for expressions other rewrites exposed.

use crate::errors::Result;
use crate::expression::{
    evaluator, AggregateFunction, BinaryOp, CompareOp, Node, NodeType, NodeValue, UnaryOp,
};
use crate::morsel::Morsel;
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;
use crate::value::Value;
use crate::{datasets, value::ValueType};

pub struct ConstantFoldingStrategy {
    statistics: QueryStatistics,
}

impl ConstantFoldingStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        ConstantFoldingStrategy { statistics }
    }
}

/// Wrap a surviving operand so it keeps the folded expression's output
/// column. Expressions with no name to preserve pass through unwrapped,
/// which keeps filter conditions splittable and lets `TRUE AND TRUE` fold
/// all the way down to a removable literal.
fn build_passthru(root: &Node, value: Node) -> Node {
    if root.node_type == NodeType::ComparisonOperator {
        return root.clone();
    }
    if root.schema_column.is_none() && root.alias.is_none() && root.query_column.is_none() {
        return value;
    }
    if value.node_type == NodeType::Literal {
        let mut literal = value;
        literal.schema_column = root.schema_column.clone();
        literal.query_column = root.query_column.clone();
        literal.alias = root.alias.clone();
        return literal;
    }
    let mut node = Node::function("PASSTHRU", vec![value]);
    node.schema_column = root.schema_column.clone();
    node.query_column = root.query_column.clone();
    node.value_type = root.value_type;
    node
}

fn build_if_not_null(root: &Node, probe: Node, replacement: Node) -> Node {
    let mut node = Node::function("IFNOTNULL", vec![probe, replacement]);
    node.schema_column = root.schema_column.clone();
    node.query_column = root.query_column.clone();
    node.value_type = root.value_type;
    node
}

fn build_literal(value: Value, root: &Node) -> Node {
    let value_type = root
        .schema_column
        .as_ref()
        .map(|c| c.value_type)
        .or(root.value_type)
        .unwrap_or_else(|| value.value_type());
    let mut node = Node::literal_typed(value, value_type);
    node.schema_column = root.schema_column.clone();
    node.alias = root.alias.clone();
    node.query_column = root.query_column.clone();
    node
}

fn literal_eq(node: &Node, expected: i64) -> bool {
    match node.value.as_literal() {
        Some(Value::Integer(i)) => *i == expected,
        Some(Value::Double(d)) => *d == expected as f64,
        _ => false,
    }
}

fn no_table() -> Morsel {
    datasets::read("$no_table").unwrap_or_default()
}

/// Strip NESTED wrappers from ORDER BY and GROUP BY entries.
fn unwrap_nesting(mut node: Node) -> Node {
    while node.node_type == NodeType::Nested {
        match node.centre {
            Some(inner) => node = *inner,
            None => break,
        }
    }
    node
}

pub fn fold_constants(mut root: Node, statistics: &QueryStatistics) -> Node {
    if root.node_type == NodeType::Literal {
        return root;
    }
    // CASE branches are not folded
    if root.node_type == NodeType::ExpressionList {
        return root;
    }

    if matches!(
        root.node_type,
        NodeType::ComparisonOperator | NodeType::BinaryOperator
    ) {
        if let Some(left) = root.left.take() {
            root.left = Some(Box::new(fold_constants(*left, statistics)));
        }
        if let Some(right) = root.right.take() {
            root.right = Some(Box::new(fold_constants(*right, statistics)));
        }

        if root.node_type == NodeType::BinaryOperator {
            if let Some(rewritten) = fold_arithmetic_identity(&root, statistics) {
                return rewritten;
            }
        }

        if root.node_type == NodeType::ComparisonOperator {
            // anything LIKE '%' is true for non null values
            let is_like = matches!(
                root.value.as_comparison(),
                Some(CompareOp::Like | CompareOp::ILike)
            );
            if is_like {
                let left_is_identifier = root
                    .left
                    .as_ref()
                    .is_some_and(|l| l.node_type == NodeType::Identifier);
                let right_is_all = root
                    .right
                    .as_ref()
                    .and_then(|r| r.value.as_literal())
                    .and_then(|v| v.as_str().map(|s| s == "%"))
                    .unwrap_or(false);
                if left_is_identifier && right_is_all {
                    if let Some(left) = root.left.take() {
                        let mut node = Node::unary(UnaryOp::IsNotNull, *left);
                        node.schema_column = root.schema_column.clone();
                        node.query_column = root.query_column.clone();
                        node.alias = root.alias.clone();
                        statistics.increment("optimization_constant_fold_reduce", 1);
                        return node;
                    }
                }
            }
        }
    }

    if matches!(root.node_type, NodeType::And | NodeType::Or | NodeType::Xor) {
        if let Some(left) = root.left.take() {
            root.left = Some(Box::new(fold_constants(*left, statistics)));
        }
        if let Some(right) = root.right.take() {
            root.right = Some(Box::new(fold_constants(*right, statistics)));
        }
        return fold_boolean_connective(root, statistics);
    }

    if root.has_non_deterministic_function() {
        // evaluated per row, never folded
        return root;
    }

    root.parameters = root
        .parameters
        .into_iter()
        .map(|p| fold_constants(p, statistics))
        .collect();

    // rewrite aggregations over constants
    if root.node_type == NodeType::Aggregator {
        if let NodeValue::Aggregate(func) = root.value {
            if root.parameters.len() == 1
                && root.parameters[0].node_type == NodeType::Literal
            {
                match func {
                    AggregateFunction::Count => {
                        // COUNT(literal) is the row count
                        root.parameters[0] = Node::wildcard();
                        statistics.increment("optimization_constant_aggregation", 1);
                        return root;
                    }
                    AggregateFunction::Avg
                    | AggregateFunction::Min
                    | AggregateFunction::Max => {
                        statistics.increment("optimization_constant_aggregation", 1);
                        let value = root.parameters[0]
                            .value
                            .as_literal()
                            .cloned()
                            .unwrap_or(Value::Null);
                        return build_literal(value, &root);
                    }
                    _ => {}
                }
            }
        }
    }

    let has_identifiers = !root.nodes_of_type(NodeType::Identifier).is_empty()
        || !root.nodes_of_type(NodeType::Wildcard).is_empty();
    let has_aggregators = root.has_aggregator();

    if !has_identifiers && !has_aggregators {
        let table = no_table();
        match evaluator::evaluate(&root, &table) {
            Ok(column) => {
                if let Some(value) = column.values.first() {
                    statistics.increment("optimization_constant_fold_expression", 1);
                    return build_literal(value.clone(), &root);
                }
            }
            Err(_) => {
                // whatever the reason, defer and leave the node unchanged
            }
        }
    }
    root
}

fn fold_arithmetic_identity(root: &Node, statistics: &QueryStatistics) -> Option<Node> {
    let op = root.value.as_binary()?;
    let left = root.left.as_deref()?;
    let right = root.right.as_deref()?;

    let left_literal = left.node_type == NodeType::Literal;
    let right_literal = right.node_type == NodeType::Literal;
    let left_identifier = left.node_type == NodeType::Identifier;
    let right_identifier = right.node_type == NodeType::Identifier;

    match op {
        BinaryOp::Multiply => {
            // 0 * x and x * 0 are 0 except for NULL inputs
            if left_literal && right_identifier && literal_eq(left, 0) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_if_not_null(
                    root,
                    right.clone(),
                    Node::literal(Value::Integer(0)),
                ));
            }
            if right_literal && left_identifier && literal_eq(right, 0) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_if_not_null(
                    root,
                    left.clone(),
                    Node::literal(Value::Integer(0)),
                ));
            }
            if left_literal && right_identifier && literal_eq(left, 1) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, right.clone()));
            }
            if right_literal && left_identifier && literal_eq(right, 1) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, left.clone()));
            }
        }
        BinaryOp::Plus => {
            if left_literal && right_identifier && literal_eq(left, 0) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, right.clone()));
            }
            if right_literal && left_identifier && literal_eq(right, 0) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, left.clone()));
            }
        }
        BinaryOp::Minus => {
            if right_literal && left_identifier && literal_eq(right, 0) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, left.clone()));
            }
        }
        BinaryOp::Divide => {
            if right_literal && left_identifier && literal_eq(right, 1) {
                statistics.increment("optimization_constant_fold_reduce", 1);
                return Some(build_passthru(root, left.clone()));
            }
        }
        _ => {}
    }
    None
}

fn fold_boolean_connective(root: Node, statistics: &QueryStatistics) -> Node {
    let (Some(left), Some(right)) = (root.left.clone(), root.right.clone()) else {
        return root;
    };
    let left_bool = left.value.as_literal().and_then(Value::as_bool);
    let right_bool = right.value.as_literal().and_then(Value::as_bool);

    let survivor = match root.node_type {
        // TRUE dominates OR, FALSE is its identity
        NodeType::Or => match (left_bool, right_bool) {
            (Some(true), _) => Some(left),
            (_, Some(true)) => Some(right),
            (Some(false), _) => Some(right),
            (_, Some(false)) => Some(left),
            _ => None,
        },
        // FALSE dominates AND, TRUE is its identity
        NodeType::And => match (left_bool, right_bool) {
            (Some(false), _) => Some(left),
            (_, Some(false)) => Some(right),
            (Some(true), _) => Some(right),
            (_, Some(true)) => Some(left),
            _ => None,
        },
        _ => None,
    };
    match survivor {
        Some(side) => {
            statistics.increment("optimization_constant_fold_boolean_reduce", 1);
            build_passthru(&root, *side)
        }
        None => root,
    }
}

impl OptimizationStrategy for ConstantFoldingStrategy {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        match node.step {
            LogicalPlanStepType::Filter => {
                let mut node = node.clone();
                if let Some(condition) = node.condition.take() {
                    let folded = fold_constants(condition, &self.statistics);
                    if folded.is_literal_true() {
                        context.optimized_plan.remove_node(&context.node_id, true)?;
                        return Ok(());
                    }
                    node.condition = Some(folded);
                }
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            LogicalPlanStepType::Project => {
                let mut node = node.clone();
                node.columns = node
                    .columns
                    .into_iter()
                    .map(|c| fold_constants(c, &self.statistics))
                    .collect();
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            LogicalPlanStepType::Order | LogicalPlanStepType::HeapSort => {
                let mut node = node.clone();
                node.order_by = node
                    .order_by
                    .into_iter()
                    .map(|(key, direction)| (unwrap_nesting(key), direction))
                    .collect();
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            LogicalPlanStepType::AggregateAndGroup => {
                let mut node = node.clone();
                node.groups = node
                    .groups
                    .into_iter()
                    .map(|group| fold_constants(unwrap_nesting(group), &self.statistics))
                    .collect();
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            _ => {}
        }
        Ok(())
    }
}
