//! Optimization Rule - Predicate Rewriter
//!
//! Goal: choose more efficient predicate evaluations.
//!
//! Local rewrites to faster forms, even when the result can't be pushed:
//! LIKE patterns without wildcards become equality checks, `%literal%`
//! patterns become substring searches, single-element IN lists become
//! equalities, `= ANY(array)` becomes IN, interval comparisons are
//! reordered into timestamp comparisons, and `CASE WHEN x IS NULL THEN y
//! ELSE x END` collapses to `IFNULL(x, y)`.

use regex::Regex;

use crate::errors::Result;
use crate::expression::operator_map::determine_type;
use crate::expression::{BinaryOp, CompareOp, Node, NodeType, NodeValue, UnaryOp};
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;
use crate::value::{Value, ValueType};

pub struct PredicateRewriteStrategy {
    statistics: QueryStatistics,
}

impl PredicateRewriteStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        PredicateRewriteStrategy { statistics }
    }
}

fn in_rewrite(op: CompareOp) -> Option<CompareOp> {
    match op {
        CompareOp::InList => Some(CompareOp::Eq),
        CompareOp::NotInList => Some(CompareOp::NotEq),
        _ => None,
    }
}

fn like_rewrite(op: CompareOp) -> Option<CompareOp> {
    match op {
        CompareOp::Like => Some(CompareOp::Eq),
        CompareOp::NotLike => Some(CompareOp::NotEq),
        _ => None,
    }
}

fn instr_rewrite(op: CompareOp) -> Option<CompareOp> {
    match op {
        CompareOp::Like => Some(CompareOp::InStr),
        CompareOp::NotLike => Some(CompareOp::NotInStr),
        CompareOp::ILike => Some(CompareOp::IInStr),
        CompareOp::NotILike => Some(CompareOp::NotIInStr),
        _ => None,
    }
}

/// Rewrite IN conditions with a single value to equality conditions.
fn rewrite_in_to_eq(mut predicate: Node, op: CompareOp) -> Node {
    predicate.value = NodeValue::Comparison(in_rewrite(op).unwrap_or(op));
    if let Some(right) = predicate.right.as_mut() {
        if let Some(Value::Array(items)) = right.value.as_literal().cloned() {
            if let Some(single) = items.into_iter().next() {
                right.value_type = Some(single.value_type());
                right.value = NodeValue::Literal(single);
            }
        }
    }
    predicate
}

/// Rewrite `end - start > interval` as `start + interval > end`: comparing
/// two timestamps is cheaper than comparing two intervals.
fn reorder_interval_calc(mut predicate: Node) -> Node {
    let Some(difference) = predicate.left.take() else {
        return predicate;
    };
    if difference.value.as_binary() != Some(BinaryOp::Minus) {
        predicate.left = Some(difference);
        return predicate;
    }
    let Some(interval) = predicate.right.take() else {
        predicate.left = Some(difference);
        return predicate;
    };
    let (Some(date_end), Some(date_start)) = (difference.left, difference.right) else {
        return predicate;
    };

    let mut shifted = Node::binary(BinaryOp::Plus, *date_start, *interval);
    shifted.value_type = Some(ValueType::Timestamp);
    predicate.left = Some(date_end);
    predicate.right = Some(Box::new(shifted));
    predicate.value_type = Some(ValueType::Boolean);
    predicate
}

fn rewrite_predicate(mut predicate: Node, statistics: &QueryStatistics) -> Node {
    if matches!(predicate.node_type, NodeType::And | NodeType::Or | NodeType::Xor) {
        predicate.left = predicate
            .left
            .map(|n| Box::new(rewrite_predicate(*n, statistics)));
        predicate.right = predicate
            .right
            .map(|n| Box::new(rewrite_predicate(*n, statistics)));
        return predicate;
    }
    if !matches!(
        predicate.node_type,
        NodeType::ComparisonOperator | NodeType::BinaryOperator
    ) {
        // after rewrites, some filters aren't actually predicates
        return predicate;
    }

    let Some(op) = predicate.value.as_comparison() else {
        return predicate;
    };

    let right_type = predicate
        .right
        .as_ref()
        .map(|r| determine_type(r))
        .unwrap_or(ValueType::Missing);

    if right_type == ValueType::Varchar {
        if let Some(pattern) = predicate
            .right
            .as_ref()
            .and_then(|r| r.value.as_literal())
            .and_then(|v| v.as_str().map(str::to_string))
        {
            if matches!(
                op,
                CompareOp::Like | CompareOp::ILike | CompareOp::NotLike | CompareOp::NotILike
            ) && pattern.contains("%%")
            {
                statistics.increment(
                    "optimization_predicate_rewriter_remove_adjacent_wildcards",
                    1,
                );
                let collapsed = Regex::new("%+")
                    .map(|re| re.replace_all(&pattern, "%").to_string())
                    .unwrap_or(pattern.clone());
                if let Some(right) = predicate.right.as_mut() {
                    right.value = NodeValue::Literal(Value::Varchar(collapsed));
                }
            }

            let pattern = predicate
                .right
                .as_ref()
                .and_then(|r| r.value.as_literal())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            if let Some(rewritten) = like_rewrite(op) {
                if !pattern.contains('%') && !pattern.contains('_') {
                    statistics
                        .increment("optimization_predicate_rewriter_remove_redundant_like", 1);
                    predicate.value = NodeValue::Comparison(rewritten);
                }
            }

            if let Some(rewritten) = instr_rewrite(op) {
                if !pattern.contains('_')
                    && pattern.len() > 2
                    && pattern.starts_with('%')
                    && pattern.ends_with('%')
                    && !pattern[1..pattern.len() - 1].contains('%')
                {
                    statistics.increment(
                        "optimization_predicate_rewriter_replace_like_with_in_string",
                        1,
                    );
                    let inner = pattern[1..pattern.len() - 1].to_string();
                    if let Some(right) = predicate.right.as_mut() {
                        right.value = NodeValue::Literal(Value::Varchar(inner));
                    }
                    predicate.value = NodeValue::Comparison(rewritten);
                }
            }
        }
    }

    let op = predicate.value.as_comparison().unwrap_or(op);

    // value = ANY(list of literals) is an IN list
    if op == CompareOp::AnyOpEq
        && predicate
            .right
            .as_ref()
            .is_some_and(|r| r.node_type == NodeType::Literal)
    {
        statistics.increment("optimization_predicate_rewriter_any_to_inlist", 1);
        predicate.value = NodeValue::Comparison(CompareOp::InList);
    }

    let op = predicate.value.as_comparison().unwrap_or(op);

    // single-element IN lists are equality checks
    if in_rewrite(op).is_some() {
        let single = predicate
            .right
            .as_ref()
            .and_then(|r| r.value.as_literal())
            .map_or(false, |v| matches!(v, Value::Array(items) if items.len() == 1));
        if single {
            statistics.increment("optimization_predicate_rewriter_in_to_equals", 1);
            return rewrite_in_to_eq(predicate, op);
        }
    }

    // interval arithmetic on the left of a comparison
    if predicate.node_type == NodeType::ComparisonOperator {
        let left_is_binary = predicate
            .left
            .as_ref()
            .is_some_and(|l| l.node_type == NodeType::BinaryOperator);
        if left_is_binary {
            let left_type = predicate
                .left
                .as_ref()
                .map(|l| determine_type(l))
                .unwrap_or(ValueType::Missing);
            let right_type = predicate
                .right
                .as_ref()
                .map(|r| determine_type(r))
                .unwrap_or(ValueType::Missing);
            if left_type == ValueType::Interval && right_type == ValueType::Interval {
                statistics.increment("optimization_predicate_rewriter_reorder_interval", 1);
                return reorder_interval_calc(predicate);
            }
        }
    }

    predicate
}

/// Rewrite `CASE WHEN x IS NULL THEN y ELSE x END` to `IFNULL(x, y)`.
fn rewrite_function(mut function: Node, statistics: &QueryStatistics) -> Node {
    let is_case = matches!(&function.value, NodeValue::Function(name) if name == "CASE");
    if !is_case || function.parameters.len() != 2 {
        return function;
    }
    let conditions = &function.parameters[0];
    let results = &function.parameters[1];
    if conditions.parameters.len() != 1 || results.parameters.len() != 2 {
        return function;
    }
    let condition = &conditions.parameters[0];
    if !matches!(condition.value, NodeValue::Unary(UnaryOp::IsNull)) {
        return function;
    }
    let Some(compare_column) = condition.centre.as_deref() else {
        return function;
    };
    let value_if_null = &results.parameters[0];
    let target_column = &results.parameters[1];

    let same_column = match (compare_column.identity(), target_column.identity()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    if same_column {
        statistics.increment("optimization_predicate_rewriter_case_to_ifnull", 1);
        let parameters = vec![compare_column.clone(), value_if_null.clone()];
        function.value = NodeValue::Function("IFNULL".to_string());
        function.parameters = parameters;
    }
    function
}

impl OptimizationStrategy for PredicateRewriteStrategy {
    fn name(&self) -> &'static str {
        "PredicateRewrite"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        match node.step {
            LogicalPlanStepType::Filter => {
                let mut node = node.clone();
                if let Some(condition) = node.condition.take() {
                    node.condition = Some(rewrite_predicate(condition, &self.statistics));
                }
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            LogicalPlanStepType::Project => {
                let mut node = node.clone();
                node.columns = node
                    .columns
                    .into_iter()
                    .map(|column| {
                        let column = rewrite_predicate(column, &self.statistics);
                        rewrite_function(column, &self.statistics)
                    })
                    .collect();
                context.optimized_plan.add_node(context.node_id.clone(), node);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;

    fn name_column() -> Node {
        Node::bound_identifier(SchemaColumn::new("name", ValueType::Varchar))
    }

    #[test]
    fn like_without_wildcards_becomes_eq() {
        let predicate = Node::comparison(
            CompareOp::Like,
            name_column(),
            Node::literal(Value::Varchar("Calypso".into())),
        );
        let rewritten = rewrite_predicate(predicate, &QueryStatistics::new());
        assert_eq!(rewritten.value.as_comparison(), Some(CompareOp::Eq));
    }

    #[test]
    fn adjacent_wildcards_collapse() {
        let predicate = Node::comparison(
            CompareOp::Like,
            name_column(),
            Node::literal(Value::Varchar("Cal%%%ypso%".into())),
        );
        let rewritten = rewrite_predicate(predicate, &QueryStatistics::new());
        assert_eq!(
            rewritten
                .right
                .as_ref()
                .and_then(|r| r.value.as_literal())
                .and_then(Value::as_str),
            Some("Cal%ypso%")
        );
    }

    #[test]
    fn contains_pattern_becomes_instr() {
        let predicate = Node::comparison(
            CompareOp::Like,
            name_column(),
            Node::literal(Value::Varchar("%lyps%".into())),
        );
        let rewritten = rewrite_predicate(predicate, &QueryStatistics::new());
        assert_eq!(rewritten.value.as_comparison(), Some(CompareOp::InStr));
        assert_eq!(
            rewritten
                .right
                .as_ref()
                .and_then(|r| r.value.as_literal())
                .and_then(Value::as_str),
            Some("lyps")
        );
    }

    #[test]
    fn single_element_in_list_becomes_eq() {
        let predicate = Node::comparison(
            CompareOp::InList,
            name_column(),
            Node::literal(Value::Array(vec![Value::Varchar("Io".into())])),
        );
        let rewritten = rewrite_predicate(predicate, &QueryStatistics::new());
        assert_eq!(rewritten.value.as_comparison(), Some(CompareOp::Eq));
        assert_eq!(
            rewritten
                .right
                .as_ref()
                .and_then(|r| r.value.as_literal()),
            Some(&Value::Varchar("Io".into()))
        );
    }

    #[test]
    fn any_eq_on_literal_array_becomes_in_list() {
        let predicate = Node::comparison(
            CompareOp::AnyOpEq,
            name_column(),
            Node::literal(Value::Array(vec![
                Value::Varchar("Io".into()),
                Value::Varchar("Moon".into()),
            ])),
        );
        let rewritten = rewrite_predicate(predicate, &QueryStatistics::new());
        assert_eq!(rewritten.value.as_comparison(), Some(CompareOp::InList));
    }

    #[test]
    fn case_is_null_collapses_to_ifnull() {
        let column = Node::bound_identifier(SchemaColumn::new("gm", ValueType::Double));
        let case = Node::function(
            "CASE",
            vec![
                Node::expression_list(vec![Node::unary(UnaryOp::IsNull, column.clone())]),
                Node::expression_list(vec![Node::literal(Value::Double(0.0)), column]),
            ],
        );
        let rewritten = rewrite_function(case, &QueryStatistics::new());
        assert!(matches!(&rewritten.value, NodeValue::Function(name) if name == "IFNULL"));
        assert_eq!(rewritten.parameters.len(), 2);
    }
}
