//! The closed operator map.
//!
//! `(left type, right type, operator) -> result type`. If a combination is
//! absent the expression is untyped (`Missing`) and can neither be folded
//! nor pushed. The per-type comparison costs feed predicate ordering.

use crate::expression::{BinaryOp, CompareOp, Node, NodeType, NodeValue, UnaryOp};
use crate::value::ValueType;

use ValueType::*;

fn is_numeric(t: ValueType) -> bool {
    matches!(t, Integer | Double)
}

fn is_temporal_point(t: ValueType) -> bool {
    matches!(t, Date | Timestamp)
}

/// Are two types orderable against each other with `< <= > >= = !=`?
fn comparable(left: ValueType, right: ValueType) -> bool {
    if is_numeric(left) && is_numeric(right) {
        return true;
    }
    if is_temporal_point(left) && is_temporal_point(right) {
        return true;
    }
    matches!(
        (left, right),
        (Varchar, Varchar)
            | (Blob, Blob)
            | (Blob, Varchar)
            | (Varchar, Blob)
            | (Time, Time)
            | (Interval, Interval)
            | (Boolean, Boolean)
    )
}

/// Resolve a comparison's result type, or `None` when the operator map has
/// no entry for the operand pair.
pub fn resolve_comparison(
    left: ValueType,
    right: ValueType,
    op: CompareOp,
) -> Option<ValueType> {
    use CompareOp::*;
    let allowed = match op {
        Eq | NotEq | Gt | GtEq | Lt | LtEq => comparable(left, right),
        Like | NotLike | ILike | NotILike | RLike | NotRLike | InStr | NotInStr | IInStr
        | NotIInStr => {
            matches!(left, Varchar | Blob) && matches!(right, Varchar | Blob)
        }
        InList | NotInList => right == Array,
        AnyOpEq | AllOpNotEq | AnyOpGtEq | AllOpLt => right == Array || left == Array,
    };
    allowed.then_some(Boolean)
}

/// Resolve a binary operator's result type, or `None` when untyped.
pub fn resolve_binary(left: ValueType, right: ValueType, op: BinaryOp) -> Option<ValueType> {
    use BinaryOp::*;
    match op {
        Plus | Minus | Multiply | Modulo if left == Integer && right == Integer => Some(Integer),
        Plus | Minus | Multiply | Modulo if is_numeric(left) && is_numeric(right) => Some(Double),
        Divide if is_numeric(left) && is_numeric(right) => Some(Double),
        Minus if is_temporal_point(left) && is_temporal_point(right) => Some(Interval),
        Plus | Minus if is_temporal_point(left) && right == Interval => Some(Timestamp),
        Plus if left == Interval && is_temporal_point(right) => Some(Timestamp),
        Plus | Minus if left == Interval && right == Interval => Some(Interval),
        StringConcat if left == Varchar && right == Varchar => Some(Varchar),
        StringConcat if left == Blob || right == Blob => Some(Blob),
        _ => None,
    }
}

/// Determine the type of a bound expression bottom-up. Returns `Missing`
/// where the operator map has no entry.
pub fn determine_type(node: &Node) -> ValueType {
    if let Some(value_type) = node.value_type {
        if value_type != Missing {
            return value_type;
        }
    }
    match node.node_type {
        NodeType::Literal => node
            .value
            .as_literal()
            .map_or(Missing, crate::value::Value::value_type),
        NodeType::Identifier => node
            .schema_column
            .as_ref()
            .map_or(Missing, |c| c.value_type),
        NodeType::Nested => node.centre.as_ref().map_or(Missing, |c| determine_type(c)),
        NodeType::And | NodeType::Or | NodeType::Xor | NodeType::Not | NodeType::Dnf => Boolean,
        NodeType::ComparisonOperator => {
            let (Some(left), Some(right)) = (&node.left, &node.right) else {
                return Missing;
            };
            let Some(op) = node.value.as_comparison() else {
                return Missing;
            };
            resolve_comparison(determine_type(left), determine_type(right), op)
                .unwrap_or(Missing)
        }
        NodeType::BinaryOperator => {
            let (Some(left), Some(right)) = (&node.left, &node.right) else {
                return Missing;
            };
            let Some(op) = node.value.as_binary() else {
                return Missing;
            };
            resolve_binary(determine_type(left), determine_type(right), op).unwrap_or(Missing)
        }
        NodeType::UnaryOperator => match node.value {
            NodeValue::Unary(UnaryOp::IsNull | UnaryOp::IsNotNull) => Boolean,
            NodeValue::Unary(UnaryOp::Negative) => {
                node.centre.as_ref().map_or(Missing, |c| determine_type(c))
            }
            _ => Missing,
        },
        NodeType::Wildcard | NodeType::ExpressionList => Missing,
        NodeType::Function | NodeType::Aggregator => node.value_type.unwrap_or(Missing),
    }
}

/// Approximate seconds to run one million basic comparisons per type.
/// Used by predicate ordering to run cheap checks first.
pub fn comparison_cost(value_type: ValueType) -> f64 {
    match value_type {
        Integer => 0.002,
        Double => 0.003,
        Boolean => 0.004,
        Timestamp => 0.009,
        Date => 0.01,
        Blob => 0.06,
        Varchar => 0.3,
        // expensive or meaningless to compare
        Array | Interval | Struct | Time | Null | Missing => 10.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Node;
    use crate::value::Value;

    #[test]
    fn numeric_comparisons_resolve() {
        assert_eq!(
            resolve_comparison(Integer, Double, CompareOp::Lt),
            Some(Boolean)
        );
        assert_eq!(resolve_comparison(Varchar, Integer, CompareOp::Eq), None);
    }

    #[test]
    fn like_requires_stringish_operands() {
        assert_eq!(
            resolve_comparison(Varchar, Varchar, CompareOp::Like),
            Some(Boolean)
        );
        assert_eq!(resolve_comparison(Integer, Varchar, CompareOp::Like), None);
    }

    #[test]
    fn arithmetic_types() {
        assert_eq!(resolve_binary(Integer, Integer, BinaryOp::Plus), Some(Integer));
        assert_eq!(resolve_binary(Integer, Integer, BinaryOp::Divide), Some(Double));
        assert_eq!(resolve_binary(Date, Date, BinaryOp::Minus), Some(Interval));
        assert_eq!(resolve_binary(Date, Interval, BinaryOp::Plus), Some(Timestamp));
        assert_eq!(resolve_binary(Varchar, Integer, BinaryOp::Plus), None);
    }

    #[test]
    fn untyped_expression_is_missing() {
        let expr = Node::binary(
            BinaryOp::Plus,
            Node::literal(Value::Varchar("a".into())),
            Node::literal(Value::Integer(1)),
        );
        assert_eq!(determine_type(&expr), Missing);
    }

    #[test]
    fn interval_reorder_precondition_detectable() {
        // (date - date) compared with an interval literal types as
        // INTERVAL vs INTERVAL, which is what the rewriter keys on
        let diff = Node::binary(
            BinaryOp::Minus,
            Node::literal(Value::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date"),
            )),
            Node::literal(Value::Date(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            )),
        );
        assert_eq!(determine_type(&diff), Interval);
    }
}
