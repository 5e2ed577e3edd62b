//! Morsel-wise expression evaluation.
//!
//! Given a bound expression and a morsel, produce a column of values.
//! Logical connectives use Kleene three-valued logic; comparisons resolve
//! through the operator map and reject operand pairs it has no entry for;
//! LIKE/ILIKE implement SQL `%`/`_` semantics with null-preserving
//! negations.

use std::collections::HashMap;

use regex::Regex;

use crate::errors::{Error, Result};
use crate::expression::operator_map::{determine_type, resolve_comparison};
use crate::expression::{functions, BinaryOp, CompareOp, Node, NodeType, NodeValue, UnaryOp};
use crate::morsel::{Column, Morsel};
use crate::value::{Value, ValueType};

/// Evaluate `node` against `morsel`, returning one value per row.
pub fn evaluate(node: &Node, morsel: &Morsel) -> Result<Column> {
    let values = evaluate_values(node, morsel)?;
    let value_type = node
        .value_type
        .filter(|t| *t != ValueType::Missing)
        .unwrap_or_else(|| {
            values
                .iter()
                .find(|v| !v.is_null())
                .map_or(ValueType::Null, Value::value_type)
        });
    let identity = node
        .identity()
        .map_or_else(|| node.uuid.clone(), str::to_string);
    Ok(Column::new(node.current_name(), identity, value_type, values))
}

fn evaluate_values(node: &Node, morsel: &Morsel) -> Result<Vec<Value>> {
    let rows = morsel.row_count();
    match node.node_type {
        NodeType::Literal => {
            let value = node
                .value
                .as_literal()
                .cloned()
                .unwrap_or(Value::Null);
            Ok(vec![value; rows])
        }
        NodeType::Identifier => {
            let column = node
                .identity()
                .and_then(|identity| morsel.column_by_identity(identity))
                .or_else(|| {
                    node.source_column
                        .as_deref()
                        .and_then(|name| morsel.column_by_name(name))
                })
                .ok_or_else(|| Error::ColumnNotFound(node.current_name()))?;
            Ok(column.values.clone())
        }
        NodeType::Nested => {
            let inner = node.centre.as_ref().ok_or_else(|| {
                Error::InvalidInternalState("nested expression with no inner".to_string())
            })?;
            evaluate_values(inner, morsel)
        }
        NodeType::And => {
            let (left, right) = binary_operands(node, morsel)?;
            Ok(zip_bools(&left, &right, kleene_and))
        }
        NodeType::Or => {
            let (left, right) = binary_operands(node, morsel)?;
            Ok(zip_bools(&left, &right, kleene_or))
        }
        NodeType::Xor => {
            let (left, right) = binary_operands(node, morsel)?;
            Ok(zip_bools(&left, &right, kleene_xor))
        }
        NodeType::Not => {
            let operand = node.centre.as_ref().ok_or_else(|| {
                Error::InvalidInternalState("NOT with no operand".to_string())
            })?;
            let values = evaluate_values(operand, morsel)?;
            Ok(values
                .into_iter()
                .map(|v| match v {
                    Value::Boolean(b) => Value::Boolean(!b),
                    _ => Value::Null,
                })
                .collect())
        }
        NodeType::Dnf => {
            // a flattened AND chain: short-circuit row-wise
            let mut accumulated: Option<Vec<Value>> = None;
            for parameter in &node.parameters {
                let values = evaluate_values(parameter, morsel)?;
                accumulated = Some(match accumulated {
                    None => values,
                    Some(acc) => zip_bools(&acc, &values, kleene_and),
                });
            }
            Ok(accumulated.unwrap_or_else(|| vec![Value::Boolean(true); rows]))
        }
        NodeType::ComparisonOperator => evaluate_comparison(node, morsel),
        NodeType::BinaryOperator => evaluate_binary(node, morsel),
        NodeType::UnaryOperator => {
            let operand = node.centre.as_ref().ok_or_else(|| {
                Error::InvalidInternalState("unary operator with no operand".to_string())
            })?;
            let values = evaluate_values(operand, morsel)?;
            match node.value {
                NodeValue::Unary(UnaryOp::IsNull) => Ok(values
                    .into_iter()
                    .map(|v| Value::Boolean(v.is_null()))
                    .collect()),
                NodeValue::Unary(UnaryOp::IsNotNull) => Ok(values
                    .into_iter()
                    .map(|v| Value::Boolean(!v.is_null()))
                    .collect()),
                NodeValue::Unary(UnaryOp::Negative) => Ok(values
                    .into_iter()
                    .map(|v| match v {
                        Value::Integer(i) => Value::Integer(-i),
                        Value::Double(d) => Value::Double(-d),
                        _ => Value::Null,
                    })
                    .collect()),
                _ => Err(Error::InvalidInternalState(
                    "unary node without unary operator".to_string(),
                )),
            }
        }
        NodeType::Function => evaluate_function(node, morsel),
        NodeType::Aggregator => Err(Error::InvalidInternalState(
            "aggregator reached the row-wise evaluator".to_string(),
        )),
        NodeType::Wildcard | NodeType::ExpressionList => Err(Error::InvalidInternalState(
            format!("{:?} cannot be evaluated as a column", node.node_type),
        )),
    }
}

fn binary_operands(node: &Node, morsel: &Morsel) -> Result<(Vec<Value>, Vec<Value>)> {
    let left = node.left.as_ref().ok_or_else(|| {
        Error::InvalidInternalState("binary node with no left operand".to_string())
    })?;
    let right = node.right.as_ref().ok_or_else(|| {
        Error::InvalidInternalState("binary node with no right operand".to_string())
    })?;
    Ok((evaluate_values(left, morsel)?, evaluate_values(right, morsel)?))
}

// Kleene three-valued logic; None is NULL
fn kleene_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn kleene_or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn kleene_xor(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    }
}

fn zip_bools(
    left: &[Value],
    right: &[Value],
    op: fn(Option<bool>, Option<bool>) -> Option<bool>,
) -> Vec<Value> {
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| match op(l.as_bool(), r.as_bool()) {
            Some(b) => Value::Boolean(b),
            None => Value::Null,
        })
        .collect()
}

fn evaluate_comparison(node: &Node, morsel: &Morsel) -> Result<Vec<Value>> {
    let op = node.value.as_comparison().ok_or_else(|| {
        Error::InvalidInternalState("comparison node without operator".to_string())
    })?;
    let left_node = node.left.as_ref().ok_or_else(|| {
        Error::InvalidInternalState("comparison with no left operand".to_string())
    })?;
    let right_node = node.right.as_ref().ok_or_else(|| {
        Error::InvalidInternalState("comparison with no right operand".to_string())
    })?;

    let left_type = determine_type(left_node);
    let right_type = determine_type(right_node);
    if left_type != ValueType::Missing
        && right_type != ValueType::Missing
        && left_type != ValueType::Null
        && right_type != ValueType::Null
        && resolve_comparison(left_type, right_type, op).is_none()
    {
        return Err(Error::UnsupportedSyntax(format!(
            "cannot apply {} between {left_type} and {right_type}",
            op.symbol()
        )));
    }

    let left = evaluate_values(left_node, morsel)?;
    let right = evaluate_values(right_node, morsel)?;

    use CompareOp::*;
    let out = match op {
        Eq | NotEq | Gt | GtEq | Lt | LtEq => left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| ordered_compare(l, r, op))
            .collect(),
        Like | NotLike | ILike | NotILike => {
            let mut cache: HashMap<String, Regex> = HashMap::new();
            let case_insensitive = matches!(op, ILike | NotILike);
            let negate = matches!(op, NotLike | NotILike);
            like_compare(&left, &right, case_insensitive, negate, &mut cache)?
        }
        RLike | NotRLike => {
            let mut cache: HashMap<String, Regex> = HashMap::new();
            let negate = matches!(op, NotRLike);
            regex_compare(&left, &right, negate, &mut cache)?
        }
        InStr | NotInStr | IInStr | NotIInStr => {
            let case_insensitive = matches!(op, IInStr | NotIInStr);
            let negate = matches!(op, NotInStr | NotIInStr);
            left.iter()
                .zip(right.iter())
                .map(|(l, r)| match (l, r) {
                    (Value::Null, _) | (_, Value::Null) => Value::Null,
                    (Value::Varchar(haystack), Value::Varchar(needle)) => {
                        let contains = if case_insensitive {
                            haystack.to_lowercase().contains(&needle.to_lowercase())
                        } else {
                            haystack.contains(needle.as_str())
                        };
                        Value::Boolean(contains != negate)
                    }
                    _ => Value::Null,
                })
                .collect()
        }
        InList | NotInList => left
            .iter()
            .zip(right.iter())
            .map(|(l, r)| match (l, r) {
                (Value::Null, _) | (_, Value::Null) => Value::Null,
                (value, Value::Array(items)) => {
                    let found = items.iter().any(|item| item.sql_eq(value));
                    Value::Boolean(found != matches!(op, NotInList))
                }
                _ => Value::Null,
            })
            .collect(),
        AnyOpEq => array_quantifier(&left, &right, |v, item| v.sql_eq(item), false),
        AllOpNotEq => array_quantifier(&left, &right, |v, item| v.sql_eq(item), true),
        AnyOpGtEq => array_quantifier(
            &left,
            &right,
            |v, item| {
                matches!(
                    v.compare(item),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                )
            },
            false,
        ),
        AllOpLt => array_quantifier(
            &left,
            &right,
            |v, item| {
                !matches!(v.compare(item), Some(std::cmp::Ordering::Less))
            },
            true,
        ),
    };
    Ok(out)
}

fn ordered_compare(left: &Value, right: &Value, op: CompareOp) -> Value {
    use std::cmp::Ordering;
    match left.compare(right) {
        None => Value::Null,
        Some(ordering) => {
            let result = match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::NotEq => ordering != Ordering::Equal,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::GtEq => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::LtEq => ordering != Ordering::Greater,
                _ => return Value::Null,
            };
            Value::Boolean(result)
        }
    }
}

/// `ANY` succeeds when the check holds for some element; `ALL` (negated
/// quantifier) when the check fails for every element.
fn array_quantifier(
    left: &[Value],
    right: &[Value],
    check: impl Fn(&Value, &Value) -> bool,
    all_negated: bool,
) -> Vec<Value> {
    left.iter()
        .zip(right.iter())
        .map(|(l, r)| match (l, r) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (value, Value::Array(items)) => {
                let any = items.iter().any(|item| check(value, item));
                Value::Boolean(if all_negated { !any } else { any })
            }
            _ => Value::Null,
        })
        .collect()
}

/// Translate a SQL LIKE pattern to an anchored regex: `%` matches any run,
/// `_` a single character; everything else is literal.
pub fn like_to_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        expression.push_str("(?is)");
    } else {
        expression.push_str("(?s)");
    }
    expression.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).map_err(|e| Error::Sql(format!("invalid LIKE pattern: {e}")))
}

fn like_compare(
    left: &[Value],
    right: &[Value],
    case_insensitive: bool,
    negate: bool,
    cache: &mut HashMap<String, Regex>,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(left.len());
    for (l, r) in left.iter().zip(right.iter()) {
        match (l, r) {
            (Value::Null, _) | (_, Value::Null) => out.push(Value::Null),
            (Value::Varchar(text), Value::Varchar(pattern)) => {
                if !cache.contains_key(pattern) {
                    cache.insert(pattern.clone(), like_to_regex(pattern, case_insensitive)?);
                }
                let matched = cache[pattern].is_match(text);
                out.push(Value::Boolean(matched != negate));
            }
            _ => out.push(Value::Null),
        }
    }
    Ok(out)
}

fn regex_compare(
    left: &[Value],
    right: &[Value],
    negate: bool,
    cache: &mut HashMap<String, Regex>,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(left.len());
    for (l, r) in left.iter().zip(right.iter()) {
        match (l, r) {
            (Value::Null, _) | (_, Value::Null) => out.push(Value::Null),
            (Value::Varchar(text), Value::Varchar(pattern)) => {
                if !cache.contains_key(pattern) {
                    cache.insert(
                        pattern.clone(),
                        Regex::new(pattern)
                            .map_err(|e| Error::Sql(format!("invalid regex: {e}")))?,
                    );
                }
                let matched = cache[pattern].is_match(text);
                out.push(Value::Boolean(matched != negate));
            }
            _ => out.push(Value::Null),
        }
    }
    Ok(out)
}

fn evaluate_binary(node: &Node, morsel: &Morsel) -> Result<Vec<Value>> {
    let op = node.value.as_binary().ok_or_else(|| {
        Error::InvalidInternalState("binary node without operator".to_string())
    })?;
    let (left, right) = binary_operands(node, morsel)?;
    Ok(left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| apply_binary(l, r, op))
        .collect())
}

fn apply_binary(left: &Value, right: &Value, op: BinaryOp) -> Value {
    use BinaryOp::*;
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    match (left, right, op) {
        (Value::Integer(a), Value::Integer(b), Plus) => Value::Integer(a + b),
        (Value::Integer(a), Value::Integer(b), Minus) => Value::Integer(a - b),
        (Value::Integer(a), Value::Integer(b), Multiply) => Value::Integer(a * b),
        (Value::Integer(a), Value::Integer(b), Modulo) => {
            if *b == 0 {
                Value::Null
            } else {
                Value::Integer(a % b)
            }
        }
        (Value::Varchar(a), Value::Varchar(b), StringConcat) => {
            Value::Varchar(format!("{a}{b}"))
        }
        (Value::Date(a), Value::Date(b), Minus) => {
            Value::Interval((*a - *b).num_seconds())
        }
        (Value::Timestamp(a), Value::Timestamp(b), Minus) => {
            Value::Interval((*a - *b).num_seconds())
        }
        (Value::Date(a), Value::Interval(s), Plus) => a
            .and_hms_opt(0, 0, 0)
            .map_or(Value::Null, |t| Value::Timestamp(t + chrono::Duration::seconds(*s))),
        (Value::Date(a), Value::Interval(s), Minus) => a
            .and_hms_opt(0, 0, 0)
            .map_or(Value::Null, |t| Value::Timestamp(t - chrono::Duration::seconds(*s))),
        (Value::Timestamp(a), Value::Interval(s), Plus) => {
            Value::Timestamp(*a + chrono::Duration::seconds(*s))
        }
        (Value::Timestamp(a), Value::Interval(s), Minus) => {
            Value::Timestamp(*a - chrono::Duration::seconds(*s))
        }
        (Value::Interval(a), Value::Interval(b), Plus) => Value::Interval(a + b),
        (Value::Interval(a), Value::Interval(b), Minus) => Value::Interval(a - b),
        _ => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Value::Null;
            };
            match op {
                Plus => Value::Double(a + b),
                Minus => Value::Double(a - b),
                Multiply => Value::Double(a * b),
                Divide => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Double(a / b)
                    }
                }
                Modulo => {
                    if b == 0.0 {
                        Value::Null
                    } else {
                        Value::Double(a % b)
                    }
                }
                StringConcat => Value::Null,
            }
        }
    }
}

fn evaluate_function(node: &Node, morsel: &Morsel) -> Result<Vec<Value>> {
    let NodeValue::Function(name) = &node.value else {
        return Err(Error::InvalidInternalState(
            "function node without a name".to_string(),
        ));
    };
    if name == "CASE" {
        return evaluate_case(node, morsel);
    }
    let mut parameters = Vec::with_capacity(node.parameters.len());
    for parameter in &node.parameters {
        parameters.push(evaluate_values(parameter, morsel)?);
    }
    let (values, _) = functions::apply(name, &parameters, morsel.row_count())?;
    Ok(values)
}

/// Searched CASE: parameters[0] lists the conditions, parameters[1] the
/// branch results with the ELSE branch last.
fn evaluate_case(node: &Node, morsel: &Morsel) -> Result<Vec<Value>> {
    let conditions = node.parameters.first().ok_or_else(|| {
        Error::InvalidInternalState("CASE with no conditions".to_string())
    })?;
    let results = node.parameters.get(1).ok_or_else(|| {
        Error::InvalidInternalState("CASE with no results".to_string())
    })?;

    let mut condition_columns = Vec::with_capacity(conditions.parameters.len());
    for condition in &conditions.parameters {
        condition_columns.push(evaluate_values(condition, morsel)?);
    }
    let mut result_columns = Vec::with_capacity(results.parameters.len());
    for result in &results.parameters {
        result_columns.push(evaluate_values(result, morsel)?);
    }
    let has_else = result_columns.len() == condition_columns.len() + 1;

    let mut out = Vec::with_capacity(morsel.row_count());
    for row in 0..morsel.row_count() {
        let mut value = if has_else {
            result_columns[result_columns.len() - 1][row].clone()
        } else {
            Value::Null
        };
        for (i, condition) in condition_columns.iter().enumerate() {
            if condition[row].as_bool() == Some(true) {
                value = result_columns[i][row].clone();
                break;
            }
        }
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::Column;
    use crate::schema::SchemaColumn;

    fn morsel_with(name: &str, values: Vec<Value>, value_type: ValueType) -> (Morsel, SchemaColumn) {
        let mut column = SchemaColumn::new(name, value_type);
        column.identity = format!("{name}-identity");
        let morsel = Morsel::new(vec![Column::new(
            name,
            column.identity.clone(),
            value_type,
            values,
        )])
        .expect("test morsel is well formed");
        (morsel, column)
    }

    #[test]
    fn kleene_truth_table() {
        assert_eq!(kleene_and(Some(false), None), Some(false));
        assert_eq!(kleene_and(Some(true), None), None);
        assert_eq!(kleene_or(Some(true), None), Some(true));
        assert_eq!(kleene_or(Some(false), None), None);
        assert_eq!(kleene_xor(Some(true), None), None);
    }

    #[test]
    fn identifier_resolves_by_identity() {
        let (morsel, column) = morsel_with(
            "name",
            vec![Value::Varchar("Io".into()), Value::Varchar("Moon".into())],
            ValueType::Varchar,
        );
        let expr = Node::bound_identifier(column);
        let result = evaluate(&expr, &morsel).expect("identifier evaluates");
        assert_eq!(result.values.len(), 2);
        assert_eq!(result.values[0], Value::Varchar("Io".into()));
    }

    #[test]
    fn comparison_with_nulls_is_null() {
        let (morsel, column) = morsel_with(
            "id",
            vec![Value::Integer(1), Value::Null, Value::Integer(3)],
            ValueType::Integer,
        );
        let expr = Node::comparison(
            CompareOp::Gt,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(1)),
        );
        let result = evaluate(&expr, &morsel).expect("comparison evaluates");
        assert_eq!(
            result.values,
            vec![Value::Boolean(false), Value::Null, Value::Boolean(true)]
        );
    }

    #[test]
    fn incompatible_comparison_errors() {
        let (morsel, column) = morsel_with(
            "name",
            vec![Value::Varchar("x".into())],
            ValueType::Varchar,
        );
        let expr = Node::comparison(
            CompareOp::Gt,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(1)),
        );
        assert!(matches!(
            evaluate(&expr, &morsel),
            Err(Error::UnsupportedSyntax(_))
        ));
    }

    #[test]
    fn like_semantics() {
        let (morsel, column) = morsel_with(
            "name",
            vec![
                Value::Varchar("Calypso".into()),
                Value::Varchar("Callisto".into()),
                Value::Null,
            ],
            ValueType::Varchar,
        );
        let expr = Node::comparison(
            CompareOp::Like,
            Node::bound_identifier(column),
            Node::literal(Value::Varchar("Cal_ps%".into())),
        );
        let result = evaluate(&expr, &morsel).expect("like evaluates");
        assert_eq!(
            result.values,
            vec![Value::Boolean(true), Value::Boolean(false), Value::Null]
        );
    }

    #[test]
    fn in_list_membership() {
        let (morsel, column) = morsel_with(
            "id",
            vec![Value::Integer(8), Value::Integer(3)],
            ValueType::Integer,
        );
        let expr = Node::comparison(
            CompareOp::InList,
            Node::bound_identifier(column),
            Node::literal(Value::Array(vec![Value::Integer(8), Value::Integer(9)])),
        );
        let result = evaluate(&expr, &morsel).expect("in-list evaluates");
        assert_eq!(
            result.values,
            vec![Value::Boolean(true), Value::Boolean(false)]
        );
    }

    #[test]
    fn any_quantifier_over_arrays() {
        let (morsel, column) = morsel_with(
            "missions",
            vec![
                Value::Array(vec![
                    Value::Varchar("Apollo 11".into()),
                    Value::Varchar("Gemini 8".into()),
                ]),
                Value::Array(vec![Value::Varchar("STS-1".into())]),
            ],
            ValueType::Array,
        );
        let expr = Node::comparison(
            CompareOp::AnyOpEq,
            Node::literal(Value::Varchar("Apollo 11".into())),
            Node::bound_identifier(column),
        );
        let result = evaluate(&expr, &morsel).expect("quantifier evaluates");
        assert_eq!(
            result.values,
            vec![Value::Boolean(true), Value::Boolean(false)]
        );
    }

    #[test]
    fn arithmetic_null_propagation() {
        let (morsel, column) = morsel_with(
            "mass",
            vec![Value::Double(2.0), Value::Null],
            ValueType::Double,
        );
        let expr = Node::binary(
            BinaryOp::Multiply,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(3)),
        );
        let result = evaluate(&expr, &morsel).expect("arithmetic evaluates");
        assert_eq!(result.values, vec![Value::Double(6.0), Value::Null]);
    }

    #[test]
    fn case_picks_first_true_branch() {
        let (morsel, column) = morsel_with(
            "id",
            vec![Value::Integer(1), Value::Integer(2)],
            ValueType::Integer,
        );
        let condition = Node::comparison(
            CompareOp::Eq,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(1)),
        );
        let case = Node::function(
            "CASE",
            vec![
                Node::expression_list(vec![condition]),
                Node::expression_list(vec![
                    Node::literal(Value::Varchar("one".into())),
                    Node::literal(Value::Varchar("other".into())),
                ]),
            ],
        );
        let result = evaluate(&case, &morsel).expect("case evaluates");
        assert_eq!(
            result.values,
            vec![
                Value::Varchar("one".into()),
                Value::Varchar("other".into())
            ]
        );
    }
}
