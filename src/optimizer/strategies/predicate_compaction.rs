//! Optimization Rule - Predicate Compaction
//!
//! Goal: compact multiple predicates on the same column into simplified
//! ranges.
//!
//! ```text
//! col > 5 AND col < 10 AND col > 7 AND col < 9
//!     => col > 7 AND col < 9        (most restrictive bounds only)
//! col > 10 AND col < 5
//!     => FALSE                      (contradiction)
//! ```
//!
//! Runs before the conjuncts are split so it sees whole AND chains.
//! Contradictions fold the condition to literal FALSE, which the
//! empty-table strategy later removes along with its subtree.

use std::collections::HashMap;

use crate::errors::Result;
use crate::expression::{CompareOp, Node, NodeType};
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;
use crate::value::Value;

pub struct PredicateCompactionStrategy {
    statistics: QueryStatistics,
}

impl PredicateCompactionStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        PredicateCompactionStrategy { statistics }
    }
}

/// A single bound in a value range.
#[derive(Debug, Clone)]
struct Limit {
    value: Value,
    inclusive: bool,
}

/// The valid range for one column, narrowed predicate by predicate.
#[derive(Debug, Default)]
struct ValueRange {
    lower: Option<Limit>,
    upper: Option<Limit>,
    /// Number of predicates folded into this range
    absorbed: usize,
    /// A representative identifier node to rebuild comparisons with
    column: Option<Node>,
}

impl ValueRange {
    /// Narrow the range; returns false when the range becomes empty.
    fn update(&mut self, op: CompareOp, value: &Value) -> bool {
        let inclusive = matches!(op, CompareOp::Eq | CompareOp::GtEq | CompareOp::LtEq);

        if matches!(op, CompareOp::Eq | CompareOp::GtEq | CompareOp::Gt) {
            let replace = match &self.lower {
                None => true,
                Some(existing) => match value.compare(&existing.value) {
                    Some(std::cmp::Ordering::Greater) => true,
                    Some(std::cmp::Ordering::Equal) => existing.inclusive && !inclusive,
                    _ => false,
                },
            };
            if replace {
                self.lower = Some(Limit {
                    value: value.clone(),
                    inclusive,
                });
            }
        }
        if matches!(op, CompareOp::Eq | CompareOp::LtEq | CompareOp::Lt) {
            let replace = match &self.upper {
                None => true,
                Some(existing) => match value.compare(&existing.value) {
                    Some(std::cmp::Ordering::Less) => true,
                    Some(std::cmp::Ordering::Equal) => existing.inclusive && !inclusive,
                    _ => false,
                },
            };
            if replace {
                self.upper = Some(Limit {
                    value: value.clone(),
                    inclusive,
                });
            }
        }
        self.absorbed += 1;
        self.is_valid()
    }

    fn is_valid(&self) -> bool {
        let (Some(lower), Some(upper)) = (&self.lower, &self.upper) else {
            return true;
        };
        match lower.value.compare(&upper.value) {
            Some(std::cmp::Ordering::Less) => true,
            Some(std::cmp::Ordering::Equal) => lower.inclusive && upper.inclusive,
            _ => false,
        }
    }

    /// Rebuild the minimal predicate list for this range.
    fn rebuild(&self) -> Vec<Node> {
        let Some(column) = &self.column else {
            return Vec::new();
        };
        // a closed point range is an equality
        if let (Some(lower), Some(upper)) = (&self.lower, &self.upper) {
            if lower.inclusive
                && upper.inclusive
                && lower.value.compare(&upper.value) == Some(std::cmp::Ordering::Equal)
            {
                return vec![Node::comparison(
                    CompareOp::Eq,
                    column.clone(),
                    Node::literal(lower.value.clone()),
                )];
            }
        }
        let mut predicates = Vec::new();
        if let Some(lower) = &self.lower {
            let op = if lower.inclusive {
                CompareOp::GtEq
            } else {
                CompareOp::Gt
            };
            predicates.push(Node::comparison(
                op,
                column.clone(),
                Node::literal(lower.value.clone()),
            ));
        }
        if let Some(upper) = &self.upper {
            let op = if upper.inclusive {
                CompareOp::LtEq
            } else {
                CompareOp::Lt
            };
            predicates.push(Node::comparison(
                op,
                column.clone(),
                Node::literal(upper.value.clone()),
            ));
        }
        predicates
    }
}

fn flatten_and(node: Node, out: &mut Vec<Node>) {
    let mut node = node;
    while node.node_type == NodeType::Nested {
        match node.centre {
            Some(inner) => node = *inner,
            None => return,
        }
    }
    if node.node_type == NodeType::And {
        if let Some(left) = node.left {
            flatten_and(*left, out);
        }
        if let Some(right) = node.right {
            flatten_and(*right, out);
        }
    } else {
        out.push(node);
    }
}

/// Is this conjunct a `column <op> numeric-literal` we can track?
fn trackable(conjunct: &Node) -> Option<(String, Node, CompareOp, Value)> {
    if conjunct.node_type != NodeType::ComparisonOperator {
        return None;
    }
    let op = conjunct.value.as_comparison()?;
    if !matches!(
        op,
        CompareOp::Eq | CompareOp::GtEq | CompareOp::LtEq | CompareOp::Gt | CompareOp::Lt
    ) {
        return None;
    }
    let left = conjunct.left.as_deref()?;
    let right = conjunct.right.as_deref()?;
    if left.node_type != NodeType::Identifier || right.node_type != NodeType::Literal {
        return None;
    }
    let identity = left.identity()?.to_string();
    let value = right.value.as_literal()?;
    if !matches!(value, Value::Integer(_) | Value::Double(_)) {
        return None;
    }
    Some((identity, left.clone(), op, value.clone()))
}

fn compact_condition(condition: Node, statistics: &QueryStatistics) -> Node {
    let mut conjuncts = Vec::new();
    flatten_and(condition.clone(), &mut conjuncts);
    if conjuncts.len() < 2 {
        return condition;
    }

    let mut ranges: HashMap<String, ValueRange> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut leftovers = Vec::new();

    for conjunct in conjuncts {
        match trackable(&conjunct) {
            Some((identity, column, op, value)) => {
                let range = ranges.entry(identity.clone()).or_default();
                if range.column.is_none() {
                    range.column = Some(column);
                    order.push(identity);
                }
                if !range.update(op, &value) {
                    statistics.increment("optimization_predicate_compaction_contradiction", 1);
                    return Node::literal(Value::Boolean(false));
                }
            }
            None => leftovers.push(conjunct),
        }
    }

    let mut compacted = Vec::new();
    let mut reduced = false;
    for identity in &order {
        let range = &ranges[identity];
        let rebuilt = range.rebuild();
        if rebuilt.len() < range.absorbed {
            reduced = true;
        }
        compacted.extend(rebuilt);
    }
    if !reduced {
        return condition;
    }
    statistics.increment("optimization_predicate_compaction", 1);

    compacted.extend(leftovers);
    let mut result = compacted.remove(0);
    for predicate in compacted {
        result = Node::and(result, predicate);
    }
    result
}

impl OptimizationStrategy for PredicateCompactionStrategy {
    fn name(&self) -> &'static str {
        "PredicateCompaction"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step != LogicalPlanStepType::Filter {
            return Ok(());
        }
        let mut node = node.clone();
        if let Some(condition) = node.condition.take() {
            node.condition = Some(compact_condition(condition, &self.statistics));
        }
        context.optimized_plan.add_node(context.node_id.clone(), node);
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

    fn id_node() -> Node {
        Node::bound_identifier(SchemaColumn::new("id", ValueType::Integer))
    }

    fn cmp(op: CompareOp, value: i64) -> Node {
        Node::comparison(op, id_node(), Node::literal(Value::Integer(value)))
    }

    #[test]
    fn overlapping_bounds_are_narrowed() {
        // id > 5 AND id < 10 AND id > 7 AND id < 9 => id > 7 AND id < 9
        let condition = Node::and(
            Node::and(
                Node::and(cmp(CompareOp::Gt, 5), cmp(CompareOp::Lt, 10)),
                cmp(CompareOp::Gt, 7),
            ),
            cmp(CompareOp::Lt, 9),
        );
        let compacted = compact_condition(condition, &QueryStatistics::new());
        let mut conjuncts = Vec::new();
        flatten_and(compacted, &mut conjuncts);
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(
            conjuncts[0].right.as_ref().and_then(|r| r.value.as_literal()),
            Some(&Value::Integer(7))
        );
        assert_eq!(
            conjuncts[1].right.as_ref().and_then(|r| r.value.as_literal()),
            Some(&Value::Integer(9))
        );
    }

    #[test]
    fn contradiction_folds_to_false() {
        let condition = Node::and(cmp(CompareOp::Gt, 10), cmp(CompareOp::Lt, 5));
        let compacted = compact_condition(condition, &QueryStatistics::new());
        assert!(compacted.is_literal_false());
    }

    #[test]
    fn point_range_becomes_equality() {
        let condition = Node::and(cmp(CompareOp::GtEq, 7), cmp(CompareOp::LtEq, 7));
        let compacted = compact_condition(condition, &QueryStatistics::new());
        assert_eq!(compacted.value.as_comparison(), Some(CompareOp::Eq));
    }

    #[test]
    fn untrackable_conjuncts_survive() {
        let name = Node::bound_identifier(SchemaColumn::new("name", ValueType::Varchar));
        let like = Node::comparison(
            CompareOp::Like,
            name,
            Node::literal(Value::Varchar("C%".into())),
        );
        let condition = Node::and(
            Node::and(cmp(CompareOp::Gt, 1), cmp(CompareOp::Gt, 3)),
            like.clone(),
        );
        let compacted = compact_condition(condition, &QueryStatistics::new());
        let mut conjuncts = Vec::new();
        flatten_and(compacted, &mut conjuncts);
        // the two lower bounds collapse to one, the LIKE survives
        assert_eq!(conjuncts.len(), 2);
        assert!(conjuncts
            .iter()
            .any(|c| c.value.as_comparison() == Some(CompareOp::Like)));
    }

    #[test]
    fn single_predicate_left_alone() {
        let condition = cmp(CompareOp::Gt, 1);
        let compacted = compact_condition(condition.clone(), &QueryStatistics::new());
        assert_eq!(compacted.uuid, condition.uuid);
    }
}
