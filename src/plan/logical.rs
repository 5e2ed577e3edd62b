//! Logical plan nodes.
//!
//! A [`LogicalPlanNode`] is a step type plus a property bag; only the
//! fields relevant to the step kind are populated. The binder fills in
//! schema columns, relation name lists and connector handles; optimizer
//! strategies mutate copies of these nodes as they rewrite the plan.

use std::collections::HashSet;
use std::sync::Arc;

use crate::connectors::Connector;
use crate::expression::Node;
use crate::plan::graph::{Nid, PlanGraph};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::Value;

/// Every kind of logical plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPlanStepType {
    Scan,
    FunctionDataset,
    Filter,
    Project,
    Aggregate,
    AggregateAndGroup,
    Join,
    Unnest,
    Limit,
    Offset,
    Order,
    HeapSort,
    Distinct,
    Union,
    Subquery,
    CTE,
    Exit,
    Explain,
    Set,
    Show,
    ShowColumns,
    MetadataWriter,
}

/// Join flavours; `NestedInner` is chosen by the join-ordering strategy
/// for small legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    NestedInner,
    LeftOuter,
    RightOuter,
    FullOuter,
    CrossJoin,
    LeftSemi,
    LeftAnti,
    RightSemi,
    RightAnti,
}

impl JoinType {
    pub fn label(self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::NestedInner => "nested_inner",
            JoinType::LeftOuter => "left outer",
            JoinType::RightOuter => "right outer",
            JoinType::FullOuter => "full outer",
            JoinType::CrossJoin => "cross join",
            JoinType::LeftSemi => "left semi",
            JoinType::LeftAnti => "left anti",
            JoinType::RightSemi => "right semi",
            JoinType::RightAnti => "right anti",
        }
    }

    /// Outer joins that keep unmatched left rows; predicates referencing
    /// only the right leg cannot be pushed past these.
    pub fn is_left_flavour(self) -> bool {
        matches!(
            self,
            JoinType::LeftOuter | JoinType::LeftSemi | JoinType::LeftAnti
        )
    }
}

/// Sort direction for ORDER BY / HEAPSORT keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A logical plan step with its property bag.
#[derive(Clone, Default)]
pub struct LogicalPlanNode {
    pub step: LogicalPlanStepType,

    // scan / function dataset
    pub relation: Option<String>,
    pub alias: Option<String>,
    pub connector: Option<Arc<dyn Connector>>,
    pub schema: Option<RelationSchema>,
    /// Bound columns this step reads or emits
    pub columns: Vec<Node>,
    /// Predicates pushed into the connector
    pub predicates: Vec<Node>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Temporal range from a `FOR` clause, passed through to the connector
    pub temporal_range: Option<(chrono::NaiveDate, chrono::NaiveDate)>,
    /// FunctionDataset generator name (e.g. EMPTY, VALUES)
    pub function: Option<String>,
    /// Detached plan fragment for SQL-typed connectors (extension point)
    pub plan_fragment: Option<Box<LogicalPlan>>,

    // filter
    pub condition: Option<Node>,
    /// Source relations the condition touches
    pub relations: HashSet<String>,
    /// Every relation name and alias visible at this step
    pub all_relations: HashSet<String>,

    // join
    pub join_type: Option<JoinType>,
    pub on: Option<Node>,
    pub left_columns: Vec<Node>,
    pub right_columns: Vec<Node>,
    pub left_relation_names: Vec<String>,
    pub right_relation_names: Vec<String>,
    pub left_size: Option<usize>,
    pub right_size: Option<usize>,
    /// Scan node ids feeding each leg, used by correlated-filter insertion
    pub left_readers: Vec<Nid>,
    pub right_readers: Vec<Nid>,
    /// Column layout of each leg, recorded by the binder; outer and cross
    /// joins use these to null-pad or lay out an empty side
    pub left_schema: Vec<SchemaColumn>,
    pub right_schema: Vec<SchemaColumn>,

    // aggregate / group
    pub aggregates: Vec<Node>,
    pub groups: Vec<Node>,
    pub projection: Vec<Node>,

    // order / heap sort
    pub order_by: Vec<(Node, Direction)>,

    // unnest
    pub unnest_column: Option<Node>,
    pub unnest_target: Option<SchemaColumn>,
    /// Literal values the unnested elements are restricted to
    pub filters: Option<Vec<Value>>,
    /// Emit each distinct element once (distinct pushdown)
    pub distinct: bool,

    // distinct
    pub distinct_on: Option<Vec<Node>>,

    // show / set / explain
    pub object_type: Option<String>,
    pub items: Vec<String>,
    pub variable: Option<String>,
    pub value: Option<Value>,
    pub analyze: bool,

    // optimizer bookkeeping
    /// Identities referenced by operators above this node, recorded by
    /// projection pushdown
    pub pre_update_columns: HashSet<String>,
    /// The node's id when it was lifted out of the plan
    pub nid: Option<Nid>,
    /// Path from the node's original position to the plan root
    pub plan_path: Vec<Nid>,
}

impl Default for LogicalPlanStepType {
    fn default() -> Self {
        LogicalPlanStepType::Scan
    }
}

impl LogicalPlanNode {
    pub fn new(step: LogicalPlanStepType) -> Self {
        LogicalPlanNode {
            step,
            ..Default::default()
        }
    }

    /// A Filter node wrapping a bound condition; columns and relations are
    /// derived from the condition's identifiers.
    pub fn filter(condition: Node) -> Self {
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Filter);
        node.columns = condition.identifiers().into_iter().cloned().collect();
        node.relations = condition.relations();
        node.all_relations = node.relations.clone();
        node.condition = Some(condition);
        node
    }

    /// One-line description for EXPLAIN and plan rendering.
    pub fn label(&self) -> String {
        match self.step {
            LogicalPlanStepType::Scan => {
                let mut text = format!(
                    "SCAN ({})",
                    self.relation.as_deref().unwrap_or("?")
                );
                if !self.predicates.is_empty() {
                    let rendered: Vec<String> =
                        self.predicates.iter().map(Node::format).collect();
                    text.push_str(&format!(" WHERE {}", rendered.join(" AND ")));
                }
                if let Some(limit) = self.limit {
                    text.push_str(&format!(" LIMIT {limit}"));
                }
                text
            }
            LogicalPlanStepType::FunctionDataset => format!(
                "FUNCTION DATASET ({})",
                self.function.as_deref().unwrap_or("?")
            ),
            LogicalPlanStepType::Filter => format!(
                "FILTER ({})",
                self.condition.as_ref().map_or_else(String::new, Node::format)
            ),
            LogicalPlanStepType::Project => {
                let rendered: Vec<String> =
                    self.columns.iter().map(Node::current_name).collect();
                format!("PROJECT ({})", rendered.join(", "))
            }
            LogicalPlanStepType::Aggregate => {
                let rendered: Vec<String> = self.aggregates.iter().map(Node::format).collect();
                format!("AGGREGATE ({})", rendered.join(", "))
            }
            LogicalPlanStepType::AggregateAndGroup => {
                let aggregates: Vec<String> =
                    self.aggregates.iter().map(Node::format).collect();
                let groups: Vec<String> = self.groups.iter().map(Node::format).collect();
                format!(
                    "AGGREGATE ({}) GROUP BY ({})",
                    aggregates.join(", "),
                    groups.join(", ")
                )
            }
            LogicalPlanStepType::Join => {
                let join_type = self.join_type.map_or("?", JoinType::label);
                match &self.on {
                    Some(on) => format!("{} JOIN ON {}", join_type.to_uppercase(), on.format()),
                    None => format!("{} JOIN", join_type.to_uppercase()),
                }
            }
            LogicalPlanStepType::Unnest => format!(
                "CROSS JOIN UNNEST ({})",
                self.unnest_column.as_ref().map_or_else(String::new, Node::format)
            ),
            LogicalPlanStepType::Limit => match self.offset {
                Some(offset) => format!(
                    "LIMIT {} OFFSET {offset}",
                    self.limit.map_or_else(|| "ALL".to_string(), |l| l.to_string())
                ),
                None => format!(
                    "LIMIT {}",
                    self.limit.map_or_else(|| "ALL".to_string(), |l| l.to_string())
                ),
            },
            LogicalPlanStepType::Offset => {
                format!("OFFSET {}", self.offset.unwrap_or(0))
            }
            LogicalPlanStepType::Order => {
                let keys: Vec<String> = self
                    .order_by
                    .iter()
                    .map(|(k, d)| format!("{} {d:?}", k.format()))
                    .collect();
                format!("ORDER BY ({})", keys.join(", "))
            }
            LogicalPlanStepType::HeapSort => {
                let keys: Vec<String> = self
                    .order_by
                    .iter()
                    .map(|(k, d)| format!("{} {d:?}", k.format()))
                    .collect();
                format!(
                    "HEAP SORT (LIMIT {}, ORDER BY {})",
                    self.limit.unwrap_or(0),
                    keys.join(", ")
                )
            }
            LogicalPlanStepType::Distinct => "DISTINCT".to_string(),
            LogicalPlanStepType::Union => "UNION".to_string(),
            LogicalPlanStepType::Subquery => format!(
                "SUBQUERY (AS {})",
                self.alias.as_deref().unwrap_or("?")
            ),
            LogicalPlanStepType::CTE => {
                format!("CTE (AS {})", self.alias.as_deref().unwrap_or("?"))
            }
            LogicalPlanStepType::Exit => {
                let rendered: Vec<String> =
                    self.columns.iter().map(Node::current_name).collect();
                format!("EXIT ({})", rendered.join(", "))
            }
            LogicalPlanStepType::Explain => {
                if self.analyze {
                    "EXPLAIN ANALYZE".to_string()
                } else {
                    "EXPLAIN".to_string()
                }
            }
            LogicalPlanStepType::Set => format!(
                "SET {} = {}",
                self.variable.as_deref().unwrap_or("?"),
                self.value.as_ref().map_or_else(String::new, Value::to_string)
            ),
            LogicalPlanStepType::Show => format!(
                "SHOW {}",
                self.items.join(" ")
            ),
            LogicalPlanStepType::ShowColumns => format!(
                "SHOW COLUMNS ({})",
                self.relation.as_deref().unwrap_or("?")
            ),
            LogicalPlanStepType::MetadataWriter => "WRITER".to_string(),
        }
    }
}

impl std::fmt::Debug for LogicalPlanNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// The logical plan: a DAG of steps
pub type LogicalPlan = PlanGraph<LogicalPlanNode>;

/// Render a plan as an indented tree from its head, for EXPLAIN output.
pub fn draw(plan: &LogicalPlan) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    for exit in plan.get_exit_points() {
        draw_inner(plan, &exit, 0, &mut lines);
    }
    lines
}

fn draw_inner(plan: &LogicalPlan, nid: &str, depth: usize, lines: &mut Vec<(usize, String)>) {
    if let Some(node) = plan.get(nid) {
        lines.push((depth, node.label()));
    }
    for (source, _, _) in plan.ingoing_edges(nid) {
        draw_inner(plan, &source, depth + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{CompareOp, Node};

    #[test]
    fn filter_node_derives_relations() {
        let condition = Node::comparison(
            CompareOp::Eq,
            Node::identifier("name", Some("$satellites".to_string())),
            Node::literal(Value::Varchar("Calypso".into())),
        );
        let node = LogicalPlanNode::filter(condition);
        assert_eq!(node.columns.len(), 1);
        assert!(node.relations.contains("$satellites"));
    }

    #[test]
    fn labels_render() {
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Limit);
        node.limit = Some(5);
        assert_eq!(node.label(), "LIMIT 5");
        node.offset = Some(2);
        assert_eq!(node.label(), "LIMIT 5 OFFSET 2");
    }
}
