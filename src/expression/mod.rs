//! # Expression Trees
//!
//! Bound expressions as produced by the planner and rewritten by the
//! optimizer. A [`Node`] is a tagged tree: logical connectives use
//! `left`/`right` (or `centre` for NOT), functions and aggregators carry an
//! ordered `parameters` list, and every bound node knows its output
//! [`SchemaColumn`] and resolved [`ValueType`].
//!
//! Node identity matters to the optimizer: clones keep their `uuid`, so a
//! duplicated conjunct (`A AND A`) is recognisable wherever it travels.

pub mod evaluator;
pub mod functions;
pub mod operator_map;

use std::fmt;

use crate::schema::SchemaColumn;
use crate::value::{Value, ValueType};

/// Expression node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Literal,
    Identifier,
    Wildcard,
    And,
    Or,
    Xor,
    Not,
    ComparisonOperator,
    BinaryOperator,
    UnaryOperator,
    Function,
    Aggregator,
    Nested,
    ExpressionList,
    /// A flattened chain of ANDed predicates built by predicate
    /// flattening/ordering; evaluated left to right
    Dnf,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Like,
    NotLike,
    ILike,
    NotILike,
    RLike,
    NotRLike,
    InStr,
    NotInStr,
    IInStr,
    NotIInStr,
    InList,
    NotInList,
    AnyOpEq,
    AllOpNotEq,
    AnyOpGtEq,
    AllOpLt,
}

impl CompareOp {
    /// The closed inversion table: `NOT (a op b)` becomes `a op' b` for
    /// exactly these pairs. Operators outside the table cannot be inverted.
    pub fn inverse(self) -> Option<CompareOp> {
        use CompareOp::*;
        Some(match self {
            Eq => NotEq,
            NotEq => Eq,
            Gt => LtEq,
            LtEq => Gt,
            GtEq => Lt,
            Lt => GtEq,
            Like => NotLike,
            NotLike => Like,
            ILike => NotILike,
            NotILike => ILike,
            RLike => NotRLike,
            NotRLike => RLike,
            InStr => NotInStr,
            NotInStr => InStr,
            IInStr => NotIInStr,
            NotIInStr => IInStr,
            AnyOpEq => AllOpNotEq,
            AllOpNotEq => AnyOpEq,
            AnyOpGtEq => AllOpLt,
            AllOpLt => AnyOpGtEq,
            InList | NotInList => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        use CompareOp::*;
        match self {
            Eq => "=",
            NotEq => "!=",
            Gt => ">",
            GtEq => ">=",
            Lt => "<",
            LtEq => "<=",
            Like => "LIKE",
            NotLike => "NOT LIKE",
            ILike => "ILIKE",
            NotILike => "NOT ILIKE",
            RLike => "RLIKE",
            NotRLike => "NOT RLIKE",
            InStr => "INSTR",
            NotInStr => "NOT INSTR",
            IInStr => "IINSTR",
            NotIInStr => "NOT IINSTR",
            InList => "IN",
            NotInList => "NOT IN",
            AnyOpEq => "= ANY",
            AllOpNotEq => "!= ALL",
            AnyOpGtEq => ">= ANY",
            AllOpLt => "< ALL",
        }
    }
}

/// Binary (arithmetic) operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    StringConcat,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::StringConcat => "||",
        }
    }
}

/// Unary operators (operand in `centre`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    IsNull,
    IsNotNull,
    Negative,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    MinMax,
    Product,
    StdDev,
    Variance,
    List,
    One,
    AnyValue,
    CountDistinct,
    ApproximateMedian,
    ArrayAgg,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        use AggregateFunction::*;
        match self {
            Count => "COUNT",
            Sum => "SUM",
            Min => "MIN",
            Max => "MAX",
            Avg => "AVG",
            MinMax => "MIN_MAX",
            Product => "PRODUCT",
            StdDev => "STDDEV",
            Variance => "VARIANCE",
            List => "LIST",
            One => "ONE",
            AnyValue => "ANY_VALUE",
            CountDistinct => "COUNT_DISTINCT",
            ApproximateMedian => "APPROXIMATE_MEDIAN",
            ArrayAgg => "ARRAY_AGG",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        use AggregateFunction::*;
        Some(match name.to_ascii_uppercase().as_str() {
            "COUNT" => Count,
            "SUM" => Sum,
            "MIN" => Min,
            "MAX" => Max,
            "AVG" | "MEAN" => Avg,
            "MIN_MAX" => MinMax,
            "PRODUCT" => Product,
            "STDDEV" => StdDev,
            "VARIANCE" => Variance,
            "LIST" => List,
            "ONE" => One,
            "ANY_VALUE" => AnyValue,
            "COUNT_DISTINCT" => CountDistinct,
            "APPROXIMATE_MEDIAN" | "MEDIAN" => ApproximateMedian,
            "ARRAY_AGG" => ArrayAgg,
            _ => return None,
        })
    }
}

/// The payload a node carries, depending on its kind
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    None,
    Literal(Value),
    Comparison(CompareOp),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Function(String),
    Aggregate(AggregateFunction),
}

impl NodeValue {
    pub fn as_comparison(&self) -> Option<CompareOp> {
        match self {
            NodeValue::Comparison(op) => Some(*op),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<BinaryOp> {
        match self {
            NodeValue::Binary(op) => Some(*op),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            NodeValue::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// A node in a bound expression tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub node_type: NodeType,
    pub value: NodeValue,
    pub left: Option<Box<Node>>,
    pub right: Option<Box<Node>>,
    pub centre: Option<Box<Node>>,
    pub parameters: Vec<Node>,
    /// The output column this expression is bound to
    pub schema_column: Option<SchemaColumn>,
    /// Resolved type; `None` until binding, `Missing` when the operator map
    /// has no entry for the operand types
    pub value_type: Option<ValueType>,
    pub alias: Option<String>,
    /// The name this expression had in the query text (projected alias)
    pub query_column: Option<String>,
    /// Identifier provenance: relation and column as written
    pub source: Option<String>,
    pub source_column: Option<String>,
    /// DISTINCT modifier on aggregators
    pub distinct: bool,
    /// LIMIT modifier on collecting aggregators
    pub agg_limit: Option<usize>,
    /// Stable expression id; preserved by clones
    pub uuid: String,
}

impl Node {
    pub fn new(node_type: NodeType) -> Self {
        Node {
            node_type,
            value: NodeValue::None,
            left: None,
            right: None,
            centre: None,
            parameters: Vec::new(),
            schema_column: None,
            value_type: None,
            alias: None,
            query_column: None,
            source: None,
            source_column: None,
            distinct: false,
            agg_limit: None,
            uuid: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn literal(value: Value) -> Self {
        let value_type = value.value_type();
        let mut node = Node::new(NodeType::Literal);
        node.value = NodeValue::Literal(value);
        node.value_type = Some(value_type);
        node
    }

    pub fn literal_typed(value: Value, value_type: ValueType) -> Self {
        let mut node = Node::literal(value);
        node.value_type = Some(value_type);
        node
    }

    /// An unbound identifier; the binder fills in `schema_column`.
    pub fn identifier(source_column: impl Into<String>, source: Option<String>) -> Self {
        let mut node = Node::new(NodeType::Identifier);
        node.source_column = Some(source_column.into());
        node.source = source;
        node
    }

    /// An identifier already bound to a schema column.
    pub fn bound_identifier(column: SchemaColumn) -> Self {
        let mut node = Node::new(NodeType::Identifier);
        node.source = column.origin.first().cloned();
        node.source_column = Some(column.name.clone());
        node.value_type = Some(column.value_type);
        node.schema_column = Some(column);
        node
    }

    pub fn wildcard() -> Self {
        Node::new(NodeType::Wildcard)
    }

    pub fn comparison(op: CompareOp, left: Node, right: Node) -> Self {
        let mut node = Node::new(NodeType::ComparisonOperator);
        node.value = NodeValue::Comparison(op);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        let mut node = Node::new(NodeType::BinaryOperator);
        node.value = NodeValue::Binary(op);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        let mut node = Node::new(NodeType::UnaryOperator);
        node.value = NodeValue::Unary(op);
        node.centre = Some(Box::new(operand));
        node.value_type = Some(match op {
            UnaryOp::IsNull | UnaryOp::IsNotNull => ValueType::Boolean,
            UnaryOp::Negative => ValueType::Missing,
        });
        node
    }

    pub fn and(left: Node, right: Node) -> Self {
        let mut node = Node::new(NodeType::And);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn or(left: Node, right: Node) -> Self {
        let mut node = Node::new(NodeType::Or);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn xor(left: Node, right: Node) -> Self {
        let mut node = Node::new(NodeType::Xor);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn not(operand: Node) -> Self {
        let mut node = Node::new(NodeType::Not);
        node.centre = Some(Box::new(operand));
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn nested(inner: Node) -> Self {
        let mut node = Node::new(NodeType::Nested);
        node.value_type = inner.value_type;
        node.centre = Some(Box::new(inner));
        node
    }

    pub fn function(name: impl Into<String>, parameters: Vec<Node>) -> Self {
        let mut node = Node::new(NodeType::Function);
        node.value = NodeValue::Function(name.into());
        node.parameters = parameters;
        node
    }

    pub fn aggregate(func: AggregateFunction, parameters: Vec<Node>) -> Self {
        let mut node = Node::new(NodeType::Aggregator);
        node.value = NodeValue::Aggregate(func);
        node.parameters = parameters;
        node
    }

    pub fn expression_list(parameters: Vec<Node>) -> Self {
        let mut node = Node::new(NodeType::ExpressionList);
        node.parameters = parameters;
        node
    }

    pub fn dnf(parameters: Vec<Node>) -> Self {
        let mut node = Node::new(NodeType::Dnf);
        node.parameters = parameters;
        node.value_type = Some(ValueType::Boolean);
        node
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// A structural copy with a fresh uuid, for rewrites that must not be
    /// mistaken for the original expression.
    pub fn with_new_id(&self) -> Node {
        let mut copy = self.clone();
        copy.uuid = uuid::Uuid::new_v4().simple().to_string();
        copy
    }

    pub fn is_literal_true(&self) -> bool {
        matches!(&self.value, NodeValue::Literal(Value::Boolean(true)))
    }

    pub fn is_literal_false(&self) -> bool {
        matches!(&self.value, NodeValue::Literal(Value::Boolean(false)))
    }

    /// The name this expression currently presents as.
    pub fn current_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if let Some(query_column) = &self.query_column {
            return query_column.clone();
        }
        if let Some(schema_column) = &self.schema_column {
            return schema_column.name.clone();
        }
        if let Some(source_column) = &self.source_column {
            return source_column.clone();
        }
        self.format()
    }

    /// The bound identity, when this expression has one.
    pub fn identity(&self) -> Option<&str> {
        self.schema_column.as_ref().map(|c| c.identity.as_str())
    }

    /// All nodes in the tree matching `predicate`, depth-first.
    pub fn collect<'a>(&'a self, predicate: &dyn Fn(&Node) -> bool, found: &mut Vec<&'a Node>) {
        if predicate(self) {
            found.push(self);
        }
        for child in [&self.left, &self.centre, &self.right].into_iter().flatten() {
            child.collect(predicate, found);
        }
        for parameter in &self.parameters {
            parameter.collect(predicate, found);
        }
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<&Node> {
        let mut found = Vec::new();
        self.collect(&|n| n.node_type == node_type, &mut found);
        found
    }

    pub fn identifiers(&self) -> Vec<&Node> {
        self.nodes_of_type(NodeType::Identifier)
    }

    pub fn has_aggregator(&self) -> bool {
        !self.nodes_of_type(NodeType::Aggregator).is_empty()
    }

    /// Identities of every bound identifier in the tree.
    pub fn identities(&self) -> Vec<String> {
        self.identifiers()
            .iter()
            .filter_map(|n| n.identity().map(str::to_string))
            .collect()
    }

    /// Relations referenced by identifiers in the tree (sources and
    /// schema-column origins).
    pub fn relations(&self) -> std::collections::HashSet<String> {
        let mut relations = std::collections::HashSet::new();
        for identifier in self.identifiers() {
            if let Some(source) = &identifier.source {
                relations.insert(source.clone());
            }
            if let Some(column) = &identifier.schema_column {
                relations.extend(column.origin.iter().cloned());
            }
        }
        relations
    }

    /// True when the tree contains a function evaluated per row
    /// (RANDOM, RAND, NORMAL, RANDOM_STRING); these are never folded.
    pub fn has_non_deterministic_function(&self) -> bool {
        self.nodes_of_type(NodeType::Function).iter().any(|n| {
            matches!(
                &n.value,
                NodeValue::Function(name)
                    if matches!(name.as_str(), "RANDOM" | "RAND" | "NORMAL" | "RANDOM_STRING")
            )
        })
    }

    /// Render the expression as SQL-ish text, used for derived column names
    /// and EXPLAIN output.
    pub fn format(&self) -> String {
        match self.node_type {
            NodeType::Literal => match &self.value {
                NodeValue::Literal(Value::Varchar(s)) => format!("'{s}'"),
                NodeValue::Literal(v) => v.to_string(),
                _ => "?".to_string(),
            },
            NodeType::Identifier => {
                if let Some(alias) = &self.alias {
                    return alias.clone();
                }
                match (&self.source, &self.source_column) {
                    (Some(source), Some(column)) => format!("{source}.{column}"),
                    (None, Some(column)) => column.clone(),
                    _ => self
                        .schema_column
                        .as_ref()
                        .map_or_else(|| "?".to_string(), |c| c.name.clone()),
                }
            }
            NodeType::Wildcard => "*".to_string(),
            NodeType::And => self.format_infix("AND"),
            NodeType::Or => self.format_infix("OR"),
            NodeType::Xor => self.format_infix("XOR"),
            NodeType::Not => format!(
                "NOT {}",
                self.centre.as_ref().map_or_else(String::new, |c| c.format())
            ),
            NodeType::ComparisonOperator => {
                let op = self.value.as_comparison().map_or("?", CompareOp::symbol);
                self.format_infix(op)
            }
            NodeType::BinaryOperator => {
                let op = self.value.as_binary().map_or("?", BinaryOp::symbol);
                self.format_infix(op)
            }
            NodeType::UnaryOperator => {
                let operand = self.centre.as_ref().map_or_else(String::new, |c| c.format());
                match self.value {
                    NodeValue::Unary(UnaryOp::IsNull) => format!("{operand} IS NULL"),
                    NodeValue::Unary(UnaryOp::IsNotNull) => format!("{operand} IS NOT NULL"),
                    NodeValue::Unary(UnaryOp::Negative) => format!("-{operand}"),
                    _ => operand,
                }
            }
            NodeType::Function => {
                let name = match &self.value {
                    NodeValue::Function(name) => name.as_str(),
                    _ => "?",
                };
                format!("{name}({})", self.format_parameters())
            }
            NodeType::Aggregator => {
                let name = match &self.value {
                    NodeValue::Aggregate(func) => func.name(),
                    _ => "?",
                };
                let distinct = if self.distinct { "DISTINCT " } else { "" };
                format!("{name}({distinct}{})", self.format_parameters())
            }
            NodeType::Nested => format!(
                "({})",
                self.centre.as_ref().map_or_else(String::new, |c| c.format())
            ),
            NodeType::ExpressionList => self.format_parameters(),
            NodeType::Dnf => self
                .parameters
                .iter()
                .map(Node::format)
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    fn format_infix(&self, op: &str) -> String {
        format!(
            "{} {op} {}",
            self.left.as_ref().map_or_else(String::new, |n| n.format()),
            self.right.as_ref().map_or_else(String::new, |n| n.format()),
        )
    }

    fn format_parameters(&self) -> String {
        self.parameters
            .iter()
            .map(Node::format)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inversion_table_round_trips() {
        for op in [
            CompareOp::Eq,
            CompareOp::NotEq,
            CompareOp::Gt,
            CompareOp::GtEq,
            CompareOp::Lt,
            CompareOp::LtEq,
            CompareOp::Like,
            CompareOp::ILike,
            CompareOp::RLike,
            CompareOp::InStr,
            CompareOp::IInStr,
            CompareOp::AnyOpEq,
            CompareOp::AnyOpGtEq,
        ] {
            let inverse = op.inverse().expect("operator is invertible");
            assert_eq!(inverse.inverse(), Some(op));
        }
        assert_eq!(CompareOp::InList.inverse(), None);
    }

    #[test]
    fn clone_preserves_uuid_but_with_new_id_does_not() {
        let node = Node::literal(Value::Integer(1));
        assert_eq!(node.clone().uuid, node.uuid);
        assert_ne!(node.with_new_id().uuid, node.uuid);
    }

    #[test]
    fn identifier_collection_walks_all_slots() {
        let condition = Node::and(
            Node::comparison(
                CompareOp::Eq,
                Node::identifier("id", Some("planets".into())),
                Node::literal(Value::Integer(1)),
            ),
            Node::not(Node::comparison(
                CompareOp::Gt,
                Node::identifier("mass", Some("planets".into())),
                Node::literal(Value::Double(10.0)),
            )),
        );
        assert_eq!(condition.identifiers().len(), 2);
    }

    #[test]
    fn format_renders_sqlish() {
        let condition = Node::comparison(
            CompareOp::NotEq,
            Node::identifier("id", None),
            Node::literal(Value::Integer(9)),
        );
        assert_eq!(condition.format(), "id != 9");
    }
}
