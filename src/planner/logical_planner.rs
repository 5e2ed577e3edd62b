//! The logical planner.
//!
//! Statements with engine-specific surface (SET, SHOW, EXPLAIN) are
//! recognised up front; everything else is handed to the delegated
//! MySQL-flavoured parser and its query AST is lowered into an unbound
//! [`LogicalPlan`]. Expressions come out as unbound [`Node`] trees; the
//! binder resolves identifiers, types and connectors afterwards.

use std::collections::HashMap;

use sqlparser::ast as sql;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::errors::{Error, Result};
use crate::expression::{
    AggregateFunction, BinaryOp, CompareOp, Node, NodeType, UnaryOp,
};
use crate::plan::{
    random_nid, JoinLeg, JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType, Nid,
};
use crate::value::Value;

/// What kind of statement this is, for the permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Execute,
    Analyze,
}

/// Plan a SQL statement (already stripped of temporal clauses).
pub fn plan_sql(sql_text: &str) -> Result<(LogicalPlan, StatementKind)> {
    let trimmed = sql_text.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err(Error::MissingSqlStatement);
    }
    let upper = trimmed.to_uppercase();

    if let Some(rest) = upper
        .strip_prefix("EXPLAIN")
        .filter(|rest| rest.starts_with(char::is_whitespace))
    {
        let analyze = rest.trim_start().starts_with("ANALYZE");
        let inner_start = if analyze {
            trimmed.len() - rest.trim_start().len() + "ANALYZE".len()
        } else {
            "EXPLAIN".len()
        };
        let inner_sql = &trimmed[inner_start..];
        let (mut plan, _) = plan_sql(inner_sql)?;
        let root = plan.exit_point()?;
        let mut explain = LogicalPlanNode::new(LogicalPlanStepType::Explain);
        explain.analyze = analyze;
        plan.insert_node_after(random_nid(), explain, &root)?;
        let kind = if analyze {
            StatementKind::Analyze
        } else {
            StatementKind::Query
        };
        return Ok((plan, kind));
    }

    if upper.starts_with("SET ") {
        return plan_set(trimmed);
    }

    if upper.starts_with("SHOW ") {
        return plan_show(trimmed);
    }

    let statements = Parser::parse_sql(&MySqlDialect {}, trimmed)
        .map_err(|e| Error::Sql(e.to_string()))?;
    if statements.is_empty() {
        return Err(Error::MissingSqlStatement);
    }
    if statements.len() > 1 {
        return Err(Error::UnsupportedSyntax(
            "only one statement at a time".to_string(),
        ));
    }
    match &statements[0] {
        sql::Statement::Query(query) => {
            let mut plan = LogicalPlan::new();
            let ctes = HashMap::new();
            let root = plan_query(query, &mut plan, &ctes)?;
            let exit = LogicalPlanNode::new(LogicalPlanStepType::Exit);
            let exit_nid = random_nid();
            plan.add_node(exit_nid.clone(), exit);
            plan.add_edge(root, exit_nid, None)?;
            Ok((plan, StatementKind::Query))
        }
        // CREATE TABLE <name> AS SELECT: the writer counts rows through;
        // the actual write is delegated to the target's connector
        sql::Statement::CreateTable(create) if create.query.is_some() => {
            let query = create
                .query
                .as_ref()
                .ok_or(Error::MissingSqlStatement)?;
            let mut plan = LogicalPlan::new();
            let ctes = HashMap::new();
            let root = plan_query(query, &mut plan, &ctes)?;
            let mut writer = LogicalPlanNode::new(LogicalPlanStepType::MetadataWriter);
            writer.relation = Some(create.name.to_string());
            let writer_nid = random_nid();
            plan.add_node(writer_nid.clone(), writer);
            plan.add_edge(root, writer_nid.clone(), None)?;
            let exit_nid = random_nid();
            plan.add_node(
                exit_nid.clone(),
                LogicalPlanNode::new(LogicalPlanStepType::Exit),
            );
            plan.add_edge(writer_nid, exit_nid, None)?;
            Ok((plan, StatementKind::Execute))
        }
        other => Err(Error::UnsupportedSyntax(format!(
            "statement not supported: {other}"
        ))),
    }
}

fn plan_set(sql_text: &str) -> Result<(LogicalPlan, StatementKind)> {
    let rest = sql_text[4..].trim();
    let Some((name, value)) = rest.split_once('=') else {
        return Err(Error::Sql("SET expects 'SET <name> = <value>'".to_string()));
    };
    let name = name.trim().trim_start_matches('@').to_string();
    if name.is_empty() {
        return Err(Error::Sql("SET with no variable name".to_string()));
    }
    let mut node = LogicalPlanNode::new(LogicalPlanStepType::Set);
    node.variable = Some(name);
    node.value = Some(parse_scalar(value.trim()));
    let mut plan = LogicalPlan::new();
    plan.add_node(random_nid(), node);
    Ok((plan, StatementKind::Execute))
}

fn parse_scalar(text: &str) -> Value {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
    {
        return Value::Varchar(inner.to_string());
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Boolean(true),
        "false" => return Value::Boolean(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Integer(integer);
    }
    if let Ok(double) = trimmed.parse::<f64>() {
        return Value::Double(double);
    }
    Value::Varchar(trimmed.to_string())
}

fn plan_show(sql_text: &str) -> Result<(LogicalPlan, StatementKind)> {
    let rest = sql_text[5..].trim();
    let upper = rest.to_uppercase();
    let mut plan = LogicalPlan::new();

    if upper.starts_with("CREATE") {
        return Err(Error::UnsupportedSyntax(
            "SHOW CREATE requires a view catalog".to_string(),
        ));
    }
    if let Some(relation) = upper
        .strip_prefix("COLUMNS FROM")
        .map(|_| rest["COLUMNS FROM".len()..].trim())
    {
        if relation.is_empty() {
            return Err(Error::Sql("SHOW COLUMNS FROM expects a relation".to_string()));
        }
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::ShowColumns);
        node.relation = Some(relation.to_string());
        plan.add_node(random_nid(), node);
        return Ok((plan, StatementKind::Query));
    }

    let variable = rest.split_whitespace().next().unwrap_or_default();
    if variable.is_empty() {
        return Err(Error::Sql("SHOW expects a variable".to_string()));
    }
    let mut node = LogicalPlanNode::new(LogicalPlanStepType::Show);
    node.object_type = Some("VARIABLE".to_string());
    node.items = vec![variable.trim_start_matches('@').to_string()];
    plan.add_node(random_nid(), node);
    Ok((plan, StatementKind::Query))
}

type CteMap = HashMap<String, sql::Query>;

fn plan_query(query: &sql::Query, plan: &mut LogicalPlan, ctes: &CteMap) -> Result<Nid> {
    // WITH clauses are gathered and inlined at their reference sites
    let mut scoped = ctes.clone();
    if let Some(with) = &query.with {
        if with.recursive {
            return Err(Error::UnsupportedSyntax(
                "recursive CTEs are not supported".to_string(),
            ));
        }
        for cte in &with.cte_tables {
            scoped.insert(cte.alias.name.value.to_lowercase(), (*cte.query).clone());
        }
    }

    let mut root = plan_set_expr(&query.body, plan, &scoped)?;

    if let Some(order_by) = &query.order_by {
        if !order_by.exprs.is_empty() {
            let mut node = LogicalPlanNode::new(LogicalPlanStepType::Order);
            for item in &order_by.exprs {
                let key = expr_to_node(&item.expr)?;
                let direction = if item.asc == Some(false) {
                    crate::plan::Direction::Descending
                } else {
                    crate::plan::Direction::Ascending
                };
                node.order_by.push((key, direction));
            }
            let nid = random_nid();
            plan.add_node(nid.clone(), node);
            plan.add_edge(root, nid.clone(), None)?;
            root = nid;
        }
    }

    let limit = match &query.limit {
        Some(expr) => Some(expr_to_usize(expr)?),
        None => None,
    };
    let offset = match &query.offset {
        Some(offset) => Some(expr_to_usize(&offset.value)?),
        None => None,
    };
    if limit.is_some() || offset.is_some() {
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Limit);
        node.limit = limit;
        node.offset = offset;
        let nid = random_nid();
        plan.add_node(nid.clone(), node);
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    }

    Ok(root)
}

fn expr_to_usize(expr: &sql::Expr) -> Result<usize> {
    match expr {
        sql::Expr::Value(sql::Value::Number(text, _)) => text
            .parse::<usize>()
            .map_err(|_| Error::Sql(format!("'{text}' is not a row count"))),
        other => Err(Error::Sql(format!(
            "expected a literal row count, got {other}"
        ))),
    }
}

fn plan_set_expr(body: &sql::SetExpr, plan: &mut LogicalPlan, ctes: &CteMap) -> Result<Nid> {
    match body {
        sql::SetExpr::Select(select) => plan_select(select, plan, ctes),
        sql::SetExpr::Query(query) => plan_query(query, plan, ctes),
        sql::SetExpr::SetOperation {
            op: sql::SetOperator::Union,
            set_quantifier,
            left,
            right,
        } => {
            let left_root = plan_set_expr(left, plan, ctes)?;
            let right_root = plan_set_expr(right, plan, ctes)?;
            let union_nid = random_nid();
            plan.add_node(
                union_nid.clone(),
                LogicalPlanNode::new(LogicalPlanStepType::Union),
            );
            plan.add_edge(left_root, union_nid.clone(), None)?;
            plan.add_edge(right_root, union_nid.clone(), None)?;

            let deduplicate = matches!(
                set_quantifier,
                sql::SetQuantifier::Distinct | sql::SetQuantifier::None
            );
            if deduplicate {
                let distinct_nid = random_nid();
                plan.add_node(
                    distinct_nid.clone(),
                    LogicalPlanNode::new(LogicalPlanStepType::Distinct),
                );
                plan.add_edge(union_nid, distinct_nid.clone(), None)?;
                Ok(distinct_nid)
            } else {
                Ok(union_nid)
            }
        }
        other => Err(Error::UnsupportedSyntax(format!(
            "query body not supported: {other}"
        ))),
    }
}

fn plan_select(select: &sql::Select, plan: &mut LogicalPlan, ctes: &CteMap) -> Result<Nid> {
    // FROM clause: a missing one reads the one-row no-table dataset
    let mut root = if select.from.is_empty() {
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$no_table".to_string());
        let nid = random_nid();
        plan.add_node(nid.clone(), scan);
        nid
    } else {
        let mut root = plan_table_with_joins(&select.from[0], plan, ctes)?;
        // comma-separated relations are cross joins
        for extra in select.from.iter().skip(1) {
            let right = plan_table_with_joins(extra, plan, ctes)?;
            let mut join = LogicalPlanNode::new(LogicalPlanStepType::Join);
            join.join_type = Some(JoinType::CrossJoin);
            let nid = random_nid();
            plan.add_node(nid.clone(), join);
            plan.add_edge(root, nid.clone(), Some(JoinLeg::Left))?;
            plan.add_edge(right, nid.clone(), Some(JoinLeg::Right))?;
            root = nid;
        }
        root
    };

    if let Some(selection) = &select.selection {
        let condition = expr_to_node(selection)?;
        let nid = random_nid();
        plan.add_node(nid.clone(), LogicalPlanNode::filter(condition));
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    }

    let mut projection = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        projection.push(select_item_to_node(item)?);
    }

    let group_exprs: Vec<Node> = match &select.group_by {
        sql::GroupByExpr::Expressions(exprs, _) => exprs
            .iter()
            .map(expr_to_node)
            .collect::<Result<Vec<_>>>()?,
        sql::GroupByExpr::All(_) => {
            return Err(Error::UnsupportedSyntax("GROUP BY ALL".to_string()))
        }
    };

    let mut aggregates = Vec::new();
    for item in &projection {
        for aggregate in item.nodes_of_type(NodeType::Aggregator) {
            aggregates.push(aggregate.clone());
        }
    }

    if !group_exprs.is_empty() {
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::AggregateAndGroup);
        node.groups = group_exprs;
        node.aggregates = aggregates;
        node.projection = projection;
        let nid = random_nid();
        plan.add_node(nid.clone(), node);
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    } else if !aggregates.is_empty() {
        if projection
            .iter()
            .any(|item| item.node_type != NodeType::Aggregator)
        {
            return Err(Error::UnsupportedSyntax(
                "non-aggregate columns in an aggregate query need GROUP BY".to_string(),
            ));
        }
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Aggregate);
        node.aggregates = projection;
        let nid = random_nid();
        plan.add_node(nid.clone(), node);
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    } else {
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Project);
        node.columns = projection;
        let nid = random_nid();
        plan.add_node(nid.clone(), node);
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    }

    if let Some(having) = &select.having {
        let condition = expr_to_node(having)?;
        let nid = random_nid();
        plan.add_node(nid.clone(), LogicalPlanNode::filter(condition));
        plan.add_edge(root, nid.clone(), None)?;
        root = nid;
    }

    match &select.distinct {
        Some(sql::Distinct::Distinct) => {
            let nid = random_nid();
            plan.add_node(
                nid.clone(),
                LogicalPlanNode::new(LogicalPlanStepType::Distinct),
            );
            plan.add_edge(root, nid.clone(), None)?;
            root = nid;
        }
        Some(sql::Distinct::On(exprs)) => {
            let mut node = LogicalPlanNode::new(LogicalPlanStepType::Distinct);
            node.distinct_on = Some(
                exprs
                    .iter()
                    .map(expr_to_node)
                    .collect::<Result<Vec<_>>>()?,
            );
            let nid = random_nid();
            plan.add_node(nid.clone(), node);
            plan.add_edge(root, nid.clone(), None)?;
            root = nid;
        }
        None => {}
    }

    Ok(root)
}

fn plan_table_with_joins(
    twj: &sql::TableWithJoins,
    plan: &mut LogicalPlan,
    ctes: &CteMap,
) -> Result<Nid> {
    let mut root = plan_table_factor(&twj.relation, plan, ctes)?;

    for join in &twj.joins {
        // CROSS JOIN UNNEST(column) AS alias expands an array column
        if let sql::TableFactor::UNNEST {
            alias, array_exprs, ..
        } = &join.relation
        {
            if !matches!(join.join_operator, sql::JoinOperator::CrossJoin) {
                return Err(Error::UnsupportedSyntax(
                    "UNNEST is only supported with CROSS JOIN".to_string(),
                ));
            }
            let array_expr = array_exprs.first().ok_or_else(|| {
                Error::Sql("UNNEST expects an array expression".to_string())
            })?;
            let mut node = LogicalPlanNode::new(LogicalPlanStepType::Unnest);
            node.unnest_column = Some(expr_to_node(array_expr)?);
            node.alias = alias.as_ref().map(|a| a.name.value.clone());
            let nid = random_nid();
            plan.add_node(nid.clone(), node);
            plan.add_edge(root, nid.clone(), None)?;
            root = nid;
            continue;
        }

        let (join_type, constraint) = match &join.join_operator {
            sql::JoinOperator::Inner(constraint) => (JoinType::Inner, Some(constraint)),
            sql::JoinOperator::LeftOuter(constraint) => (JoinType::LeftOuter, Some(constraint)),
            sql::JoinOperator::RightOuter(constraint) => {
                (JoinType::RightOuter, Some(constraint))
            }
            sql::JoinOperator::FullOuter(constraint) => (JoinType::FullOuter, Some(constraint)),
            sql::JoinOperator::CrossJoin => (JoinType::CrossJoin, None),
            sql::JoinOperator::LeftSemi(constraint) => (JoinType::LeftSemi, Some(constraint)),
            sql::JoinOperator::RightSemi(constraint) => (JoinType::RightSemi, Some(constraint)),
            sql::JoinOperator::LeftAnti(constraint) => (JoinType::LeftAnti, Some(constraint)),
            sql::JoinOperator::RightAnti(constraint) => (JoinType::RightAnti, Some(constraint)),
            other => {
                return Err(Error::UnsupportedSyntax(format!(
                    "join type not supported: {other:?}"
                )))
            }
        };

        let right = plan_table_factor(&join.relation, plan, ctes)?;
        let mut node = LogicalPlanNode::new(LogicalPlanStepType::Join);
        node.join_type = Some(join_type);

        match constraint {
            Some(sql::JoinConstraint::On(expr)) => {
                node.on = Some(expr_to_node(expr)?);
            }
            Some(sql::JoinConstraint::Using(columns)) => {
                node.items = columns.iter().map(|c| c.value.clone()).collect();
            }
            Some(sql::JoinConstraint::Natural) => {
                return Err(Error::UnsupportedSyntax(
                    "NATURAL joins are not supported".to_string(),
                ));
            }
            Some(sql::JoinConstraint::None) | None => {}
        }

        if node.on.is_none()
            && node.items.is_empty()
            && join_type != JoinType::CrossJoin
        {
            return Err(Error::UnsupportedSyntax(
                "INNER JOIN has no valid conditions, did you mean CROSS JOIN?".to_string(),
            ));
        }

        let nid = random_nid();
        plan.add_node(nid.clone(), node);
        plan.add_edge(root, nid.clone(), Some(JoinLeg::Left))?;
        plan.add_edge(right, nid.clone(), Some(JoinLeg::Right))?;
        root = nid;
    }

    Ok(root)
}

fn plan_table_factor(
    factor: &sql::TableFactor,
    plan: &mut LogicalPlan,
    ctes: &CteMap,
) -> Result<Nid> {
    match factor {
        sql::TableFactor::Table { name, alias, .. } => {
            let relation = name.to_string();
            if let Some(cte) = ctes.get(&relation.to_lowercase()) {
                let inner = plan_query(&cte.clone(), plan, ctes)?;
                let mut node = LogicalPlanNode::new(LogicalPlanStepType::CTE);
                node.alias = Some(
                    alias
                        .as_ref()
                        .map_or_else(|| relation.clone(), |a| a.name.value.clone()),
                );
                let nid = random_nid();
                plan.add_node(nid.clone(), node);
                plan.add_edge(inner, nid.clone(), None)?;
                return Ok(nid);
            }
            let mut node = LogicalPlanNode::new(LogicalPlanStepType::Scan);
            node.relation = Some(relation);
            node.alias = alias.as_ref().map(|a| a.name.value.clone());
            let nid = random_nid();
            plan.add_node(nid.clone(), node);
            Ok(nid)
        }
        sql::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let inner = plan_query(subquery, plan, ctes)?;
            let mut node = LogicalPlanNode::new(LogicalPlanStepType::Subquery);
            node.alias = alias.as_ref().map(|a| a.name.value.clone());
            let nid = random_nid();
            plan.add_node(nid.clone(), node);
            plan.add_edge(inner, nid.clone(), None)?;
            Ok(nid)
        }
        sql::TableFactor::NestedJoin {
            table_with_joins, ..
        } => plan_table_with_joins(table_with_joins, plan, ctes),
        other => Err(Error::UnsupportedSyntax(format!(
            "relation form not supported: {other}"
        ))),
    }
}

fn select_item_to_node(item: &sql::SelectItem) -> Result<Node> {
    match item {
        sql::SelectItem::UnnamedExpr(expr) => expr_to_node(expr),
        sql::SelectItem::ExprWithAlias { expr, alias } => {
            let mut node = expr_to_node(expr)?;
            node.alias = Some(alias.value.clone());
            node.query_column = Some(alias.value.clone());
            Ok(node)
        }
        sql::SelectItem::Wildcard(_) => Ok(Node::wildcard()),
        sql::SelectItem::QualifiedWildcard(name, _) => {
            let mut node = Node::wildcard();
            node.source = Some(name.to_string());
            Ok(node)
        }
    }
}

fn literal_from_value(value: &sql::Value) -> Result<Value> {
    match value {
        sql::Value::Number(text, _) => {
            if let Ok(integer) = text.parse::<i64>() {
                Ok(Value::Integer(integer))
            } else {
                text.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| Error::Sql(format!("'{text}' is not a number")))
            }
        }
        sql::Value::SingleQuotedString(text) | sql::Value::DoubleQuotedString(text) => {
            Ok(Value::Varchar(text.clone()))
        }
        sql::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sql::Value::Null => Ok(Value::Null),
        other => Err(Error::UnsupportedSyntax(format!(
            "literal not supported: {other}"
        ))),
    }
}

fn binary_op_to_node(op: &sql::BinaryOperator, left: Node, right: Node) -> Result<Node> {
    use sql::BinaryOperator as Op;
    Ok(match op {
        Op::And => Node::and(left, right),
        Op::Or => Node::or(left, right),
        Op::Xor => Node::xor(left, right),
        Op::Eq => Node::comparison(CompareOp::Eq, left, right),
        Op::NotEq => Node::comparison(CompareOp::NotEq, left, right),
        Op::Gt => Node::comparison(CompareOp::Gt, left, right),
        Op::GtEq => Node::comparison(CompareOp::GtEq, left, right),
        Op::Lt => Node::comparison(CompareOp::Lt, left, right),
        Op::LtEq => Node::comparison(CompareOp::LtEq, left, right),
        Op::Plus => Node::binary(BinaryOp::Plus, left, right),
        Op::Minus => Node::binary(BinaryOp::Minus, left, right),
        Op::Multiply => Node::binary(BinaryOp::Multiply, left, right),
        Op::Divide => Node::binary(BinaryOp::Divide, left, right),
        Op::Modulo => Node::binary(BinaryOp::Modulo, left, right),
        Op::StringConcat => Node::binary(BinaryOp::StringConcat, left, right),
        other => {
            return Err(Error::UnsupportedSyntax(format!(
                "operator not supported: {other}"
            )))
        }
    })
}

pub fn expr_to_node(expr: &sql::Expr) -> Result<Node> {
    match expr {
        sql::Expr::Identifier(ident) => Ok(Node::identifier(ident.value.clone(), None)),
        sql::Expr::CompoundIdentifier(parts) => {
            let column = parts
                .last()
                .map(|p| p.value.clone())
                .unwrap_or_default();
            let source = parts[..parts.len().saturating_sub(1)]
                .iter()
                .map(|p| p.value.clone())
                .collect::<Vec<_>>()
                .join(".");
            Ok(Node::identifier(column, Some(source)))
        }
        sql::Expr::Value(value) => Ok(Node::literal(literal_from_value(value)?)),
        sql::Expr::BinaryOp { left, op, right } => {
            binary_op_to_node(op, expr_to_node(left)?, expr_to_node(right)?)
        }
        sql::Expr::UnaryOp { op, expr } => match op {
            sql::UnaryOperator::Not => Ok(Node::not(expr_to_node(expr)?)),
            sql::UnaryOperator::Minus => {
                let inner = expr_to_node(expr)?;
                // fold a negative literal straight away
                if let Some(value) = inner.value.as_literal() {
                    match value {
                        Value::Integer(i) => return Ok(Node::literal(Value::Integer(-i))),
                        Value::Double(d) => return Ok(Node::literal(Value::Double(-d))),
                        _ => {}
                    }
                }
                Ok(Node::unary(UnaryOp::Negative, inner))
            }
            sql::UnaryOperator::Plus => expr_to_node(expr),
            other => Err(Error::UnsupportedSyntax(format!(
                "unary operator not supported: {other}"
            ))),
        },
        sql::Expr::Nested(inner) => Ok(Node::nested(expr_to_node(inner)?)),
        sql::Expr::IsNull(inner) => Ok(Node::unary(UnaryOp::IsNull, expr_to_node(inner)?)),
        sql::Expr::IsNotNull(inner) => {
            Ok(Node::unary(UnaryOp::IsNotNull, expr_to_node(inner)?))
        }
        sql::Expr::InList {
            expr,
            list,
            negated,
        } => {
            let mut values = Vec::with_capacity(list.len());
            for item in list {
                let node = expr_to_node(item)?;
                match node.value.as_literal() {
                    Some(value) => values.push(value.clone()),
                    None => {
                        return Err(Error::UnsupportedSyntax(
                            "IN lists must contain literals".to_string(),
                        ))
                    }
                }
            }
            let op = if *negated {
                CompareOp::NotInList
            } else {
                CompareOp::InList
            };
            Ok(Node::comparison(
                op,
                expr_to_node(expr)?,
                Node::literal(Value::Array(values)),
            ))
        }
        sql::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let subject = expr_to_node(expr)?;
            let lower = Node::comparison(CompareOp::GtEq, subject.clone(), expr_to_node(low)?);
            let upper = Node::comparison(CompareOp::LtEq, subject, expr_to_node(high)?);
            let between = Node::and(lower, upper);
            Ok(if *negated {
                Node::not(between)
            } else {
                between
            })
        }
        sql::Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => {
            let op = if *negated {
                CompareOp::NotLike
            } else {
                CompareOp::Like
            };
            Ok(Node::comparison(
                op,
                expr_to_node(expr)?,
                expr_to_node(pattern)?,
            ))
        }
        sql::Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => {
            let op = if *negated {
                CompareOp::NotILike
            } else {
                CompareOp::ILike
            };
            Ok(Node::comparison(
                op,
                expr_to_node(expr)?,
                expr_to_node(pattern)?,
            ))
        }
        sql::Expr::RLike {
            negated,
            expr,
            pattern,
            ..
        } => {
            let op = if *negated {
                CompareOp::NotRLike
            } else {
                CompareOp::RLike
            };
            Ok(Node::comparison(
                op,
                expr_to_node(expr)?,
                expr_to_node(pattern)?,
            ))
        }
        sql::Expr::AnyOp {
            left,
            compare_op,
            right,
            ..
        } => {
            let op = match compare_op {
                sql::BinaryOperator::Eq => CompareOp::AnyOpEq,
                sql::BinaryOperator::GtEq => CompareOp::AnyOpGtEq,
                other => {
                    return Err(Error::UnsupportedSyntax(format!(
                        "ANY with operator {other} is not supported"
                    )))
                }
            };
            Ok(Node::comparison(
                op,
                expr_to_node(left)?,
                expr_to_node(right)?,
            ))
        }
        sql::Expr::AllOp {
            left,
            compare_op,
            right,
        } => {
            let op = match compare_op {
                sql::BinaryOperator::NotEq => CompareOp::AllOpNotEq,
                sql::BinaryOperator::Lt => CompareOp::AllOpLt,
                other => {
                    return Err(Error::UnsupportedSyntax(format!(
                        "ALL with operator {other} is not supported"
                    )))
                }
            };
            Ok(Node::comparison(
                op,
                expr_to_node(left)?,
                expr_to_node(right)?,
            ))
        }
        sql::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let mut condition_nodes = Vec::with_capacity(conditions.len());
            for condition in conditions {
                let node = expr_to_node(condition)?;
                condition_nodes.push(match operand {
                    Some(operand) => {
                        Node::comparison(CompareOp::Eq, expr_to_node(operand)?, node)
                    }
                    None => node,
                });
            }
            let mut result_nodes = Vec::with_capacity(results.len() + 1);
            for result in results {
                result_nodes.push(expr_to_node(result)?);
            }
            if let Some(else_result) = else_result {
                result_nodes.push(expr_to_node(else_result)?);
            }
            Ok(Node::function(
                "CASE",
                vec![
                    Node::expression_list(condition_nodes),
                    Node::expression_list(result_nodes),
                ],
            ))
        }
        sql::Expr::Function(function) => function_to_node(function),
        sql::Expr::Tuple(items) | sql::Expr::Array(sql::Array { elem: items, .. }) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let node = expr_to_node(item)?;
                match node.value.as_literal() {
                    Some(value) => values.push(value.clone()),
                    None => {
                        return Err(Error::UnsupportedSyntax(
                            "arrays must contain literals".to_string(),
                        ))
                    }
                }
            }
            Ok(Node::literal(Value::Array(values)))
        }
        other => Err(Error::UnsupportedSyntax(format!(
            "expression not supported: {other}"
        ))),
    }
}

fn function_to_node(function: &sql::Function) -> Result<Node> {
    let name = function.name.to_string().to_uppercase();

    let (parameters, distinct) = match &function.args {
        sql::FunctionArguments::List(list) => {
            let mut parameters = Vec::with_capacity(list.args.len());
            for argument in &list.args {
                match argument {
                    sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr)) => {
                        parameters.push(expr_to_node(expr)?);
                    }
                    sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Wildcard) => {
                        parameters.push(Node::wildcard());
                    }
                    other => {
                        return Err(Error::UnsupportedSyntax(format!(
                            "function argument not supported: {other}"
                        )))
                    }
                }
            }
            let distinct = matches!(
                list.duplicate_treatment,
                Some(sql::DuplicateTreatment::Distinct)
            );
            (parameters, distinct)
        }
        sql::FunctionArguments::None => (Vec::new(), false),
        sql::FunctionArguments::Subquery(_) => {
            return Err(Error::UnsupportedSyntax(
                "subquery function arguments are not supported".to_string(),
            ))
        }
    };

    if let Some(aggregate) = AggregateFunction::from_name(&name) {
        let mut node = Node::aggregate(aggregate, parameters);
        node.distinct = distinct;
        return Ok(node);
    }
    Ok(Node::function(name, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::get_nodes_of_type;

    fn steps(plan: &LogicalPlan, step: LogicalPlanStepType) -> usize {
        get_nodes_of_type(plan, &[step]).len()
    }

    #[test]
    fn select_where_order_limit_shapes_the_plan() {
        let (plan, kind) =
            plan_sql("SELECT name FROM $planets WHERE id < 5 ORDER BY id LIMIT 3")
                .expect("plans");
        assert_eq!(kind, StatementKind::Query);
        assert_eq!(steps(&plan, LogicalPlanStepType::Scan), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Filter), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Project), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Order), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Limit), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Exit), 1);
    }

    #[test]
    fn group_by_produces_aggregate_and_group() {
        let (plan, _) =
            plan_sql("SELECT COUNT(*), planetId FROM $satellites GROUP BY planetId")
                .expect("plans");
        assert_eq!(steps(&plan, LogicalPlanStepType::AggregateAndGroup), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Project), 0);
    }

    #[test]
    fn join_using_records_key_names() {
        let (plan, _) =
            plan_sql("SELECT * FROM $satellites INNER JOIN $planets USING (id)").expect("plans");
        let joins = get_nodes_of_type(&plan, &[LogicalPlanStepType::Join]);
        assert_eq!(joins.len(), 1);
        let join = plan.get(&joins[0]).expect("join node");
        assert_eq!(join.items, vec!["id".to_string()]);
    }

    #[test]
    fn cross_join_unnest_becomes_unnest_node() {
        let (plan, _) = plan_sql(
            "SELECT * FROM $astronauts CROSS JOIN UNNEST(missions) AS m WHERE m = 'Apollo 11'",
        )
        .expect("plans");
        assert_eq!(steps(&plan, LogicalPlanStepType::Unnest), 1);
        assert_eq!(steps(&plan, LogicalPlanStepType::Join), 0);
    }

    #[test]
    fn explain_wraps_the_query() {
        let (plan, kind) = plan_sql("EXPLAIN SELECT * FROM $planets").expect("plans");
        assert_eq!(kind, StatementKind::Query);
        assert_eq!(steps(&plan, LogicalPlanStepType::Explain), 1);
        let (_, kind) = plan_sql("EXPLAIN ANALYZE SELECT * FROM $planets").expect("plans");
        assert_eq!(kind, StatementKind::Analyze);
    }

    #[test]
    fn set_and_show_statements() {
        let (plan, kind) = plan_sql("SET @cache = true").expect("plans");
        assert_eq!(kind, StatementKind::Execute);
        assert_eq!(steps(&plan, LogicalPlanStepType::Set), 1);

        let (plan, kind) = plan_sql("SHOW COLUMNS FROM $planets").expect("plans");
        assert_eq!(kind, StatementKind::Query);
        assert_eq!(steps(&plan, LogicalPlanStepType::ShowColumns), 1);
    }

    #[test]
    fn empty_statement_is_rejected() {
        assert!(matches!(plan_sql("   "), Err(Error::MissingSqlStatement)));
        assert!(matches!(plan_sql("SELEKT 1"), Err(Error::Sql(_))));
    }

    #[test]
    fn inner_join_without_condition_is_rejected() {
        let result = plan_sql("SELECT * FROM $satellites INNER JOIN $planets");
        assert!(matches!(result, Err(Error::UnsupportedSyntax(_))));
    }
}
