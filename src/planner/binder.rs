//! The binder.
//!
//! Walks the unbound plan from the scans up, resolving identifiers to
//! [`SchemaColumn`]s with stable identities, attaching connector handles
//! to scans, computing join key lists and relation name sets, and minting
//! output columns for computed expressions. After binding, every
//! identifier's identity equals the identity of its schema column, which
//! is the invariant all the pushdown rules key on.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::connectors::{Connector, VirtualDataConnector};
use crate::errors::{Error, Result};
use crate::expression::operator_map::{determine_type, resolve_binary, resolve_comparison};
use crate::expression::{
    AggregateFunction, CompareOp, Node, NodeType, NodeValue,
};
use crate::plan::{JoinLeg, JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType, Nid};
use crate::planner::rewriter::TemporalRange;
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::ValueType;

/// Resolve the connector serving a relation.
pub fn connector_for(relation: &str) -> Result<Arc<dyn Connector>> {
    if VirtualDataConnector::handles(relation) {
        Ok(Arc::new(VirtualDataConnector))
    } else {
        Err(Error::DatasetNotFound(relation.to_string()))
    }
}

/// Pair the identifiers of an equi-join condition into (left keys, right
/// keys), assigning each identifier to the leg whose relation set contains
/// its source. The predicate pushdown rule re-runs this after rewriting a
/// join's condition.
pub fn extract_join_fields(
    on: &Node,
    left_names: &[String],
    right_names: &[String],
) -> (Vec<Node>, Vec<Node>) {
    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    collect_join_fields(on, left_names, right_names, &mut left_keys, &mut right_keys);
    (left_keys, right_keys)
}

fn identifier_leg(node: &Node, left_names: &[String], right_names: &[String]) -> Option<bool> {
    let mut sources: Vec<&String> = Vec::new();
    if let Some(source) = &node.source {
        sources.push(source);
    }
    if let Some(column) = &node.schema_column {
        sources.extend(column.origin.iter());
    }
    if sources.iter().any(|s| left_names.contains(s)) {
        return Some(true);
    }
    if sources.iter().any(|s| right_names.contains(s)) {
        return Some(false);
    }
    None
}

fn collect_join_fields(
    node: &Node,
    left_names: &[String],
    right_names: &[String],
    left_keys: &mut Vec<Node>,
    right_keys: &mut Vec<Node>,
) {
    match node.node_type {
        NodeType::And => {
            if let Some(left) = &node.left {
                collect_join_fields(left, left_names, right_names, left_keys, right_keys);
            }
            if let Some(right) = &node.right {
                collect_join_fields(right, left_names, right_names, left_keys, right_keys);
            }
        }
        NodeType::ComparisonOperator if node.value.as_comparison() == Some(CompareOp::Eq) => {
            let (Some(a), Some(b)) = (node.left.as_deref(), node.right.as_deref()) else {
                return;
            };
            if a.node_type != NodeType::Identifier || b.node_type != NodeType::Identifier {
                return;
            }
            match identifier_leg(a, left_names, right_names) {
                Some(true) => {
                    left_keys.push(a.clone());
                    right_keys.push(b.clone());
                }
                Some(false) => {
                    left_keys.push(b.clone());
                    right_keys.push(a.clone());
                }
                None => {}
            }
        }
        _ => {}
    }
}

struct BoundState {
    outputs: HashMap<Nid, Vec<SchemaColumn>>,
    relations: HashMap<Nid, HashSet<String>>,
    readers: HashMap<Nid, Vec<Nid>>,
    sizes: HashMap<Nid, Option<usize>>,
}

/// Bind a plan in place, attaching identities, types and connectors.
pub fn bind(plan: &mut LogicalPlan, temporal_ranges: &[TemporalRange]) -> Result<()> {
    let mut state = BoundState {
        outputs: HashMap::new(),
        relations: HashMap::new(),
        readers: HashMap::new(),
        sizes: HashMap::new(),
    };
    let mut pending_ranges: VecDeque<TemporalRange> = temporal_ranges.iter().copied().collect();

    for nid in plan.depth_first_search_flat() {
        let Some(node) = plan.get(&nid).cloned() else {
            continue;
        };
        let bound = bind_node(&nid, node, plan, &mut state, &mut pending_ranges)?;
        plan.add_node(nid.clone(), bound);
        relocate_sort_if_needed(&nid, plan, &mut state)?;
    }
    Ok(())
}

/// `ORDER BY` may reference columns the projection does not emit. When a
/// sort's keys bound against the scope below its projection, the sort is
/// moved below that projection so the columns are physically present.
fn relocate_sort_if_needed(
    nid: &str,
    plan: &mut LogicalPlan,
    state: &mut BoundState,
) -> Result<()> {
    let Some(node) = plan.get(nid) else {
        return Ok(());
    };
    if !matches!(
        node.step,
        LogicalPlanStepType::Order | LogicalPlanStepType::HeapSort
    ) {
        return Ok(());
    }
    let producers = producers_of(plan, nid);
    let [(producer, _)] = producers.as_slice() else {
        return Ok(());
    };
    let producer = producer.clone();
    let Some(project) = plan.get(&producer) else {
        return Ok(());
    };
    if project.step != LogicalPlanStepType::Project {
        return Ok(());
    }

    let project_outputs = state.outputs.get(&producer).cloned().unwrap_or_default();
    let keys_resolve_above = plan
        .get(nid)
        .map(|node| {
            node.order_by.iter().all(|(key, _)| {
                key.identity()
                    .is_some_and(|identity| project_outputs.iter().any(|c| c.identity == identity))
            })
        })
        .unwrap_or(true);
    if keys_resolve_above {
        return Ok(());
    }

    let node = plan.get(nid).cloned().ok_or_else(|| {
        Error::InvalidInternalState("sort node vanished during binding".to_string())
    })?;
    plan.remove_node(nid, true)?;
    plan.insert_node_before(nid.to_string(), node, &producer)?;
    // below the projection the sort sees its producer's scope
    let below = producers_of(plan, nid);
    let outputs = gather_inputs(&below, state);
    state.outputs.insert(nid.to_string(), outputs);
    Ok(())
}

fn producers_of(plan: &LogicalPlan, nid: &str) -> Vec<(Nid, Option<JoinLeg>)> {
    plan.ingoing_edges(nid)
        .into_iter()
        .map(|(source, _, leg)| (source, leg))
        .collect()
}

fn gather_inputs(
    producers: &[(Nid, Option<JoinLeg>)],
    state: &BoundState,
) -> Vec<SchemaColumn> {
    let mut inputs = Vec::new();
    for (producer, _) in producers {
        if let Some(outputs) = state.outputs.get(producer) {
            inputs.extend(outputs.iter().cloned());
        }
    }
    inputs
}

fn gather_relations(
    producers: &[(Nid, Option<JoinLeg>)],
    state: &BoundState,
) -> HashSet<String> {
    let mut relations = HashSet::new();
    for (producer, _) in producers {
        if let Some(below) = state.relations.get(producer) {
            relations.extend(below.iter().cloned());
        }
    }
    relations
}

fn gather_readers(producers: &[(Nid, Option<JoinLeg>)], state: &BoundState) -> Vec<Nid> {
    let mut readers = Vec::new();
    for (producer, _) in producers {
        if let Some(below) = state.readers.get(producer) {
            readers.extend(below.iter().cloned());
        }
    }
    readers
}

fn single_size(producers: &[(Nid, Option<JoinLeg>)], state: &BoundState) -> Option<usize> {
    match producers {
        [(producer, _)] => state.sizes.get(producer).copied().flatten(),
        _ => None,
    }
}

fn bind_node(
    nid: &str,
    mut node: LogicalPlanNode,
    plan: &LogicalPlan,
    state: &mut BoundState,
    pending_ranges: &mut VecDeque<TemporalRange>,
) -> Result<LogicalPlanNode> {
    let producers = producers_of(plan, nid);
    let inputs = gather_inputs(&producers, state);

    match node.step {
        LogicalPlanStepType::Scan => {
            let relation = node
                .relation
                .clone()
                .ok_or_else(|| Error::InvalidInternalState("scan with no relation".to_string()))?;
            let connector = connector_for(&relation)?;
            let schema = connector.schema(&relation)?;
            let row_count = schema.row_count;

            let mut bound_columns = Vec::with_capacity(schema.columns.len());
            for mut column in schema.columns {
                column.origin = vec![relation.clone()];
                if let Some(alias) = &node.alias {
                    column.origin.push(alias.clone());
                }
                bound_columns.push(column);
            }
            node.schema = Some(
                RelationSchema::new(relation.clone(), bound_columns.clone())
                    .with_row_count(row_count.unwrap_or(0)),
            );
            node.columns = bound_columns
                .iter()
                .map(|c| Node::bound_identifier(c.clone()))
                .collect();
            node.connector = Some(connector);
            node.temporal_range = pending_ranges.pop_front().map(|r| (r.start, r.end));
            let mut relations: HashSet<String> = [relation].into_iter().collect();
            if let Some(alias) = &node.alias {
                relations.insert(alias.clone());
            }
            node.all_relations = relations.clone();

            state.outputs.insert(nid.to_string(), bound_columns);
            state.relations.insert(nid.to_string(), relations);
            state.readers.insert(nid.to_string(), vec![nid.to_string()]);
            state.sizes.insert(nid.to_string(), row_count);
        }

        LogicalPlanStepType::FunctionDataset => {
            let outputs: Vec<SchemaColumn> = node
                .columns
                .iter()
                .filter_map(|c| c.schema_column.clone())
                .collect();
            state.outputs.insert(nid.to_string(), outputs);
            state.relations.insert(nid.to_string(), HashSet::new());
            state.readers.insert(nid.to_string(), vec![nid.to_string()]);
            state.sizes.insert(nid.to_string(), Some(0));
        }

        LogicalPlanStepType::Filter => {
            if let Some(mut condition) = node.condition.take() {
                bind_expression(&mut condition, &inputs)?;
                node.columns = condition.identifiers().into_iter().cloned().collect();
                node.relations = condition.relations();
                node.condition = Some(condition);
            }
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::Project => {
            let mut bound_columns = Vec::new();
            let mut outputs = Vec::new();
            for column in std::mem::take(&mut node.columns) {
                if column.node_type == NodeType::Wildcard {
                    expand_wildcard(&column, &inputs, &mut bound_columns, &mut outputs)?;
                    continue;
                }
                let mut column = column;
                bind_expression(&mut column, &inputs)?;
                outputs.push(output_column(&mut column, &inputs)?);
                bound_columns.push(column);
            }
            node.columns = bound_columns;
            node.all_relations = gather_relations(&producers, state);
            state.outputs.insert(nid.to_string(), outputs);
            state
                .relations
                .insert(nid.to_string(), node.all_relations.clone());
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            let size = single_size(&producers, state);
            state.sizes.insert(nid.to_string(), size);
        }

        LogicalPlanStepType::Aggregate => {
            let mut outputs = Vec::new();
            for aggregate in node.aggregates.iter_mut() {
                bind_expression(aggregate, &inputs)?;
                outputs.push(
                    aggregate
                        .schema_column
                        .clone()
                        .unwrap_or_else(|| SchemaColumn::new(aggregate.format(), ValueType::Integer)),
                );
            }
            node.all_relations = gather_relations(&producers, state);
            state.outputs.insert(nid.to_string(), outputs);
            state
                .relations
                .insert(nid.to_string(), node.all_relations.clone());
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            state.sizes.insert(nid.to_string(), Some(1));
        }

        LogicalPlanStepType::AggregateAndGroup => {
            for group in node.groups.iter_mut() {
                bind_expression(group, &inputs)?;
            }
            for aggregate in node.aggregates.iter_mut() {
                bind_expression(aggregate, &inputs)?;
            }
            let mut outputs = Vec::new();
            let mut bound_projection = Vec::new();
            for projected in std::mem::take(&mut node.projection) {
                if projected.node_type == NodeType::Wildcard {
                    return Err(Error::UnsupportedSyntax(
                        "SELECT * is not valid with GROUP BY".to_string(),
                    ));
                }
                let mut projected = projected;
                bind_expression(&mut projected, &inputs)?;
                outputs.push(output_column(&mut projected, &inputs)?);
                bound_projection.push(projected);
            }
            node.projection = bound_projection;
            node.all_relations = gather_relations(&producers, state);
            state.outputs.insert(nid.to_string(), outputs);
            state
                .relations
                .insert(nid.to_string(), node.all_relations.clone());
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            state.sizes.insert(nid.to_string(), None);
        }

        LogicalPlanStepType::Join => bind_join(nid, &mut node, &producers, state)?,

        LogicalPlanStepType::Unnest => {
            let mut unnest_column = node.unnest_column.take().ok_or_else(|| {
                Error::InvalidInternalState("unnest with no column".to_string())
            })?;
            bind_expression(&mut unnest_column, &inputs)?;
            let element_type = unnest_column
                .schema_column
                .as_ref()
                .and_then(|c| c.element_type)
                .unwrap_or(ValueType::Varchar);
            let target_name = node.alias.clone().unwrap_or_else(|| "unnest".to_string());
            let mut target = SchemaColumn::new(target_name, element_type)
                .with_element_type(element_type);
            if let Some(alias) = &node.alias {
                target.origin = vec![alias.clone()];
            }
            node.unnest_target = Some(target.clone());
            node.unnest_column = Some(unnest_column);

            let mut relations = gather_relations(&producers, state);
            if let Some(alias) = &node.alias {
                relations.insert(alias.clone());
            }
            node.all_relations = relations.clone();

            let mut outputs = inputs;
            outputs.push(target);
            state.outputs.insert(nid.to_string(), outputs);
            state.relations.insert(nid.to_string(), relations);
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            state.sizes.insert(nid.to_string(), None);
        }

        LogicalPlanStepType::Order | LogicalPlanStepType::HeapSort => {
            // sort keys may name columns the projection below does not
            // emit; fall back to the scope beneath it, and the sort is
            // then relocated below the projection
            let mut fallback = inputs.clone();
            if let [(producer, _)] = producers.as_slice() {
                if plan.get(producer).map(|n| n.step) == Some(LogicalPlanStepType::Project) {
                    let below = producers_of(plan, producer);
                    fallback.extend(gather_inputs(&below, state));
                }
            }
            for (key, _) in node.order_by.iter_mut() {
                match bind_expression(key, &inputs) {
                    Ok(()) => {}
                    Err(Error::ColumnNotFound(_)) => bind_expression(key, &fallback)?,
                    Err(error) => return Err(error),
                }
            }
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::Limit
        | LogicalPlanStepType::Offset
        | LogicalPlanStepType::MetadataWriter => {
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::Distinct => {
            if let Some(on) = node.distinct_on.as_mut() {
                for column in on.iter_mut() {
                    bind_expression(column, &inputs)?;
                }
            }
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::Union => {
            // the first leg defines the output shape
            let first = producers
                .first()
                .and_then(|(producer, _)| state.outputs.get(producer))
                .cloned()
                .unwrap_or_default();
            node.all_relations = gather_relations(&producers, state);
            state.outputs.insert(nid.to_string(), first);
            state
                .relations
                .insert(nid.to_string(), node.all_relations.clone());
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            state.sizes.insert(nid.to_string(), None);
        }

        LogicalPlanStepType::Subquery | LogicalPlanStepType::CTE => {
            let alias = node.alias.clone().unwrap_or_default();
            let outputs: Vec<SchemaColumn> = inputs
                .into_iter()
                .map(|mut column| {
                    column.origin = vec![alias.clone()];
                    column
                })
                .collect();
            let mut relations = HashSet::new();
            if !alias.is_empty() {
                relations.insert(alias.clone());
            }
            node.all_relations = relations.clone();
            state.outputs.insert(nid.to_string(), outputs);
            state.relations.insert(nid.to_string(), relations);
            let readers = gather_readers(&producers, state);
            state.readers.insert(nid.to_string(), readers);
            let size = single_size(&producers, state);
            state.sizes.insert(nid.to_string(), size);
        }

        LogicalPlanStepType::Exit => {
            node.columns = inputs
                .iter()
                .map(|column| Node::bound_identifier(column.clone()))
                .collect();
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::Explain => {
            node.all_relations = gather_relations(&producers, state);
            passthrough(nid, inputs, &producers, state);
        }

        LogicalPlanStepType::ShowColumns => {
            let relation = node.relation.clone().ok_or_else(|| {
                Error::InvalidInternalState("SHOW COLUMNS with no relation".to_string())
            })?;
            let connector = connector_for(&relation)?;
            node.schema = Some(connector.schema(&relation)?);
            state.outputs.insert(nid.to_string(), Vec::new());
            state.relations.insert(nid.to_string(), HashSet::new());
            state.readers.insert(nid.to_string(), Vec::new());
            state.sizes.insert(nid.to_string(), None);
        }

        LogicalPlanStepType::Set | LogicalPlanStepType::Show => {
            state.outputs.insert(nid.to_string(), Vec::new());
            state.relations.insert(nid.to_string(), HashSet::new());
            state.readers.insert(nid.to_string(), Vec::new());
            state.sizes.insert(nid.to_string(), None);
        }
    }

    Ok(node)
}

fn passthrough(
    nid: &str,
    inputs: Vec<SchemaColumn>,
    producers: &[(Nid, Option<JoinLeg>)],
    state: &mut BoundState,
) {
    let relations = gather_relations(producers, state);
    let readers = gather_readers(producers, state);
    let size = single_size(producers, state);
    state.outputs.insert(nid.to_string(), inputs);
    state.relations.insert(nid.to_string(), relations);
    state.readers.insert(nid.to_string(), readers);
    state.sizes.insert(nid.to_string(), size);
}

fn bind_join(
    nid: &str,
    node: &mut LogicalPlanNode,
    producers: &[(Nid, Option<JoinLeg>)],
    state: &mut BoundState,
) -> Result<()> {
    let left_producer = producers
        .iter()
        .find(|(_, leg)| *leg == Some(JoinLeg::Left))
        .map(|(p, _)| p.clone())
        .ok_or_else(|| Error::InvalidInternalState("join with no left leg".to_string()))?;
    let right_producer = producers
        .iter()
        .find(|(_, leg)| *leg == Some(JoinLeg::Right))
        .map(|(p, _)| p.clone())
        .ok_or_else(|| Error::InvalidInternalState("join with no right leg".to_string()))?;

    let left_inputs = state.outputs.get(&left_producer).cloned().unwrap_or_default();
    let right_inputs = state
        .outputs
        .get(&right_producer)
        .cloned()
        .unwrap_or_default();
    let mut all_inputs = left_inputs.clone();
    all_inputs.extend(right_inputs.iter().cloned());

    // USING (a, b) lowers to equality conditions on both legs' columns
    if !node.items.is_empty() && node.on.is_none() {
        let mut condition: Option<Node> = None;
        for name in &node.items {
            let left_column = left_inputs
                .iter()
                .find(|c| c.answers_to(name))
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            let right_column = right_inputs
                .iter()
                .find(|c| c.answers_to(name))
                .ok_or_else(|| Error::ColumnNotFound(name.clone()))?;
            let equality = Node::comparison(
                CompareOp::Eq,
                Node::bound_identifier(left_column.clone()),
                Node::bound_identifier(right_column.clone()),
            );
            condition = Some(match condition {
                None => equality,
                Some(existing) => Node::and(existing, equality),
            });
        }
        node.on = condition;
    } else if let Some(on) = node.on.as_mut() {
        bind_expression(on, &all_inputs)?;
    }

    let left_relations = state
        .relations
        .get(&left_producer)
        .cloned()
        .unwrap_or_default();
    let right_relations = state
        .relations
        .get(&right_producer)
        .cloned()
        .unwrap_or_default();
    node.left_relation_names = left_relations.iter().cloned().collect();
    node.right_relation_names = right_relations.iter().cloned().collect();
    node.all_relations = left_relations.union(&right_relations).cloned().collect();
    node.left_readers = state
        .readers
        .get(&left_producer)
        .cloned()
        .unwrap_or_default();
    node.right_readers = state
        .readers
        .get(&right_producer)
        .cloned()
        .unwrap_or_default();
    node.left_size = state.sizes.get(&left_producer).copied().flatten();
    node.right_size = state.sizes.get(&right_producer).copied().flatten();
    node.left_schema = left_inputs.clone();
    node.right_schema = right_inputs.clone();

    if let Some(on) = &node.on {
        let (left_keys, right_keys) = extract_join_fields(
            on,
            &node.left_relation_names,
            &node.right_relation_names,
        );
        node.left_columns = left_keys;
        node.right_columns = right_keys;
        node.columns = on.identifiers().into_iter().cloned().collect();
    }

    let join_type = node.join_type.unwrap_or(JoinType::Inner);
    if join_type == JoinType::Inner && node.left_columns.is_empty() && node.on.is_some() {
        return Err(Error::UnsupportedSyntax(
            "INNER JOIN requires at least one equality condition".to_string(),
        ));
    }

    let outputs = match join_type {
        JoinType::LeftSemi | JoinType::LeftAnti => left_inputs,
        JoinType::RightSemi | JoinType::RightAnti => right_inputs,
        _ => all_inputs,
    };
    state.outputs.insert(nid.to_string(), outputs);
    state
        .relations
        .insert(nid.to_string(), node.all_relations.clone());
    let readers = gather_readers(producers, state);
    state.readers.insert(nid.to_string(), readers);
    state.sizes.insert(nid.to_string(), None);
    Ok(())
}

fn expand_wildcard(
    wildcard: &Node,
    inputs: &[SchemaColumn],
    bound_columns: &mut Vec<Node>,
    outputs: &mut Vec<SchemaColumn>,
) -> Result<()> {
    let qualifier = wildcard.source.as_deref();
    let mut matched = false;
    for column in inputs {
        if let Some(qualifier) = qualifier {
            if !column.origin.iter().any(|o| o == qualifier) {
                continue;
            }
        }
        matched = true;
        bound_columns.push(Node::bound_identifier(column.clone()));
        outputs.push(column.clone());
    }
    if !matched {
        if let Some(qualifier) = qualifier {
            return Err(Error::UnexpectedDatasetReference(qualifier.to_string()));
        }
    }
    Ok(())
}

/// The output schema column a projected expression presents.
fn output_column(expression: &mut Node, _inputs: &[SchemaColumn]) -> Result<SchemaColumn> {
    if expression.node_type == NodeType::Identifier {
        let mut column = expression
            .schema_column
            .clone()
            .ok_or_else(|| Error::ColumnNotFound(expression.current_name()))?;
        if let Some(alias) = &expression.alias {
            column.aliases.push(column.name.clone());
            column.name = alias.clone();
        }
        expression.schema_column = Some(column.clone());
        return Ok(column);
    }
    // computed expression: mint an output column
    let value_type = determine_type(expression);
    let mut column = SchemaColumn::new(expression.current_name(), value_type);
    let mut origins: Vec<String> = Vec::new();
    for identifier in expression.identifiers() {
        if let Some(schema_column) = &identifier.schema_column {
            for origin in &schema_column.origin {
                if !origins.contains(origin) {
                    origins.push(origin.clone());
                }
            }
        }
    }
    column.origin = origins;
    expression.schema_column = Some(column.clone());
    expression.value_type = Some(value_type);
    Ok(column)
}

/// Bind every identifier in an expression tree and resolve types
/// bottom-up through the operator map.
pub fn bind_expression(node: &mut Node, inputs: &[SchemaColumn]) -> Result<()> {
    if node.node_type == NodeType::Identifier {
        let name = node
            .source_column
            .clone()
            .ok_or_else(|| Error::InvalidInternalState("identifier with no name".to_string()))?;
        let source = node.source.clone();

        let candidates: Vec<&SchemaColumn> = inputs
            .iter()
            .filter(|column| {
                column.answers_to(&name)
                    && source
                        .as_ref()
                        .map_or(true, |s| column.origin.iter().any(|o| o == s))
            })
            .collect();

        let column = match candidates.as_slice() {
            [] => {
                if let Some(source) = &source {
                    let source_known = inputs
                        .iter()
                        .any(|column| column.origin.iter().any(|o| o == source));
                    if !source_known {
                        return Err(Error::UnexpectedDatasetReference(source.clone()));
                    }
                }
                return Err(Error::ColumnNotFound(name));
            }
            [only] => (*only).clone(),
            [first, rest @ ..] => {
                if rest.iter().any(|c| c.identity != first.identity) {
                    return Err(Error::AmbiguousIdentifier(name));
                }
                (*first).clone()
            }
        };

        if node.source.is_none() {
            node.source = column.origin.first().cloned();
        }
        node.value_type = Some(column.value_type);
        node.schema_column = Some(column);
        return Ok(());
    }

    if let Some(left) = node.left.as_mut() {
        bind_expression(left, inputs)?;
    }
    if let Some(centre) = node.centre.as_mut() {
        bind_expression(centre, inputs)?;
    }
    if let Some(right) = node.right.as_mut() {
        bind_expression(right, inputs)?;
    }
    for parameter in node.parameters.iter_mut() {
        bind_expression(parameter, inputs)?;
    }

    match node.node_type {
        NodeType::ComparisonOperator => {
            let resolved = match (&node.left, &node.right, node.value.as_comparison()) {
                (Some(left), Some(right), Some(op)) => {
                    resolve_comparison(determine_type(left), determine_type(right), op)
                }
                _ => None,
            };
            node.value_type = Some(resolved.unwrap_or(ValueType::Missing));
            if node.value_type == Some(ValueType::Missing) {
                // untyped comparisons survive binding (NULL literals, etc.)
                // but cannot be folded or pushed
                node.value_type = Some(ValueType::Boolean);
            }
        }
        NodeType::BinaryOperator => {
            let resolved = match (&node.left, &node.right, node.value.as_binary()) {
                (Some(left), Some(right), Some(op)) => {
                    resolve_binary(determine_type(left), determine_type(right), op)
                }
                _ => None,
            };
            node.value_type = Some(resolved.unwrap_or(ValueType::Missing));
        }
        NodeType::Aggregator => {
            let value_type = aggregate_output_type(node);
            let mut column = SchemaColumn::new(node.current_name(), value_type);
            column.origin = node
                .identifiers()
                .iter()
                .filter_map(|i| i.schema_column.as_ref())
                .flat_map(|c| c.origin.clone())
                .collect();
            node.value_type = Some(value_type);
            node.schema_column = Some(column);
        }
        NodeType::Function => {
            node.value_type = Some(function_output_type(node));
        }
        _ => {}
    }
    Ok(())
}

fn aggregate_output_type(node: &Node) -> ValueType {
    let NodeValue::Aggregate(function) = node.value else {
        return ValueType::Missing;
    };
    let parameter_type = node
        .parameters
        .first()
        .map(determine_type)
        .unwrap_or(ValueType::Integer);
    use AggregateFunction::*;
    match function {
        Count | CountDistinct => ValueType::Integer,
        Avg | StdDev | Variance | Product | ApproximateMedian => ValueType::Double,
        Sum | Min | Max | One | AnyValue => parameter_type,
        List | ArrayAgg | MinMax => ValueType::Array,
    }
}

fn function_output_type(node: &Node) -> ValueType {
    let NodeValue::Function(name) = &node.value else {
        return ValueType::Missing;
    };
    match name.as_str() {
        "UPPER" | "LOWER" | "TRIM" | "CONCAT" | "RANDOM_STRING" => ValueType::Varchar,
        "LENGTH" => ValueType::Integer,
        "RANDOM" | "RAND" | "NORMAL" | "ROUND" => ValueType::Double,
        "ABS" | "PASSTHRU" | "IFNULL" | "IFNOTNULL" => node
            .parameters
            .first()
            .map(determine_type)
            .unwrap_or(ValueType::Missing),
        "CASE" => node
            .parameters
            .get(1)
            .and_then(|results| results.parameters.first())
            .map(determine_type)
            .unwrap_or(ValueType::Missing),
        _ => ValueType::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::logical_planner::plan_sql;

    fn bound_plan(sql: &str) -> LogicalPlan {
        let (mut plan, _) = plan_sql(sql).expect("plans");
        bind(&mut plan, &[]).expect("binds");
        plan
    }

    #[test]
    fn scan_gets_connector_and_identities() {
        let plan = bound_plan("SELECT name FROM $planets");
        let scan = plan
            .nodes()
            .find(|(_, n)| n.step == LogicalPlanStepType::Scan)
            .map(|(_, n)| n.clone())
            .expect("scan exists");
        assert!(scan.connector.is_some());
        assert_eq!(scan.columns.len(), 20);
        assert!(scan.columns.iter().all(|c| c.identity().is_some()));
    }

    #[test]
    fn filter_condition_is_typed() {
        let plan = bound_plan("SELECT name FROM $planets WHERE id < 5");
        let filter = plan
            .nodes()
            .find(|(_, n)| n.step == LogicalPlanStepType::Filter)
            .map(|(_, n)| n.clone())
            .expect("filter exists");
        let condition = filter.condition.expect("condition bound");
        assert_eq!(condition.value_type, Some(ValueType::Boolean));
        assert_eq!(filter.relations.len(), 1);
        assert!(filter.relations.contains("$planets"));
    }

    #[test]
    fn join_using_builds_keys_and_leg_names() {
        let plan = bound_plan("SELECT * FROM $satellites INNER JOIN $planets USING (id)");
        let join = plan
            .nodes()
            .find(|(_, n)| n.step == LogicalPlanStepType::Join)
            .map(|(_, n)| n.clone())
            .expect("join exists");
        assert!(join.on.is_some());
        assert_eq!(join.left_columns.len(), 1);
        assert_eq!(join.right_columns.len(), 1);
        assert_eq!(join.left_relation_names, vec!["$satellites".to_string()]);
        assert_eq!(join.right_relation_names, vec!["$planets".to_string()]);
        assert_eq!(join.left_size, Some(177));
        assert_eq!(join.right_size, Some(9));
    }

    #[test]
    fn unknown_column_and_relation_errors() {
        let (mut plan, _) = plan_sql("SELECT nothing FROM $planets").expect("plans");
        assert!(matches!(
            bind(&mut plan, &[]),
            Err(Error::ColumnNotFound(_))
        ));

        let (mut plan, _) = plan_sql("SELECT * FROM missing_table").expect("plans");
        assert!(matches!(
            bind(&mut plan, &[]),
            Err(Error::DatasetNotFound(_))
        ));

        let (mut plan, _) = plan_sql("SELECT x.name FROM $planets").expect("plans");
        assert!(matches!(
            bind(&mut plan, &[]),
            Err(Error::UnexpectedDatasetReference(_))
        ));
    }

    #[test]
    fn unnest_target_is_minted_with_element_type() {
        let plan = bound_plan("SELECT * FROM $astronauts CROSS JOIN UNNEST(missions) AS m");
        let unnest = plan
            .nodes()
            .find(|(_, n)| n.step == LogicalPlanStepType::Unnest)
            .map(|(_, n)| n.clone())
            .expect("unnest exists");
        let target = unnest.unnest_target.expect("target minted");
        assert_eq!(target.name, "m");
        assert_eq!(target.value_type, ValueType::Varchar);
    }

    #[test]
    fn ambiguous_identifier_is_rejected() {
        let (mut plan, _) = plan_sql(
            "SELECT id FROM $satellites INNER JOIN $planets ON $satellites.id = $planets.id",
        )
        .expect("plans");
        assert!(matches!(
            bind(&mut plan, &[]),
            Err(Error::AmbiguousIdentifier(_))
        ));
    }
}
