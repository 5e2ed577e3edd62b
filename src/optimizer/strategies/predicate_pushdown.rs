//! Optimization Rule - Predicate Pushdown
//!
//! Goal: filter rows as early as possible.
//!
//! Single-column filters are lifted out of the plan and carried towards
//! the scans; a connector that advertises predicate pushdown absorbs them
//! into the read itself. Filters are also pushed into join conditions:
//! the fewer rows a join returns the better, so rather than filter after
//! a join we add conditions to the join. Cross joins whose filter is an
//! equality spanning exactly both legs are rewritten to inner joins.
//! Anything that cannot be placed is reinserted along its original plan
//! path on completion.

use std::collections::HashSet;

use crate::connectors::Capabilities;
use crate::errors::{Error, Result};
use crate::expression::operator_map::determine_type;
use crate::expression::{CompareOp, Node, NodeType};
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{
    random_nid, JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType,
};
use crate::planner::binder::extract_join_fields;
use crate::schema::SchemaColumn;
use crate::statistics::QueryStatistics;
use crate::value::{Value, ValueType};

pub struct PredicatePushdownStrategy {
    statistics: QueryStatistics,
}

impl PredicatePushdownStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        PredicatePushdownStrategy { statistics }
    }
}

fn add_condition(existing: Option<Node>, new_condition: Node) -> Node {
    match existing {
        None => new_condition,
        Some(existing) => Node::and(new_condition, existing),
    }
}

/// Split a join condition at ANDs, lifting out conjuncts where one side is
/// constant (no identifiers); those belong in a filter, not the join.
fn lift_constant_conjuncts(node: Node) -> (Vec<Node>, Option<Node>) {
    if node.node_type == NodeType::And {
        let left = node.left.clone().map(|n| *n);
        let right = node.right.clone().map(|n| *n);
        if let Some(left) = left {
            let (collected, _) = lift_constant_conjuncts(left);
            if !collected.is_empty() {
                return (collected, node.right.map(|n| *n));
            }
        }
        if let Some(right) = right {
            let (collected, _) = lift_constant_conjuncts(right);
            if !collected.is_empty() {
                return (collected, node.left.map(|n| *n));
            }
        }
        return (Vec::new(), Some(node));
    }
    let left_constant = node
        .left
        .as_ref()
        .is_some_and(|l| l.identifiers().is_empty());
    let right_constant = node
        .right
        .as_ref()
        .is_some_and(|r| r.identifiers().is_empty());
    if left_constant || right_constant {
        return (vec![node], None);
    }
    (Vec::new(), Some(node))
}

fn operand_types(condition: &Node) -> HashSet<ValueType> {
    let mut types = HashSet::new();
    if let Some(left) = &condition.left {
        types.insert(determine_type(left));
    }
    if let Some(right) = &condition.right {
        types.insert(determine_type(right));
    }
    types
}

impl PredicatePushdownStrategy {
    /// Offer each collected predicate to a scan; the connector absorbs
    /// what it can, the rest lands as a filter immediately above.
    fn handle_scan(
        &self,
        node: &LogicalPlanNode,
        context: &mut OptimizerContext,
    ) -> Result<LogicalPlanNode> {
        let mut node = node.clone();
        let mut remaining = Vec::new();
        let scan_names: HashSet<String> = node
            .relation
            .iter()
            .chain(node.alias.iter())
            .cloned()
            .collect();

        for predicate in std::mem::take(&mut context.collected_predicates) {
            // only predicates contained entirely within this scan's
            // relation may land here; join predicates travel further
            let applies = !predicate.relations.is_empty()
                && predicate.relations.iter().all(|r| scan_names.contains(r));
            if !applies {
                remaining.push(predicate);
                continue;
            }
            if let (Some(connector), Some(condition)) = (&node.connector, &predicate.condition) {
                if connector
                    .capabilities()
                    .contains(Capabilities::PREDICATE_PUSHABLE)
                    && connector.can_push(condition, &operand_types(condition))
                {
                    self.statistics
                        .increment("optimization_predicate_pushdown_into_scan", 1);
                    node.predicates.push(condition.clone());
                    continue;
                }
            }
            self.statistics
                .increment("optimization_predicate_pushdown", 1);
            let nid = predicate.nid.clone().unwrap_or_else(random_nid);
            context
                .optimized_plan
                .insert_node_after(nid, predicate, &context.node_id)?;
        }
        context.collected_predicates = remaining;
        Ok(node)
    }

    fn handle_join(
        &self,
        node: &LogicalPlanNode,
        context: &mut OptimizerContext,
    ) -> Result<()> {
        let mut node = node.clone();

        // constant-sided conjuncts in the ON clause become filters
        if let Some(on) = node.on.take() {
            let (lifted, remaining_on) = lift_constant_conjuncts(on);
            node.on = remaining_on;
            for condition in lifted {
                self.statistics
                    .increment("optimization_predicate_pushdown_into_join", 1);
                let mut filter = LogicalPlanNode::filter(condition);
                filter.nid = Some(random_nid());
                context.collected_predicates.push(filter);
            }
        }

        if !context.collected_predicates.is_empty() {
            let join_type = node.join_type.unwrap_or(JoinType::Inner);

            if join_type.is_left_flavour() {
                // pushing past an outer join is unsound when the predicate
                // touches the right leg, or when we don't know where the
                // relation came from (usually subqueries)
                let offending = context.collected_predicates.iter().any(|predicate| {
                    predicate
                        .condition
                        .iter()
                        .flat_map(Node::identifiers)
                        .any(|identifier| {
                            identifier.source.as_ref().is_some_and(|source| {
                                node.right_relation_names.contains(source)
                                    || !node.all_relations.contains(source)
                            })
                        })
                });
                if offending {
                    self.reinsert_all(context)?;
                }
            } else if !matches!(join_type, JoinType::CrossJoin | JoinType::Inner) {
                // IMPROVE: push past SEMI and ANTI joins
                self.reinsert_all(context)?;
            } else if join_type == JoinType::CrossJoin {
                let mut remaining = Vec::new();
                let leg_names: HashSet<String> = node
                    .left_relation_names
                    .iter()
                    .chain(node.right_relation_names.iter())
                    .cloned()
                    .collect();
                for predicate in std::mem::take(&mut context.collected_predicates) {
                    let condition_is_eq = predicate
                        .condition
                        .as_ref()
                        .and_then(|c| c.value.as_comparison())
                        == Some(CompareOp::Eq);
                    if predicate.relations.len() == 2
                        && condition_is_eq
                        && predicate.relations == leg_names
                    {
                        node.join_type = Some(JoinType::Inner);
                        if let Some(condition) = predicate.condition {
                            node.on = Some(add_condition(node.on.take(), condition));
                        }
                        self.statistics.increment(
                            "optimization_predicate_pushdown_cross_join_to_inner_join",
                            1,
                        );
                    } else {
                        remaining.push(predicate);
                    }
                }
                context.collected_predicates = remaining;
                self.refresh_join_keys(&mut node);
            }

            if node.join_type == Some(JoinType::Inner) {
                let mut remaining = Vec::new();
                let leg_names: HashSet<String> = node
                    .left_relation_names
                    .iter()
                    .chain(node.right_relation_names.iter())
                    .cloned()
                    .collect();
                for predicate in std::mem::take(&mut context.collected_predicates) {
                    let condition_is_eq = predicate
                        .condition
                        .as_ref()
                        .and_then(|c| c.value.as_comparison())
                        == Some(CompareOp::Eq);
                    if predicate.relations.len() == 2
                        && condition_is_eq
                        && predicate.relations == leg_names
                    {
                        self.statistics
                            .increment("optimization_predicate_pushdown_add_to_inner_join", 1);
                        if let Some(condition) = predicate.condition {
                            node.on = Some(add_condition(node.on.take(), condition));
                        }
                    } else {
                        remaining.push(predicate);
                    }
                }
                context.collected_predicates = remaining;
                self.refresh_join_keys(&mut node);
            }
        }

        if node.on.is_none() && node.join_type == Some(JoinType::Inner) {
            return Err(Error::UnsupportedSyntax(
                "INNER JOIN has no valid conditions, did you mean CROSS JOIN?".to_string(),
            ));
        }

        context
            .optimized_plan
            .add_node(context.node_id.clone(), node);
        Ok(())
    }

    fn refresh_join_keys(&self, node: &mut LogicalPlanNode) {
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
    }

    fn reinsert_all(&self, context: &mut OptimizerContext) -> Result<()> {
        for predicate in std::mem::take(&mut context.collected_predicates) {
            self.statistics
                .increment("optimization_predicate_pushdown", 1);
            let nid = predicate.nid.clone().unwrap_or_else(random_nid);
            context
                .optimized_plan
                .insert_node_after(nid, predicate, &context.node_id)?;
        }
        Ok(())
    }

    fn handle_unnest(
        &self,
        node: &LogicalPlanNode,
        context: &mut OptimizerContext,
    ) -> Result<()> {
        let mut node = node.clone();
        let target_identity = node
            .unnest_target
            .as_ref()
            .map(|c| c.identity.clone())
            .unwrap_or_default();
        let source_relation = node
            .unnest_column
            .as_ref()
            .and_then(|c| c.source.clone());

        let mut remaining = Vec::new();
        let mut node_updated = false;
        for predicate in std::mem::take(&mut context.collected_predicates) {
            let known_identities: HashSet<String> = predicate
                .condition
                .iter()
                .flat_map(Node::identities)
                .collect();
            let condition = predicate.condition.clone();
            let query_identities: HashSet<String> = condition
                .as_ref()
                .map(|c| {
                    c.left
                        .iter()
                        .chain(c.right.iter())
                        .filter_map(|side| side.identity().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            // a predicate on the relation feeding the unnest moves below
            // it, so fewer rows are expanded
            if !predicate.relations.is_empty()
                && source_relation
                    .as_ref()
                    .is_some_and(|source| {
                        predicate.relations.iter().all(|r| r == source)
                    })
                && !known_identities.contains(&target_identity)
            {
                self.statistics
                    .increment("optimization_predicate_pushdown", 1);
                let nid = predicate.nid.clone().unwrap_or_else(random_nid);
                context
                    .optimized_plan
                    .insert_node_before(nid, predicate, &context.node_id)?;
                continue;
            }

            // Eq / IN on the unnested column with literal operands merges
            // into the unnest's own value filter
            let mergeable = condition.as_ref().is_some_and(|c| {
                matches!(
                    c.value.as_comparison(),
                    Some(CompareOp::Eq | CompareOp::InList)
                ) && predicate.columns.len() == 1
                    && predicate.columns[0].identity() == Some(target_identity.as_str())
                    && c.left.as_ref().is_some_and(|l| {
                        matches!(l.node_type, NodeType::Literal | NodeType::Identifier)
                    })
                    && c.right.as_ref().is_some_and(|r| {
                        matches!(r.node_type, NodeType::Literal | NodeType::Identifier)
                    })
            });
            if mergeable {
                let values = condition
                    .as_ref()
                    .and_then(|c| c.right.as_ref())
                    .and_then(|r| r.value.as_literal())
                    .cloned();
                let new_values = match values {
                    Some(Value::Array(items)) => items,
                    Some(single) => vec![single],
                    None => Vec::new(),
                };
                let filters = node.filters.get_or_insert_with(Vec::new);
                for value in new_values {
                    if !filters.iter().any(|existing| existing.sql_eq(&value)) {
                        filters.push(value);
                    }
                }
                self.statistics
                    .increment("optimization_predicate_pushdown_cross_join_unnest", 1);
                node_updated = true;
                continue;
            }

            if query_identities == known_identities && !known_identities.is_empty()
                || query_identities.contains(&target_identity)
            {
                self.statistics
                    .increment("optimization_predicate_pushdown", 1);
                let nid = predicate.nid.clone().unwrap_or_else(random_nid);
                context
                    .optimized_plan
                    .insert_node_after(nid, predicate, &context.node_id)?;
            } else {
                remaining.push(predicate);
            }
        }
        context.collected_predicates = remaining;
        if node_updated {
            context
                .optimized_plan
                .add_node(context.node_id.clone(), node);
        }
        Ok(())
    }

    /// Inline simple projected aliases referenced by a boolean filter so
    /// the predicate can be pushed below the projection.
    fn inline_project_alias_predicates(
        &self,
        node: &mut LogicalPlanNode,
        context: &OptimizerContext,
    ) {
        let Some(condition) = node.condition.clone() else {
            return;
        };
        if condition.node_type != NodeType::ComparisonOperator
            || !matches!(
                condition.value.as_comparison(),
                Some(CompareOp::Eq | CompareOp::NotEq)
            )
        {
            return;
        }

        // walk down through single-input steps looking for the projection
        // that computed the alias
        let mut alias_chain: HashSet<String> = HashSet::new();
        let mut current = context.node_id.clone();
        let project_node = loop {
            let producers = context.pre_optimized_tree.ingoing_edges(&current);
            if producers.len() != 1 {
                return;
            }
            current = producers[0].0.clone();
            let Some(producer) = context.pre_optimized_tree.get(&current) else {
                return;
            };
            if let Some(alias) = &producer.alias {
                alias_chain.insert(alias.clone());
            }
            match producer.step {
                LogicalPlanStepType::Project => break producer.clone(),
                LogicalPlanStepType::Scan | LogicalPlanStepType::FunctionDataset => return,
                _ => {}
            }
        };

        let candidates = [
            (condition.left.as_deref(), condition.right.as_deref()),
            (condition.right.as_deref(), condition.left.as_deref()),
        ];
        for (alias_candidate, literal_candidate) in candidates {
            let (Some(alias_candidate), Some(literal_candidate)) =
                (alias_candidate, literal_candidate)
            else {
                continue;
            };
            if alias_candidate.node_type != NodeType::Identifier
                || literal_candidate.node_type != NodeType::Literal
            {
                continue;
            }
            let Some(Value::Boolean(literal_is_true)) =
                literal_candidate.value.as_literal().cloned()
            else {
                continue;
            };
            let Some(source_column) = alias_candidate.source_column.as_deref() else {
                continue;
            };
            if let Some(source) = &alias_candidate.source {
                if !alias_chain.is_empty() && !alias_chain.contains(source) {
                    continue;
                }
            }
            let Some(template) = project_node.columns.iter().find(|column| {
                column.query_column.as_deref() == Some(source_column)
                    || column.alias.as_deref() == Some(source_column)
            }) else {
                continue;
            };
            if template.has_aggregator() {
                continue;
            }

            let mut expression = template.clone();
            expression.alias = None;
            expression.query_column = None;
            if let Some(column) = expression.schema_column.as_mut() {
                column.aliases.clear();
            }

            let negate = if condition.value.as_comparison() == Some(CompareOp::Eq) {
                !literal_is_true
            } else {
                literal_is_true
            };

            let new_condition = if negate {
                let mut negated = Node::not(expression.clone());
                negated.schema_column = Some(SchemaColumn::new(
                    format!("NOT {}", expression.format()),
                    ValueType::Boolean,
                ));
                negated
            } else {
                expression
            };

            node.columns = new_condition.identifiers().into_iter().cloned().collect();
            node.relations = new_condition.relations();
            node.condition = Some(new_condition);
            self.statistics
                .increment("optimization_predicate_pushdown_inline_project", 1);
            return;
        }
    }
}

impl OptimizationStrategy for PredicatePushdownStrategy {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        match node.step {
            LogicalPlanStepType::Scan | LogicalPlanStepType::FunctionDataset => {
                let updated = self.handle_scan(node, context)?;
                context
                    .optimized_plan
                    .add_node(context.node_id.clone(), updated);
            }
            LogicalPlanStepType::Limit | LogicalPlanStepType::Union => {
                // don't push filters past limits
                for predicate in std::mem::take(&mut context.collected_predicates) {
                    self.statistics
                        .increment("optimization_predicate_pushdown", 1);
                    let nid = predicate.nid.clone().unwrap_or_else(random_nid);
                    context
                        .optimized_plan
                        .insert_node_after(nid, predicate, &context.node_id)?;
                }
            }
            LogicalPlanStepType::Filter => {
                let mut node = node.clone();
                self.inline_project_alias_predicates(&mut node, context);
                let identifier_count = node
                    .condition
                    .as_ref()
                    .map_or(0, |c| c.identifiers().len());
                let has_aggregator = node
                    .condition
                    .as_ref()
                    .is_some_and(Node::has_aggregator);
                // single-column predicates travel towards their scan; a
                // two-relation equality travels towards its join, where it
                // may turn a cross join into an inner join
                let join_candidate = identifier_count == 2
                    && node.relations.len() >= 2
                    && node
                        .condition
                        .as_ref()
                        .and_then(|c| c.value.as_comparison())
                        == Some(CompareOp::Eq);
                if !node.relations.is_empty()
                    && !has_aggregator
                    && (identifier_count == 1 || join_candidate)
                {
                    node.nid = Some(context.node_id.clone());
                    node.plan_path = context.optimized_plan.trace_to_root(&context.node_id);
                    context
                        .optimized_plan
                        .remove_node(&context.node_id, true)?;
                    context.collected_predicates.push(node);
                } else {
                    context
                        .optimized_plan
                        .add_node(context.node_id.clone(), node);
                }
            }
            LogicalPlanStepType::Unnest => self.handle_unnest(node, context)?,
            LogicalPlanStepType::Join => self.handle_join(node, context)?,
            _ => {}
        }
        Ok(())
    }

    fn complete(&self, mut context: OptimizerContext) -> Result<LogicalPlan> {
        // anything we couldn't place goes back where it came from
        for predicate in std::mem::take(&mut context.collected_predicates) {
            for nid in predicate.plan_path.clone() {
                if context.optimized_plan.contains(&nid) {
                    self.statistics
                        .increment("optimization_predicate_pushdown_unplaced", 1);
                    let pred_nid = predicate.nid.clone().unwrap_or_else(random_nid);
                    context
                        .optimized_plan
                        .insert_node_before(pred_nid, predicate, &nid)?;
                    break;
                }
            }
        }
        Ok(context.optimized_plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;

    fn bound(name: &str, relation: &str, value_type: ValueType) -> Node {
        Node::bound_identifier(
            SchemaColumn::new(name, value_type).with_origin(relation),
        )
    }

    #[test]
    fn join_fields_pair_by_leg() {
        let on = Node::comparison(
            CompareOp::Eq,
            bound("id", "$planets", ValueType::Integer),
            bound("planetId", "$satellites", ValueType::Integer),
        );
        let (left, right) = extract_join_fields(
            &on,
            &["$satellites".to_string()],
            &["$planets".to_string()],
        );
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);
        assert_eq!(left[0].source_column.as_deref(), Some("planetId"));
        assert_eq!(right[0].source_column.as_deref(), Some("id"));
    }

    #[test]
    fn constant_conjuncts_are_lifted_from_join_conditions() {
        let keyed = Node::comparison(
            CompareOp::Eq,
            bound("id", "a", ValueType::Integer),
            bound("id", "b", ValueType::Integer),
        );
        let constant = Node::comparison(
            CompareOp::Gt,
            bound("mass", "a", ValueType::Double),
            Node::literal(Value::Integer(1)),
        );
        let on = Node::and(keyed.clone(), constant);
        let (lifted, remaining) = lift_constant_conjuncts(on);
        assert_eq!(lifted.len(), 1);
        assert_eq!(
            remaining.map(|n| n.uuid),
            Some(keyed.uuid)
        );
    }
}
