//! Optimization Rule - Projection Pushdown
//!
//! Goal: limit columns which need to be moved around.
//!
//! Unlike the other rules this one doesn't move operators; walking from
//! the head of the plan down towards the scans it accumulates the set of
//! column identities referenced above each node, prunes projections that
//! emit columns nobody reads, and rewrites each scan's column list to
//! exactly what the plan consumes. Subqueries are opaque: every column is
//! treated as reachable through them.

use std::collections::HashSet;

use crate::errors::Result;
use crate::expression::Node;
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct ProjectionPushdownStrategy {
    statistics: QueryStatistics,
}

impl ProjectionPushdownStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        ProjectionPushdownStrategy { statistics }
    }

    /// Every bound identity referenced by this node's expressions.
    fn collect_columns(node: &LogicalPlanNode) -> HashSet<String> {
        let mut identities = HashSet::new();
        let mut absorb = |expression: &Node| {
            identities.extend(expression.identities());
        };
        for column in &node.columns {
            absorb(column);
        }
        if let Some(condition) = &node.condition {
            absorb(condition);
        }
        if let Some(on) = &node.on {
            absorb(on);
        }
        for aggregate in &node.aggregates {
            absorb(aggregate);
        }
        for group in &node.groups {
            absorb(group);
        }
        for projected in &node.projection {
            absorb(projected);
        }
        for (key, _) in &node.order_by {
            absorb(key);
        }
        if let Some(unnest_column) = &node.unnest_column {
            absorb(unnest_column);
        }
        if let Some(distinct_on) = &node.distinct_on {
            for column in distinct_on {
                absorb(column);
            }
        }
        identities
    }
}

impl OptimizationStrategy for ProjectionPushdownStrategy {
    fn name(&self) -> &'static str {
        "ProjectionPushdown"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        let mut node = node.clone();
        node.pre_update_columns = context.collected_identities.clone();

        // a union changes what we think we know about the columns
        if node.step == LogicalPlanStepType::Union {
            context.seen_unions += 1;
        }

        if node.step == LogicalPlanStepType::Project {
            // below the top projection we can drop columns (and their
            // evaluations) that the outer query never references
            if context.seen_unions == 0 && context.seen_projections > 0 {
                let before = node.columns.len();
                node.columns.retain(|column| {
                    column
                        .identity()
                        .map_or(true, |identity| node.pre_update_columns.contains(identity))
                });
                if node.columns.len() < before {
                    self.statistics
                        .increment("optimization_projection_pushdown_prune_projection", 1);
                }
            }
            if context.seen_unions == 0 {
                context.seen_projections += 1;
            }
        }

        // subqueries act like all columns are referenced
        if node.step != LogicalPlanStepType::Subquery {
            context
                .collected_identities
                .extend(Self::collect_columns(&node));
        }

        if matches!(
            node.step,
            LogicalPlanStepType::Scan
                | LogicalPlanStepType::Subquery
                | LogicalPlanStepType::Union
        ) {
            if let Some(schema) = node.schema.clone() {
                // predicates already pushed into the scan still need
                // their columns read
                let mut required = context.collected_identities.clone();
                for predicate in &node.predicates {
                    required.extend(predicate.identities());
                }
                let mut pushed: Vec<Node> = schema
                    .columns
                    .iter()
                    .filter(|column| required.contains(&column.identity))
                    .map(|column| Node::bound_identifier(column.clone()))
                    .collect();
                // a count-style query references nothing; keep one column
                // so the reader still produces row counts
                if pushed.is_empty() {
                    if let Some(first) = schema.columns.first() {
                        pushed.push(Node::bound_identifier(first.clone()));
                    }
                }
                if pushed.len() < node.columns.len() {
                    self.statistics
                        .increment("optimization_projection_pushdown", 1);
                }
                node.columns = pushed;
            }
        }

        context
            .optimized_plan
            .add_node(context.node_id.clone(), node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets;
    use crate::expression::CompareOp;
    use crate::optimizer::apply_strategy;
    use crate::plan::LogicalPlan;
    use crate::value::Value;

    #[test]
    fn scan_columns_reduce_to_referenced_identities() {
        // SELECT name FROM $planets WHERE id < 5 reads two columns
        let schema = datasets::schema("$planets").expect("schema exists");
        let id = schema.find_column("id").expect("id").clone();
        let name = schema.find_column("name").expect("name").clone();

        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        scan.columns = schema
            .columns
            .iter()
            .map(|c| Node::bound_identifier(c.clone()))
            .collect();
        scan.schema = Some(schema);
        plan.add_node("scan", scan);

        plan.add_node(
            "filter",
            LogicalPlanNode::filter(Node::comparison(
                CompareOp::Lt,
                Node::bound_identifier(id),
                Node::literal(Value::Integer(5)),
            )),
        );

        let mut project = LogicalPlanNode::new(LogicalPlanStepType::Project);
        project.columns = vec![Node::bound_identifier(name)];
        plan.add_node("project", project);

        let mut exit = LogicalPlanNode::new(LogicalPlanStepType::Exit);
        exit.columns = vec![];
        plan.add_node("exit", exit);

        plan.add_edge("scan", "filter", None).expect("acyclic");
        plan.add_edge("filter", "project", None).expect("acyclic");
        plan.add_edge("project", "exit", None).expect("acyclic");

        let strategy = ProjectionPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");
        let scan = optimized.get("scan").expect("scan survives");
        let names: Vec<String> = scan.columns.iter().map(Node::current_name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"id".to_string()));
        assert!(names.contains(&"name".to_string()));
    }
}
