//! Optimization Rule - Limit Pushdown
//!
//! Goal: reduce rows.
//!
//! LIMIT and HEAPSORT nodes travel below projections when the projection
//! doesn't compute their ordering columns, reducing the rows that reach
//! expensive projection evaluations. A LIMIT arriving at a scan whose
//! connector honours limits is absorbed into the read itself. Aggregates,
//! distincts, filters, joins, orders and unions are hard boundaries.

use crate::connectors::Capabilities;
use crate::errors::Result;
use crate::optimizer::{get_nodes_of_type, OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct LimitPushdownStrategy {
    statistics: QueryStatistics,
}

impl LimitPushdownStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        LimitPushdownStrategy { statistics }
    }

    /// A LIMIT can always move below a projection. A HEAPSORT only when
    /// every ordering column already existed before the projection ran,
    /// i.e. none of them is computed by it.
    fn can_push_before_projection(
        limit_node: &LogicalPlanNode,
        project_node: &LogicalPlanNode,
    ) -> bool {
        match limit_node.step {
            LogicalPlanStepType::Limit => true,
            LogicalPlanStepType::HeapSort => {
                if project_node.pre_update_columns.is_empty() {
                    // can't tell what existed before; don't push
                    return false;
                }
                limit_node.order_by.iter().all(|(key, _)| {
                    key.identity().map_or(false, |identity| {
                        project_node.pre_update_columns.contains(identity)
                    })
                })
            }
            _ => false,
        }
    }
}

impl OptimizationStrategy for LimitPushdownStrategy {
    fn name(&self) -> &'static str {
        "LimitPushdown"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        match node.step {
            LogicalPlanStepType::Limit => {
                if node.offset.is_some() {
                    // we can't push down limits with offset
                    return Ok(());
                }
                let mut node = node.clone();
                node.nid = Some(context.node_id.clone());
                context.collected_limits.push(node);
            }
            LogicalPlanStepType::HeapSort => {
                let mut node = node.clone();
                node.nid = Some(context.node_id.clone());
                context.collected_limits.push(node);
            }
            LogicalPlanStepType::Project => {
                for limit_node in std::mem::take(&mut context.collected_limits) {
                    if Self::can_push_before_projection(&limit_node, node) {
                        if let Some(nid) = limit_node.nid.clone() {
                            self.statistics.increment("optimization_limit_pushdown", 1);
                            context.optimized_plan.remove_node(&nid, true)?;
                            context.optimized_plan.insert_node_before(
                                nid,
                                limit_node.clone(),
                                &context.node_id,
                            )?;
                        }
                    }
                    // still collected: it may reach a limit-pushable scan
                    context.collected_limits.push(limit_node);
                }
            }
            LogicalPlanStepType::Scan
                if node.connector.as_ref().is_some_and(|c| {
                    c.capabilities().contains(Capabilities::LIMIT_PUSHABLE)
                }) =>
            {
                let mut node = node.clone();
                let mut absorbed = false;
                // scans are boundaries: absorb what we can, drop the rest
                for limit_node in std::mem::take(&mut context.collected_limits) {
                    // only plain LIMITs fold into a read; a heap sort
                    // still has ordering work to do
                    let relation_matches = node
                        .relation
                        .as_ref()
                        .is_some_and(|r| limit_node.all_relations.contains(r));
                    if limit_node.step == LogicalPlanStepType::Limit && relation_matches {
                        if let Some(nid) = &limit_node.nid {
                            self.statistics.increment("optimization_limit_pushdown", 1);
                            context.optimized_plan.remove_node(nid, true)?;
                            node.limit = limit_node.limit;
                            absorbed = true;
                        }
                    }
                }
                if absorbed {
                    context
                        .optimized_plan
                        .add_node(context.node_id.clone(), node);
                }
            }
            LogicalPlanStepType::Aggregate
            | LogicalPlanStepType::AggregateAndGroup
            | LogicalPlanStepType::Distinct
            | LogicalPlanStepType::Filter
            | LogicalPlanStepType::Join
            | LogicalPlanStepType::Order
            | LogicalPlanStepType::Union
            | LogicalPlanStepType::Scan => {
                // we don't push past here; anything still collected stays
                // where it is in the plan
                context.collected_limits.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn should_i_run(&self, plan: &LogicalPlan) -> bool {
        !get_nodes_of_type(
            plan,
            &[LogicalPlanStepType::Limit, LogicalPlanStepType::HeapSort],
        )
        .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::VirtualDataConnector;
    use crate::expression::Node;
    use crate::optimizer::apply_strategy;
    use crate::plan::Direction;
    use crate::schema::SchemaColumn;
    use crate::value::ValueType;
    use std::sync::Arc;

    fn scan_project_limit_plan(limit_pushable: bool) -> LogicalPlan {
        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        scan.all_relations = ["$planets".to_string()].into_iter().collect();
        if limit_pushable {
            scan.connector = Some(Arc::new(VirtualDataConnector));
        }
        plan.add_node("scan", scan);

        let mut project = LogicalPlanNode::new(LogicalPlanStepType::Project);
        project.columns = vec![Node::bound_identifier(SchemaColumn::new(
            "name",
            ValueType::Varchar,
        ))];
        plan.add_node("project", project);

        let mut limit = LogicalPlanNode::new(LogicalPlanStepType::Limit);
        limit.limit = Some(5);
        limit.all_relations = ["$planets".to_string()].into_iter().collect();
        plan.add_node("limit", limit);

        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "project", None).expect("acyclic");
        plan.add_edge("project", "limit", None).expect("acyclic");
        plan.add_edge("limit", "exit", None).expect("acyclic");
        plan
    }

    #[test]
    fn limit_absorbed_by_pushable_scan() {
        let plan = scan_project_limit_plan(true);
        let strategy = LimitPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");
        assert!(!optimized.contains("limit"));
        assert_eq!(optimized.get("scan").expect("scan").limit, Some(5));
    }

    #[test]
    fn limit_moves_below_projection_without_pushable_scan() {
        let plan = scan_project_limit_plan(false);
        let strategy = LimitPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");
        // the limit survives, now below the project
        assert!(optimized.contains("limit"));
        let above_scan = optimized.outgoing_edges("scan");
        assert_eq!(above_scan[0].1, "limit");
    }

    #[test]
    fn heap_sort_on_computed_key_stays_put() {
        let mut plan = LogicalPlan::new();
        let mut scan = LogicalPlanNode::new(LogicalPlanStepType::Scan);
        scan.relation = Some("$planets".to_string());
        plan.add_node("scan", scan);
        let mut project = LogicalPlanNode::new(LogicalPlanStepType::Project);
        // pre_update_columns empty: the ordering key's provenance is
        // unknown, so the heap sort must not move
        project.columns = vec![];
        plan.add_node("project", project);
        let mut heap = LogicalPlanNode::new(LogicalPlanStepType::HeapSort);
        heap.limit = Some(3);
        heap.order_by = vec![(
            Node::bound_identifier(SchemaColumn::new("derived", ValueType::Double)),
            Direction::Ascending,
        )];
        plan.add_node("heap", heap);
        plan.add_node("exit", LogicalPlanNode::new(LogicalPlanStepType::Exit));
        plan.add_edge("scan", "project", None).expect("acyclic");
        plan.add_edge("project", "heap", None).expect("acyclic");
        plan.add_edge("heap", "exit", None).expect("acyclic");

        let strategy = LimitPushdownStrategy::new(QueryStatistics::new());
        let optimized =
            apply_strategy(&plan, &strategy, QueryStatistics::new()).expect("strategy applies");
        // heap sort still directly above the project
        assert_eq!(optimized.outgoing_edges("project")[0].1, "heap");
    }
}
