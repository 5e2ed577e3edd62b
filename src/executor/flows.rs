//! Flow identification.
//!
//! A flow is a maximal chain of stateless operators with fan-in and
//! fan-out of one; morsels can pass through a whole flow without touching
//! engine state, which is what lets the worker pool evaluate them in
//! parallel. Joins, aggregations, unions and any node with multiple
//! producers or consumers are flow boundaries and carry no flow id.

use std::collections::HashMap;

use crate::operators::PhysicalOperator;
use crate::plan::{Nid, PlanGraph};

pub type PhysicalPlan = PlanGraph<PhysicalOperator>;

/// Maximal stateless chains, each ordered producer-first.
pub fn identify_flows(plan: &PhysicalPlan) -> Vec<Vec<Nid>> {
    let mut flows = Vec::new();
    for (nid, operator) in plan.nodes() {
        if !is_chainable(plan, nid, operator) {
            continue;
        }
        // only start a chain at its head: the producer is not chainable
        let producer = plan.ingoing_edges(nid);
        let has_chainable_producer = producer.first().is_some_and(|(source, _, _)| {
            plan.get(source)
                .is_some_and(|op| is_chainable(plan, source, op))
        });
        if has_chainable_producer {
            continue;
        }
        let mut chain = vec![nid.clone()];
        let mut current = nid.clone();
        loop {
            let consumers = plan.outgoing_edges(&current);
            if consumers.len() != 1 {
                break;
            }
            let next = consumers[0].1.clone();
            let Some(op) = plan.get(&next) else { break };
            if !is_chainable(plan, &next, op) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        flows.push(chain);
    }
    flows
}

/// Stateless, single producer, single consumer.
fn is_chainable(plan: &PhysicalPlan, nid: &str, operator: &PhysicalOperator) -> bool {
    operator.is_stateless()
        && plan.ingoing_edges(nid).len() == 1
        && plan.outgoing_edges(nid).len() == 1
}

/// The flow id of every node; boundaries map to `None`.
pub fn flow_ids(plan: &PhysicalPlan) -> HashMap<Nid, Option<usize>> {
    let mut ids: HashMap<Nid, Option<usize>> = plan
        .node_ids()
        .into_iter()
        .map(|nid| (nid, None))
        .collect();
    for (flow, chain) in identify_flows(plan).into_iter().enumerate() {
        for nid in chain {
            ids.insert(nid, Some(flow));
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{CompareOp, Node};
    use crate::operators::{FilterOperator, ProjectionOperator, SortOperator};
    use crate::value::Value;

    fn filter_op() -> PhysicalOperator {
        PhysicalOperator::Filter(FilterOperator::new(Node::literal(Value::Boolean(true))))
    }

    fn predicate_filter() -> PhysicalOperator {
        PhysicalOperator::Filter(FilterOperator::new(Node::comparison(
            CompareOp::Eq,
            Node::literal(Value::Integer(1)),
            Node::literal(Value::Integer(1)),
        )))
    }

    #[test]
    fn adjacent_stateless_operators_share_a_flow() {
        let mut plan = PhysicalPlan::new();
        plan.add_node(
            "scan",
            PhysicalOperator::FunctionDataset(crate::operators::FunctionDatasetOperator::new(
                "EMPTY".to_string(),
                vec![],
            )),
        );
        plan.add_node("filter", predicate_filter());
        plan.add_node(
            "project",
            PhysicalOperator::Projection(ProjectionOperator::new(vec![])),
        );
        plan.add_node("sort", PhysicalOperator::Sort(SortOperator::new(vec![])));
        plan.add_node("tail_filter", filter_op());
        plan.add_node(
            "exit",
            PhysicalOperator::Exit(crate::operators::ExitOperator::new(vec![])),
        );
        plan.add_edge("scan", "filter", None).expect("acyclic");
        plan.add_edge("filter", "project", None).expect("acyclic");
        plan.add_edge("project", "sort", None).expect("acyclic");
        plan.add_edge("sort", "tail_filter", None).expect("acyclic");
        plan.add_edge("tail_filter", "exit", None).expect("acyclic");

        let flows = identify_flows(&plan);
        assert_eq!(flows.len(), 2);
        assert_eq!(
            flows[0],
            vec!["filter".to_string(), "project".to_string()]
        );
        assert_eq!(flows[1], vec!["tail_filter".to_string()]);

        let ids = flow_ids(&plan);
        assert_eq!(ids["filter"], ids["project"]);
        assert_eq!(ids["sort"], None);
        assert_ne!(ids["filter"], ids["tail_filter"]);
    }
}
