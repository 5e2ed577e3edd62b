//! # The Execution Engine
//!
//! A single driver pumps the scan operators in plan order and pushes the
//! resulting `(operator, message, join leg)` work units through the
//! operator graph, collecting whatever arrives at the plan's single exit
//! point. Morsel order is preserved within a scan and within each join
//! leg; EOS sentinels flow the same paths and trigger flushes at the
//! stateful boundaries.
//!
//! When more than one worker is configured, maximal stateless flows
//! (filter/project chains) are evaluated on a worker pool: batches of
//! morsels fan out over a channel to worker threads, each running its own
//! clone of the chain, and fan back in sequence order so downstream
//! operators observe the serial ordering.
//!
//! The first error wins: it cancels the token, which stops the scans and
//! drains the remaining work.

pub mod flows;

pub use flows::PhysicalPlan;

use std::collections::{HashMap, VecDeque};

use crossbeam_channel::unbounded;

use crate::errors::{Error, Result};
use crate::morsel::{Message, Morsel};
use crate::operators::{
    ExecutionContext, FilterOperator, PhysicalOperator, ProjectionOperator,
};
use crate::plan::{JoinLeg, Nid};

/// A cloneable stateless operator, the unit workers execute.
#[derive(Clone)]
enum ChainOp {
    Filter(FilterOperator),
    Projection(ProjectionOperator),
}

impl ChainOp {
    fn from_operator(operator: &PhysicalOperator) -> Option<ChainOp> {
        match operator {
            PhysicalOperator::Filter(op) => Some(ChainOp::Filter(op.clone())),
            PhysicalOperator::Projection(op) => Some(ChainOp::Projection(op.clone())),
            _ => None,
        }
    }

    fn apply(&self, message: Message, context: &ExecutionContext) -> Result<Vec<Message>> {
        match self {
            ChainOp::Filter(op) => op.process(message, context),
            ChainOp::Projection(op) => op.process(message, context),
        }
    }
}

fn feed_chain(
    ops: &[ChainOp],
    message: Message,
    context: &ExecutionContext,
) -> Result<Vec<Message>> {
    let mut messages = vec![message];
    for op in ops {
        let mut next = Vec::with_capacity(messages.len());
        for message in messages {
            next.extend(op.apply(message, context)?);
        }
        messages = next;
    }
    Ok(messages)
}

/// Fan a batch of morsels over a channel to the pool, preserving order
/// by sequence number on the way back in.
fn run_chain_parallel(
    ops: &[ChainOp],
    batch: Vec<Morsel>,
    context: &ExecutionContext,
    worker_threads: usize,
) -> Result<Vec<Morsel>> {
    let total = batch.len();
    let workers = worker_threads.max(1).min(total.max(1));

    let (work_sender, work_receiver) = unbounded::<(usize, Morsel)>();
    let (result_sender, result_receiver) = unbounded::<(usize, Result<Vec<Morsel>>)>();

    for work_unit in batch.into_iter().enumerate() {
        if work_sender.send(work_unit).is_err() {
            return Err(Error::InvalidInternalState(
                "chain work queue closed early".to_string(),
            ));
        }
    }
    drop(work_sender);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let work = work_receiver.clone();
            let results = result_sender.clone();
            let ops = ops.to_vec();
            let context = context.clone();
            scope.spawn(move || {
                for (index, morsel) in work {
                    let outcome =
                        feed_chain(&ops, Message::Morsel(morsel), &context).map(|messages| {
                            messages
                                .into_iter()
                                .filter_map(|m| match m {
                                    Message::Morsel(m) => Some(m),
                                    Message::Eos => None,
                                })
                                .collect()
                        });
                    if results.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_sender);

    let mut slots: Vec<Option<Result<Vec<Morsel>>>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    for (index, outcome) in result_receiver {
        slots[index] = Some(outcome);
    }

    let mut ordered = Vec::new();
    for slot in slots {
        match slot {
            Some(Ok(morsels)) => ordered.extend(morsels),
            Some(Err(error)) => return Err(error),
            None => {
                return Err(Error::InvalidInternalState(
                    "worker abandoned a chain work unit".to_string(),
                ))
            }
        }
    }
    Ok(ordered)
}

fn route(
    plan: &PhysicalPlan,
    from: &str,
    message: Message,
    queue: &mut VecDeque<(Nid, Message, Option<JoinLeg>)>,
    results: &mut Vec<Morsel>,
) {
    let consumers = plan.outgoing_edges(from);
    if consumers.is_empty() {
        if let Message::Morsel(morsel) = message {
            results.push(morsel);
        }
        return;
    }
    for (_, target, leg) in consumers {
        queue.push_back((target, message.clone(), leg));
    }
}

/// Run a physical plan to completion, returning the result morsels.
pub fn execute(
    plan: &mut PhysicalPlan,
    context: &ExecutionContext,
    worker_threads: usize,
) -> Result<Vec<Morsel>> {
    let started = std::time::Instant::now();
    // the plan must have exactly one head
    plan.exit_point()?;

    // map each flow head to its chain for pooled evaluation
    let chains: Vec<Vec<Nid>> = flows::identify_flows(plan);
    let mut chain_of_head: HashMap<Nid, usize> = HashMap::new();
    let mut chain_ops: Vec<Vec<ChainOp>> = Vec::new();
    let parallel = worker_threads > 1;
    if parallel {
        for (index, chain) in chains.iter().enumerate() {
            let mut ops = Vec::with_capacity(chain.len());
            for nid in chain {
                if let Some(op) = plan.get(nid).and_then(ChainOp::from_operator) {
                    ops.push(op);
                }
            }
            if ops.len() == chain.len() {
                chain_of_head.insert(chain[0].clone(), index);
                chain_ops.push(ops);
            } else {
                chain_ops.push(Vec::new());
            }
        }
    }

    let mut results: Vec<Morsel> = Vec::new();
    let mut queue: VecDeque<(Nid, Message, Option<JoinLeg>)> = VecDeque::new();

    // pump the scans, leaves first
    for nid in plan.depth_first_search_flat() {
        let is_scan = plan.get(&nid).is_some_and(PhysicalOperator::is_scan);
        if !is_scan {
            continue;
        }
        let operator = plan.get_mut(&nid).ok_or_else(|| {
            Error::InvalidInternalState("scan disappeared from the plan".to_string())
        })?;
        let messages = operator.execute_source(context)?;
        for message in messages {
            route(plan, &nid, message, &mut queue, &mut results);
        }
    }

    while let Some((nid, message, leg)) = queue.pop_front() {
        if context.cancel.is_cancelled() {
            break;
        }

        // pooled evaluation of whole stateless chains
        if parallel {
            if let Some(&chain_index) = chain_of_head.get(&nid) {
                let chain = &chains[chain_index];
                let ops = &chain_ops[chain_index];
                let tail = chain.last().cloned().unwrap_or_else(|| nid.clone());
                match message {
                    Message::Morsel(first) => {
                        // drain the run of queued morsels headed for the
                        // same chain so the pool gets a whole batch
                        let mut batch = vec![first];
                        loop {
                            let next_is_ours = matches!(
                                queue.front(),
                                Some((next_nid, Message::Morsel(_), _)) if *next_nid == nid
                            );
                            if !next_is_ours {
                                break;
                            }
                            let Some((_, Message::Morsel(morsel), _)) = queue.pop_front()
                            else {
                                break;
                            };
                            batch.push(morsel);
                        }
                        let outputs = match run_chain_parallel(
                            ops,
                            batch,
                            context,
                            worker_threads,
                        ) {
                            Ok(outputs) => outputs,
                            Err(error) => {
                                context.cancel.cancel();
                                return Err(error);
                            }
                        };
                        for morsel in outputs {
                            route(plan, &tail, Message::Morsel(morsel), &mut queue, &mut results);
                        }
                    }
                    Message::Eos => {
                        for message in feed_chain(ops, Message::Eos, context)? {
                            route(plan, &tail, message, &mut queue, &mut results);
                        }
                    }
                }
                continue;
            }
        }

        let operator = plan.get_mut(&nid).ok_or_else(|| {
            Error::InvalidInternalState(format!("work unit targets unknown node {nid}"))
        })?;
        let outputs = match operator.process(message, leg, context) {
            Ok(outputs) => outputs,
            Err(error) => {
                context.cancel.cancel();
                return Err(error);
            }
        };
        for message in outputs {
            route(plan, &nid, message, &mut queue, &mut results);
        }
    }

    context
        .statistics
        .add_time("time_executing", started.elapsed().as_nanos() as u64);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{AsyncVirtualConnector, Connector, VirtualDataConnector};
    use crate::expression::{CompareOp, Node};
    use crate::operators::{ExitOperator, ReaderOperator};
    use crate::statistics::QueryStatistics;
    use crate::value::Value;
    use std::sync::Arc;

    fn scan_filter_exit_plan(
        connector: Arc<dyn Connector>,
        pool_capacity: usize,
        commit_retries: usize,
    ) -> PhysicalPlan {
        let schema = connector.schema("$planets").expect("schema");
        let id = schema.find_column("id").expect("id").clone();

        let mut plan = PhysicalPlan::new();
        plan.add_node(
            "scan",
            PhysicalOperator::Reader(ReaderOperator::new(
                connector,
                "$planets".to_string(),
                schema.columns.clone(),
                Vec::new(),
                None,
                pool_capacity,
                commit_retries,
            )),
        );
        plan.add_node(
            "filter",
            PhysicalOperator::Filter(FilterOperator::new(Node::comparison(
                CompareOp::LtEq,
                Node::bound_identifier(id),
                Node::literal(Value::Integer(4)),
            ))),
        );
        plan.add_node("exit", PhysicalOperator::Exit(ExitOperator::new(vec![])));
        plan.add_edge("scan", "filter", None).expect("acyclic");
        plan.add_edge("filter", "exit", None).expect("acyclic");
        plan
    }

    #[test]
    fn serial_execution_filters_rows() {
        let mut plan = scan_filter_exit_plan(Arc::new(VirtualDataConnector), 8, 10);
        let context = ExecutionContext::new(QueryStatistics::new(), 3);
        let results = execute(&mut plan, &context, 1).expect("executes");
        let total: usize = results.iter().map(Morsel::row_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn parallel_execution_matches_serial() {
        let mut plan = scan_filter_exit_plan(Arc::new(VirtualDataConnector), 8, 10);
        let context = ExecutionContext::new(QueryStatistics::new(), 2);
        let results = execute(&mut plan, &context, 4).expect("executes");
        let total: usize = results.iter().map(Morsel::row_count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn read_ahead_scans_flow_through_the_engine() {
        // a one-slot pool with a tiny retry allowance drives the whole
        // query through the read-ahead path and its back-pressure
        let mut plan = scan_filter_exit_plan(Arc::new(AsyncVirtualConnector), 1, 2);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let results = execute(&mut plan, &context, 4).expect("executes");

        let ids: Vec<Value> = results
            .iter()
            .flat_map(|m| {
                m.column_by_name("id")
                    .map(|c| c.values.clone())
                    .unwrap_or_default()
            })
            .collect();
        let expected: Vec<Value> = (1..=4).map(Value::Integer).collect();
        assert_eq!(ids, expected);
        assert_eq!(context.statistics.get("rows_read"), 9);
    }

    #[test]
    fn two_exits_is_an_internal_error() {
        let mut plan = PhysicalPlan::new();
        plan.add_node("a", PhysicalOperator::Exit(ExitOperator::new(vec![])));
        plan.add_node("b", PhysicalOperator::Exit(ExitOperator::new(vec![])));
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        assert!(matches!(
            execute(&mut plan, &context, 1),
            Err(Error::InvalidInternalState(_))
        ));
    }
}
