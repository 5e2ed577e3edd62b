//! Physical operators.
//!
//! Each logical step maps to one operator here. Rather than an
//! inheritance tree, [`PhysicalOperator`] is a tagged union with a
//! dispatch table for execution: sources produce messages via
//! `execute_source`, everything else transforms incoming messages via
//! `process`. Morsels are immutable; operators build new ones.
//!
//! Stateless operators (filter, project) declare themselves so the
//! executor can evaluate chains of them on the worker pool.

mod aggregate;
mod aggregate_group;
mod distinct;
mod filter;
mod join_cross;
mod join_filter;
mod join_inner;
mod join_outer;
mod limit;
mod misc;
mod projection;
mod read;
mod sort;
mod union;

pub use aggregate::{build_accumulator, Accumulator, AggregateOperator};
pub use aggregate_group::AggregateAndGroupOperator;
pub use distinct::DistinctOperator;
pub use filter::FilterOperator;
pub use join_cross::{CrossJoinOperator, CrossJoinUnnestOperator};
pub use join_filter::FilterJoinOperator;
pub use join_inner::{InnerJoinOperator, InnerJoinSingleOperator, NestedLoopJoinOperator};
pub use join_outer::OuterJoinOperator;
pub use limit::LimitOperator;
pub use misc::{
    ExitOperator, ExplainOperator, MetadataWriterOperator, SetVariableOperator,
    ShowColumnsOperator, ShowValueOperator,
};
pub use projection::ProjectionOperator;
pub use read::{FunctionDatasetOperator, MorselPool, ReaderOperator};
pub use sort::{HeapSortOperator, SortOperator};
pub use union::UnionOperator;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::morsel::Message;
use crate::plan::JoinLeg;
use crate::statistics::QueryStatistics;
use crate::value::Value;

/// Signals the driver and every scan to stop.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-query state threaded through every operator.
#[derive(Clone)]
pub struct ExecutionContext {
    pub statistics: QueryStatistics,
    pub variables: Arc<Mutex<BTreeMap<String, Value>>>,
    pub cancel: CancelToken,
    pub morsel_size: usize,
}

impl ExecutionContext {
    pub fn new(statistics: QueryStatistics, morsel_size: usize) -> Self {
        ExecutionContext {
            statistics,
            variables: Arc::new(Mutex::new(BTreeMap::new())),
            cancel: CancelToken::new(),
            morsel_size,
        }
    }
}

/// Every physical operator, dispatchable without virtual calls.
pub enum PhysicalOperator {
    Reader(ReaderOperator),
    FunctionDataset(FunctionDatasetOperator),
    Filter(FilterOperator),
    Projection(ProjectionOperator),
    Distinct(DistinctOperator),
    Limit(LimitOperator),
    Sort(SortOperator),
    HeapSort(HeapSortOperator),
    Aggregate(AggregateOperator),
    AggregateAndGroup(AggregateAndGroupOperator),
    InnerJoin(InnerJoinOperator),
    InnerJoinSingle(InnerJoinSingleOperator),
    NestedLoopJoin(NestedLoopJoinOperator),
    OuterJoin(OuterJoinOperator),
    FilterJoin(FilterJoinOperator),
    CrossJoin(CrossJoinOperator),
    CrossJoinUnnest(CrossJoinUnnestOperator),
    Union(UnionOperator),
    Explain(ExplainOperator),
    ShowColumns(ShowColumnsOperator),
    ShowValue(ShowValueOperator),
    SetVariable(SetVariableOperator),
    MetadataWriter(MetadataWriterOperator),
    Exit(ExitOperator),
}

impl PhysicalOperator {
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOperator::Reader(_) => "Reader",
            PhysicalOperator::FunctionDataset(_) => "Function Dataset",
            PhysicalOperator::Filter(_) => "Filter",
            PhysicalOperator::Projection(_) => "Projection",
            PhysicalOperator::Distinct(_) => "Distinct",
            PhysicalOperator::Limit(_) => "Limit",
            PhysicalOperator::Sort(_) => "Sort",
            PhysicalOperator::HeapSort(_) => "Heap Sort",
            PhysicalOperator::InnerJoin(_) => "Inner Join",
            PhysicalOperator::InnerJoinSingle(_) => "Inner Join (Single Key)",
            PhysicalOperator::NestedLoopJoin(_) => "Nested Loop Join",
            PhysicalOperator::OuterJoin(_) => "Outer Join",
            PhysicalOperator::FilterJoin(_) => "Filter Join",
            PhysicalOperator::CrossJoin(_) => "Cross Join",
            PhysicalOperator::CrossJoinUnnest(_) => "Cross Join Unnest",
            PhysicalOperator::Aggregate(_) => "Aggregate",
            PhysicalOperator::AggregateAndGroup(_) => "Aggregate and Group",
            PhysicalOperator::Union(_) => "Union",
            PhysicalOperator::Explain(_) => "Explain",
            PhysicalOperator::ShowColumns(_) => "Show Columns",
            PhysicalOperator::ShowValue(_) => "Show Value",
            PhysicalOperator::SetVariable(_) => "Set Variable",
            PhysicalOperator::MetadataWriter(_) => "Writer",
            PhysicalOperator::Exit(_) => "Exit",
        }
    }

    /// Sources pump the pipeline; the driver starts them in plan order.
    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::Reader(_)
                | PhysicalOperator::FunctionDataset(_)
                | PhysicalOperator::Explain(_)
                | PhysicalOperator::ShowColumns(_)
                | PhysicalOperator::ShowValue(_)
                | PhysicalOperator::SetVariable(_)
        )
    }

    /// Stateless operators form flows the worker pool can evaluate.
    pub fn is_stateless(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::Filter(_) | PhysicalOperator::Projection(_)
        )
    }

    /// Produce this source's full output (morsels then EOS).
    pub fn execute_source(&mut self, context: &ExecutionContext) -> Result<Vec<Message>> {
        let started = std::time::Instant::now();
        let result = match self {
            PhysicalOperator::Reader(op) => op.execute(context),
            PhysicalOperator::FunctionDataset(op) => op.execute(context),
            PhysicalOperator::Explain(op) => op.execute(context),
            PhysicalOperator::ShowColumns(op) => op.execute(context),
            PhysicalOperator::ShowValue(op) => op.execute(context),
            PhysicalOperator::SetVariable(op) => op.execute(context),
            other => Err(crate::errors::Error::InvalidInternalState(format!(
                "{} is not a source operator",
                other.name()
            ))),
        };
        context
            .statistics
            .add_time("time_reading", started.elapsed().as_nanos() as u64);
        result
    }

    /// Feed one message through this operator.
    pub fn process(
        &mut self,
        message: Message,
        leg: Option<JoinLeg>,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match self {
            PhysicalOperator::Filter(op) => op.process(message, context),
            PhysicalOperator::Projection(op) => op.process(message, context),
            PhysicalOperator::Distinct(op) => op.process(message, context),
            PhysicalOperator::Limit(op) => op.process(message, context),
            PhysicalOperator::Sort(op) => op.process(message, context),
            PhysicalOperator::HeapSort(op) => op.process(message, context),
            PhysicalOperator::Aggregate(op) => op.process(message, context),
            PhysicalOperator::AggregateAndGroup(op) => op.process(message, context),
            PhysicalOperator::InnerJoin(op) => op.process(message, leg, context),
            PhysicalOperator::InnerJoinSingle(op) => op.process(message, leg, context),
            PhysicalOperator::NestedLoopJoin(op) => op.process(message, leg, context),
            PhysicalOperator::OuterJoin(op) => op.process(message, leg, context),
            PhysicalOperator::FilterJoin(op) => op.process(message, leg, context),
            PhysicalOperator::CrossJoin(op) => op.process(message, leg, context),
            PhysicalOperator::CrossJoinUnnest(op) => op.process(message, context),
            PhysicalOperator::Union(op) => op.process(message, context),
            PhysicalOperator::MetadataWriter(op) => op.process(message, context),
            PhysicalOperator::Exit(op) => op.process(message, context),
            source => Err(crate::errors::Error::InvalidInternalState(format!(
                "{} cannot receive messages",
                source.name()
            ))),
        }
    }
}
