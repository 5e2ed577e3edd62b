//! Scan operators.
//!
//! [`ReaderOperator`] pulls a relation from its connector with whatever
//! columns, predicates and limit the optimizer pushed into the scan. For
//! connectors advertising async reads, a read-ahead thread fills a
//! bounded [`MorselPool`]; a commit that finds the pool full is retried a
//! bounded number of times, the stall is recorded against
//! `stalls_io_waiting_on_engine`, and the producer then parks until the
//! engine drains a slot.
//!
//! [`FunctionDatasetOperator`] generates virtual relations, currently the
//! empty table that empty-table elimination substitutes for contradicted
//! subtrees.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::connectors::{Capabilities, Connector};
use crate::errors::{Error, Result};
use crate::expression::Node;
use crate::morsel::{Message, Morsel};
use crate::operators::ExecutionContext;
use crate::schema::SchemaColumn;
use crate::statistics::QueryStatistics;

/// A bounded buffer between a read-ahead thread and the engine, backed
/// by a bounded channel so both sides park instead of spinning.
pub struct MorselPool {
    sender: Sender<Morsel>,
    receiver: Receiver<Morsel>,
}

impl MorselPool {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        MorselPool { sender, receiver }
    }

    /// Deposit a morsel. A full pool fails with the morsel handed back as
    /// the sentinel, so the caller can retry.
    pub fn commit(&self, morsel: Morsel) -> std::result::Result<(), Morsel> {
        match self.sender.try_send(morsel) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(morsel) | TrySendError::Disconnected(morsel)) => Err(morsel),
        }
    }

    /// Park until a slot frees; used once the bounded retries are spent.
    /// Returns false if the pool has been torn down.
    pub fn commit_blocking(&self, morsel: Morsel) -> bool {
        self.sender.send(morsel).is_ok()
    }

    pub fn read(&self) -> Option<Morsel> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for a morsel.
    pub fn read_timeout(&self, timeout: Duration) -> Option<Morsel> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// The producer side of the pool contract: retry the commit sentinel a
/// bounded number of times, record the stall, then park until the engine
/// drains a slot. Returns false when the pool is gone.
fn commit_with_retries(
    pool: &MorselPool,
    morsel: Morsel,
    retries: usize,
    statistics: &QueryStatistics,
) -> bool {
    let mut pending = morsel;
    let mut attempts = 0;
    loop {
        match pool.commit(pending) {
            Ok(()) => return true,
            Err(returned) => {
                attempts += 1;
                if attempts >= retries.max(1) {
                    statistics.increment("stalls_io_waiting_on_engine", 1);
                    return pool.commit_blocking(returned);
                }
                std::thread::yield_now();
                pending = returned;
            }
        }
    }
}

pub struct ReaderOperator {
    connector: Arc<dyn Connector>,
    relation: String,
    columns: Vec<SchemaColumn>,
    predicates: Vec<Node>,
    limit: Option<usize>,
    pool_capacity: usize,
    commit_retries: usize,
}

impl ReaderOperator {
    pub fn new(
        connector: Arc<dyn Connector>,
        relation: String,
        columns: Vec<SchemaColumn>,
        predicates: Vec<Node>,
        limit: Option<usize>,
        pool_capacity: usize,
        commit_retries: usize,
    ) -> Self {
        ReaderOperator {
            connector,
            relation,
            columns,
            predicates,
            limit,
            pool_capacity,
            commit_retries,
        }
    }

    pub fn execute(&mut self, context: &ExecutionContext) -> Result<Vec<Message>> {
        if context.cancel.is_cancelled() {
            return Ok(vec![Message::Eos]);
        }
        let morsels = if self
            .connector
            .capabilities()
            .contains(Capabilities::ASYNC_READABLE)
        {
            self.read_ahead(context)?
        } else {
            self.connector.read_dataset(
                &self.relation,
                &self.columns,
                &self.predicates,
                self.limit,
                context.morsel_size,
            )?
        };

        context.statistics.increment("blobs_read", 1);
        let mut messages = Vec::with_capacity(morsels.len() + 1);
        for morsel in morsels {
            context
                .statistics
                .increment("rows_read", morsel.row_count() as u64);
            context
                .statistics
                .increment("columns_read", morsel.column_count() as u64);
            messages.push(Message::Morsel(morsel));
            if context.cancel.is_cancelled() {
                break;
            }
        }
        messages.push(Message::Eos);
        Ok(messages)
    }

    /// Overlap the read with the engine through the bounded pool.
    fn read_ahead(&self, context: &ExecutionContext) -> Result<Vec<Morsel>> {
        let pool = Arc::new(MorselPool::new(self.pool_capacity));
        let producer_done = Arc::new(AtomicBool::new(false));

        let connector = Arc::clone(&self.connector);
        let relation = self.relation.clone();
        let columns = self.columns.clone();
        let predicates = self.predicates.clone();
        let limit = self.limit;
        let morsel_size = context.morsel_size;
        let commit_retries = self.commit_retries;
        let statistics = context.statistics.clone();
        let producer_pool = Arc::clone(&pool);
        let producer_flag = Arc::clone(&producer_done);

        let producer = std::thread::spawn(move || {
            let result =
                connector.read_dataset(&relation, &columns, &predicates, limit, morsel_size);
            let morsels = match result {
                Ok(morsels) => morsels,
                Err(error) => {
                    producer_flag.store(true, Ordering::Release);
                    return Err(error);
                }
            };
            for morsel in morsels {
                if !commit_with_retries(&producer_pool, morsel, commit_retries, &statistics) {
                    break;
                }
            }
            producer_flag.store(true, Ordering::Release);
            Ok(())
        });

        let mut morsels = Vec::new();
        loop {
            match pool.read_timeout(Duration::from_millis(2)) {
                Some(morsel) => morsels.push(morsel),
                None => {
                    if producer_done.load(Ordering::Acquire) && pool.is_empty() {
                        break;
                    }
                }
            }
        }
        producer
            .join()
            .map_err(|_| Error::InvalidInternalState("read-ahead thread panicked".to_string()))??;
        Ok(morsels)
    }
}

/// Generated datasets (currently only the empty relation).
pub struct FunctionDatasetOperator {
    function: String,
    columns: Vec<SchemaColumn>,
}

impl FunctionDatasetOperator {
    pub fn new(function: String, columns: Vec<SchemaColumn>) -> Self {
        FunctionDatasetOperator { function, columns }
    }

    pub fn execute(&mut self, _context: &ExecutionContext) -> Result<Vec<Message>> {
        match self.function.as_str() {
            "EMPTY" => Ok(vec![
                Message::Morsel(Morsel::empty(&self.columns)),
                Message::Eos,
            ]),
            other => Err(Error::UnsupportedSyntax(format!(
                "unknown dataset function '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::{AsyncVirtualConnector, VirtualDataConnector};
    use crate::value::Value;

    #[test]
    fn pool_commit_returns_sentinel_when_full() {
        let pool = MorselPool::new(1);
        assert!(pool.commit(Morsel::default()).is_ok());
        assert!(pool.commit(Morsel::default()).is_err());
        assert!(pool.read().is_some());
        assert!(pool.commit(Morsel::default()).is_ok());
    }

    #[test]
    fn stall_is_recorded_after_the_bounded_retries() {
        let pool = Arc::new(MorselPool::new(1));
        let statistics = QueryStatistics::new();
        pool.commit(Morsel::default()).expect("first commit fits");

        let producer_pool = Arc::clone(&pool);
        let producer_stats = statistics.clone();
        let producer = std::thread::spawn(move || {
            commit_with_retries(&producer_pool, Morsel::default(), 3, &producer_stats)
        });

        // the producer exhausts its retries against the full pool,
        // records the stall, then parks until a slot is drained
        let waited = std::time::Instant::now();
        while statistics.get("stalls_io_waiting_on_engine") == 0 {
            assert!(
                waited.elapsed() < Duration::from_secs(5),
                "stall was never recorded"
            );
            std::thread::yield_now();
        }
        assert!(pool.read().is_some());
        assert!(producer.join().expect("producer finishes"));
        assert!(pool.read().is_some());
    }

    #[test]
    fn reader_emits_morsels_then_eos() {
        let connector: Arc<dyn Connector> = Arc::new(VirtualDataConnector);
        let schema = connector.schema("$planets").expect("schema");
        let mut reader = ReaderOperator::new(
            connector,
            "$planets".to_string(),
            schema.columns,
            Vec::new(),
            None,
            8,
            10,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 4);
        let messages = reader.execute(&context).expect("reads");
        assert!(matches!(messages.last(), Some(Message::Eos)));
        let rows: usize = messages
            .iter()
            .filter_map(|m| match m {
                Message::Morsel(m) => Some(m.row_count()),
                Message::Eos => None,
            })
            .sum();
        assert_eq!(rows, 9);
        assert_eq!(context.statistics.get("rows_read"), 9);
    }

    #[test]
    fn read_ahead_streams_the_relation_in_order() {
        // the async connector serves single-row morsels through a
        // two-slot pool, so the producer commits against back-pressure
        let connector: Arc<dyn Connector> = Arc::new(AsyncVirtualConnector);
        let schema = connector.schema("$planets").expect("schema");
        let mut reader = ReaderOperator::new(
            connector,
            "$planets".to_string(),
            schema.columns,
            Vec::new(),
            None,
            2,
            2,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let messages = reader.execute(&context).expect("reads");
        assert!(matches!(messages.last(), Some(Message::Eos)));

        let ids: Vec<Value> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Morsel(m) => m.column_by_name("id").map(|c| c.values.clone()),
                Message::Eos => None,
            })
            .flatten()
            .collect();
        let expected: Vec<Value> = (1..=9).map(Value::Integer).collect();
        assert_eq!(ids, expected);
        assert_eq!(context.statistics.get("rows_read"), 9);
    }

    #[test]
    fn empty_function_dataset_has_schema_but_no_rows() {
        let columns = vec![SchemaColumn::new("id", crate::value::ValueType::Integer)];
        let mut op = FunctionDatasetOperator::new("EMPTY".to_string(), columns);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let messages = op.execute(&context).expect("emits");
        let Message::Morsel(morsel) = &messages[0] else {
            panic!("expected morsel")
        };
        assert_eq!(morsel.shape(), (0, 1));
    }
}
