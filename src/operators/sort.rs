//! Sorting operators.
//!
//! [`SortOperator`] buffers the whole input and emits one stably-sorted
//! morsel at end of stream. [`HeapSortOperator`] is the fused ORDER BY +
//! LIMIT: it keeps a bounded buffer, re-sorting and truncating to the top
//! K whenever the buffer grows past 2K+1 rows, so memory stays
//! proportional to the limit rather than the input.
//!
//! Null ordering follows SQL defaults: nulls last ascending, first
//! descending.

use std::cmp::Ordering;

use crate::errors::Result;
use crate::expression::{evaluator, Node};
use crate::morsel::{Message, Morsel};
use crate::operators::ExecutionContext;
use crate::plan::Direction;
use crate::value::Value;

/// Direction-aware comparison of two key tuples.
pub fn compare_keys(a: &[Value], b: &[Value], directions: &[Direction]) -> Ordering {
    for ((left, right), direction) in a.iter().zip(b.iter()).zip(directions.iter()) {
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            // nulls sort last ascending; direction-aware, so reversing
            // flips them to the front
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
        };
        let ordering = match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sort_buffer(
    buffer: &[Morsel],
    order_by: &[(Node, Direction)],
) -> Result<Option<(Morsel, Vec<usize>)>> {
    let combined = Morsel::concat(buffer)?;
    if combined.row_count() == 0 {
        return Ok(None);
    }
    let mut key_columns = Vec::with_capacity(order_by.len());
    for (key, _) in order_by {
        key_columns.push(evaluator::evaluate(key, &combined)?.values);
    }
    let directions: Vec<Direction> = order_by.iter().map(|(_, d)| *d).collect();

    let mut indices: Vec<usize> = (0..combined.row_count()).collect();
    indices.sort_by(|&a, &b| {
        let a_key: Vec<Value> = key_columns.iter().map(|c| c[a].clone()).collect();
        let b_key: Vec<Value> = key_columns.iter().map(|c| c[b].clone()).collect();
        compare_keys(&a_key, &b_key, &directions)
    });
    Ok(Some((combined, indices)))
}

/// Full sort: stable ordering by the key tuple, one output morsel at EOS.
pub struct SortOperator {
    order_by: Vec<(Node, Direction)>,
    buffer: Vec<Morsel>,
}

impl SortOperator {
    pub fn new(order_by: Vec<(Node, Direction)>) -> Self {
        SortOperator {
            order_by,
            buffer: Vec::new(),
        }
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match message {
            Message::Morsel(morsel) => {
                context
                    .statistics
                    .increment("rows_seen_by_sort", morsel.row_count() as u64);
                self.buffer.push(morsel);
                Ok(Vec::new())
            }
            Message::Eos => {
                let mut out = Vec::new();
                if let Some((combined, indices)) =
                    sort_buffer(&self.buffer, &self.order_by)?
                {
                    out.push(Message::Morsel(combined.take(&indices)));
                }
                self.buffer.clear();
                out.push(Message::Eos);
                Ok(out)
            }
        }
    }
}

/// Fused ORDER BY + LIMIT keeping only the top K rows.
pub struct HeapSortOperator {
    order_by: Vec<(Node, Direction)>,
    limit: usize,
    buffer: Vec<Morsel>,
    buffered_rows: usize,
}

impl HeapSortOperator {
    pub fn new(order_by: Vec<(Node, Direction)>, limit: usize) -> Self {
        HeapSortOperator {
            order_by,
            limit,
            buffer: Vec::new(),
            buffered_rows: 0,
        }
    }

    fn shrink(&mut self) -> Result<()> {
        if let Some((combined, indices)) = sort_buffer(&self.buffer, &self.order_by)? {
            let top: Vec<usize> = indices.into_iter().take(self.limit).collect();
            let kept = combined.take(&top);
            self.buffered_rows = kept.row_count();
            self.buffer = vec![kept];
        }
        Ok(())
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match message {
            Message::Morsel(morsel) => {
                context
                    .statistics
                    .increment("rows_seen_by_heap_sort", morsel.row_count() as u64);
                self.buffered_rows += morsel.row_count();
                self.buffer.push(morsel);
                // flush a sorted window whenever the buffer outgrows 2K+1
                if self.buffered_rows > 2 * self.limit + 1 {
                    self.shrink()?;
                }
                Ok(Vec::new())
            }
            Message::Eos => {
                self.shrink()?;
                let mut out = Vec::new();
                if let Some(kept) = self.buffer.pop() {
                    if kept.row_count() > 0 {
                        out.push(Message::Morsel(kept));
                    }
                }
                self.buffer.clear();
                out.push(Message::Eos);
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::Column;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;
    use crate::value::ValueType;

    fn morsel_of(column: &SchemaColumn, values: Vec<Value>) -> Morsel {
        Morsel::new(vec![Column::new(
            &column.name,
            &column.identity,
            column.value_type,
            values,
        )])
        .expect("well formed")
    }

    #[test]
    fn sort_orders_with_nulls_last_ascending() {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let mut sort = SortOperator::new(vec![(
            Node::bound_identifier(column.clone()),
            Direction::Ascending,
        )]);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        sort.process(
            Message::Morsel(morsel_of(
                &column,
                vec![Value::Integer(3), Value::Null, Value::Integer(1)],
            )),
            &context,
        )
        .expect("buffers");
        let out = sort.process(Message::Eos, &context).expect("flushes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(
            result.columns()[0].values,
            vec![Value::Integer(1), Value::Integer(3), Value::Null]
        );
    }

    #[test]
    fn descending_puts_nulls_first() {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let mut sort = SortOperator::new(vec![(
            Node::bound_identifier(column.clone()),
            Direction::Descending,
        )]);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        sort.process(
            Message::Morsel(morsel_of(
                &column,
                vec![Value::Integer(3), Value::Null, Value::Integer(1)],
            )),
            &context,
        )
        .expect("buffers");
        let out = sort.process(Message::Eos, &context).expect("flushes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(
            result.columns()[0].values,
            vec![Value::Null, Value::Integer(3), Value::Integer(1)]
        );
    }

    #[test]
    fn heap_sort_yields_top_k_in_order() {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let mut heap = HeapSortOperator::new(
            vec![(Node::bound_identifier(column.clone()), Direction::Ascending)],
            2,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        // feed 10 single-row morsels in reverse order to force shrinks
        for n in (0..10).rev() {
            heap.process(
                Message::Morsel(morsel_of(&column, vec![Value::Integer(n)])),
                &context,
            )
            .expect("buffers");
        }
        let out = heap.process(Message::Eos, &context).expect("flushes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(
            result.columns()[0].values,
            vec![Value::Integer(0), Value::Integer(1)]
        );
    }
}
