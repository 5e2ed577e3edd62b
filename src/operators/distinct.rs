//! DISTINCT: hashes each row's signature and emits first occurrences
//! only. State persists across morsels, so duplicates are removed across
//! the whole stream.

use std::collections::HashSet;

use crate::errors::Result;
use crate::expression::{evaluator, Node};
use crate::morsel::Message;
use crate::operators::ExecutionContext;
use crate::value::RowKey;

pub struct DistinctOperator {
    /// DISTINCT ON columns; None means the whole row
    on: Option<Vec<Node>>,
    seen: HashSet<RowKey>,
}

impl DistinctOperator {
    pub fn new(on: Option<Vec<Node>>) -> Self {
        DistinctOperator {
            on,
            seen: HashSet::new(),
        }
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        let Message::Morsel(morsel) = message else {
            return Ok(vec![Message::Eos]);
        };
        context
            .statistics
            .increment("rows_seen_by_distinct", morsel.row_count() as u64);

        // signature columns: either the DISTINCT ON expressions or every
        // column of the row
        let signature_columns = match &self.on {
            Some(expressions) => {
                let mut columns = Vec::with_capacity(expressions.len());
                for expression in expressions {
                    columns.push(evaluator::evaluate(expression, &morsel)?.values);
                }
                columns
            }
            None => morsel
                .columns()
                .iter()
                .map(|c| c.values.clone())
                .collect(),
        };

        let mut keep = Vec::new();
        for row in 0..morsel.row_count() {
            let key = RowKey(
                signature_columns
                    .iter()
                    .map(|column| column[row].clone())
                    .collect(),
            );
            if self.seen.insert(key) {
                keep.push(row);
            }
        }
        Ok(vec![Message::Morsel(morsel.take(&keep))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::{Column, Morsel};
    use crate::statistics::QueryStatistics;
    use crate::value::{Value, ValueType};

    #[test]
    fn duplicates_are_removed_across_morsels() {
        let mut distinct = DistinctOperator::new(None);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let first = Morsel::new(vec![Column::from_values(
            "x",
            ValueType::Integer,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(1)],
        )])
        .expect("well formed");
        let second = Morsel::new(vec![Column::from_values(
            "x",
            ValueType::Integer,
            vec![Value::Integer(2), Value::Integer(3)],
        )])
        .expect("well formed");

        let out1 = distinct
            .process(Message::Morsel(first), &context)
            .expect("first morsel");
        let out2 = distinct
            .process(Message::Morsel(second), &context)
            .expect("second morsel");
        let Message::Morsel(m1) = &out1[0] else {
            panic!("expected morsel")
        };
        let Message::Morsel(m2) = &out2[0] else {
            panic!("expected morsel")
        };
        assert_eq!(m1.row_count(), 2);
        assert_eq!(m2.row_count(), 1);
        assert_eq!(m2.columns()[0].values[0], Value::Integer(3));
    }
}
