//! Outer joins (left, right, full).
//!
//! Both legs are materialised before any row is emitted: unmatched rows
//! can only be identified once the opposite side is complete. Matching
//! uses the same hashed key tuples as the inner join; the unmatched rows
//! of the preserved side(s) are emitted padded with nulls.

use std::collections::{HashMap, HashSet};

use crate::errors::{Error, Result};
use crate::expression::{evaluator, Node};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;
use crate::plan::{JoinLeg, JoinType};
use crate::schema::SchemaColumn;
use crate::value::{RowKey, Value};

fn key_tuples(keys: &[Node], morsel: &Morsel) -> Result<Vec<RowKey>> {
    let mut columns = Vec::with_capacity(keys.len());
    for key in keys {
        columns.push(evaluator::evaluate(key, morsel)?.values);
    }
    Ok((0..morsel.row_count())
        .map(|row| RowKey(columns.iter().map(|c| c[row].clone()).collect()))
        .collect())
}

/// A morsel of `rows` all-null values in the given layout.
fn null_morsel(layout: &[Column], rows: usize) -> Morsel {
    let columns = layout
        .iter()
        .map(|c| Column::new(&c.name, &c.identity, c.value_type, vec![Value::Null; rows]))
        .collect();
    Morsel::new(columns).unwrap_or_default()
}

fn layout_from_schema(schema: &[SchemaColumn]) -> Vec<Column> {
    schema
        .iter()
        .map(|c| Column::new(&c.name, &c.identity, c.value_type, Vec::new()))
        .collect()
}

pub struct OuterJoinOperator {
    join_type: JoinType,
    left_keys: Vec<Node>,
    right_keys: Vec<Node>,
    left_schema: Vec<SchemaColumn>,
    right_schema: Vec<SchemaColumn>,
    left_buffer: Vec<Morsel>,
    right_buffer: Vec<Morsel>,
    left_done: bool,
    right_done: bool,
}

impl OuterJoinOperator {
    pub fn new(
        join_type: JoinType,
        left_keys: Vec<Node>,
        right_keys: Vec<Node>,
        left_schema: Vec<SchemaColumn>,
        right_schema: Vec<SchemaColumn>,
    ) -> Self {
        OuterJoinOperator {
            join_type,
            left_keys,
            right_keys,
            left_schema,
            right_schema,
            left_buffer: Vec::new(),
            right_buffer: Vec::new(),
            left_done: false,
            right_done: false,
        }
    }

    fn emit(&mut self, context: &ExecutionContext) -> Result<Vec<Message>> {
        let left = Morsel::concat(&self.left_buffer)?;
        let right = Morsel::concat(&self.right_buffer)?;
        self.left_buffer.clear();
        self.right_buffer.clear();
        context.statistics.increment(
            "join_build_rows",
            (left.row_count() + right.row_count()) as u64,
        );

        let left_layout = if left.column_count() > 0 {
            left.columns().to_vec()
        } else {
            layout_from_schema(&self.left_schema)
        };
        let right_layout = if right.column_count() > 0 {
            right.columns().to_vec()
        } else {
            layout_from_schema(&self.right_schema)
        };

        // hash the right side, probe with the left
        let mut right_map: HashMap<RowKey, Vec<usize>> = HashMap::new();
        for (row, key) in key_tuples(&self.right_keys, &right)?.into_iter().enumerate() {
            if key.has_null() {
                continue;
            }
            right_map.entry(key).or_default().push(row);
        }

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        let mut unmatched_left = Vec::new();
        let mut matched_right: HashSet<usize> = HashSet::new();

        for (row, key) in key_tuples(&self.left_keys, &left)?.into_iter().enumerate() {
            let matches = if key.has_null() {
                None
            } else {
                right_map.get(&key)
            };
            match matches {
                Some(matches) => {
                    for &right_row in matches {
                        left_rows.push(row);
                        right_rows.push(right_row);
                        matched_right.insert(right_row);
                    }
                }
                None => unmatched_left.push(row),
            }
        }

        let mut pieces: Vec<Morsel> = Vec::new();
        let matched =
            Morsel::zip(&left.take(&left_rows), &right.take(&right_rows))?;
        pieces.push(matched);

        let keep_left = matches!(self.join_type, JoinType::LeftOuter | JoinType::FullOuter);
        let keep_right = matches!(self.join_type, JoinType::RightOuter | JoinType::FullOuter);

        if keep_left && !unmatched_left.is_empty() {
            pieces.push(Morsel::zip(
                &left.take(&unmatched_left),
                &null_morsel(&right_layout, unmatched_left.len()),
            )?);
        }
        if keep_right {
            let unmatched_right: Vec<usize> = (0..right.row_count())
                .filter(|row| !matched_right.contains(row))
                .collect();
            if !unmatched_right.is_empty() {
                pieces.push(Morsel::zip(
                    &null_morsel(&left_layout, unmatched_right.len()),
                    &right.take(&unmatched_right),
                )?);
            }
        }

        let combined = Morsel::concat(&pieces)?;
        let mut out: Vec<Message> = combined
            .chunk(context.morsel_size)
            .into_iter()
            .map(Message::Morsel)
            .collect();
        out.push(Message::Eos);
        Ok(out)
    }

    pub fn process(
        &mut self,
        message: Message,
        leg: Option<JoinLeg>,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match (leg, message) {
            (Some(JoinLeg::Left), Message::Morsel(morsel)) => {
                self.left_buffer.push(morsel);
                Ok(Vec::new())
            }
            (Some(JoinLeg::Right), Message::Morsel(morsel)) => {
                self.right_buffer.push(morsel);
                Ok(Vec::new())
            }
            (Some(JoinLeg::Left), Message::Eos) => {
                self.left_done = true;
                if self.right_done {
                    self.emit(context)
                } else {
                    Ok(Vec::new())
                }
            }
            (Some(JoinLeg::Right), Message::Eos) => {
                self.right_done = true;
                if self.left_done {
                    self.emit(context)
                } else {
                    Ok(Vec::new())
                }
            }
            (None, _) => Err(Error::InvalidInternalState(
                "join received a message without a leg label".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::QueryStatistics;
    use crate::value::ValueType;

    fn keyed(column: &SchemaColumn, values: Vec<Value>) -> Morsel {
        Morsel::new(vec![Column::new(
            &column.name,
            &column.identity,
            column.value_type,
            values,
        )])
        .expect("well formed")
    }

    fn run_join(join_type: JoinType) -> Morsel {
        let left_column = SchemaColumn::new("l", ValueType::Integer);
        let right_column = SchemaColumn::new("r", ValueType::Integer);
        let mut join = OuterJoinOperator::new(
            join_type,
            vec![Node::bound_identifier(left_column.clone())],
            vec![Node::bound_identifier(right_column.clone())],
            vec![left_column.clone()],
            vec![right_column.clone()],
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        join.process(
            Message::Morsel(keyed(&left_column, vec![Value::Integer(1), Value::Integer(2)])),
            Some(JoinLeg::Left),
            &context,
        )
        .expect("left buffered");
        join.process(Message::Eos, Some(JoinLeg::Left), &context)
            .expect("left done");
        join.process(
            Message::Morsel(keyed(
                &right_column,
                vec![Value::Integer(2), Value::Integer(3)],
            )),
            Some(JoinLeg::Right),
            &context,
        )
        .expect("right buffered");
        let out = join
            .process(Message::Eos, Some(JoinLeg::Right), &context)
            .expect("emits");
        let morsels: Vec<Morsel> = out
            .into_iter()
            .filter_map(|m| match m {
                Message::Morsel(m) => Some(m),
                Message::Eos => None,
            })
            .collect();
        Morsel::concat(&morsels).expect("combined")
    }

    #[test]
    fn left_outer_keeps_unmatched_left() {
        let result = run_join(JoinType::LeftOuter);
        // 1 matched pair + 1 unmatched left
        assert_eq!(result.shape(), (2, 2));
        let right_values = &result.columns()[1].values;
        assert!(right_values.contains(&Value::Null));
    }

    #[test]
    fn right_outer_keeps_unmatched_right() {
        let result = run_join(JoinType::RightOuter);
        assert_eq!(result.shape(), (2, 2));
        let left_values = &result.columns()[0].values;
        assert!(left_values.contains(&Value::Null));
    }

    #[test]
    fn full_outer_keeps_both() {
        let result = run_join(JoinType::FullOuter);
        assert_eq!(result.shape(), (3, 2));
    }
}
