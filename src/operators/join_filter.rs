//! Semi and anti joins.
//!
//! The filter side is materialised into a key set; the output side then
//! streams through, each row emitted iff the set does (semi) or does not
//! (anti) contain its key. Only the output side's columns are emitted.
//! Null keys never match: a semi join drops them, an anti join keeps
//! them.

use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::expression::{evaluator, Node};
use crate::morsel::{Message, Morsel};
use crate::operators::ExecutionContext;
use crate::plan::{JoinLeg, JoinType};
use crate::value::RowKey;

pub struct FilterJoinOperator {
    join_type: JoinType,
    left_keys: Vec<Node>,
    right_keys: Vec<Node>,
    /// The side that streams through to the output
    output_leg: JoinLeg,
    key_set: HashSet<RowKey>,
    filter_buffer: Vec<Morsel>,
    pending_output: Vec<Morsel>,
    filter_done: bool,
    output_done: bool,
}

impl FilterJoinOperator {
    pub fn new(join_type: JoinType, left_keys: Vec<Node>, right_keys: Vec<Node>) -> Self {
        let output_leg = match join_type {
            JoinType::LeftSemi | JoinType::LeftAnti => JoinLeg::Left,
            _ => JoinLeg::Right,
        };
        FilterJoinOperator {
            join_type,
            left_keys,
            right_keys,
            output_leg,
            key_set: HashSet::new(),
            filter_buffer: Vec::new(),
            pending_output: Vec::new(),
            filter_done: false,
            output_done: false,
        }
    }

    fn keys_for(&self, leg: JoinLeg) -> &[Node] {
        match leg {
            JoinLeg::Left => &self.left_keys,
            JoinLeg::Right => &self.right_keys,
        }
    }

    fn anti(&self) -> bool {
        matches!(self.join_type, JoinType::LeftAnti | JoinType::RightAnti)
    }

    fn build(&mut self, context: &ExecutionContext) -> Result<()> {
        let combined = Morsel::concat(&self.filter_buffer)?;
        self.filter_buffer.clear();
        let filter_leg = match self.output_leg {
            JoinLeg::Left => JoinLeg::Right,
            JoinLeg::Right => JoinLeg::Left,
        };
        let keys = self.keys_for(filter_leg).to_vec();
        let mut columns = Vec::with_capacity(keys.len());
        for key in &keys {
            columns.push(evaluator::evaluate(key, &combined)?.values);
        }
        for row in 0..combined.row_count() {
            let key = RowKey(columns.iter().map(|c| c[row].clone()).collect());
            if !key.has_null() {
                self.key_set.insert(key);
            }
        }
        context
            .statistics
            .increment("join_build_rows", combined.row_count() as u64);
        self.filter_done = true;
        Ok(())
    }

    fn filter_morsel(&self, morsel: &Morsel) -> Result<Message> {
        let keys = self.keys_for(self.output_leg).to_vec();
        let mut columns = Vec::with_capacity(keys.len());
        for key in &keys {
            columns.push(evaluator::evaluate(key, morsel)?.values);
        }
        let anti = self.anti();
        let mut keep = Vec::new();
        for row in 0..morsel.row_count() {
            let key = RowKey(columns.iter().map(|c| c[row].clone()).collect());
            let matched = !key.has_null() && self.key_set.contains(&key);
            if matched != anti {
                keep.push(row);
            }
        }
        Ok(Message::Morsel(morsel.take(&keep)))
    }

    pub fn process(
        &mut self,
        message: Message,
        leg: Option<JoinLeg>,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        let leg = leg.ok_or_else(|| {
            Error::InvalidInternalState(
                "join received a message without a leg label".to_string(),
            )
        })?;
        let is_output_leg = leg == self.output_leg;
        match message {
            Message::Morsel(morsel) => {
                if is_output_leg {
                    if self.filter_done {
                        Ok(vec![self.filter_morsel(&morsel)?])
                    } else {
                        self.pending_output.push(morsel);
                        Ok(Vec::new())
                    }
                } else {
                    self.filter_buffer.push(morsel);
                    Ok(Vec::new())
                }
            }
            Message::Eos if is_output_leg => {
                self.output_done = true;
                if self.filter_done {
                    Ok(vec![Message::Eos])
                } else {
                    Ok(Vec::new())
                }
            }
            Message::Eos => {
                self.build(context)?;
                let mut out = Vec::new();
                for morsel in std::mem::take(&mut self.pending_output) {
                    out.push(self.filter_morsel(&morsel)?);
                }
                if self.output_done {
                    out.push(Message::Eos);
                }
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
    use crate::value::{Value, ValueType};

    fn keyed(column: &SchemaColumn, values: Vec<Value>) -> Morsel {
        Morsel::new(vec![Column::new(
            &column.name,
            &column.identity,
            column.value_type,
            values,
        )])
        .expect("well formed")
    }

    fn run(join_type: JoinType) -> Morsel {
        let left_column = SchemaColumn::new("l", ValueType::Integer);
        let right_column = SchemaColumn::new("r", ValueType::Integer);
        let mut join = FilterJoinOperator::new(
            join_type,
            vec![Node::bound_identifier(left_column.clone())],
            vec![Node::bound_identifier(right_column.clone())],
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        // left: 1, 2, null; right (filter side): 2, 3
        join.process(
            Message::Morsel(keyed(
                &left_column,
                vec![Value::Integer(1), Value::Integer(2), Value::Null],
            )),
            Some(JoinLeg::Left),
            &context,
        )
        .expect("left buffered");
        join.process(Message::Eos, Some(JoinLeg::Left), &context)
            .expect("left eos");
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
    fn left_semi_keeps_matching_left_rows() {
        let result = run(JoinType::LeftSemi);
        assert_eq!(result.shape(), (1, 1));
        assert_eq!(result.columns()[0].values[0], Value::Integer(2));
    }

    #[test]
    fn left_anti_keeps_non_matching_and_null_rows() {
        let result = run(JoinType::LeftAnti);
        assert_eq!(result.shape(), (2, 1));
        assert_eq!(result.columns()[0].values[0], Value::Integer(1));
        assert_eq!(result.columns()[0].values[1], Value::Null);
    }
}
