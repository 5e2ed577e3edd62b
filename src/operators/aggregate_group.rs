//! GROUP BY aggregation.
//!
//! Hashes the group-by key tuple; each group accumulates its own
//! aggregator states. One morsel is emitted at end of stream, with
//! columns laid out per the projection list (group keys and aggregate
//! results in query order). Groups emit in first-seen order, which keeps
//! results deterministic for a given input order.

use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::expression::{evaluator, Node, NodeType};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::aggregate::{accumulate, aggregate_parts, build_accumulator, Accumulator};
use crate::operators::ExecutionContext;
use crate::value::{RowKey, Value, ValueType};

struct GroupState {
    key: Vec<Value>,
    accumulators: Vec<Accumulator>,
}

pub struct AggregateAndGroupOperator {
    groups: Vec<Node>,
    aggregates: Vec<Node>,
    projection: Vec<Node>,
    lookup: HashMap<RowKey, usize>,
    states: Vec<GroupState>,
}

impl AggregateAndGroupOperator {
    pub fn new(groups: Vec<Node>, aggregates: Vec<Node>, projection: Vec<Node>) -> Self {
        AggregateAndGroupOperator {
            groups,
            aggregates,
            projection,
            lookup: HashMap::new(),
            states: Vec::new(),
        }
    }

    fn new_state(&self, key: Vec<Value>) -> Result<GroupState> {
        let mut accumulators = Vec::with_capacity(self.aggregates.len());
        for aggregate in &self.aggregates {
            let (function, wildcard, distinct, limit) = aggregate_parts(aggregate)?;
            accumulators.push(build_accumulator(function, wildcard, distinct, limit));
        }
        Ok(GroupState { key, accumulators })
    }

    fn absorb(&mut self, morsel: &Morsel) -> Result<()> {
        let mut key_columns = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            key_columns.push(evaluator::evaluate(group, morsel)?.values);
        }

        // bucket row indices by group, then accumulate group-wise so each
        // aggregate parameter is evaluated once per morsel slice
        let mut buckets: Vec<(usize, Vec<usize>)> = Vec::new();
        let mut bucket_lookup: HashMap<usize, usize> = HashMap::new();
        for row in 0..morsel.row_count() {
            let key_values: Vec<Value> =
                key_columns.iter().map(|c| c[row].clone()).collect();
            let key = RowKey(key_values.clone());
            let group_index = match self.lookup.get(&key) {
                Some(index) => *index,
                None => {
                    let index = self.states.len();
                    let state = self.new_state(key_values)?;
                    self.states.push(state);
                    self.lookup.insert(key, index);
                    index
                }
            };
            match bucket_lookup.get(&group_index) {
                Some(bucket) => buckets[*bucket].1.push(row),
                None => {
                    bucket_lookup.insert(group_index, buckets.len());
                    buckets.push((group_index, vec![row]));
                }
            }
        }

        for (group_index, rows) in buckets {
            let slice = morsel.take(&rows);
            let state = &mut self.states[group_index];
            for (aggregate, accumulator) in
                self.aggregates.iter().zip(state.accumulators.iter_mut())
            {
                accumulate(aggregate, accumulator, &slice)?;
            }
        }
        Ok(())
    }

    fn emit(&self) -> Result<Morsel> {
        let mut columns = Vec::with_capacity(self.projection.len());
        for projected in &self.projection {
            let identity = projected
                .identity()
                .map_or_else(|| projected.uuid.clone(), str::to_string);

            if projected.node_type == NodeType::Aggregator {
                let index = self
                    .aggregates
                    .iter()
                    .position(|a| a.uuid == projected.uuid || a.format() == projected.format())
                    .ok_or_else(|| {
                        Error::InvalidInternalState(format!(
                            "projected aggregate '{}' not in aggregate list",
                            projected.format()
                        ))
                    })?;
                let values: Vec<Value> = self
                    .states
                    .iter()
                    .map(|state| state.accumulators[index].finish())
                    .collect();
                let value_type = values
                    .iter()
                    .find(|v| !v.is_null())
                    .map_or(ValueType::Integer, Value::value_type);
                columns.push(Column::new(
                    projected.current_name(),
                    identity,
                    value_type,
                    values,
                ));
            } else {
                let index = self
                    .groups
                    .iter()
                    .position(|g| {
                        g.uuid == projected.uuid
                            || (g.identity().is_some() && g.identity() == projected.identity())
                    })
                    .ok_or_else(|| {
                        Error::InvalidInternalState(format!(
                            "projected column '{}' is neither a group key nor an aggregate",
                            projected.format()
                        ))
                    })?;
                let values: Vec<Value> = self
                    .states
                    .iter()
                    .map(|state| state.key[index].clone())
                    .collect();
                let value_type = values
                    .iter()
                    .find(|v| !v.is_null())
                    .map_or(ValueType::Null, Value::value_type);
                columns.push(Column::new(
                    projected.current_name(),
                    identity,
                    value_type,
                    values,
                ));
            }
        }
        Morsel::new(columns)
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
                    .increment("rows_seen_by_group_by", morsel.row_count() as u64);
                self.absorb(&morsel)?;
                Ok(Vec::new())
            }
            Message::Eos => {
                context
                    .statistics
                    .increment("groups_emitted", self.states.len() as u64);
                Ok(vec![Message::Morsel(self.emit()?), Message::Eos])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::AggregateFunction;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;

    #[test]
    fn groups_count_rows_per_key() {
        let key_column = SchemaColumn::new("planetId", ValueType::Integer);
        let morsel = Morsel::new(vec![Column::new(
            "planetId",
            key_column.identity.clone(),
            ValueType::Integer,
            vec![
                Value::Integer(3),
                Value::Integer(5),
                Value::Integer(3),
                Value::Integer(5),
                Value::Integer(5),
            ],
        )])
        .expect("well formed");

        let group = Node::bound_identifier(key_column);
        let count = Node::aggregate(AggregateFunction::Count, vec![Node::wildcard()]);
        let mut op = AggregateAndGroupOperator::new(
            vec![group.clone()],
            vec![count.clone()],
            vec![count, group],
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        op.process(Message::Morsel(morsel), &context)
            .expect("absorbs");
        let out = op.process(Message::Eos, &context).expect("emits");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.shape(), (2, 2));
        // first-seen order: planet 3 then planet 5
        assert_eq!(result.columns()[0].values, vec![Value::Integer(2), Value::Integer(3)]);
        assert_eq!(result.columns()[1].values, vec![Value::Integer(3), Value::Integer(5)]);
    }
}
