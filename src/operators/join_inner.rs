//! Inner joins.
//!
//! The build side (left leg) is consumed until end-of-stream and hashed;
//! the probe side then streams. Null keys hash to nothing and never
//! match. Multi-column keys combine their component hashes with the
//! stable `h = h * 31 + h2` combiner (see [`RowKey`]). A single VARCHAR
//! key gets a specialised string-keyed table; tiny build sides skip the
//! hash table entirely and scan.

use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::expression::{evaluator, Node};
use crate::morsel::{Message, Morsel};
use crate::operators::ExecutionContext;
use crate::plan::JoinLeg;
use crate::value::{RowKey, Value};

/// Evaluate the key expressions, yielding one key tuple per row.
fn key_tuples(keys: &[Node], morsel: &Morsel) -> Result<Vec<Vec<Value>>> {
    let mut columns = Vec::with_capacity(keys.len());
    for key in keys {
        columns.push(evaluator::evaluate(key, morsel)?.values);
    }
    let rows = morsel.row_count();
    Ok((0..rows)
        .map(|row| columns.iter().map(|c| c[row].clone()).collect())
        .collect())
}

fn emit_pairs(
    build: &Morsel,
    probe: &Morsel,
    build_rows: &[usize],
    probe_rows: &[usize],
    build_is_left: bool,
) -> Result<Vec<Message>> {
    if build_rows.is_empty() {
        return Ok(Vec::new());
    }
    let build_side = build.take(build_rows);
    let probe_side = probe.take(probe_rows);
    let joined = if build_is_left {
        Morsel::zip(&build_side, &probe_side)?
    } else {
        Morsel::zip(&probe_side, &build_side)?
    };
    Ok(vec![Message::Morsel(joined)])
}

/// Multi-key hash join.
pub struct InnerJoinOperator {
    left_keys: Vec<Node>,
    right_keys: Vec<Node>,
    left_buffer: Vec<Morsel>,
    left_combined: Option<Morsel>,
    hash_table: HashMap<RowKey, Vec<usize>>,
    pending_right: Vec<Morsel>,
    left_done: bool,
    right_done: bool,
}

impl InnerJoinOperator {
    pub fn new(left_keys: Vec<Node>, right_keys: Vec<Node>) -> Self {
        InnerJoinOperator {
            left_keys,
            right_keys,
            left_buffer: Vec::new(),
            left_combined: None,
            hash_table: HashMap::new(),
            pending_right: Vec::new(),
            left_done: false,
            right_done: false,
        }
    }

    fn build(&mut self, context: &ExecutionContext) -> Result<()> {
        let combined = Morsel::concat(&self.left_buffer)?;
        self.left_buffer.clear();
        for (row, key) in key_tuples(&self.left_keys, &combined)?.into_iter().enumerate() {
            let key = RowKey(key);
            if key.has_null() {
                continue;
            }
            self.hash_table.entry(key).or_default().push(row);
        }
        context
            .statistics
            .increment("join_build_rows", combined.row_count() as u64);
        self.left_combined = Some(combined);
        self.left_done = true;
        Ok(())
    }

    fn probe(&self, morsel: &Morsel) -> Result<Vec<Message>> {
        let build = self.left_combined.as_ref().ok_or_else(|| {
            Error::InvalidInternalState("probing a join before its build completed".to_string())
        })?;
        let mut build_rows = Vec::new();
        let mut probe_rows = Vec::new();
        for (row, key) in key_tuples(&self.right_keys, morsel)?.into_iter().enumerate() {
            let key = RowKey(key);
            if key.has_null() {
                continue;
            }
            if let Some(matches) = self.hash_table.get(&key) {
                for &build_row in matches {
                    build_rows.push(build_row);
                    probe_rows.push(row);
                }
            }
        }
        emit_pairs(build, morsel, &build_rows, &probe_rows, true)
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
            (Some(JoinLeg::Left), Message::Eos) => {
                self.build(context)?;
                let mut out = Vec::new();
                for morsel in std::mem::take(&mut self.pending_right) {
                    out.extend(self.probe(&morsel)?);
                }
                if self.right_done {
                    out.push(Message::Eos);
                }
                Ok(out)
            }
            (Some(JoinLeg::Right), Message::Morsel(morsel)) => {
                if self.left_done {
                    self.probe(&morsel)
                } else {
                    self.pending_right.push(morsel);
                    Ok(Vec::new())
                }
            }
            (Some(JoinLeg::Right), Message::Eos) => {
                self.right_done = true;
                if self.left_done {
                    Ok(vec![Message::Eos])
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

/// Inner join specialised for exactly one VARCHAR key.
pub struct InnerJoinSingleOperator {
    left_key: Node,
    right_key: Node,
    left_buffer: Vec<Morsel>,
    left_combined: Option<Morsel>,
    hash_table: HashMap<String, Vec<usize>>,
    pending_right: Vec<Morsel>,
    left_done: bool,
    right_done: bool,
}

impl InnerJoinSingleOperator {
    pub fn new(left_key: Node, right_key: Node) -> Self {
        InnerJoinSingleOperator {
            left_key,
            right_key,
            left_buffer: Vec::new(),
            left_combined: None,
            hash_table: HashMap::new(),
            pending_right: Vec::new(),
            left_done: false,
            right_done: false,
        }
    }

    fn build(&mut self, context: &ExecutionContext) -> Result<()> {
        let combined = Morsel::concat(&self.left_buffer)?;
        self.left_buffer.clear();
        let keys = evaluator::evaluate(&self.left_key, &combined)?;
        for (row, value) in keys.values.iter().enumerate() {
            if let Value::Varchar(key) = value {
                self.hash_table.entry(key.clone()).or_default().push(row);
            }
        }
        context
            .statistics
            .increment("join_build_rows", combined.row_count() as u64);
        self.left_combined = Some(combined);
        self.left_done = true;
        Ok(())
    }

    fn probe(&self, morsel: &Morsel) -> Result<Vec<Message>> {
        let build = self.left_combined.as_ref().ok_or_else(|| {
            Error::InvalidInternalState("probing a join before its build completed".to_string())
        })?;
        let keys = evaluator::evaluate(&self.right_key, morsel)?;
        let mut build_rows = Vec::new();
        let mut probe_rows = Vec::new();
        for (row, value) in keys.values.iter().enumerate() {
            if let Value::Varchar(key) = value {
                if let Some(matches) = self.hash_table.get(key) {
                    for &build_row in matches {
                        build_rows.push(build_row);
                        probe_rows.push(row);
                    }
                }
            }
        }
        emit_pairs(build, morsel, &build_rows, &probe_rows, true)
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
            (Some(JoinLeg::Left), Message::Eos) => {
                self.build(context)?;
                let mut out = Vec::new();
                for morsel in std::mem::take(&mut self.pending_right) {
                    out.extend(self.probe(&morsel)?);
                }
                if self.right_done {
                    out.push(Message::Eos);
                }
                Ok(out)
            }
            (Some(JoinLeg::Right), Message::Morsel(morsel)) => {
                if self.left_done {
                    self.probe(&morsel)
                } else {
                    self.pending_right.push(morsel);
                    Ok(Vec::new())
                }
            }
            (Some(JoinLeg::Right), Message::Eos) => {
                self.right_done = true;
                if self.left_done {
                    Ok(vec![Message::Eos])
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

/// Nested loop inner join for tiny build sides.
pub struct NestedLoopJoinOperator {
    left_keys: Vec<Node>,
    right_keys: Vec<Node>,
    left_buffer: Vec<Morsel>,
    left_combined: Option<Morsel>,
    left_key_tuples: Vec<Vec<Value>>,
    pending_right: Vec<Morsel>,
    left_done: bool,
    right_done: bool,
}

impl NestedLoopJoinOperator {
    pub fn new(left_keys: Vec<Node>, right_keys: Vec<Node>) -> Self {
        NestedLoopJoinOperator {
            left_keys,
            right_keys,
            left_buffer: Vec::new(),
            left_combined: None,
            left_key_tuples: Vec::new(),
            pending_right: Vec::new(),
            left_done: false,
            right_done: false,
        }
    }

    fn build(&mut self, context: &ExecutionContext) -> Result<()> {
        let combined = Morsel::concat(&self.left_buffer)?;
        self.left_buffer.clear();
        self.left_key_tuples = key_tuples(&self.left_keys, &combined)?;
        context
            .statistics
            .increment("join_build_rows", combined.row_count() as u64);
        self.left_combined = Some(combined);
        self.left_done = true;
        Ok(())
    }

    fn probe(&self, morsel: &Morsel) -> Result<Vec<Message>> {
        let build = self.left_combined.as_ref().ok_or_else(|| {
            Error::InvalidInternalState("probing a join before its build completed".to_string())
        })?;
        let mut build_rows = Vec::new();
        let mut probe_rows = Vec::new();
        for (row, probe_key) in key_tuples(&self.right_keys, morsel)?.into_iter().enumerate() {
            if probe_key.iter().any(Value::is_null) {
                continue;
            }
            for (build_row, build_key) in self.left_key_tuples.iter().enumerate() {
                if build_key.len() == probe_key.len()
                    && build_key
                        .iter()
                        .zip(probe_key.iter())
                        .all(|(a, b)| a.sql_eq(b))
                {
                    build_rows.push(build_row);
                    probe_rows.push(row);
                }
            }
        }
        emit_pairs(build, morsel, &build_rows, &probe_rows, true)
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
            (Some(JoinLeg::Left), Message::Eos) => {
                self.build(context)?;
                let mut out = Vec::new();
                for morsel in std::mem::take(&mut self.pending_right) {
                    out.extend(self.probe(&morsel)?);
                }
                if self.right_done {
                    out.push(Message::Eos);
                }
                Ok(out)
            }
            (Some(JoinLeg::Right), Message::Morsel(morsel)) => {
                if self.left_done {
                    self.probe(&morsel)
                } else {
                    self.pending_right.push(morsel);
                    Ok(Vec::new())
                }
            }
            (Some(JoinLeg::Right), Message::Eos) => {
                self.right_done = true;
                if self.left_done {
                    Ok(vec![Message::Eos])
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
    use crate::morsel::Column;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;
    use crate::value::ValueType;

    fn keyed_morsel(column: &SchemaColumn, values: Vec<Value>) -> Morsel {
        Morsel::new(vec![Column::new(
            &column.name,
            &column.identity,
            column.value_type,
            values,
        )])
        .expect("well formed")
    }

    #[test]
    fn hash_join_matches_and_skips_nulls() {
        let left_column = SchemaColumn::new("id", ValueType::Integer);
        let right_column = SchemaColumn::new("ref", ValueType::Integer);
        let mut join = InnerJoinOperator::new(
            vec![Node::bound_identifier(left_column.clone())],
            vec![Node::bound_identifier(right_column.clone())],
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);

        join.process(
            Message::Morsel(keyed_morsel(
                &left_column,
                vec![Value::Integer(1), Value::Null, Value::Integer(2)],
            )),
            Some(JoinLeg::Left),
            &context,
        )
        .expect("buffers left");
        join.process(Message::Eos, Some(JoinLeg::Left), &context)
            .expect("builds");

        let out = join
            .process(
                Message::Morsel(keyed_morsel(
                    &right_column,
                    vec![Value::Integer(2), Value::Null, Value::Integer(2), Value::Integer(9)],
                )),
                Some(JoinLeg::Right),
                &context,
            )
            .expect("probes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        // id=2 matches twice, nulls and 9 never match
        assert_eq!(result.shape(), (2, 2));
    }

    #[test]
    fn single_key_varchar_join() {
        let left_column = SchemaColumn::new("name", ValueType::Varchar);
        let right_column = SchemaColumn::new("name", ValueType::Varchar);
        let mut join = InnerJoinSingleOperator::new(
            Node::bound_identifier(left_column.clone()),
            Node::bound_identifier(right_column.clone()),
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        join.process(
            Message::Morsel(keyed_morsel(
                &left_column,
                vec![Value::Varchar("Io".into()), Value::Varchar("Moon".into())],
            )),
            Some(JoinLeg::Left),
            &context,
        )
        .expect("buffers");
        join.process(Message::Eos, Some(JoinLeg::Left), &context)
            .expect("builds");
        let out = join
            .process(
                Message::Morsel(keyed_morsel(
                    &right_column,
                    vec![Value::Varchar("Moon".into()), Value::Varchar("Titan".into())],
                )),
                Some(JoinLeg::Right),
                &context,
            )
            .expect("probes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.shape(), (1, 2));
    }

    #[test]
    fn nested_loop_join_agrees_with_hash_join() {
        let left_column = SchemaColumn::new("id", ValueType::Integer);
        let right_column = SchemaColumn::new("ref", ValueType::Integer);
        let mut join = NestedLoopJoinOperator::new(
            vec![Node::bound_identifier(left_column.clone())],
            vec![Node::bound_identifier(right_column.clone())],
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        join.process(
            Message::Morsel(keyed_morsel(
                &left_column,
                vec![Value::Integer(1), Value::Integer(2)],
            )),
            Some(JoinLeg::Left),
            &context,
        )
        .expect("buffers");
        join.process(Message::Eos, Some(JoinLeg::Left), &context)
            .expect("builds");
        let out = join
            .process(
                Message::Morsel(keyed_morsel(
                    &right_column,
                    vec![Value::Integer(2), Value::Integer(3)],
                )),
                Some(JoinLeg::Right),
                &context,
            )
            .expect("probes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.shape(), (1, 2));
    }
}
