//! Cross joins and CROSS JOIN UNNEST.
//!
//! The cartesian operator materialises the left leg, then streams the
//! right leg, emitting the product in bounded chunks. CROSS JOIN UNNEST
//! is the cartesian product between each outer row and the elements of
//! one of its array columns: outer columns repeat once per element, with
//! an optional literal-value filter on the elements and an optional
//! distinct mode where each element value is emitted only once.

use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::expression::{evaluator, Node};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;
use crate::plan::JoinLeg;
use crate::schema::SchemaColumn;
use crate::value::{HashableValue, Value, ValueType};

pub struct CrossJoinOperator {
    left_buffer: Vec<Morsel>,
    left_combined: Option<Morsel>,
    pending_right: Vec<Morsel>,
    left_done: bool,
    right_done: bool,
}

impl CrossJoinOperator {
    pub fn new() -> Self {
        CrossJoinOperator {
            left_buffer: Vec::new(),
            left_combined: None,
            pending_right: Vec::new(),
            left_done: false,
            right_done: false,
        }
    }

    fn product(&self, right: &Morsel, context: &ExecutionContext) -> Result<Vec<Message>> {
        let left = self.left_combined.as_ref().ok_or_else(|| {
            Error::InvalidInternalState("cross join product before left completed".to_string())
        })?;
        let left_rows = left.row_count();
        let right_rows = right.row_count();
        if left_rows == 0 || right_rows == 0 {
            return Ok(Vec::new());
        }
        let mut left_indices = Vec::with_capacity(left_rows * right_rows);
        let mut right_indices = Vec::with_capacity(left_rows * right_rows);
        for right_row in 0..right_rows {
            for left_row in 0..left_rows {
                left_indices.push(left_row);
                right_indices.push(right_row);
            }
        }
        let combined = Morsel::zip(&left.take(&left_indices), &right.take(&right_indices))?;
        context
            .statistics
            .increment("rows_emitted_by_cross_join", combined.row_count() as u64);
        Ok(combined
            .chunk(context.morsel_size)
            .into_iter()
            .map(Message::Morsel)
            .collect())
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
                self.left_combined = Some(Morsel::concat(&self.left_buffer)?);
                self.left_buffer.clear();
                self.left_done = true;
                let mut out = Vec::new();
                for morsel in std::mem::take(&mut self.pending_right) {
                    out.extend(self.product(&morsel, context)?);
                }
                if self.right_done {
                    out.push(Message::Eos);
                }
                Ok(out)
            }
            (Some(JoinLeg::Right), Message::Morsel(morsel)) => {
                if self.left_done {
                    self.product(&morsel, context)
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

impl Default for CrossJoinOperator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CrossJoinUnnestOperator {
    /// The array column being unnested
    source: Node,
    /// The output column the elements land in
    target: SchemaColumn,
    /// Literal values the elements are restricted to
    filters: Option<Vec<Value>>,
    /// Emit each distinct element value once
    distinct: bool,
    seen: HashSet<HashableValue>,
}

impl CrossJoinUnnestOperator {
    pub fn new(
        source: Node,
        target: SchemaColumn,
        filters: Option<Vec<Value>>,
        distinct: bool,
    ) -> Self {
        CrossJoinUnnestOperator {
            source,
            target,
            filters,
            distinct,
            seen: HashSet::new(),
        }
    }

    fn expand(&mut self, morsel: &Morsel, context: &ExecutionContext) -> Result<Vec<Message>> {
        let source_values = evaluator::evaluate(&self.source, morsel)?.values;

        let mut outer_indices: Vec<usize> = Vec::new();
        let mut elements: Vec<Value> = Vec::new();

        for (row, value) in source_values.iter().enumerate() {
            match value {
                Value::Array(items) if !items.is_empty() => {
                    for item in items {
                        if let Some(allowed) = &self.filters {
                            if !allowed.iter().any(|a| a.sql_eq(item)) {
                                continue;
                            }
                        }
                        if self.distinct
                            && !self.seen.insert(HashableValue(item.clone()))
                        {
                            continue;
                        }
                        outer_indices.push(row);
                        elements.push(item.clone());
                    }
                }
                _ => {
                    // empty or null arrays keep the outer row with a null
                    // element, unless a value filter is in force
                    if self.filters.is_some() {
                        continue;
                    }
                    if self.distinct && !self.seen.insert(HashableValue(Value::Null)) {
                        continue;
                    }
                    outer_indices.push(row);
                    elements.push(Value::Null);
                }
            }
        }

        let element_type = self.target.element_type.unwrap_or(ValueType::Varchar);
        let mut expanded = morsel.take(&outer_indices).into_columns();
        expanded.push(Column::new(
            &self.target.name,
            &self.target.identity,
            element_type,
            elements,
        ));
        let combined = Morsel::new(expanded)?;
        context
            .statistics
            .increment("rows_emitted_by_unnest", combined.row_count() as u64);
        Ok(combined
            .chunk(context.morsel_size)
            .into_iter()
            .map(Message::Morsel)
            .collect())
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match message {
            Message::Morsel(morsel) => self.expand(&morsel, context),
            Message::Eos => Ok(vec![Message::Eos]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::QueryStatistics;

    fn missions_morsel(column: &SchemaColumn) -> Morsel {
        Morsel::new(vec![Column::new(
            "missions",
            column.identity.clone(),
            ValueType::Array,
            vec![
                Value::Array(vec![
                    Value::Varchar("Gemini 8".into()),
                    Value::Varchar("Apollo 11".into()),
                ]),
                Value::Null,
                Value::Array(vec![Value::Varchar("Apollo 11".into())]),
            ],
        )])
        .expect("well formed")
    }

    fn target() -> SchemaColumn {
        SchemaColumn::new("m", ValueType::Varchar).with_element_type(ValueType::Varchar)
    }

    #[test]
    fn unnest_expands_rows_per_element() {
        let source_column =
            SchemaColumn::new("missions", ValueType::Array).with_element_type(ValueType::Varchar);
        let mut op = CrossJoinUnnestOperator::new(
            Node::bound_identifier(source_column.clone()),
            target(),
            None,
            false,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = op
            .process(Message::Morsel(missions_morsel(&source_column)), &context)
            .expect("expands");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        // 2 elements + null row + 1 element
        assert_eq!(result.shape(), (4, 2));
    }

    #[test]
    fn literal_filters_restrict_elements_and_drop_null_rows() {
        let source_column =
            SchemaColumn::new("missions", ValueType::Array).with_element_type(ValueType::Varchar);
        let mut op = CrossJoinUnnestOperator::new(
            Node::bound_identifier(source_column.clone()),
            target(),
            Some(vec![Value::Varchar("Apollo 11".into())]),
            false,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = op
            .process(Message::Morsel(missions_morsel(&source_column)), &context)
            .expect("expands");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.shape(), (2, 2));
    }

    #[test]
    fn distinct_emits_each_element_once() {
        let source_column =
            SchemaColumn::new("missions", ValueType::Array).with_element_type(ValueType::Varchar);
        let mut op = CrossJoinUnnestOperator::new(
            Node::bound_identifier(source_column.clone()),
            target(),
            None,
            true,
        );
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = op
            .process(Message::Morsel(missions_morsel(&source_column)), &context)
            .expect("expands");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        // Gemini 8, Apollo 11, null; the second Apollo 11 deduplicates
        assert_eq!(result.shape(), (3, 2));
    }
}
