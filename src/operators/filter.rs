//! Row filtering.
//!
//! Evaluates the condition against each morsel and keeps the rows where it
//! is TRUE; FALSE and NULL rows are dropped, per SQL semantics. The
//! condition may be a flattened chain (`Dnf`) produced by predicate
//! flattening, which the evaluator folds with Kleene AND.

use crate::errors::Result;
use crate::expression::{evaluator, Node};
use crate::morsel::Message;
use crate::operators::ExecutionContext;
use crate::value::Value;

#[derive(Clone)]
pub struct FilterOperator {
    condition: Node,
}

impl FilterOperator {
    pub fn new(condition: Node) -> Self {
        FilterOperator { condition }
    }

    pub fn process(
        &self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        let Message::Morsel(morsel) = message else {
            return Ok(vec![Message::Eos]);
        };
        context
            .statistics
            .increment("rows_seen_by_filter", morsel.row_count() as u64);

        let mask = evaluator::evaluate(&self.condition, &morsel)?;
        let keep: Vec<usize> = mask
            .values
            .iter()
            .enumerate()
            .filter(|(_, value)| matches!(value, Value::Boolean(true)))
            .map(|(index, _)| index)
            .collect();

        context
            .statistics
            .increment("rows_emitted_by_filter", keep.len() as u64);
        Ok(vec![Message::Morsel(morsel.take(&keep))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::CompareOp;
    use crate::morsel::{Column, Morsel};
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;
    use crate::value::ValueType;

    #[test]
    fn null_and_false_rows_are_dropped() {
        let column = SchemaColumn::new("id", ValueType::Integer);
        let morsel = Morsel::new(vec![Column::new(
            "id",
            column.identity.clone(),
            ValueType::Integer,
            vec![Value::Integer(1), Value::Null, Value::Integer(3)],
        )])
        .expect("well formed");
        let filter = FilterOperator::new(Node::comparison(
            CompareOp::Gt,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(1)),
        ));
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = filter
            .process(Message::Morsel(morsel), &context)
            .expect("filter processes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected a morsel");
        };
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.columns()[0].values[0], Value::Integer(3));
    }
}
