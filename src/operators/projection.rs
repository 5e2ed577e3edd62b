//! Column projection: evaluates each projected expression against the
//! morsel and emits the results as a new morsel, in projection order.

use crate::errors::Result;
use crate::expression::{evaluator, Node, NodeType};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;

#[derive(Clone)]
pub struct ProjectionOperator {
    columns: Vec<Node>,
}

impl ProjectionOperator {
    pub fn new(columns: Vec<Node>) -> Self {
        ProjectionOperator { columns }
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
            .increment("rows_seen_by_projection", morsel.row_count() as u64);

        let mut projected: Vec<Column> = Vec::with_capacity(self.columns.len());
        for expression in &self.columns {
            // identifiers pass their column through; everything else is
            // evaluated
            if expression.node_type == NodeType::Identifier {
                if let Some(existing) = expression
                    .identity()
                    .and_then(|identity| morsel.column_by_identity(identity))
                {
                    let mut column = existing.clone();
                    column.name = expression.current_name();
                    projected.push(column);
                    continue;
                }
            }
            projected.push(evaluator::evaluate(expression, &morsel)?);
        }
        Ok(vec![Message::Morsel(Morsel::new(projected)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BinaryOp;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;
    use crate::value::{Value, ValueType};

    #[test]
    fn expressions_and_identifiers_project_in_order() {
        let column = SchemaColumn::new("id", ValueType::Integer);
        let morsel = Morsel::new(vec![Column::new(
            "id",
            column.identity.clone(),
            ValueType::Integer,
            vec![Value::Integer(2), Value::Integer(5)],
        )])
        .expect("well formed");

        let doubled = Node::binary(
            BinaryOp::Multiply,
            Node::bound_identifier(column.clone()),
            Node::literal(Value::Integer(2)),
        )
        .with_alias("doubled");
        let projection =
            ProjectionOperator::new(vec![Node::bound_identifier(column), doubled]);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = projection
            .process(Message::Morsel(morsel), &context)
            .expect("projection processes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected a morsel");
        };
        assert_eq!(result.shape(), (2, 2));
        assert_eq!(result.columns()[1].name, "doubled");
        assert_eq!(result.columns()[1].values[1], Value::Integer(10));
    }
}
