//! Administrative and terminal operators: EXPLAIN, SHOW, SET, the
//! metadata writer extension point, and the Exit step that shapes the
//! final result.

use crate::errors::Result;
use crate::expression::Node;
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;
use crate::schema::RelationSchema;
use crate::value::{Value, ValueType};

/// Emits the rendered plan; with ANALYZE the session also executes the
/// plan and appends runtime statistics.
pub struct ExplainOperator {
    lines: Vec<(usize, String)>,
    analyze_statistics: Option<Vec<(String, f64)>>,
}

impl ExplainOperator {
    pub fn new(lines: Vec<(usize, String)>) -> Self {
        ExplainOperator {
            lines,
            analyze_statistics: None,
        }
    }

    pub fn with_statistics(mut self, statistics: Vec<(String, f64)>) -> Self {
        self.analyze_statistics = Some(statistics);
        self
    }

    pub fn execute(&mut self, _context: &ExecutionContext) -> Result<Vec<Message>> {
        let mut rendered: Vec<Value> = self
            .lines
            .iter()
            .map(|(depth, label)| Value::Varchar(format!("{}{label}", "  ".repeat(*depth))))
            .collect();
        if let Some(statistics) = &self.analyze_statistics {
            for (name, value) in statistics {
                rendered.push(Value::Varchar(format!("{name}: {value}")));
            }
        }
        let morsel = Morsel::new(vec![Column::from_values(
            "plan",
            ValueType::Varchar,
            rendered,
        )])?;
        Ok(vec![Message::Morsel(morsel), Message::Eos])
    }
}

/// SHOW COLUMNS FROM <relation>
pub struct ShowColumnsOperator {
    schema: RelationSchema,
}

impl ShowColumnsOperator {
    pub fn new(schema: RelationSchema) -> Self {
        ShowColumnsOperator { schema }
    }

    pub fn execute(&mut self, _context: &ExecutionContext) -> Result<Vec<Message>> {
        let names = self
            .schema
            .columns
            .iter()
            .map(|c| Value::Varchar(c.name.clone()))
            .collect();
        let types = self
            .schema
            .columns
            .iter()
            .map(|c| Value::Varchar(c.value_type.to_string()))
            .collect();
        let morsel = Morsel::new(vec![
            Column::from_values("name", ValueType::Varchar, names),
            Column::from_values("type", ValueType::Varchar, types),
        ])?;
        Ok(vec![Message::Morsel(morsel), Message::Eos])
    }
}

/// SHOW <variable>
pub struct ShowValueOperator {
    name: String,
}

impl ShowValueOperator {
    pub fn new(name: String) -> Self {
        ShowValueOperator { name }
    }

    pub fn execute(&mut self, context: &ExecutionContext) -> Result<Vec<Message>> {
        let value = context
            .variables
            .lock()
            .get(&self.name)
            .cloned()
            .unwrap_or(Value::Null);
        let value_type = match value.value_type() {
            ValueType::Null => ValueType::Varchar,
            t => t,
        };
        let morsel = Morsel::new(vec![
            Column::from_values(
                "name",
                ValueType::Varchar,
                vec![Value::Varchar(self.name.clone())],
            ),
            Column::from_values("value", value_type, vec![value]),
        ])?;
        Ok(vec![Message::Morsel(morsel), Message::Eos])
    }
}

/// SET <variable> = <value>; produces no rows.
pub struct SetVariableOperator {
    name: String,
    value: Value,
}

impl SetVariableOperator {
    pub fn new(name: String, value: Value) -> Self {
        SetVariableOperator { name, value }
    }

    pub fn execute(&mut self, context: &ExecutionContext) -> Result<Vec<Message>> {
        context
            .variables
            .lock()
            .insert(self.name.clone(), self.value.clone());
        Ok(vec![Message::Morsel(Morsel::default()), Message::Eos])
    }
}

/// Forwards morsels while counting rows written; the connector-backed
/// write itself is delegated to the session's writer hook.
pub struct MetadataWriterOperator {
    rows_written: u64,
}

impl MetadataWriterOperator {
    pub fn new() -> Self {
        MetadataWriterOperator { rows_written: 0 }
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        if let Message::Morsel(morsel) = &message {
            self.rows_written += morsel.row_count() as u64;
            context
                .statistics
                .increment("rows_written", morsel.row_count() as u64);
        }
        Ok(vec![message])
    }
}

impl Default for MetadataWriterOperator {
    fn default() -> Self {
        Self::new()
    }
}

/// The final step: presents exactly the query's output columns, in
/// order, under their display names.
pub struct ExitOperator {
    columns: Vec<Node>,
}

impl ExitOperator {
    pub fn new(columns: Vec<Node>) -> Self {
        ExitOperator { columns }
    }

    pub fn process(
        &mut self,
        message: Message,
        _context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        let Message::Morsel(morsel) = message else {
            return Ok(vec![Message::Eos]);
        };
        if self.columns.is_empty() {
            return Ok(vec![Message::Morsel(morsel)]);
        }
        let mut selected = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let found = column
                .identity()
                .and_then(|identity| morsel.column_by_identity(identity))
                .or_else(|| morsel.column_by_name(&column.current_name()));
            if let Some(found) = found {
                let mut output = found.clone();
                output.name = column.current_name();
                selected.push(output);
            }
        }
        // if nothing resolved, pass the morsel through rather than
        // swallowing the result
        if selected.is_empty() {
            return Ok(vec![Message::Morsel(morsel)]);
        }
        Ok(vec![Message::Morsel(Morsel::new(selected)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;

    #[test]
    fn set_then_show_round_trips_a_variable() {
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let mut set = SetVariableOperator::new("cache".to_string(), Value::Boolean(true));
        set.execute(&context).expect("sets");
        let mut show = ShowValueOperator::new("cache".to_string());
        let out = show.execute(&context).expect("shows");
        let Message::Morsel(morsel) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(morsel.columns()[1].values[0], Value::Boolean(true));
    }

    #[test]
    fn exit_renames_and_orders_columns() {
        let id = SchemaColumn::new("id", ValueType::Integer);
        let name = SchemaColumn::new("name", ValueType::Varchar);
        let morsel = Morsel::new(vec![
            Column::new("id", id.identity.clone(), ValueType::Integer, vec![Value::Integer(1)]),
            Column::new(
                "name",
                name.identity.clone(),
                ValueType::Varchar,
                vec![Value::Varchar("Io".into())],
            ),
        ])
        .expect("well formed");

        let mut exit = ExitOperator::new(vec![
            Node::bound_identifier(name).with_alias("moon"),
            Node::bound_identifier(id),
        ]);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let out = exit
            .process(Message::Morsel(morsel), &context)
            .expect("exits");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.columns()[0].name, "moon");
        assert_eq!(result.columns()[1].name, "id");
    }
}
