//! Relation and column schemas.
//!
//! The binder attaches a [`SchemaColumn`] to every identifier it resolves.
//! The column's `identity` is a stable opaque id that names the column
//! through the whole plan, no matter how it is aliased or projected; every
//! pushdown decision keys on identities, never on display names.

use crate::value::{Value, ValueType};

/// A bound column: stable identity, resolved type, provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaColumn {
    /// Display name of the column
    pub name: String,
    /// Stable opaque id assigned at bind time
    pub identity: String,
    pub value_type: ValueType,
    /// Element type for Array columns
    pub element_type: Option<ValueType>,
    /// Relations this column originates from
    pub origin: Vec<String>,
    /// Alternate names the column answers to
    pub aliases: Vec<String>,
    /// Lowest value seen, when the source keeps statistics
    pub lowest_value: Option<Value>,
    /// Highest value seen, when the source keeps statistics
    pub highest_value: Option<Value>,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        SchemaColumn {
            name: name.into(),
            identity: uuid::Uuid::new_v4().simple().to_string(),
            value_type,
            element_type: None,
            origin: Vec::new(),
            aliases: Vec::new(),
            lowest_value: None,
            highest_value: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = vec![origin.into()];
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_element_type(mut self, element_type: ValueType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn with_range(mut self, lowest: Value, highest: Value) -> Self {
        self.lowest_value = Some(lowest);
        self.highest_value = Some(highest);
        self
    }

    /// Does this column answer to `name` (directly or via an alias)?
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// The schema of a relation, with an optional row count estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
    pub row_count: Option<usize>,
}

impl RelationSchema {
    pub fn new(name: impl Into<String>, columns: Vec<SchemaColumn>) -> Self {
        RelationSchema {
            name: name.into(),
            columns,
            row_count: None,
        }
    }

    pub fn with_row_count(mut self, row_count: usize) -> Self {
        self.row_count = Some(row_count);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.answers_to(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let a = SchemaColumn::new("id", ValueType::Integer);
        let b = SchemaColumn::new("id", ValueType::Integer);
        assert_ne!(a.identity, b.identity);
    }

    #[test]
    fn aliases_resolve() {
        let column = SchemaColumn::new("planetId", ValueType::Integer)
            .with_aliases(vec!["planet_id".to_string()]);
        let schema = RelationSchema::new("$satellites", vec![column]);
        assert!(schema.find_column("planet_id").is_some());
        assert!(schema.find_column("planetId").is_some());
        assert!(schema.find_column("planet").is_none());
    }
}
