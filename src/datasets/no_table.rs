//! The `$no_table` dataset.
//!
//! One row, one column. Queries with no FROM clause read it, and constant
//! folding evaluates identifier-free expressions against it to reduce them
//! to literals.

use crate::errors::Result;
use crate::morsel::{Column, Morsel};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::{Value, ValueType};

pub fn schema() -> RelationSchema {
    RelationSchema::new(
        "$no_table",
        vec![SchemaColumn::new("$column", ValueType::Integer).with_origin("$no_table")],
    )
    .with_row_count(1)
}

pub fn read() -> Result<Morsel> {
    Morsel::new(vec![Column::from_values(
        "$column",
        ValueType::Integer,
        vec![Value::Integer(0)],
    )])
}
