//! # Morsels
//!
//! The unit of data flow: an immutable columnar batch of named, typed
//! columns with equal row counts. Operators transform morsels into new
//! morsels; they never mutate one in place.
//!
//! [`Message`] is what actually travels along plan edges: either a morsel
//! or the per-leg end-of-stream sentinel joins and aggregations key on.

use crate::errors::{Error, Result};
use crate::schema::SchemaColumn;
use crate::value::{Value, ValueType};

/// A single named column of values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// The bound identity this column carries through the plan
    pub identity: String,
    pub value_type: ValueType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        value_type: ValueType,
        values: Vec<Value>,
    ) -> Self {
        Column {
            name: name.into(),
            identity: identity.into(),
            value_type,
            values,
        }
    }

    /// A column whose name doubles as its identity; datasets start here and
    /// the connector relabels identities to the bound schema.
    pub fn from_values(name: &str, value_type: ValueType, values: Vec<Value>) -> Self {
        Column::new(name, name, value_type, values)
    }
}

/// A columnar batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Morsel {
    columns: Vec<Column>,
    row_count: usize,
}

impl Morsel {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map_or(0, |c| c.values.len());
        if columns.iter().any(|c| c.values.len() != row_count) {
            return Err(Error::InvalidInternalState(
                "morsel columns have unequal row counts".to_string(),
            ));
        }
        Ok(Morsel { columns, row_count })
    }

    /// A zero-row morsel carrying the given schema columns.
    pub fn empty(schema: &[SchemaColumn]) -> Self {
        let columns = schema
            .iter()
            .map(|c| Column::new(&c.name, &c.identity, c.value_type, Vec::new()))
            .collect();
        Morsel {
            columns,
            row_count: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count, self.columns.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_by_identity(&self, identity: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.identity == identity)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// One full row as values, in column order.
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.values[index].clone())
            .collect()
    }

    /// A new morsel containing the given row indices, in order. Indices may
    /// repeat (joins fan rows out this way).
    pub fn take(&self, indices: &[usize]) -> Morsel {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                identity: c.identity.clone(),
                value_type: c.value_type,
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Morsel {
            columns,
            row_count: indices.len(),
        }
    }

    /// Rows [offset, offset + length) as a new morsel.
    pub fn slice(&self, offset: usize, length: usize) -> Morsel {
        let end = (offset + length).min(self.row_count);
        let offset = offset.min(end);
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                identity: c.identity.clone(),
                value_type: c.value_type,
                values: c.values[offset..end].to_vec(),
            })
            .collect();
        Morsel {
            columns,
            row_count: end - offset,
        }
    }

    /// Concatenate morsels with identical column layouts.
    pub fn concat(morsels: &[Morsel]) -> Result<Morsel> {
        let Some(first) = morsels.first() else {
            return Ok(Morsel::default());
        };
        let mut columns: Vec<Column> = first
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                identity: c.identity.clone(),
                value_type: c.value_type,
                values: Vec::new(),
            })
            .collect();
        let mut row_count = 0;
        for morsel in morsels {
            if morsel.column_count() != columns.len() {
                return Err(Error::InvalidInternalState(
                    "cannot concatenate morsels with different column counts".to_string(),
                ));
            }
            for (target, source) in columns.iter_mut().zip(morsel.columns.iter()) {
                target.values.extend(source.values.iter().cloned());
            }
            row_count += morsel.row_count;
        }
        Ok(Morsel {
            columns,
            row_count,
        })
    }

    /// Side-by-side combination of two morsels with equal row counts,
    /// as produced by a join emitting left and right columns.
    pub fn zip(left: &Morsel, right: &Morsel) -> Result<Morsel> {
        if left.row_count != right.row_count {
            return Err(Error::InvalidInternalState(
                "cannot zip morsels with different row counts".to_string(),
            ));
        }
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Ok(Morsel {
            columns,
            row_count: left.row_count,
        })
    }

    /// Split into batches of at most `size` rows.
    pub fn chunk(&self, size: usize) -> Vec<Morsel> {
        if self.row_count <= size {
            return vec![self.clone()];
        }
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < self.row_count {
            chunks.push(self.slice(offset, size));
            offset += size;
        }
        chunks
    }
}

/// What flows along a plan edge: data, or the end-of-stream sentinel.
#[derive(Debug, Clone)]
pub enum Message {
    Morsel(Morsel),
    Eos,
}

impl Message {
    pub fn is_eos(&self) -> bool {
        matches!(self, Message::Eos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Morsel {
        Morsel::new(vec![
            Column::from_values(
                "id",
                ValueType::Integer,
                vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
            ),
            Column::from_values(
                "name",
                ValueType::Varchar,
                vec![
                    Value::Varchar("a".into()),
                    Value::Varchar("b".into()),
                    Value::Varchar("c".into()),
                ],
            ),
        ])
        .expect("sample morsel is well formed")
    }

    #[test]
    fn unequal_columns_rejected() {
        let result = Morsel::new(vec![
            Column::from_values("a", ValueType::Integer, vec![Value::Integer(1)]),
            Column::from_values("b", ValueType::Integer, vec![]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn take_repeats_rows() {
        let taken = sample().take(&[2, 0, 0]);
        assert_eq!(taken.shape(), (3, 2));
        assert_eq!(taken.columns()[0].values[0], Value::Integer(3));
        assert_eq!(taken.columns()[0].values[1], Value::Integer(1));
    }

    #[test]
    fn slice_clamps_to_bounds() {
        let sliced = sample().slice(2, 10);
        assert_eq!(sliced.shape(), (1, 2));
        assert_eq!(sample().slice(5, 2).row_count(), 0);
    }

    #[test]
    fn concat_and_chunk_roundtrip() {
        let morsel = sample();
        let chunks = morsel.chunk(2);
        assert_eq!(chunks.len(), 2);
        let back = Morsel::concat(&chunks).expect("chunks share layout");
        assert_eq!(back, morsel);
    }
}
