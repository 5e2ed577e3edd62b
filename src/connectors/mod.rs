//! Data source connectors.
//!
//! A [`Connector`] hands morsels to scan operators and advertises what the
//! optimizer may push down to it via capability bit flags; the optimizer
//! queries flags, never concrete types. The built-in
//! [`VirtualDataConnector`] serves the `$`-prefixed sample datasets and
//! honours predicate and limit pushdown, which is what the pushdown rules
//! exercise in tests.

use std::collections::HashSet;

use bitflags::bitflags;

use crate::datasets;
use crate::errors::{Error, Result};
use crate::expression::evaluator;
use crate::expression::{CompareOp, Node, NodeType};
use crate::morsel::{Column, Morsel};
use crate::schema::{RelationSchema, SchemaColumn};
use crate::value::{Value, ValueType};

bitflags! {
    /// What a connector supports; the optimizer keys pushdown on these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// `Scan.predicates` will be applied by the connector
        const PREDICATE_PUSHABLE = 0b0000_0001;
        /// `Scan.limit` is honoured
        const LIMIT_PUSHABLE = 0b0000_0010;
        /// Reads can overlap compute; use the read-ahead reader
        const ASYNC_READABLE = 0b0000_0100;
    }
}

/// Broad family of the backing store. SQL-typed connectors are the
/// extension point for pushing whole plan fragments to a remote engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    Internal,
    Sql,
    Document,
    Blob,
}

/// A source of relations.
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Internal
    }

    fn schema(&self, relation: &str) -> Result<RelationSchema>;

    /// May this predicate be evaluated by the connector? Only meaningful
    /// when `PREDICATE_PUSHABLE` is advertised. `types` carries the
    /// resolved operand types; an unresolved operand blocks the push.
    fn can_push(&self, _predicate: &Node, _types: &HashSet<ValueType>) -> bool {
        false
    }

    /// Read a relation, with any pushed column list, predicates and limit
    /// applied, split into morsels of at most `morsel_size` rows.
    fn read_dataset(
        &self,
        relation: &str,
        columns: &[SchemaColumn],
        predicates: &[Node],
        limit: Option<usize>,
        morsel_size: usize,
    ) -> Result<Vec<Morsel>>;
}

/// Serves the built-in `$planets`, `$satellites`, `$astronauts` and
/// `$no_table` datasets from memory.
pub struct VirtualDataConnector;

impl VirtualDataConnector {
    pub fn handles(relation: &str) -> bool {
        relation.starts_with('$')
    }
}

impl Connector for VirtualDataConnector {
    fn name(&self) -> &str {
        "virtual"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PREDICATE_PUSHABLE | Capabilities::LIMIT_PUSHABLE
    }

    fn schema(&self, relation: &str) -> Result<RelationSchema> {
        datasets::schema(relation)
    }

    fn can_push(&self, predicate: &Node, types: &HashSet<ValueType>) -> bool {
        if types
            .iter()
            .any(|t| matches!(t, ValueType::Missing | ValueType::Struct))
        {
            return false;
        }
        if predicate.node_type != NodeType::ComparisonOperator {
            return false;
        }
        matches!(
            predicate.value.as_comparison(),
            Some(
                CompareOp::Eq
                    | CompareOp::NotEq
                    | CompareOp::Gt
                    | CompareOp::GtEq
                    | CompareOp::Lt
                    | CompareOp::LtEq
                    | CompareOp::InList
                    | CompareOp::Like
                    | CompareOp::ILike
            )
        )
    }

    fn read_dataset(
        &self,
        relation: &str,
        columns: &[SchemaColumn],
        predicates: &[Node],
        limit: Option<usize>,
        morsel_size: usize,
    ) -> Result<Vec<Morsel>> {
        let raw = datasets::read(relation)?;

        // relabel the raw columns with the bound identities, in the order
        // the binder requested them
        let mut selected = Vec::with_capacity(columns.len());
        for bound in columns {
            let source = raw
                .columns()
                .iter()
                .find(|c| bound.answers_to(&c.name))
                .ok_or_else(|| Error::ColumnNotFound(bound.name.clone()))?;
            selected.push(Column::new(
                &bound.name,
                &bound.identity,
                source.value_type,
                source.values.clone(),
            ));
        }
        let mut morsel = Morsel::new(selected)?;

        for predicate in predicates {
            let mask = evaluator::evaluate(predicate, &morsel)?;
            let keep: Vec<usize> = mask
                .values
                .iter()
                .enumerate()
                .filter(|(_, v)| matches!(v, Value::Boolean(true)))
                .map(|(i, _)| i)
                .collect();
            morsel = morsel.take(&keep);
        }

        if let Some(limit) = limit {
            morsel = morsel.slice(0, limit);
        }

        Ok(morsel.chunk(morsel_size.max(1)))
    }
}

/// A read-ahead variant of the virtual connector for the engine's tests:
/// it advertises async reads and serves single-row morsels, so the
/// reader's bounded pool sees one commit per row and real back-pressure.
#[cfg(test)]
pub struct AsyncVirtualConnector;

#[cfg(test)]
impl Connector for AsyncVirtualConnector {
    fn name(&self) -> &str {
        "async-virtual"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PREDICATE_PUSHABLE
            | Capabilities::LIMIT_PUSHABLE
            | Capabilities::ASYNC_READABLE
    }

    fn schema(&self, relation: &str) -> Result<RelationSchema> {
        datasets::schema(relation)
    }

    fn can_push(&self, predicate: &Node, types: &HashSet<ValueType>) -> bool {
        VirtualDataConnector.can_push(predicate, types)
    }

    fn read_dataset(
        &self,
        relation: &str,
        columns: &[SchemaColumn],
        predicates: &[Node],
        limit: Option<usize>,
        _morsel_size: usize,
    ) -> Result<Vec<Morsel>> {
        VirtualDataConnector.read_dataset(relation, columns, predicates, limit, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_connector_serves_schema() {
        let connector = VirtualDataConnector;
        let schema = connector.schema("$planets").expect("$planets exists");
        assert_eq!(schema.columns.len(), 20);
        assert_eq!(schema.row_count, Some(9));
    }

    #[test]
    fn unknown_relation_is_dataset_not_found() {
        let connector = VirtualDataConnector;
        assert!(matches!(
            connector.schema("$nothing"),
            Err(Error::DatasetNotFound(_))
        ));
    }

    #[test]
    fn pushed_predicate_and_limit_are_applied() {
        let connector = VirtualDataConnector;
        let schema = connector.schema("$planets").expect("$planets exists");
        let id = schema.find_column("id").expect("id column").clone();
        let predicate = Node::comparison(
            CompareOp::LtEq,
            Node::bound_identifier(id),
            Node::literal(Value::Integer(5)),
        );
        let morsels = connector
            .read_dataset("$planets", &schema.columns, &[predicate], Some(3), 1000)
            .expect("read succeeds");
        let total: usize = morsels.iter().map(Morsel::row_count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn async_variant_advertises_read_ahead_and_drips_rows() {
        assert!(AsyncVirtualConnector
            .capabilities()
            .contains(Capabilities::ASYNC_READABLE));
        let schema = AsyncVirtualConnector
            .schema("$planets")
            .expect("$planets exists");
        let morsels = AsyncVirtualConnector
            .read_dataset("$planets", &schema.columns, &[], None, 1000)
            .expect("read succeeds");
        // one row per morsel, regardless of the requested morsel size
        assert_eq!(morsels.len(), 9);
        assert!(morsels.iter().all(|m| m.row_count() == 1));
    }

    #[test]
    fn can_push_rejects_unresolved_types() {
        let connector = VirtualDataConnector;
        let predicate = Node::comparison(
            CompareOp::Eq,
            Node::identifier("x", None),
            Node::literal(Value::Integer(1)),
        );
        let mut types = HashSet::new();
        types.insert(ValueType::Missing);
        assert!(!connector.can_push(&predicate, &types));
        let mut types = HashSet::new();
        types.insert(ValueType::Integer);
        assert!(connector.can_push(&predicate, &types));
    }
}
