//! Property tests for the algebraic guarantees the optimizer relies on.

use proptest::prelude::*;

use quarry::expression::{evaluator, CompareOp, Node};
use quarry::morsel::{Column, Morsel};
use quarry::operators::{
    ExecutionContext, HeapSortOperator, LimitOperator, SortOperator,
};
use quarry::morsel::Message;
use quarry::plan::Direction;
use quarry::schema::SchemaColumn;
use quarry::statistics::QueryStatistics;
use quarry::value::{Value, ValueType};

fn int_morsel(column: &SchemaColumn, values: &[i64]) -> Morsel {
    Morsel::new(vec![Column::new(
        &column.name,
        &column.identity,
        ValueType::Integer,
        values.iter().copied().map(Value::Integer).collect(),
    )])
    .expect("well formed")
}

proptest! {
    /// NOT NOT x evaluates identically to x.
    #[test]
    fn double_negation_round_trips(values in proptest::collection::vec(-50i64..50, 1..40), threshold in -50i64..50) {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let morsel = int_morsel(&column, &values);

        let predicate = Node::comparison(
            CompareOp::Gt,
            Node::bound_identifier(column),
            Node::literal(Value::Integer(threshold)),
        );
        let double_negated = Node::not(Node::not(predicate.clone()));

        let direct = evaluator::evaluate(&predicate, &morsel).expect("evaluates");
        let wrapped = evaluator::evaluate(&double_negated, &morsel).expect("evaluates");
        prop_assert_eq!(direct.values, wrapped.values);
    }

    /// The boolean inversion table is an involution over evaluation:
    /// NOT (a op b) equals (a op' b) row-wise.
    #[test]
    fn inversion_matches_negation(values in proptest::collection::vec(-20i64..20, 1..40), threshold in -20i64..20) {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let morsel = int_morsel(&column, &values);

        for op in [CompareOp::Eq, CompareOp::Gt, CompareOp::GtEq, CompareOp::Lt, CompareOp::LtEq, CompareOp::NotEq] {
            let inverse = op.inverse().expect("core comparisons invert");
            let negated = Node::not(Node::comparison(
                op,
                Node::bound_identifier(column.clone()),
                Node::literal(Value::Integer(threshold)),
            ));
            let inverted = Node::comparison(
                inverse,
                Node::bound_identifier(column.clone()),
                Node::literal(Value::Integer(threshold)),
            );
            let negated_out = evaluator::evaluate(&negated, &morsel).expect("evaluates");
            let inverted_out = evaluator::evaluate(&inverted, &morsel).expect("evaluates");
            prop_assert_eq!(negated_out.values, inverted_out.values);
        }
    }

    /// HeapSort(K) produces exactly Sort then Limit(K), rows and order.
    #[test]
    fn heap_sort_equals_sort_then_limit(values in proptest::collection::vec(-1000i64..1000, 0..120), k in 1usize..12) {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let order = vec![(Node::bound_identifier(column.clone()), Direction::Ascending)];

        let mut heap = HeapSortOperator::new(order.clone(), k);
        let mut sort = SortOperator::new(order);
        let mut limit = LimitOperator::new(Some(k), None);

        // feed in small morsels to force intermediate shrinks
        for chunk in values.chunks(3) {
            let morsel = int_morsel(&column, chunk);
            heap.process(Message::Morsel(morsel.clone()), &context).expect("heap accepts");
            sort.process(Message::Morsel(morsel), &context).expect("sort accepts");
        }

        let heap_rows = drain(&mut |m| heap.process(m, &context));
        let mut sorted_rows = Vec::new();
        for message in sort.process(Message::Eos, &context).expect("sort flushes") {
            for message in limit.process(message, &context).expect("limit applies") {
                if let Message::Morsel(morsel) = message {
                    sorted_rows.extend(morsel.columns()[0].values.clone());
                }
            }
        }
        prop_assert_eq!(heap_rows, sorted_rows);
    }

    /// Limit/offset agree with slicing the full materialised input.
    #[test]
    fn limit_offset_matches_slicing(values in proptest::collection::vec(-100i64..100, 0..60), limit in 0usize..20, offset in 0usize..20) {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        let mut operator = LimitOperator::new(Some(limit), Some(offset));

        let mut collected = Vec::new();
        for chunk in values.chunks(7) {
            let out = operator
                .process(Message::Morsel(int_morsel(&column, chunk)), &context)
                .expect("limit accepts");
            for message in out {
                if let Message::Morsel(morsel) = message {
                    collected.extend(morsel.columns()[0].values.clone());
                }
            }
        }

        let expected: Vec<Value> = values
            .iter()
            .skip(offset)
            .take(limit)
            .copied()
            .map(Value::Integer)
            .collect();
        prop_assert_eq!(collected, expected);
    }
}

fn drain(
    process: &mut dyn FnMut(Message) -> quarry::Result<Vec<Message>>,
) -> Vec<Value> {
    let mut rows = Vec::new();
    for message in process(Message::Eos).expect("flushes") {
        if let Message::Morsel(morsel) = message {
            rows.extend(morsel.columns()[0].values.clone());
        }
    }
    rows
}
