//! Single-group aggregation.
//!
//! Accumulates every input row into one state per aggregate expression
//! and emits a single-row morsel at end of stream. The same accumulators
//! back grouped aggregation, which keeps one set per group key.

use std::collections::HashSet;

use crate::errors::{Error, Result};
use crate::expression::{evaluator, AggregateFunction, Node, NodeType, NodeValue};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;
use crate::value::{HashableValue, Value, ValueType};

/// Running state for one aggregate expression.
pub enum Accumulator {
    Count {
        count: u64,
        wildcard: bool,
    },
    Sum {
        integer: i64,
        double: f64,
        saw_double: bool,
        saw_value: bool,
    },
    Min(Option<Value>),
    Max(Option<Value>),
    Avg {
        sum: f64,
        count: u64,
    },
    MinMax {
        min: Option<Value>,
        max: Option<Value>,
    },
    Product {
        product: f64,
        saw_value: bool,
    },
    /// Welford online variance; `sample` divides by n-1
    Variance {
        count: u64,
        mean: f64,
        m2: f64,
        stddev: bool,
    },
    Collect {
        values: Vec<Value>,
        distinct: bool,
        limit: Option<usize>,
    },
    First(Option<Value>),
    CountDistinct(HashSet<HashableValue>),
    ApproximateMedian(Vec<f64>),
}

/// Build the accumulator for an aggregate function with its modifiers.
pub fn build_accumulator(
    function: AggregateFunction,
    wildcard: bool,
    distinct: bool,
    limit: Option<usize>,
) -> Accumulator {
    use AggregateFunction::*;
    match function {
        Count if distinct => Accumulator::CountDistinct(HashSet::new()),
        Count => Accumulator::Count { count: 0, wildcard },
        Sum => Accumulator::Sum {
            integer: 0,
            double: 0.0,
            saw_double: false,
            saw_value: false,
        },
        Min => Accumulator::Min(None),
        Max => Accumulator::Max(None),
        Avg => Accumulator::Avg { sum: 0.0, count: 0 },
        MinMax => Accumulator::MinMax {
            min: None,
            max: None,
        },
        Product => Accumulator::Product {
            product: 1.0,
            saw_value: false,
        },
        StdDev => Accumulator::Variance {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            stddev: true,
        },
        Variance => Accumulator::Variance {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            stddev: false,
        },
        List | ArrayAgg => Accumulator::Collect {
            values: Vec::new(),
            distinct,
            limit,
        },
        One | AnyValue => Accumulator::First(None),
        CountDistinct => Accumulator::CountDistinct(HashSet::new()),
        ApproximateMedian => Accumulator::ApproximateMedian(Vec::new()),
    }
}

impl Accumulator {
    pub fn update(&mut self, value: &Value) {
        match self {
            Accumulator::Count { count, wildcard } => {
                if *wildcard || !value.is_null() {
                    *count += 1;
                }
            }
            Accumulator::Sum {
                integer,
                double,
                saw_double,
                saw_value,
            } => match value {
                Value::Integer(i) => {
                    *integer += i;
                    *double += *i as f64;
                    *saw_value = true;
                }
                Value::Double(d) => {
                    *double += d;
                    *saw_double = true;
                    *saw_value = true;
                }
                _ => {}
            },
            Accumulator::Min(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| {
                        value.compare(c) == Some(std::cmp::Ordering::Less)
                    })
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Max(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| {
                        value.compare(c) == Some(std::cmp::Ordering::Greater)
                    })
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            Accumulator::MinMax { min, max } => {
                if !value.is_null() {
                    if min.as_ref().map_or(true, |c| {
                        value.compare(c) == Some(std::cmp::Ordering::Less)
                    }) {
                        *min = Some(value.clone());
                    }
                    if max.as_ref().map_or(true, |c| {
                        value.compare(c) == Some(std::cmp::Ordering::Greater)
                    }) {
                        *max = Some(value.clone());
                    }
                }
            }
            Accumulator::Product { product, saw_value } => {
                if let Some(v) = value.as_f64() {
                    *product *= v;
                    *saw_value = true;
                }
            }
            Accumulator::Variance {
                count, mean, m2, ..
            } => {
                if let Some(v) = value.as_f64() {
                    *count += 1;
                    let delta = v - *mean;
                    *mean += delta / *count as f64;
                    *m2 += delta * (v - *mean);
                }
            }
            Accumulator::Collect {
                values,
                distinct,
                limit,
            } => {
                if value.is_null() {
                    return;
                }
                if limit.is_some_and(|l| values.len() >= l) {
                    return;
                }
                if *distinct && values.iter().any(|v| v.sql_eq(value)) {
                    return;
                }
                values.push(value.clone());
            }
            Accumulator::First(current) => {
                if current.is_none() && !value.is_null() {
                    *current = Some(value.clone());
                }
            }
            Accumulator::CountDistinct(seen) => {
                if !value.is_null() {
                    seen.insert(HashableValue(value.clone()));
                }
            }
            Accumulator::ApproximateMedian(values) => {
                if let Some(v) = value.as_f64() {
                    values.push(v);
                }
            }
        }
    }

    pub fn finish(&self) -> Value {
        match self {
            Accumulator::Count { count, .. } => Value::Integer(*count as i64),
            Accumulator::Sum {
                integer,
                double,
                saw_double,
                saw_value,
            } => {
                if !saw_value {
                    Value::Null
                } else if *saw_double {
                    Value::Double(*double)
                } else {
                    Value::Integer(*integer)
                }
            }
            Accumulator::Min(current) | Accumulator::Max(current) => {
                current.clone().unwrap_or(Value::Null)
            }
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Double(sum / *count as f64)
                }
            }
            Accumulator::MinMax { min, max } => Value::Array(vec![
                min.clone().unwrap_or(Value::Null),
                max.clone().unwrap_or(Value::Null),
            ]),
            Accumulator::Product { product, saw_value } => {
                if *saw_value {
                    Value::Double(*product)
                } else {
                    Value::Null
                }
            }
            Accumulator::Variance {
                count, m2, stddev, ..
            } => {
                if *count < 2 {
                    Value::Null
                } else {
                    let variance = m2 / (*count as f64 - 1.0);
                    if *stddev {
                        Value::Double(variance.sqrt())
                    } else {
                        Value::Double(variance)
                    }
                }
            }
            Accumulator::Collect { values, .. } => Value::Array(values.clone()),
            Accumulator::First(current) => current.clone().unwrap_or(Value::Null),
            Accumulator::CountDistinct(seen) => Value::Integer(seen.len() as i64),
            Accumulator::ApproximateMedian(values) => {
                if values.is_empty() {
                    Value::Null
                } else {
                    let mut sorted = values.clone();
                    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    let mid = sorted.len() / 2;
                    if sorted.len() % 2 == 1 {
                        Value::Double(sorted[mid])
                    } else {
                        Value::Double((sorted[mid - 1] + sorted[mid]) / 2.0)
                    }
                }
            }
        }
    }
}

/// Pull the function and modifiers off an aggregator node.
pub fn aggregate_parts(node: &Node) -> Result<(AggregateFunction, bool, bool, Option<usize>)> {
    let NodeValue::Aggregate(function) = node.value else {
        return Err(Error::InvalidInternalState(
            "aggregate operator configured with a non-aggregate expression".to_string(),
        ));
    };
    let wildcard = node
        .parameters
        .first()
        .map_or(true, |p| p.node_type == NodeType::Wildcard);
    Ok((function, wildcard, node.distinct, node.agg_limit))
}

/// Feed one morsel's parameter values into an accumulator.
pub fn accumulate(
    aggregate: &Node,
    accumulator: &mut Accumulator,
    morsel: &Morsel,
) -> Result<()> {
    let (_, wildcard, _, _) = aggregate_parts(aggregate)?;
    if wildcard {
        for _ in 0..morsel.row_count() {
            accumulator.update(&Value::Integer(1));
        }
        return Ok(());
    }
    let parameter = aggregate.parameters.first().ok_or_else(|| {
        Error::InvalidInternalState("aggregator with no parameter".to_string())
    })?;
    let column = evaluator::evaluate(parameter, morsel)?;
    for value in &column.values {
        accumulator.update(value);
    }
    Ok(())
}

/// Single-group aggregation over the whole input.
pub struct AggregateOperator {
    aggregates: Vec<Node>,
    accumulators: Vec<Accumulator>,
}

impl AggregateOperator {
    pub fn new(aggregates: Vec<Node>) -> Result<Self> {
        let mut accumulators = Vec::with_capacity(aggregates.len());
        for aggregate in &aggregates {
            let (function, wildcard, distinct, limit) = aggregate_parts(aggregate)?;
            accumulators.push(build_accumulator(function, wildcard, distinct, limit));
        }
        Ok(AggregateOperator {
            aggregates,
            accumulators,
        })
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        match message {
            Message::Morsel(morsel) => {
                context
                    .statistics
                    .increment("rows_seen_by_aggregate", morsel.row_count() as u64);
                for (aggregate, accumulator) in
                    self.aggregates.iter().zip(self.accumulators.iter_mut())
                {
                    accumulate(aggregate, accumulator, &morsel)?;
                }
                Ok(Vec::new())
            }
            Message::Eos => {
                let columns: Vec<Column> = self
                    .aggregates
                    .iter()
                    .zip(self.accumulators.iter())
                    .map(|(aggregate, accumulator)| {
                        let value = accumulator.finish();
                        let value_type = match value.value_type() {
                            ValueType::Null => ValueType::Integer,
                            t => t,
                        };
                        Column::new(
                            aggregate.current_name(),
                            aggregate
                                .identity()
                                .map_or_else(|| aggregate.uuid.clone(), str::to_string),
                            value_type,
                            vec![value],
                        )
                    })
                    .collect();
                Ok(vec![Message::Morsel(Morsel::new(columns)?), Message::Eos])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;
    use crate::statistics::QueryStatistics;

    fn morsel(values: Vec<Value>) -> (Morsel, SchemaColumn) {
        let column = SchemaColumn::new("n", ValueType::Integer);
        let morsel = Morsel::new(vec![Column::new(
            "n",
            column.identity.clone(),
            ValueType::Integer,
            values,
        )])
        .expect("well formed");
        (morsel, column)
    }

    #[test]
    fn count_star_counts_nulls_too() {
        let (data, _) = morsel(vec![Value::Integer(1), Value::Null, Value::Integer(3)]);
        let count = Node::aggregate(AggregateFunction::Count, vec![Node::wildcard()]);
        let mut op = AggregateOperator::new(vec![count]).expect("operator builds");
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        op.process(Message::Morsel(data), &context).expect("accumulates");
        let out = op.process(Message::Eos, &context).expect("finishes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.columns()[0].values[0], Value::Integer(3));
    }

    #[test]
    fn count_column_skips_nulls() {
        let (data, column) = morsel(vec![Value::Integer(1), Value::Null, Value::Integer(3)]);
        let count = Node::aggregate(
            AggregateFunction::Count,
            vec![Node::bound_identifier(column)],
        );
        let mut op = AggregateOperator::new(vec![count]).expect("operator builds");
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);
        op.process(Message::Morsel(data), &context).expect("accumulates");
        let out = op.process(Message::Eos, &context).expect("finishes");
        let Message::Morsel(result) = &out[0] else {
            panic!("expected morsel")
        };
        assert_eq!(result.columns()[0].values[0], Value::Integer(2));
    }

    #[test]
    fn sum_stays_integer_until_a_double_arrives() {
        let mut accumulator = build_accumulator(AggregateFunction::Sum, false, false, None);
        accumulator.update(&Value::Integer(2));
        accumulator.update(&Value::Integer(3));
        assert_eq!(accumulator.finish(), Value::Integer(5));
        accumulator.update(&Value::Double(0.5));
        assert_eq!(accumulator.finish(), Value::Double(5.5));
    }

    #[test]
    fn count_distinct_and_median() {
        let mut distinct = build_accumulator(AggregateFunction::CountDistinct, false, true, None);
        for v in [1, 2, 2, 3, 1] {
            distinct.update(&Value::Integer(v));
        }
        assert_eq!(distinct.finish(), Value::Integer(3));

        let mut median =
            build_accumulator(AggregateFunction::ApproximateMedian, false, false, None);
        for v in [5.0, 1.0, 3.0] {
            median.update(&Value::Double(v));
        }
        assert_eq!(median.finish(), Value::Double(3.0));
    }

    #[test]
    fn array_agg_respects_distinct_and_limit() {
        let mut collect = build_accumulator(AggregateFunction::ArrayAgg, false, true, Some(2));
        for v in [1, 1, 2, 3] {
            collect.update(&Value::Integer(v));
        }
        assert_eq!(
            collect.finish(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn stddev_of_constant_inputs_is_zero() {
        let mut stddev = build_accumulator(AggregateFunction::StdDev, false, false, None);
        for _ in 0..4 {
            stddev.update(&Value::Integer(7));
        }
        assert_eq!(stddev.finish(), Value::Double(0.0));
    }
}
