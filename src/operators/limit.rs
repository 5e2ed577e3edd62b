//! LIMIT / OFFSET: skips the first `offset` rows then emits up to `limit`
//! rows. Once satisfied, further morsels are dropped without copying; the
//! executor stops feeding a satisfied limit's subtree when the scans
//! observe cancellation.

use crate::errors::Result;
use crate::morsel::Message;
use crate::operators::ExecutionContext;

pub struct LimitOperator {
    limit: Option<usize>,
    offset: usize,
    rows_skipped: usize,
    rows_emitted: usize,
}

impl LimitOperator {
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        LimitOperator {
            limit,
            offset: offset.unwrap_or(0),
            rows_skipped: 0,
            rows_emitted: 0,
        }
    }

    pub fn process(
        &mut self,
        message: Message,
        context: &ExecutionContext,
    ) -> Result<Vec<Message>> {
        let Message::Morsel(morsel) = message else {
            return Ok(vec![Message::Eos]);
        };
        context
            .statistics
            .increment("rows_seen_by_limit", morsel.row_count() as u64);

        let mut morsel = morsel;

        // burn through the offset first
        if self.rows_skipped < self.offset {
            let to_skip = (self.offset - self.rows_skipped).min(morsel.row_count());
            self.rows_skipped += to_skip;
            morsel = morsel.slice(to_skip, morsel.row_count() - to_skip);
        }

        if let Some(limit) = self.limit {
            if self.rows_emitted >= limit {
                return Ok(vec![Message::Morsel(morsel.slice(0, 0))]);
            }
            let remaining = limit - self.rows_emitted;
            if morsel.row_count() > remaining {
                morsel = morsel.slice(0, remaining);
            }
        }
        self.rows_emitted += morsel.row_count();
        Ok(vec![Message::Morsel(morsel)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::{Column, Morsel};
    use crate::statistics::QueryStatistics;
    use crate::value::{Value, ValueType};

    fn numbers(range: std::ops::Range<i64>) -> Morsel {
        Morsel::new(vec![Column::from_values(
            "n",
            ValueType::Integer,
            range.map(Value::Integer).collect(),
        )])
        .expect("well formed")
    }

    #[test]
    fn offset_then_limit_across_morsels() {
        let mut limit = LimitOperator::new(Some(3), Some(2));
        let context = ExecutionContext::new(QueryStatistics::new(), 1000);

        let out1 = limit
            .process(Message::Morsel(numbers(0..4)), &context)
            .expect("first");
        let Message::Morsel(m1) = &out1[0] else {
            panic!("expected morsel")
        };
        // rows 0,1 skipped; 2,3 emitted
        assert_eq!(m1.row_count(), 2);
        assert_eq!(m1.columns()[0].values[0], Value::Integer(2));

        let out2 = limit
            .process(Message::Morsel(numbers(4..8)), &context)
            .expect("second");
        let Message::Morsel(m2) = &out2[0] else {
            panic!("expected morsel")
        };
        // only one more row fits the limit
        assert_eq!(m2.row_count(), 1);
        assert_eq!(m2.columns()[0].values[0], Value::Integer(4));

        let out3 = limit
            .process(Message::Morsel(numbers(8..10)), &context)
            .expect("third");
        let Message::Morsel(m3) = &out3[0] else {
            panic!("expected morsel")
        };
        assert_eq!(m3.row_count(), 0);
    }
}
