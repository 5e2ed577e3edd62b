//! UNION ALL: concatenates its inputs. Column layout is taken from the
//! first morsel to arrive; later inputs are mapped positionally onto it.
//! Plain UNION deduplicates by having the planner wrap this operator in a
//! Distinct.

use crate::errors::{Error, Result};
use crate::morsel::{Column, Message, Morsel};
use crate::operators::ExecutionContext;

pub struct UnionOperator {
    expected_inputs: usize,
    eos_seen: usize,
    layout: Option<Vec<Column>>,
}

impl UnionOperator {
    pub fn new(expected_inputs: usize) -> Self {
        UnionOperator {
            expected_inputs,
            eos_seen: 0,
            layout: None,
        }
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
                    .increment("rows_seen_by_union", morsel.row_count() as u64);
                let layout = self
                    .layout
                    .get_or_insert_with(|| morsel.columns().to_vec());
                if morsel.column_count() != layout.len() {
                    return Err(Error::Sql(format!(
                        "UNION legs have different column counts ({} vs {})",
                        layout.len(),
                        morsel.column_count()
                    )));
                }
                // remap onto the first leg's names and identities
                let columns: Vec<Column> = layout
                    .iter()
                    .zip(morsel.columns().iter())
                    .map(|(template, data)| {
                        Column::new(
                            &template.name,
                            &template.identity,
                            data.value_type,
                            data.values.clone(),
                        )
                    })
                    .collect();
                Ok(vec![Message::Morsel(Morsel::new(columns)?)])
            }
            Message::Eos => {
                self.eos_seen += 1;
                if self.eos_seen >= self.expected_inputs {
                    Ok(vec![Message::Eos])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}
