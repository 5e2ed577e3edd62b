//! The physical planner.
//!
//! A thin one-to-one mapping from logical steps to operator instances,
//! with dispatch on the join type and the SHOW subtype. The interesting
//! choices: an inner join on exactly one VARCHAR key uses the
//! single-key hash join, small inner joins picked by the optimizer run
//! as nested loops, outer and cross joins use the bespoke operators, and
//! a scan whose connector advertises async reads takes the read-ahead
//! path inside the reader.

use crate::config::EngineConfig;
use crate::errors::{Error, Result};
use crate::executor::PhysicalPlan;
use crate::operators::{
    AggregateAndGroupOperator, AggregateOperator, CrossJoinOperator, CrossJoinUnnestOperator,
    DistinctOperator, ExitOperator, ExplainOperator, FilterJoinOperator, FilterOperator,
    FunctionDatasetOperator, InnerJoinOperator, InnerJoinSingleOperator, LimitOperator,
    MetadataWriterOperator, NestedLoopJoinOperator, OuterJoinOperator, PhysicalOperator,
    ProjectionOperator, ReaderOperator, SetVariableOperator, ShowColumnsOperator,
    ShowValueOperator, SortOperator,
};
use crate::plan::{JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType};
use crate::value::{Value, ValueType};

/// Map every logical node to a concrete operator and copy the edges.
pub fn create_physical_plan(
    logical_plan: &LogicalPlan,
    engine: &EngineConfig,
) -> Result<PhysicalPlan> {
    let mut plan = PhysicalPlan::new();

    for (nid, node) in logical_plan.nodes() {
        let operator = build_operator(node, logical_plan, nid, engine)?;
        plan.add_node(nid.clone(), operator);
    }
    for (source, target, leg) in logical_plan.edges() {
        plan.add_edge(source.clone(), target.clone(), *leg)?;
    }
    Ok(plan)
}

fn build_operator(
    node: &LogicalPlanNode,
    logical_plan: &LogicalPlan,
    nid: &str,
    engine: &EngineConfig,
) -> Result<PhysicalOperator> {
    let operator = match node.step {
        LogicalPlanStepType::Scan => {
            let connector = node.connector.clone().ok_or_else(|| {
                Error::InvalidInternalState("scan reached execution unbound".to_string())
            })?;
            let relation = node.relation.clone().unwrap_or_default();
            let columns = node
                .columns
                .iter()
                .filter_map(|c| c.schema_column.clone())
                .collect();
            PhysicalOperator::Reader(ReaderOperator::new(
                connector,
                relation,
                columns,
                node.predicates.clone(),
                node.limit,
                engine.morsel_pool_capacity,
                engine.pool_commit_retries,
            ))
        }
        LogicalPlanStepType::FunctionDataset => PhysicalOperator::FunctionDataset(
            FunctionDatasetOperator::new(
                node.function.clone().unwrap_or_else(|| "EMPTY".to_string()),
                node.columns
                    .iter()
                    .filter_map(|c| c.schema_column.clone())
                    .collect(),
            ),
        ),
        LogicalPlanStepType::Filter => {
            let condition = node.condition.clone().ok_or_else(|| {
                Error::InvalidInternalState("filter with no condition".to_string())
            })?;
            PhysicalOperator::Filter(FilterOperator::new(condition))
        }
        LogicalPlanStepType::Project => {
            PhysicalOperator::Projection(ProjectionOperator::new(node.columns.clone()))
        }
        LogicalPlanStepType::Aggregate => {
            PhysicalOperator::Aggregate(AggregateOperator::new(node.aggregates.clone())?)
        }
        LogicalPlanStepType::AggregateAndGroup => {
            PhysicalOperator::AggregateAndGroup(AggregateAndGroupOperator::new(
                node.groups.clone(),
                node.aggregates.clone(),
                node.projection.clone(),
            ))
        }
        LogicalPlanStepType::Join => build_join(node)?,
        LogicalPlanStepType::Unnest => {
            let source = node.unnest_column.clone().ok_or_else(|| {
                Error::InvalidInternalState("unnest with no column".to_string())
            })?;
            let target = node.unnest_target.clone().ok_or_else(|| {
                Error::InvalidInternalState("unnest with no target".to_string())
            })?;
            PhysicalOperator::CrossJoinUnnest(CrossJoinUnnestOperator::new(
                source,
                target,
                node.filters.clone(),
                node.distinct,
            ))
        }
        LogicalPlanStepType::Limit => {
            PhysicalOperator::Limit(LimitOperator::new(node.limit, node.offset))
        }
        LogicalPlanStepType::Offset => {
            PhysicalOperator::Limit(LimitOperator::new(None, node.offset))
        }
        LogicalPlanStepType::Order => {
            PhysicalOperator::Sort(SortOperator::new(node.order_by.clone()))
        }
        LogicalPlanStepType::HeapSort => {
            let limit = node.limit.ok_or_else(|| {
                Error::InvalidInternalState("heap sort with no limit".to_string())
            })?;
            PhysicalOperator::HeapSort(crate::operators::HeapSortOperator::new(
                node.order_by.clone(),
                limit,
            ))
        }
        LogicalPlanStepType::Distinct => {
            PhysicalOperator::Distinct(DistinctOperator::new(node.distinct_on.clone()))
        }
        LogicalPlanStepType::Union => {
            let inputs = logical_plan.ingoing_edges(nid).len();
            PhysicalOperator::Union(crate::operators::UnionOperator::new(inputs.max(1)))
        }
        // subqueries and CTE wrappers that survive (optimizer disabled)
        // pass morsels straight through
        LogicalPlanStepType::Subquery | LogicalPlanStepType::CTE => {
            PhysicalOperator::Exit(ExitOperator::new(Vec::new()))
        }
        LogicalPlanStepType::Exit => {
            PhysicalOperator::Exit(ExitOperator::new(node.columns.clone()))
        }
        LogicalPlanStepType::Explain => {
            // the session renders the plan into the node before physical
            // planning; the operator just emits it
            let lines = node.items.iter().map(|l| (0, l.clone())).collect();
            PhysicalOperator::Explain(ExplainOperator::new(lines))
        }
        LogicalPlanStepType::Set => {
            let variable = node.variable.clone().ok_or_else(|| {
                Error::InvalidInternalState("SET with no variable".to_string())
            })?;
            PhysicalOperator::SetVariable(SetVariableOperator::new(
                variable,
                node.value.clone().unwrap_or(Value::Null),
            ))
        }
        LogicalPlanStepType::Show => match node.object_type.as_deref() {
            Some("VARIABLE") => {
                let name = node.items.first().cloned().ok_or_else(|| {
                    Error::InvalidInternalState("SHOW with no subject".to_string())
                })?;
                PhysicalOperator::ShowValue(ShowValueOperator::new(name))
            }
            other => {
                return Err(Error::UnsupportedSyntax(format!(
                    "SHOW type '{}' is not supported",
                    other.unwrap_or("?")
                )))
            }
        },
        LogicalPlanStepType::ShowColumns => {
            let schema = node.schema.clone().ok_or_else(|| {
                Error::InvalidInternalState("SHOW COLUMNS reached execution unbound".to_string())
            })?;
            PhysicalOperator::ShowColumns(ShowColumnsOperator::new(schema))
        }
        LogicalPlanStepType::MetadataWriter => {
            PhysicalOperator::MetadataWriter(MetadataWriterOperator::new())
        }
    };
    Ok(operator)
}

fn build_join(node: &LogicalPlanNode) -> Result<PhysicalOperator> {
    let join_type = node.join_type.ok_or_else(|| {
        Error::InvalidInternalState("join with no type".to_string())
    })?;
    Ok(match join_type {
        JoinType::Inner => {
            // single VARCHAR keys get the specialised string-keyed table
            let single_varchar = node.left_columns.len() == 1
                && node
                    .left_columns
                    .first()
                    .and_then(|c| c.schema_column.as_ref())
                    .map(|c| c.value_type)
                    == Some(ValueType::Varchar);
            if single_varchar {
                let left = node.left_columns[0].clone();
                let right = node.right_columns[0].clone();
                PhysicalOperator::InnerJoinSingle(InnerJoinSingleOperator::new(left, right))
            } else {
                PhysicalOperator::InnerJoin(InnerJoinOperator::new(
                    node.left_columns.clone(),
                    node.right_columns.clone(),
                ))
            }
        }
        JoinType::NestedInner => PhysicalOperator::NestedLoopJoin(NestedLoopJoinOperator::new(
            node.left_columns.clone(),
            node.right_columns.clone(),
        )),
        JoinType::LeftOuter | JoinType::RightOuter | JoinType::FullOuter => {
            PhysicalOperator::OuterJoin(OuterJoinOperator::new(
                join_type,
                node.left_columns.clone(),
                node.right_columns.clone(),
                node.left_schema.clone(),
                node.right_schema.clone(),
            ))
        }
        JoinType::CrossJoin => PhysicalOperator::CrossJoin(CrossJoinOperator::new()),
        JoinType::LeftSemi | JoinType::LeftAnti | JoinType::RightSemi | JoinType::RightAnti => {
            PhysicalOperator::FilterJoin(FilterJoinOperator::new(
                join_type,
                node.left_columns.clone(),
                node.right_columns.clone(),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::binder::bind;
    use crate::planner::logical_planner::plan_sql;

    fn physical_for(sql: &str) -> PhysicalPlan {
        let (mut plan, _) = plan_sql(sql).expect("plans");
        bind(&mut plan, &[]).expect("binds");
        create_physical_plan(&plan, &EngineConfig::default()).expect("maps")
    }

    #[test]
    fn nodes_and_edges_carry_over() {
        let plan = physical_for("SELECT name FROM $planets WHERE id < 5");
        // scan, filter, project, exit
        assert_eq!(plan.node_count(), 4);
        assert_eq!(plan.get_entry_points().len(), 1);
        assert_eq!(plan.get_exit_points().len(), 1);
    }

    #[test]
    fn varchar_single_key_join_is_specialised() {
        let plan = physical_for(
            "SELECT * FROM $satellites INNER JOIN $planets ON $satellites.name = $planets.name",
        );
        let specialised = plan
            .nodes()
            .any(|(_, op)| matches!(op, PhysicalOperator::InnerJoinSingle(_)));
        assert!(specialised);
    }

    #[test]
    fn integer_key_join_uses_the_generic_hash_join() {
        let plan = physical_for(
            "SELECT * FROM $satellites INNER JOIN $planets ON $satellites.planetId = $planets.id",
        );
        let generic = plan
            .nodes()
            .any(|(_, op)| matches!(op, PhysicalOperator::InnerJoin(_)));
        assert!(generic);
    }
}
