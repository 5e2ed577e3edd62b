//! Optimization Rule - Remove Redundant Operators
//!
//! Goal: remove steps which don't affect the result.
//!
//! Runs towards the end of the pipeline. A projection that re-selects
//! exactly the columns its provider already emits does nothing; subquery
//! wrappers were only needed for binding. Both are removed, with their
//! aliases propagated to the surviving provider so later name resolution
//! still works.

use crate::errors::Result;
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct RedundantOperationsStrategy {
    statistics: QueryStatistics,
}

impl RedundantOperationsStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        RedundantOperationsStrategy { statistics }
    }
}

fn identity_set(columns: &[crate::expression::Node]) -> Option<Vec<String>> {
    let mut identities: Vec<String> = columns
        .iter()
        .map(|c| c.identity().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    identities.sort();
    Some(identities)
}

impl OptimizationStrategy for RedundantOperationsStrategy {
    fn name(&self) -> &'static str {
        "RedundantOperations"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        // a projection selecting exactly its provider's columns does nothing
        if node.step == LogicalPlanStepType::Project {
            let providers = context.optimized_plan.ingoing_edges(&context.node_id);
            if providers.len() == 1 {
                let provider_nid = providers[0].0.clone();
                let Some(provider) = context.optimized_plan.get(&provider_nid).cloned() else {
                    return Ok(());
                };
                if provider.step != LogicalPlanStepType::Subquery
                    && !provider.columns.is_empty()
                    && identity_set(&provider.columns).is_some()
                    && identity_set(&provider.columns) == identity_set(&node.columns)
                {
                    let mut provider = provider;
                    // read the alias off the optimized copy: an earlier
                    // subquery removal may have pushed one onto this node
                    let alias = context
                        .optimized_plan
                        .get(&context.node_id)
                        .and_then(|n| n.alias.clone())
                        .or_else(|| node.alias.clone());
                    if let Some(alias) = alias {
                        provider.all_relations.insert(alias);
                    }
                    context.optimized_plan.add_node(provider_nid, provider);
                    context
                        .optimized_plan
                        .remove_node(&context.node_id, true)?;
                    self.statistics
                        .increment("optimization_remove_redundant_operators_project", 1);
                }
            }
        }

        // subqueries are useful for planning but not needed for execution
        if matches!(
            node.step,
            LogicalPlanStepType::Subquery | LogicalPlanStepType::CTE
        ) {
            let providers = context.optimized_plan.ingoing_edges(&context.node_id);
            let Some((mut provider_nid, _, _)) = providers.first().cloned() else {
                return Ok(());
            };
            // with stacked subqueries only the outermost alias matters
            loop {
                let Some(provider) = context.optimized_plan.get(&provider_nid) else {
                    return Ok(());
                };
                if !matches!(
                    provider.step,
                    LogicalPlanStepType::Subquery | LogicalPlanStepType::CTE
                ) {
                    break;
                }
                let inner = context.optimized_plan.ingoing_edges(&provider_nid);
                match inner.first() {
                    Some((nid, _, _)) => provider_nid = nid.clone(),
                    None => return Ok(()),
                }
            }
            let Some(mut provider) = context.optimized_plan.get(&provider_nid).cloned() else {
                return Ok(());
            };
            provider.alias = node.alias.clone();
            if let Some(alias) = node.alias.clone() {
                provider.all_relations.insert(alias);
            }
            context.optimized_plan.add_node(provider_nid, provider);
            context
                .optimized_plan
                .remove_node(&context.node_id, true)?;
            self.statistics
                .increment("optimization_remove_redundant_operators_subquery", 1);
        }

        Ok(())
    }
}
