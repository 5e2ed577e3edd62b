//! Optimization Rule - Split Conjunctive Predicates
//!
//! Conjunctive predicates (ANDs) can be split and executed in any order to
//! get the same result, so every Filter whose condition is an AND chain is
//! rewritten into a sequence of single-conjunct Filters. Smaller
//! predicates have fewer dependencies and are easier to move; running them
//! in turn also means each successive filter sees fewer rows.

use crate::errors::Result;
use crate::expression::{Node, NodeType};
use crate::optimizer::{OptimizationStrategy, OptimizerContext};
use crate::plan::{random_nid, LogicalPlanNode, LogicalPlanStepType};
use crate::statistics::QueryStatistics;

pub struct SplitConjunctivePredicatesStrategy {
    statistics: QueryStatistics,
}

impl SplitConjunctivePredicatesStrategy {
    pub fn new(statistics: QueryStatistics) -> Self {
        SplitConjunctivePredicatesStrategy { statistics }
    }
}

fn inner_split(node: Node, out: &mut Vec<Node>) {
    let mut node = node;
    while node.node_type == NodeType::Nested {
        match node.centre {
            Some(inner) => node = *inner,
            None => return,
        }
    }
    if node.node_type != NodeType::And {
        out.push(node);
        return;
    }
    if let Some(left) = node.left {
        inner_split(*left, out);
    }
    if let Some(right) = node.right {
        inner_split(*right, out);
    }
}

impl OptimizationStrategy for SplitConjunctivePredicatesStrategy {
    fn name(&self) -> &'static str {
        "SplitConjunctivePredicates"
    }

    fn visit(&self, node: &LogicalPlanNode, context: &mut OptimizerContext) -> Result<()> {
        if node.step != LogicalPlanStepType::Filter {
            return Ok(());
        }
        let Some(condition) = node.condition.clone() else {
            return Ok(());
        };

        let mut conjuncts = Vec::new();
        inner_split(condition, &mut conjuncts);
        if conjuncts.is_empty() {
            return Ok(());
        }

        // the visited node keeps the first conjunct; the rest are inserted
        // as fresh filters directly below it
        let first = conjuncts.remove(0);
        let mut replacement = LogicalPlanNode::filter(first);
        replacement.alias = node.alias.clone();
        replacement.all_relations = node.all_relations.clone();
        context
            .optimized_plan
            .add_node(context.node_id.clone(), replacement);

        if !conjuncts.is_empty() {
            self.statistics
                .increment("optimization_split_conjunctive_predicates", 1);
        }
        for conjunct in conjuncts {
            let mut filter = LogicalPlanNode::filter(conjunct);
            filter.all_relations = node.all_relations.clone();
            context
                .optimized_plan
                .insert_node_before(random_nid(), filter, &context.node_id)?;
        }
        Ok(())
    }
}
