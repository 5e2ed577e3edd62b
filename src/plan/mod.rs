//! Plan graphs: the generic DAG plus the logical plan node vocabulary.

pub mod graph;
pub mod logical;

pub use graph::{random_nid, JoinLeg, Nid, PlanGraph};
pub use logical::{
    draw, Direction, JoinType, LogicalPlan, LogicalPlanNode, LogicalPlanStepType,
};
