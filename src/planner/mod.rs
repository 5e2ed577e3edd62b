//! Query planning: SQL text to executable plan.
//!
//! ```text
//! SQL -> [rewriter] -> [parser] -> [logical planner] -> [binder]
//!     -> [optimizer] -> [physical planner] -> operators
//! ```

pub mod binder;
pub mod logical_planner;
pub mod physical;
pub mod rewriter;

pub use binder::bind;
pub use logical_planner::{plan_sql, StatementKind};
pub use physical::create_physical_plan;
pub use rewriter::{extract_temporal_filters, TemporalRange};
