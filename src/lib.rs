//! # Quarry SQL Engine
//!
//! An embedded SQL query engine: parse SQL, build a logical plan,
//! optimize it through a rule-based cost-aware pipeline, and execute it
//! over columnar morsels drawn from pluggable connectors.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! SQL Source Text
//!     ↓
//! [SQL Rewriter]          → temporal filters extracted
//!     ↓
//! [Parser]                → AST (delegated, MySQL-flavoured)
//!     ↓
//! [Logical Planner]       → LogicalPlan (DAG of plan steps)
//!     ↓
//! [Binder]                → identities, types, connectors, join keys
//!     ↓
//! [Optimizer]             → strategy pipeline over the plan
//!     ↓
//! [Physical Planner]      → operator instances
//!     ↓
//! [Executor]              → morsel-parallel pull of results
//!     ↓
//! Results
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use quarry::Session;
//!
//! let mut session = Session::default();
//! let result = session
//!     .execute("SELECT name FROM $planets ORDER BY id LIMIT 3")
//!     .expect("query runs");
//! assert_eq!(result.shape(), (3, 1));
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `planner` | SQL → logical plan → bound plan → operators |
//! | `optimizer` | The rule pipeline and its strategies |
//! | `operators` | Physical operators (joins, aggregates, sorts, ...) |
//! | `executor` | The work-unit driver and worker pool |
//! | `plan` | Plan graphs and logical plan nodes |
//! | `expression` | Expression trees, the operator map, evaluation |
//! | `morsel` | Columnar batches flowing between operators |
//! | `connectors` | Data source trait and capability flags |
//! | `datasets` | Built-in `$planets`, `$satellites`, `$astronauts` |

pub mod config;
pub mod connectors;
pub mod datasets;
pub mod display;
pub mod errors;
pub mod executor;
pub mod expression;
pub mod morsel;
pub mod operators;
pub mod optimizer;
pub mod permissions;
pub mod plan;
pub mod planner;
pub mod schema;
pub mod session;
pub mod statistics;
pub mod value;

// Re-export the public surface for convenience
pub use config::Config;
pub use errors::{Error, Result};
pub use morsel::{Column, Message, Morsel};
pub use permissions::Permission;
pub use schema::{RelationSchema, SchemaColumn};
pub use session::{ResultSet, Session};
pub use statistics::QueryStatistics;
pub use value::{Value, ValueType};
