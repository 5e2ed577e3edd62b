//! Sessions: the engine's front door.
//!
//! A [`Session`] holds the configuration, permission set and variables,
//! and runs the whole pipeline for each statement: temporal rewrite,
//! parse, logical plan, bind, permission check, optimize, physical plan,
//! execute. Results come back as a [`ResultSet`] over the collected
//! morsels.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::executor;
use crate::morsel::Morsel;
use crate::operators::{CancelToken, ExecutionContext};
use crate::optimizer::CostBasedOptimizer;
use crate::permissions::{check_permission, Permission};
use crate::plan::{self, LogicalPlan, LogicalPlanStepType};
use crate::planner::{self, StatementKind};
use crate::statistics::QueryStatistics;
use crate::value::{Value, ValueType};

/// The rows and columns a query produced.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<(String, ValueType)>,
    morsels: Vec<Morsel>,
    statistics: QueryStatistics,
}

impl ResultSet {
    fn from_morsels(morsels: Vec<Morsel>, statistics: QueryStatistics) -> Self {
        let columns = morsels
            .first()
            .map(|m| {
                m.columns()
                    .iter()
                    .map(|c| (c.name.clone(), c.value_type))
                    .collect()
            })
            .unwrap_or_default();
        ResultSet {
            columns,
            morsels,
            statistics,
        }
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (
            self.morsels.iter().map(Morsel::row_count).sum(),
            self.columns.len(),
        )
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column_types(&self) -> Vec<ValueType> {
        self.columns.iter().map(|(_, t)| *t).collect()
    }

    /// All rows, materialised in order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        for morsel in &self.morsels {
            for row in 0..morsel.row_count() {
                rows.push(morsel.row(row));
            }
        }
        rows
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<Value> {
        self.rows().get(row).and_then(|r| r.get(column)).cloned()
    }

    pub fn statistics(&self) -> &QueryStatistics {
        &self.statistics
    }
}

/// An engine session.
pub struct Session {
    config: Config,
    permissions: HashSet<Permission>,
    variables: Arc<Mutex<BTreeMap<String, Value>>>,
    query_counter: u64,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Session {
            config,
            permissions: Permission::all(),
            variables: Arc::new(Mutex::new(BTreeMap::new())),
            query_counter: 0,
        }
    }

    pub fn with_permissions(mut self, permissions: HashSet<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Run a statement end to end.
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let started = std::time::Instant::now();
        self.query_counter += 1;
        let query_id = format!(
            "q{}-{}",
            self.query_counter,
            uuid::Uuid::new_v4().simple()
        );
        let statistics = QueryStatistics::for_query(&query_id);

        let (clean_sql, temporal_ranges) = planner::extract_temporal_filters(sql)?;
        let (mut logical_plan, kind) = planner::plan_sql(&clean_sql)?;

        let required = match kind {
            StatementKind::Query => Permission::Query,
            StatementKind::Execute => Permission::Execute,
            StatementKind::Analyze => Permission::Analyze,
        };
        check_permission(required, &self.permissions)?;

        let bind_started = std::time::Instant::now();
        planner::bind(&mut logical_plan, &temporal_ranges)?;
        statistics.add_time("time_planning", bind_started.elapsed().as_nanos() as u64);

        let optimize_started = std::time::Instant::now();
        let optimizer =
            CostBasedOptimizer::new(statistics.clone(), self.config.optimizer.disabled);
        let mut optimized = optimizer.optimize(logical_plan)?;
        statistics.add_time(
            "time_optimizing",
            optimize_started.elapsed().as_nanos() as u64,
        );

        let context = ExecutionContext {
            statistics: statistics.clone(),
            variables: Arc::clone(&self.variables),
            cancel: CancelToken::new(),
            morsel_size: self.config.engine.morsel_size,
        };

        // EXPLAIN renders (and for ANALYZE also runs) the optimized plan
        if let Some(explain_nid) = find_step(&optimized, LogicalPlanStepType::Explain) {
            optimized = self.prepare_explain(optimized, &explain_nid, &context)?;
        }

        debug!(query = %query_id, "executing plan");
        let mut physical_plan =
            planner::create_physical_plan(&optimized, &self.config.engine)?;
        let morsels = executor::execute(
            &mut physical_plan,
            &context,
            self.config.engine.worker_threads,
        )?;

        statistics.add_time("time_total", started.elapsed().as_nanos() as u64);
        Ok(ResultSet::from_morsels(morsels, statistics))
    }

    /// Replace the plan with a single Explain leaf carrying the rendered
    /// tree (and, for ANALYZE, the runtime statistics of a real run).
    fn prepare_explain(
        &self,
        mut plan: LogicalPlan,
        explain_nid: &str,
        context: &ExecutionContext,
    ) -> Result<LogicalPlan> {
        let analyze = plan
            .get(explain_nid)
            .map(|n| n.analyze)
            .unwrap_or(false);

        // render the subtree below the explain node
        let mut subplan = plan.clone();
        subplan.remove_node(explain_nid, true)?;
        let mut lines: Vec<String> = plan::draw(&subplan)
            .into_iter()
            .map(|(depth, label)| format!("{}{label}", "  ".repeat(depth)))
            .collect();

        if analyze {
            let mut physical_plan =
                planner::create_physical_plan(&subplan, &self.config.engine)?;
            executor::execute(
                &mut physical_plan,
                context,
                self.config.engine.worker_threads,
            )?;
            lines.push(String::new());
            for (name, value) in context.statistics.as_map() {
                lines.push(format!("{name}: {value}"));
            }
        }

        let mut explain_plan = LogicalPlan::new();
        let mut node = plan
            .get(explain_nid)
            .cloned()
            .ok_or_else(|| Error::InvalidInternalState("explain node vanished".to_string()))?;
        node.items = lines;
        explain_plan.add_node(explain_nid.to_string(), node);
        Ok(explain_plan)
    }
}

fn find_step(plan: &LogicalPlan, step: LogicalPlanStepType) -> Option<String> {
    plan.nodes()
        .find(|(_, node)| node.step == step)
        .map(|(nid, _)| nid.clone())
}

impl Default for Session {
    fn default() -> Self {
        Session::new(Config::default())
    }
}
