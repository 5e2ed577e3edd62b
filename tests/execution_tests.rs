//! Engine-level execution behaviour: worker-pool equivalence, statistics,
//! EXPLAIN, temporal clause handling and session state.

use quarry::{Config, Session, Value};

#[test]
fn worker_pool_and_serial_execution_agree() {
    let queries = [
        "SELECT name FROM $satellites WHERE planetId = 6",
        "SELECT * FROM $satellites INNER JOIN $planets USING (id)",
        "SELECT COUNT(*), planetId FROM $satellites GROUP BY planetId",
    ];
    for sql in queries {
        let mut serial_config = Config::default();
        serial_config.engine.worker_threads = 1;
        let mut parallel_config = Config::default();
        parallel_config.engine.worker_threads = 4;

        let serial = Session::new(serial_config)
            .execute(sql)
            .expect("serial runs");
        let parallel = Session::new(parallel_config)
            .execute(sql)
            .expect("parallel runs");
        assert_eq!(serial.shape(), parallel.shape(), "{sql}");
        assert_eq!(serial.rows(), parallel.rows(), "{sql}");
    }
}

#[test]
fn small_morsels_produce_the_same_results() {
    let mut config = Config::default();
    config.engine.morsel_size = 7;
    let mut session = Session::new(config);
    let result = session
        .execute("SELECT * FROM $satellites INNER JOIN $planets USING (id)")
        .expect("query runs");
    assert_eq!(result.shape(), (9, 28));
}

#[test]
fn statistics_count_rows_through_the_plan() {
    let mut session = Session::default();
    let result = session
        .execute("SELECT name FROM $planets WHERE id < 5")
        .expect("query runs");
    let statistics = result.statistics();
    assert_eq!(statistics.get("rows_read"), 4); // predicate pushed to the read
    assert!(statistics.get("blobs_read") >= 1);
    assert!(statistics.as_map().contains_key("time_executing"));
}

#[test]
fn explain_analyze_executes_and_reports() {
    let mut session = Session::default();
    let result = session
        .execute("EXPLAIN ANALYZE SELECT name FROM $planets WHERE id < 5")
        .expect("query runs");
    let rendered: Vec<String> = result
        .rows()
        .into_iter()
        .map(|row| row[0].to_string())
        .collect();
    assert!(rendered.iter().any(|line| line.contains("SCAN")));
    assert!(rendered.iter().any(|line| line.contains("rows_read")));
}

#[test]
fn temporal_clauses_are_stripped_before_parsing() {
    let mut session = Session::default();
    // the virtual datasets are not date partitioned; the clause must
    // still parse and strip cleanly
    let result = session
        .execute("SELECT name FROM $planets FOR TODAY WHERE id = 1")
        .expect("query runs");
    assert_eq!(result.shape(), (1, 1));

    assert!(matches!(
        session.execute("SELECT name FROM $planets FOR DATES"),
        Err(quarry::Error::InvalidTemporalRangeFilter(_))
    ));
}

#[test]
fn union_mismatched_column_counts_error() {
    let mut session = Session::default();
    let result =
        session.execute("SELECT id, name FROM $planets UNION ALL SELECT name FROM $planets");
    assert!(result.is_err());
}

#[test]
fn aggregates_with_distinct_modifier() {
    let mut session = Session::default();
    let result = session
        .execute("SELECT COUNT(DISTINCT planetId) FROM $satellites")
        .expect("query runs");
    assert_eq!(result.cell(0, 0), Some(Value::Integer(7)));
}

#[test]
fn heap_sorted_top_k_matches_full_sort() {
    let mut session = Session::default();
    let fused = session
        .execute("SELECT radius, name FROM $satellites ORDER BY radius DESC LIMIT 4")
        .expect("query runs");
    assert_eq!(fused.shape(), (4, 2));
    // Ganymede is the largest moon
    assert_eq!(fused.cell(0, 1), Some(Value::Varchar("Ganymede".into())));
}

#[test]
fn projection_expressions_compute() {
    let mut session = Session::default();
    let result = session
        .execute("SELECT name, gravity * 2 AS double_gravity FROM $planets WHERE id = 3")
        .expect("query runs");
    assert_eq!(result.column_names(), vec!["name", "double_gravity"]);
    assert_eq!(result.cell(0, 1), Some(Value::Double(19.6)));
}

#[test]
fn case_expressions_evaluate() {
    let mut session = Session::default();
    let result = session
        .execute(
            "SELECT name, CASE WHEN id < 5 THEN 'inner' ELSE 'outer' END AS zone \
             FROM $planets ORDER BY id LIMIT 9",
        )
        .expect("query runs");
    assert_eq!(result.cell(0, 1), Some(Value::Varchar("inner".into())));
    assert_eq!(result.cell(8, 1), Some(Value::Varchar("outer".into())));
}

#[test]
fn create_table_as_select_counts_written_rows() {
    let mut session = Session::default();
    let result = session
        .execute("CREATE TABLE tiny AS SELECT name FROM $planets WHERE id < 4")
        .expect("statement runs");
    assert_eq!(result.statistics().get("rows_written"), 3);
}

#[test]
fn cross_join_cartesian_counts() {
    let mut session = Session::default();
    let result = session
        .execute(
            "SELECT * FROM (SELECT name FROM $planets LIMIT 3) AS a \
             CROSS JOIN (SELECT name FROM $planets LIMIT 4) AS b",
        )
        .expect("query runs");
    assert_eq!(result.shape(), (12, 2));
}
