//! End-to-end SQL translation: statement text, schema propagation and
//! positioned failures

use std::cell::RefCell;

use pipeql_ir::{
    Catalog, ColumnInfo, Pipeline, PipelineTranslationFailure, StepError, StepKind, TableSchema, Value,
};
use pipeql_sql::{DataProbe, SqlDialect, SqlQuery, SqlTranslator};

fn table(name: &str, columns: &[(&str, &str)]) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns: columns.iter().map(|(n, t)| ColumnInfo::new(*n, *t)).collect(),
    }
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_table(table("sales", &[("A", "INTEGER"), ("code", "VARCHAR")]))
        .with_table(table("regions", &[("code", "VARCHAR"), ("region", "VARCHAR")]))
        .with_table(table(
            "geo",
            &[("continent", "VARCHAR"), ("country", "VARCHAR"), ("value", "INTEGER")],
        ))
        .with_table(table("t", &[("id", "INTEGER"), ("cat", "VARCHAR"), ("v", "INTEGER")]))
}

fn pipeline(json: &str) -> Pipeline {
    serde_json::from_str(json).unwrap()
}

fn translate(dialect: SqlDialect, json: &str) -> Result<SqlQuery, PipelineTranslationFailure> {
    let catalog = catalog();
    SqlTranslator::new(dialect, &catalog).translate_pipeline(&pipeline(json))
}

fn root_cause(err: &StepError) -> &StepError {
    match err {
        StepError::SubPipeline(failure) => root_cause(&failure.cause),
        other => other,
    }
}

#[derive(Default)]
struct FakeProbe {
    values: Vec<Value>,
    columns: Vec<ColumnInfo>,
    seen: RefCell<Vec<String>>,
}

impl DataProbe for FakeProbe {
    fn distinct_values(&self, sql: &str) -> Result<Vec<Value>, String> {
        self.seen.borrow_mut().push(sql.to_string());
        Ok(self.values.clone())
    }

    fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, String> {
        self.seen.borrow_mut().push(sql.to_string());
        Ok(self.columns.clone())
    }
}

#[test]
fn test_rename_then_filter_statement() {
    let catalog = Catalog::new().with_table(table("sales", &[("A", "INTEGER")]));
    let query = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .translate_pipeline(&pipeline(
            r#"[
                {"name": "domain", "domain": "sales"},
                {"name": "rename", "to_rename": [["A", "B"]]},
                {"name": "filter", "condition": {"column": "B", "operator": "eq", "value": 5}}
            ]"#,
        ))
        .unwrap();

    assert_eq!(
        query.statement,
        "WITH SELECT_STEP_0 AS (SELECT * FROM sales), \
         RENAME_STEP_1 AS (SELECT A AS B FROM SELECT_STEP_0), \
         FILTER_STEP_2 AS (SELECT B FROM RENAME_STEP_1 WHERE B = 5) \
         SELECT B FROM FILTER_STEP_2"
    );
    assert_eq!(query.columns(), vec!["B"]);
    let b = &query.schema.columns[0];
    assert_eq!(b.original_name, "A");
    assert_eq!(b.alias.as_deref(), Some("A"));
}

#[test]
fn test_failure_is_positioned_on_offending_step() {
    let failure = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rename", "to_rename": [["A", "B"]]},
            {"name": "filter", "condition": {"column": "A", "operator": "eq", "value": 5}}
        ]"#,
    )
    .unwrap_err();

    assert_eq!(failure.step_index, 3);
    assert_eq!(failure.step_name, "filter");
    assert!(matches!(failure.cause, StepError::ColumnNotFound { ref column, .. } if column == "A"));
    assert!(failure.to_string().starts_with("step 3 (filter) failed: Column 'A' not found"));
}

#[test]
fn test_translation_is_deterministic() {
    let json = r#"[
        {"name": "domain", "domain": "sales"},
        {"name": "formula", "new_column": "half", "formula": "A / 2"},
        {"name": "aggregate", "on": ["code"], "aggregations": [{"new_columns": ["total"], "aggfunction": "sum", "columns": ["half"]}]}
    ]"#;
    let first = translate(SqlDialect::Snowflake, json).unwrap();
    let second = translate(SqlDialect::Snowflake, json).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_rename_round_trip_restores_names() {
    let query = translate(
        SqlDialect::DuckDB,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rename", "to_rename": [["A", "B"]]},
            {"name": "rename", "to_rename": [["B", "A"]]}
        ]"#,
    )
    .unwrap();
    assert_eq!(query.columns(), vec!["A", "code"]);
    assert!(query.statement.ends_with("SELECT A, code FROM RENAME_STEP_2"));
}

#[test]
fn test_rename_onto_existing_column_fails() {
    let failure = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rename", "to_rename": [["A", "code"]]}
        ]"#,
    )
    .unwrap_err();
    assert_eq!(failure.cause, StepError::DuplicateColumn("code".to_string()));
}

#[test]
fn test_division_is_null_safe() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "t"},
            {"name": "formula", "new_column": "ratio", "formula": "v / id"}
        ]"#,
    )
    .unwrap();
    assert!(query
        .statement
        .contains("(CAST(v AS DOUBLE PRECISION) / NULLIF(id, 0)) AS ratio"));
    assert_eq!(query.schema.type_of("ratio"), pipeql_ir::LogicalType::Float);
}

#[test]
fn test_rollup_has_one_branch_per_level_plus_total() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "geo"},
            {"name": "rollup", "hierarchy": ["continent", "country"],
             "aggregations": [{"new_columns": ["value"], "aggfunction": "sum", "columns": ["value"]}]}
        ]"#,
    )
    .unwrap();

    assert_eq!(query.statement.matches(" UNION ALL ").count(), 2);
    assert!(query.statement.contains(
        "SELECT continent, CAST(NULL AS TEXT) AS country, CAST(continent AS TEXT) AS label, \
         'continent' AS level, CAST(NULL AS TEXT) AS parent, SUM(value) AS value \
         FROM SELECT_STEP_0 GROUP BY continent"
    ));
    assert!(query.statement.contains(
        "CAST(country AS TEXT) AS label, 'country' AS level, CAST(continent AS TEXT) AS parent"
    ));
    assert_eq!(
        query.columns(),
        vec!["continent", "country", "label", "level", "parent", "value"]
    );
}

#[test]
fn test_window_steps_need_window_functions() {
    let failure = translate(
        SqlDialect::MySql,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rank", "value_col": "A", "order": "desc", "method": "dense"}
        ]"#,
    )
    .unwrap_err();
    assert_eq!(failure.step_index, 2);
    assert_eq!(failure.step_name, "rank");
    assert_eq!(
        failure.cause,
        StepError::NotImplementedForDialect {
            step: "rank".to_string(),
            dialect: "mysql".to_string(),
        }
    );

    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rank", "value_col": "A", "order": "desc", "method": "dense", "groupby": ["code"]}
        ]"#,
    )
    .unwrap();
    assert!(query
        .statement
        .contains("DENSE_RANK() OVER (PARTITION BY code ORDER BY A DESC) AS A_RANK"));
}

#[test]
fn test_mongo_only_step_is_rejected() {
    let failure = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "custom", "query": {"$match": {"A": 1}}}
        ]"#,
    )
    .unwrap_err();
    assert!(matches!(failure.cause, StepError::NotImplementedForDialect { .. }));
}

#[test]
fn test_pivot_resumes_after_probe() {
    let catalog = catalog();
    let probe = FakeProbe {
        values: vec![Value::from("x"), Value::from("y"), Value::Null],
        ..Default::default()
    };
    let query = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .with_probe(&probe)
        .translate_pipeline(&pipeline(
            r#"[
                {"name": "domain", "domain": "t"},
                {"name": "pivot", "index": ["id"], "column_to_pivot": "cat", "value_column": "v", "agg_function": "sum"}
            ]"#,
        ))
        .unwrap();

    assert_eq!(
        probe.seen.borrow().as_slice(),
        ["WITH SELECT_STEP_0 AS (SELECT * FROM t) SELECT DISTINCT cat FROM SELECT_STEP_0 ORDER BY cat"]
    );
    assert!(query.statement.contains(
        "PIVOT_STEP_1 AS (SELECT id, SUM(CASE WHEN cat = 'x' THEN v END) AS x, \
         SUM(CASE WHEN cat = 'y' THEN v END) AS y FROM SELECT_STEP_0 GROUP BY id)"
    ));
    assert_eq!(query.columns(), vec!["id", "x", "y"]);
}

#[test]
fn test_pivot_without_probe_fails_on_its_step() {
    let failure = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "t"},
            {"name": "pivot", "index": ["id"], "column_to_pivot": "cat", "value_column": "v", "agg_function": "sum"}
        ]"#,
    )
    .unwrap_err();
    assert_eq!(failure.step_index, 2);
    assert!(matches!(failure.cause, StepError::Probe(_)));
}

#[test]
fn test_customsql_requires_placeholder() {
    let failure = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "t"},
            {"name": "customsql", "query": "SELECT 1"}
        ]"#,
    )
    .unwrap_err();
    assert_eq!(
        failure.cause,
        StepError::MissingIdentifier("##PREVIOUS_STEP##".to_string())
    );
}

#[test]
fn test_customsql_learns_columns_from_probe() {
    let catalog = catalog();
    let probe = FakeProbe {
        columns: vec![ColumnInfo::new("n", "BIGINT")],
        ..Default::default()
    };
    let query = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .with_probe(&probe)
        .translate_pipeline(&pipeline(
            r#"[
                {"name": "domain", "domain": "t"},
                {"name": "customsql", "query": "SELECT COUNT(*) AS n FROM ##PREVIOUS_STEP##;"}
            ]"#,
        ))
        .unwrap();

    assert_eq!(
        probe.seen.borrow()[0],
        "WITH SELECT_STEP_0 AS (SELECT * FROM t), \
         CUSTOMSQL_STEP_1 AS (SELECT COUNT(*) AS n FROM SELECT_STEP_0) \
         SELECT * FROM CUSTOMSQL_STEP_1"
    );
    assert!(query.statement.ends_with("SELECT n FROM CUSTOMSQL_STEP_1"));
    assert_eq!(query.columns(), vec!["n"]);
}

#[test]
fn test_saved_pipeline_cycle_is_detected() {
    let catalog = catalog()
        .with_pipeline("p1", Pipeline::from_domain("p2"))
        .with_pipeline("p2", Pipeline::from_domain("p1"));
    let failure = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .translate_pipeline(&Pipeline::from_domain("p1"))
        .unwrap_err();

    assert_eq!(failure.step_index, 1);
    assert_eq!(
        root_cause(&failure.cause),
        &StepError::ReferenceCycle(vec!["p1".to_string(), "p2".to_string(), "p1".to_string()])
    );
}

#[test]
fn test_deep_reference_chain_is_rejected() {
    let mut catalog = catalog();
    for i in 0..20 {
        catalog.add_pipeline(format!("p{}", i), Pipeline::from_domain(format!("p{}", i + 1)));
    }
    catalog.add_pipeline("p20", Pipeline::from_domain("sales"));

    let failure = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .translate_pipeline(&Pipeline::from_domain("p0"))
        .unwrap_err();
    assert_eq!(root_cause(&failure.cause), &StepError::ReferenceTooDeep(16));

    let query = SqlTranslator::new(SqlDialect::Postgres, &catalog)
        .translate_pipeline(&Pipeline::from_domain("p15"))
        .unwrap();
    assert_eq!(query.columns(), vec!["A", "code"]);
}

#[test]
fn test_unknown_domain() {
    let failure = translate(SqlDialect::Postgres, r#"[{"name": "domain", "domain": "nope"}]"#).unwrap_err();
    assert_eq!(failure.cause, StepError::UnknownReference("nope".to_string()));
}

#[test]
fn test_join_keeps_left_columns_on_collision() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "join", "right_pipeline": "regions", "type": "left", "on": [["code", "code"]]}
        ]"#,
    )
    .unwrap();
    assert!(query.statement.contains(
        "JOIN_STEP_1 AS (SELECT lhs.A, lhs.code, rhs.region FROM SELECT_STEP_0 AS lhs LEFT JOIN \
         (WITH SELECT_STEP_0 AS (SELECT * FROM regions) SELECT code, region FROM SELECT_STEP_0) AS rhs \
         ON lhs.code = rhs.code)"
    ));
    assert_eq!(query.columns(), vec!["A", "code", "region"]);
}

#[test]
fn test_anti_join_keeps_only_left_columns() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "join", "right_pipeline": [{"name": "domain", "domain": "regions"}], "type": "left outer", "on": [["code", "code"]]}
        ]"#,
    )
    .unwrap();
    assert!(query.statement.contains("WHERE rhs.code IS NULL"));
    assert_eq!(query.columns(), vec!["A", "code"]);
}

#[test]
fn test_append_aligns_columns_with_typed_nulls() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "append", "pipelines": ["regions"]}
        ]"#,
    )
    .unwrap();
    assert!(query.statement.contains(
        "APPEND_STEP_1 AS (SELECT A, code, CAST(NULL AS TEXT) AS region FROM SELECT_STEP_0 UNION ALL \
         SELECT CAST(NULL AS BIGINT) AS A, code, region FROM \
         (WITH SELECT_STEP_0 AS (SELECT * FROM regions) SELECT code, region FROM SELECT_STEP_0) AS appended_1)"
    ));
    assert_eq!(query.columns(), vec!["A", "code", "region"]);
}

#[test]
fn test_sort_order_survives_row_preserving_steps() {
    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "sort", "columns": [{"column": "A", "order": "desc"}]},
            {"name": "delete", "columns": ["code"]}
        ]"#,
    )
    .unwrap();
    assert!(query
        .statement
        .ends_with("SELECT A FROM DELETE_STEP_2 ORDER BY A DESC"));

    let query = translate(
        SqlDialect::Postgres,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "sort", "columns": [{"column": "A", "order": "desc"}]},
            {"name": "uniquegroups", "on": ["code"]}
        ]"#,
    )
    .unwrap();
    assert!(query.statement.ends_with("SELECT code FROM UNIQUEGROUPS_STEP_2"));
}

#[test]
fn test_pagination_per_dialect() {
    let catalog = catalog();
    let pipeline = Pipeline::from_domain("sales");
    let athena = SqlTranslator::new(SqlDialect::Athena, &catalog)
        .with_pagination(Some(10), Some(5))
        .translate_pipeline(&pipeline)
        .unwrap();
    assert!(athena.statement.ends_with(" OFFSET 5 LIMIT 10"));

    let mysql = SqlTranslator::new(SqlDialect::MySql, &catalog)
        .with_pagination(Some(10), Some(5))
        .translate_pipeline(&pipeline)
        .unwrap();
    assert!(mysql.statement.ends_with("FROM SELECT_STEP_0 LIMIT 5, 10"));
}

#[test]
fn test_split_uses_arrays_on_bigquery() {
    let json = r#"[
        {"name": "domain", "domain": "sales"},
        {"name": "split", "column": "code", "delimiter": "-", "number_cols_to_keep": 2}
    ]"#;
    let bigquery = translate(SqlDialect::BigQuery, json).unwrap();
    assert!(bigquery.statement.contains("SPLIT(code, '-')[SAFE_OFFSET(0)] AS code_1"));
    assert!(bigquery.statement.contains("SPLIT(code, '-')[SAFE_OFFSET(1)] AS code_2"));

    let postgres = translate(SqlDialect::Postgres, json).unwrap();
    assert!(postgres.statement.contains("SPLIT_PART(code, '-', 2) AS code_2"));
    assert_eq!(postgres.columns(), vec!["A", "code", "code_1", "code_2"]);

    let mysql = translate(SqlDialect::MySql, json).unwrap_err();
    assert!(matches!(mysql.cause, StepError::NotImplementedForDialect { .. }));
}

#[test]
fn test_quantiles_unavailable_on_mysql() {
    let json = r#"[
        {"name": "domain", "domain": "sales"},
        {"name": "statistics", "column": "A", "statistics": ["average"], "quantiles": [{"nth": 1, "order": 2}]}
    ]"#;
    let failure = translate(SqlDialect::MySql, json).unwrap_err();
    assert!(matches!(failure.cause, StepError::NotImplementedForDialect { .. }));

    let query = translate(SqlDialect::Postgres, json).unwrap();
    assert!(query.statement.contains(
        "SELECT AVG(A) AS average, PERCENTILE_DISC(0.5) WITHIN GROUP (ORDER BY A) AS \"1-th 2-quantile\" FROM SELECT_STEP_0"
    ));
}

#[test]
fn test_registry_coverage_per_dialect() {
    let catalog = catalog();
    for dialect in SqlDialect::ALL {
        let translator = SqlTranslator::new(dialect, &catalog);
        let supported = translator.registry().supported_steps();
        let capabilities = dialect.capabilities();
        for kind in StepKind::ALL {
            let expected = match kind {
                StepKind::Custom => false,
                StepKind::AddMissingDates => matches!(dialect, SqlDialect::Postgres | SqlDialect::DuckDB),
                StepKind::Split => capabilities.split_part || dialect == SqlDialect::BigQuery,
                StepKind::Rank
                | StepKind::Top
                | StepKind::Argmax
                | StepKind::Argmin
                | StepKind::Cumsum
                | StepKind::MovingAverage
                | StepKind::Percentage => capabilities.window_functions,
                _ => true,
            };
            assert_eq!(supported.contains_key(&kind), expected, "{} on {}", kind, dialect);
        }
    }
}
