//! Generated DuckDB SQL executed against an in-memory database

use pipeql_duck::{discover_catalog, DuckExecutor, QueryResult};
use pipeql_ir::{Pipeline, Value};
use pipeql_sql::{SqlDialect, SqlTranslator};
use test_case::test_case;

fn executor() -> DuckExecutor {
    let executor = DuckExecutor::open_in_memory().unwrap();
    executor
        .connection()
        .execute_batch(
            "CREATE TABLE sales (id INTEGER, city VARCHAR, yr INTEGER, amount INTEGER);
             INSERT INTO sales VALUES
                (1, 'Paris', 2020, 10),
                (2, 'Paris', 2021, 30),
                (3, 'Lyon', 2020, 5),
                (4, 'Lyon', 2021, NULL),
                (5, 'Nice', 2021, 10);
             CREATE TABLE regions (city VARCHAR, region VARCHAR);
             INSERT INTO regions VALUES ('Paris', 'IDF'), ('Lyon', 'ARA');
             CREATE TABLE geo (continent VARCHAR, country VARCHAR, city VARCHAR, pop INTEGER);
             INSERT INTO geo VALUES
                ('Europe', 'France', 'Paris', 10),
                ('Europe', 'France', 'Lyon', 5),
                ('Europe', 'Spain', 'Madrid', 7),
                ('Asia', 'Japan', 'Tokyo', 20);
             CREATE TABLE visits (shop VARCHAR, visited TIMESTAMP, n INTEGER);
             INSERT INTO visits VALUES
                ('A', TIMESTAMP '2021-01-01 00:00:00', 10),
                ('A', TIMESTAMP '2021-01-02 00:00:00', 20),
                ('A', TIMESTAMP '2021-01-03 00:00:00', 5),
                ('A', TIMESTAMP '2021-01-05 00:00:00', 7),
                ('B', TIMESTAMP '2021-01-01 00:00:00', 3);",
        )
        .unwrap();
    executor
}

/// Translate, execute, and check the output columns against both the
/// translator's metadata and `expected_columns`
fn run(executor: &DuckExecutor, json: &str, expected_columns: &[&str]) -> QueryResult {
    let pipeline: Pipeline = serde_json::from_str(json).unwrap();
    let catalog = discover_catalog(executor.connection()).unwrap();
    let query = SqlTranslator::new(SqlDialect::DuckDB, &catalog)
        .with_probe(executor)
        .translate_pipeline(&pipeline)
        .unwrap();
    let result = executor.execute(&query.statement, None).unwrap();
    assert_eq!(result.columns, expected_columns, "{}", query.statement);
    assert_eq!(query.columns(), expected_columns);
    result
}

fn ints(values: &[Option<i64>]) -> Vec<Value> {
    values.iter().map(|v| v.map(Value::Int).unwrap_or(Value::Null)).collect()
}

fn floats(values: &[Option<f64>]) -> Vec<Value> {
    values.iter().map(|v| v.map(Value::Float).unwrap_or(Value::Null)).collect()
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

/// Rows in a canonical order, for steps that emit rows in no defined order
fn row_set(rows: &[Vec<Value>]) -> Vec<String> {
    let mut keys: Vec<String> = rows.iter().map(|row| format!("{:?}", row)).collect();
    keys.sort();
    keys
}

#[test_case(r#"{"column": "amount", "operator": "gt", "value": 10}"#, &[2]; "comparison")]
#[test_case(r#"{"column": "city", "operator": "in", "value": ["Lyon", "Nice"]}"#, &[3, 4, 5]; "inclusion")]
#[test_case(r#"{"column": "amount", "operator": "isnull"}"#, &[4]; "null check")]
#[test_case(r#"{"or": [{"column": "yr", "operator": "eq", "value": 2020}, {"column": "city", "operator": "eq", "value": "Nice"}]}"#, &[1, 3, 5]; "disjunction")]
#[test_case(r#"{"column": "city", "operator": "matches", "value": "^P"}"#, &[1, 2]; "regex")]
fn test_filter_selects_rows(condition: &str, expected: &[i64]) {
    let executor = executor();
    let result = run(
        &executor,
        &format!(
            r#"[
                {{"name": "domain", "domain": "sales"}},
                {{"name": "filter", "condition": {}}},
                {{"name": "select", "columns": ["id"]}},
                {{"name": "sort", "columns": [{{"column": "id", "order": "asc"}}]}}
            ]"#,
            condition
        ),
        &["id"],
    );
    let expected: Vec<Option<i64>> = expected.iter().copied().map(Some).collect();
    assert_eq!(result.column("id").unwrap(), ints(&expected));
}

#[test]
fn test_rename_then_filter() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "rename", "to_rename": [["amount", "total"]]},
            {"name": "filter", "condition": {"column": "total", "operator": "eq", "value": 10}},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "city", "yr", "total"],
    );
    assert_eq!(result.column("id").unwrap(), ints(&[Some(1), Some(5)]));
}

#[test]
fn test_aggregate_by_city() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "aggregate", "on": ["city"], "aggregations": [
                {"new_columns": ["total"], "aggfunction": "sum", "columns": ["amount"]},
                {"new_columns": ["n"], "aggfunction": "count", "columns": ["amount"]}
            ]},
            {"name": "sort", "columns": [{"column": "city", "order": "asc"}]}
        ]"#,
        &["city", "total", "n"],
    );
    assert_eq!(result.column("city").unwrap(), texts(&["Lyon", "Nice", "Paris"]));
    assert_eq!(result.column("total").unwrap(), ints(&[Some(5), Some(10), Some(40)]));
    assert_eq!(result.column("n").unwrap(), ints(&[Some(1), Some(1), Some(2)]));
}

#[test]
fn test_division_by_zero_is_null() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "formula", "new_column": "ratio", "formula": "amount / (yr - 2020)"},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "city", "yr", "amount", "ratio"],
    );
    assert_eq!(
        result.column("ratio").unwrap(),
        floats(&[None, Some(30.0), None, None, Some(10.0)])
    );
}

#[test]
fn test_pivot_columns_come_from_live_values() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "pivot", "index": ["city"], "column_to_pivot": "yr", "value_column": "amount", "agg_function": "sum"},
            {"name": "sort", "columns": [{"column": "city", "order": "asc"}]}
        ]"#,
        &["city", "2020", "2021"],
    );
    assert_eq!(result.column("2020").unwrap(), ints(&[Some(5), None, Some(10)]));
    assert_eq!(result.column("2021").unwrap(), ints(&[None, Some(10), Some(30)]));
}

#[test]
fn test_top_per_group() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "filter", "condition": {"column": "amount", "operator": "notnull"}},
            {"name": "top", "rank_on": "amount", "sort": "desc", "limit": 1, "groups": ["city"]},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "city", "yr", "amount"],
    );
    assert_eq!(result.column("id").unwrap(), ints(&[Some(2), Some(3), Some(5)]));
}

#[test_case("standard", &[2, 4, 1, 2]; "standard ranks skip after ties")]
#[test_case("dense", &[2, 3, 1, 2]; "dense ranks are consecutive")]
fn test_rank_methods(method: &str, expected: &[i64]) {
    let executor = executor();
    let result = run(
        &executor,
        &format!(
            r#"[
                {{"name": "domain", "domain": "sales"}},
                {{"name": "filter", "condition": {{"column": "amount", "operator": "notnull"}}}},
                {{"name": "rank", "value_col": "amount", "order": "asc", "method": "{}"}},
                {{"name": "sort", "columns": [{{"column": "id", "order": "asc"}}]}}
            ]"#,
            method
        ),
        &["id", "city", "yr", "amount", "amount_RANK"],
    );
    let expected: Vec<Option<i64>> = expected.iter().copied().map(Some).collect();
    assert_eq!(result.column("amount_RANK").unwrap(), ints(&expected));
}

#[test]
fn test_cumsum_per_group() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "cumsum", "to_cumsum": [["amount", "running"]], "reference_column": "id", "groups": ["city"]},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "city", "yr", "amount", "running"],
    );
    assert_eq!(
        result.column("running").unwrap(),
        ints(&[Some(10), Some(40), Some(5), Some(5), Some(10)])
    );
}

#[test]
fn test_left_join_keeps_unmatched_rows() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "join", "right_pipeline": "regions", "type": "left", "on": [["city", "city"]]},
            {"name": "select", "columns": ["id", "region"]},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "region"],
    );
    assert_eq!(
        result.column("region").unwrap(),
        vec![
            Value::from("IDF"),
            Value::from("IDF"),
            Value::from("ARA"),
            Value::from("ARA"),
            Value::Null
        ]
    );
}

#[test]
fn test_customsql_columns_come_from_describe() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "customsql", "query": "SELECT city, COUNT(*) AS n FROM ##PREVIOUS_STEP## GROUP BY city"},
            {"name": "sort", "columns": [{"column": "city", "order": "asc"}]}
        ]"#,
        &["city", "n"],
    );
    assert_eq!(result.column("n").unwrap(), ints(&[Some(2), Some(1), Some(2)]));
}

#[test]
fn test_rollup_levels_and_grand_total() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "geo"},
            {"name": "rollup", "hierarchy": ["continent", "country"], "aggregations": [
                {"new_columns": ["total"], "aggfunction": "sum", "columns": ["pop"]}
            ]}
        ]"#,
        &["continent", "country", "label", "level", "parent", "total"],
    );
    let text = |s: &str| Value::from(s);
    let expected = vec![
        vec![text("Europe"), Value::Null, text("Europe"), text("continent"), Value::Null, Value::Int(22)],
        vec![text("Asia"), Value::Null, text("Asia"), text("continent"), Value::Null, Value::Int(20)],
        vec![text("Europe"), text("France"), text("France"), text("country"), text("Europe"), Value::Int(15)],
        vec![text("Europe"), text("Spain"), text("Spain"), text("country"), text("Europe"), Value::Int(7)],
        vec![text("Asia"), text("Japan"), text("Japan"), text("country"), text("Asia"), Value::Int(20)],
        vec![Value::Null, Value::Null, Value::Null, Value::Null, Value::Null, Value::Int(42)],
    ];
    assert_eq!(row_set(&result.rows), row_set(&expected));
}

#[test]
fn test_totals_cover_every_dimension_subset() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "totals", "total_dimensions": [
                {"total_column": "city", "total_rows_label": "All cities"},
                {"total_column": "yr", "total_rows_label": "All years"}
            ], "aggregations": [
                {"new_columns": ["total"], "aggfunction": "sum", "columns": ["amount"]}
            ]}
        ]"#,
        &["city", "yr", "total"],
    );
    let row = |city: &str, yr: &str, total: Option<i64>| {
        vec![Value::from(city), Value::from(yr), total.map(Value::Int).unwrap_or(Value::Null)]
    };
    let expected = vec![
        row("Paris", "2020", Some(10)),
        row("Paris", "2021", Some(30)),
        row("Lyon", "2020", Some(5)),
        row("Lyon", "2021", None),
        row("Nice", "2021", Some(10)),
        row("All cities", "2020", Some(15)),
        row("All cities", "2021", Some(40)),
        row("Paris", "All years", Some(40)),
        row("Lyon", "All years", Some(5)),
        row("Nice", "All years", Some(10)),
        row("All cities", "All years", Some(55)),
    ];
    assert_eq!(row_set(&result.rows), row_set(&expected));
}

#[test]
fn test_evolution_against_previous_day() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "visits"},
            {"name": "evolution", "date_col": "visited", "value_col": "n", "evolution_type": "vsLastDay",
             "evolution_format": "abs", "index_columns": ["shop"], "new_column": "delta"},
            {"name": "sort", "columns": [{"column": "shop", "order": "asc"}, {"column": "visited", "order": "asc"}]}
        ]"#,
        &["shop", "visited", "n", "delta"],
    );
    // 2021-01-05 has no 2021-01-04 row to compare with
    assert_eq!(
        result.column("delta").unwrap(),
        ints(&[None, Some(10), Some(-15), None, None])
    );
}

#[test]
fn test_moving_average_waits_for_a_full_window() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "visits"},
            {"name": "movingaverage", "value_column": "n", "column_to_sort": "visited", "moving_window": 2,
             "groups": ["shop"], "new_column_name": "avg2"},
            {"name": "sort", "columns": [{"column": "shop", "order": "asc"}, {"column": "visited", "order": "asc"}]}
        ]"#,
        &["shop", "visited", "n", "avg2"],
    );
    assert_eq!(
        result.column("avg2").unwrap(),
        floats(&[None, Some(15.0), Some(12.5), Some(6.0), None])
    );
}

#[test]
fn test_percentage_of_group_total() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "percentage", "column": "amount", "group": ["city"]},
            {"name": "sort", "columns": [{"column": "id", "order": "asc"}]}
        ]"#,
        &["id", "city", "yr", "amount", "amount_PCT"],
    );
    assert_eq!(
        result.column("amount_PCT").unwrap(),
        floats(&[Some(0.25), Some(0.75), Some(1.0), None, Some(1.0)])
    );
}

#[test]
fn test_statistics_per_city() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "statistics", "column": "amount", "groupby_columns": ["city"],
             "statistics": ["count", "max", "average", "variance"],
             "quantiles": [{"label": "median", "nth": 1, "order": 2}]},
            {"name": "sort", "columns": [{"column": "city", "order": "asc"}]}
        ]"#,
        &["city", "count", "max", "average", "variance", "median"],
    );
    assert_eq!(result.column("city").unwrap(), texts(&["Lyon", "Nice", "Paris"]));
    assert_eq!(result.column("count").unwrap(), ints(&[Some(1), Some(1), Some(2)]));
    assert_eq!(result.column("max").unwrap(), ints(&[Some(5), Some(10), Some(30)]));
    assert_eq!(result.column("average").unwrap(), floats(&[Some(5.0), Some(10.0), Some(20.0)]));
    assert_eq!(result.column("variance").unwrap(), floats(&[Some(0.0), Some(0.0), Some(100.0)]));
    assert_eq!(result.column("median").unwrap(), ints(&[Some(5), Some(10), Some(10)]));
}

#[test]
fn test_unpivot_drops_null_readings() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "unpivot", "keep": ["id"], "unpivot": ["yr", "amount"],
             "unpivot_column_name": "attribute", "value_column_name": "reading"}
        ]"#,
        &["id", "attribute", "reading"],
    );
    let row = |id: i64, attribute: &str, reading: i64| vec![Value::Int(id), Value::from(attribute), Value::Int(reading)];
    let expected = vec![
        row(1, "yr", 2020),
        row(2, "yr", 2021),
        row(3, "yr", 2020),
        row(4, "yr", 2021),
        row(5, "yr", 2021),
        row(1, "amount", 10),
        row(2, "amount", 30),
        row(3, "amount", 5),
        row(5, "amount", 10),
    ];
    assert_eq!(row_set(&result.rows), row_set(&expected));
}

#[test]
fn test_append_aligns_columns_with_nulls() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "sales"},
            {"name": "select", "columns": ["city", "amount"]},
            {"name": "append", "pipelines": ["regions"]}
        ]"#,
        &["city", "amount", "region"],
    );
    let row = |city: &str, amount: Option<i64>, region: Option<&str>| {
        vec![
            Value::from(city),
            amount.map(Value::Int).unwrap_or(Value::Null),
            region.map(Value::from).unwrap_or(Value::Null),
        ]
    };
    let expected = vec![
        row("Paris", Some(10), None),
        row("Paris", Some(30), None),
        row("Lyon", Some(5), None),
        row("Lyon", None, None),
        row("Nice", Some(10), None),
        row("Paris", None, Some("IDF")),
        row("Lyon", None, Some("ARA")),
    ];
    assert_eq!(row_set(&result.rows), row_set(&expected));
}

#[test]
fn test_addmissingdates_fills_gaps_per_group() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "visits"},
            {"name": "addmissingdates", "dates_column": "visited", "dates_granularity": "day", "groups": ["shop"]},
            {"name": "sort", "columns": [{"column": "shop", "order": "asc"}, {"column": "visited", "order": "asc"}]}
        ]"#,
        &["shop", "visited", "n"],
    );
    assert_eq!(result.column("shop").unwrap(), texts(&["A", "A", "A", "A", "A", "B"]));
    assert_eq!(
        result.column("visited").unwrap(),
        texts(&[
            "2021-01-01 00:00:00",
            "2021-01-02 00:00:00",
            "2021-01-03 00:00:00",
            "2021-01-04 00:00:00",
            "2021-01-05 00:00:00",
            "2021-01-01 00:00:00",
        ])
    );
    assert_eq!(
        result.column("n").unwrap(),
        ints(&[Some(10), Some(20), Some(5), None, Some(7), Some(3)])
    );
}

#[test]
fn test_dateextract_parts() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "visits"},
            {"name": "filter", "condition": {"column": "shop", "operator": "eq", "value": "A"}},
            {"name": "dateextract", "column": "visited", "date_info": ["year", "month", "day", "quarter"],
             "new_columns": ["y", "m", "d", "q"]},
            {"name": "sort", "columns": [{"column": "visited", "order": "asc"}]}
        ]"#,
        &["shop", "visited", "n", "y", "m", "d", "q"],
    );
    assert_eq!(result.column("y").unwrap(), ints(&[Some(2021); 4]));
    assert_eq!(result.column("m").unwrap(), ints(&[Some(1); 4]));
    assert_eq!(result.column("d").unwrap(), ints(&[Some(1), Some(2), Some(3), Some(5)]));
    assert_eq!(result.column("q").unwrap(), ints(&[Some(1); 4]));
}

#[test]
fn test_fixed_date_bounds_are_inclusive() {
    let executor = executor();
    let result = run(
        &executor,
        r#"[
            {"name": "domain", "domain": "visits"},
            {"name": "filter", "condition": {"and": [
                {"column": "visited", "operator": "from", "value": "2021-01-02"},
                {"column": "visited", "operator": "until", "value": "2021-01-03T18:00:00Z"}
            ]}},
            {"name": "select", "columns": ["n"]},
            {"name": "sort", "columns": [{"column": "n", "order": "desc"}]}
        ]"#,
        &["n"],
    );
    assert_eq!(result.column("n").unwrap(), ints(&[Some(20), Some(5)]));
}

#[test_case("from", 5; "every visit is after a date a century ago")]
#[test_case("until", 0; "no visit is before a date a century ago")]
fn test_today_relative_bounds(operator: &str, expected_rows: usize) {
    let executor = executor();
    let result = run(
        &executor,
        &format!(
            r#"[
                {{"name": "domain", "domain": "visits"}},
                {{"name": "filter", "condition": {{
                    "column": "visited", "operator": "{}", "value": {{"date": "today", "quantity": -100, "duration": "year"}}
                }}}}
            ]"#,
            operator
        ),
        &["shop", "visited", "n"],
    );
    assert_eq!(result.rows.len(), expected_rows);
}
