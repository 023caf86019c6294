//! Validator properties checked across whole families of statements.

use tripsql::catalog::{nyc_taxi_tables, CatalogSnapshot};
use tripsql::error::ErrorKind;
use tripsql::query::QueryCandidate;
use tripsql::safety::{SqlValidator, WRITE_KEYWORDS};

use super::common::{self, ROW_CAP};

fn validator() -> SqlValidator {
    SqlValidator::new(common::allow_list(), ROW_CAP)
}

fn snapshot() -> CatalogSnapshot {
    CatalogSnapshot::new(1, nyc_taxi_tables())
}

fn kind(sql: &str) -> Option<ErrorKind> {
    validator().check(sql, &snapshot()).err().map(|e| e.kind())
}

#[test]
fn test_every_write_keyword_is_unsafe_wherever_it_appears() {
    for keyword in WRITE_KEYWORDS {
        let templates = [
            format!("{} nyc_taxi.yellow_curated", keyword),
            format!("{} TABLE nyc_taxi.yellow_curated", keyword.to_lowercase()),
            format!(
                "SELECT COUNT(*) FROM nyc_taxi.yellow_curated; {} TABLE nyc_taxi.yellow_curated",
                keyword
            ),
            format!("SELECT fare_amount FROM nyc_taxi.yellow_curated WHERE {} = 1", keyword),
            format!(
                "SELECT Zone FROM nyc_taxi.taxi_zone_lookup /* ok */ {} nyc_taxi.taxi_zone_lookup",
                keyword
            ),
        ];
        for sql in &templates {
            assert_eq!(kind(sql), Some(ErrorKind::UnsafeStatement), "{}", sql);
        }
    }
}

#[test]
fn test_quoted_keywords_do_not_trip_the_guard() {
    for keyword in WRITE_KEYWORDS {
        let sql = format!(
            "SELECT Zone FROM nyc_taxi.taxi_zone_lookup WHERE Zone = '{} street'",
            keyword
        );
        assert_eq!(kind(&sql), None, "{}", sql);
    }
}

#[test]
fn test_non_query_statements_are_unsafe() {
    for sql in [
        "SHOW TABLES",
        "EXPLAIN SELECT 1",
        "SET search_path = nyc_taxi",
        "",
        "this is not sql",
    ] {
        assert_eq!(kind(sql), Some(ErrorKind::UnsafeStatement), "{:?}", sql);
    }
}

#[test]
fn test_tables_outside_allow_list_are_forbidden() {
    for sql in [
        "SELECT COUNT(*) FROM nyc_taxi_raw.yellow_tripdata",
        "SELECT * FROM information_schema.tables",
        "SELECT y.fare_amount FROM nyc_taxi.yellow_curated y \
         JOIN nyc_taxi_raw.yellow_tripdata r ON y.vendorid = r.vendorid",
        "WITH raw AS (SELECT * FROM nyc_taxi_raw.yellow_tripdata) SELECT COUNT(*) FROM raw",
        "SELECT Zone FROM nyc_taxi.taxi_zone_lookup \
         WHERE LocationID IN (SELECT pulocationid FROM nyc_taxi_raw.yellow_tripdata)",
        "SELECT fare_amount FROM other_catalog.nyc_taxi.yellow_curated",
        "SELECT fare_amount FROM a.b.nyc_taxi.yellow_curated",
    ] {
        assert_eq!(kind(sql), Some(ErrorKind::ForbiddenTable), "{}", sql);
    }
}

#[test]
fn test_unknown_references() {
    for sql in [
        "SELECT tip_percent FROM nyc_taxi.yellow_curated",
        "SELECT z.Borough FROM nyc_taxi.taxi_zone_lookup zone",
        "SELECT Borough FROM nyc_taxi.taxi_zone_lookup WHERE LocationId = 1 AND nope > 2",
    ] {
        assert_eq!(kind(sql), Some(ErrorKind::UnknownReference), "{}", sql);
    }
}

#[test]
fn test_every_valid_query_is_bounded() {
    let cases = [
        ("SELECT Borough FROM nyc_taxi.taxi_zone_lookup", "LIMIT 100"),
        ("SELECT Borough FROM nyc_taxi.taxi_zone_lookup LIMIT 10", "LIMIT 10"),
        ("SELECT Borough FROM nyc_taxi.taxi_zone_lookup LIMIT 5000", "LIMIT 100"),
        (
            "SELECT Borough, COUNT(*) AS zones FROM nyc_taxi.taxi_zone_lookup GROUP BY Borough;",
            "LIMIT 100",
        ),
    ];
    for (sql, expected) in cases {
        let validated = validator().check(sql, &snapshot()).unwrap();
        assert!(
            validated.sql.ends_with(expected),
            "{} became {}",
            sql,
            validated.sql
        );
    }
}

#[test]
fn test_validate_is_deterministic() {
    let sql = "SELECT pickup_borough, SUM(total_amount) AS revenue \
               FROM v_trips_borough_hour GROUP BY pickup_borough";
    let first = validator().validate(QueryCandidate::manual(sql, 1), &snapshot());
    let second = validator().validate(QueryCandidate::manual(sql, 1), &snapshot());
    assert!(first.is_valid());
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.output_names, vec!["pickup_borough", "revenue"]);
}
