//! Row-limit enforcement on the top-level query.

use sqlparser::ast::{Expr, Query, Value};

fn number(expr: &Expr) -> Option<u64> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        _ => None,
    }
}

fn cap_expr(cap: usize) -> Expr {
    Expr::Value(Value::Number(cap.to_string(), false))
}

/// Bounds the query's result to `cap` rows.
///
/// Injects `LIMIT cap` when neither LIMIT nor FETCH is present, and replaces
/// a limit that is larger than the cap or not a literal. Returns true if the
/// query was changed.
pub fn enforce_limit(query: &mut Query, cap: usize) -> bool {
    let cap_u64 = cap as u64;

    if let Some(fetch) = &query.fetch {
        let within_cap = !fetch.percent
            && fetch
                .quantity
                .as_ref()
                .and_then(number)
                .is_some_and(|n| n <= cap_u64);
        if within_cap && query.limit.is_none() {
            return false;
        }
        query.fetch = None;
    }

    match query.limit.as_ref().and_then(number) {
        Some(n) if n <= cap_u64 => false,
        _ => {
            query.limit = Some(cap_expr(cap));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::Statement;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn apply(sql: &str, cap: usize) -> (bool, String) {
        let mut statements = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        let Statement::Query(query) = &mut statements[0] else {
            panic!("not a query");
        };
        let changed = enforce_limit(query, cap);
        (changed, statements[0].to_string())
    }

    #[test]
    fn test_injects_missing_limit() {
        let (changed, sql) = apply("SELECT a FROM t ORDER BY a", 100);
        assert!(changed);
        assert!(sql.ends_with("ORDER BY a LIMIT 100"));
    }

    #[test]
    fn test_keeps_smaller_limit() {
        let (changed, sql) = apply("SELECT a FROM t LIMIT 10", 100);
        assert!(!changed);
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_clamps_larger_limit() {
        let (changed, sql) = apply("SELECT a FROM t LIMIT 5000", 100);
        assert!(changed);
        assert!(sql.ends_with("LIMIT 100"));
        assert!(!sql.contains("5000"));
    }

    #[test]
    fn test_fetch_first_within_cap_is_kept() {
        let (changed, sql) = apply("SELECT a FROM t FETCH FIRST 5 ROWS ONLY", 100);
        assert!(!changed);
        assert!(sql.contains("FETCH FIRST 5 ROWS ONLY"));
    }

    #[test]
    fn test_fetch_first_over_cap_becomes_limit() {
        let (changed, sql) = apply("SELECT a FROM t FETCH FIRST 500 ROWS ONLY", 100);
        assert!(changed);
        assert!(!sql.contains("FETCH"));
        assert!(sql.ends_with("LIMIT 100"));
    }

    #[test]
    fn test_union_gets_single_outer_limit() {
        let (changed, sql) = apply("SELECT a FROM t UNION ALL SELECT a FROM u", 50);
        assert!(changed);
        assert!(sql.ends_with("LIMIT 50"));
        assert_eq!(sql.matches("LIMIT").count(), 1);
    }
}
