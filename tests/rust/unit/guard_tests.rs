//! Unit tests for the read-only SQL guard

#[cfg(test)]
mod guard_tests {
    use clickask::schema_catalog::TableDescriptor;
    use clickask::sql_guard::{enforce_limit, validate, Allowlist, GuardError};
    use test_case::test_case;

    fn allowlist() -> Allowlist {
        let sales = TableDescriptor::new("DW", "Cluster_Main_Sales");
        let items = TableDescriptor::new("DW", "Dimension_IM");
        Allowlist::from_candidates(&[&sales, &items])
    }

    #[test_case("SELECT 1" ; "no limit")]
    #[test_case("SELECT 1;" ; "trailing semicolon")]
    #[test_case("SELECT * FROM t LIMIT 5" ; "existing limit")]
    #[test_case("select x from t\nlimit 1000" ; "large lowercase limit")]
    fn test_enforce_limit_is_idempotent(sql: &str) {
        let once = enforce_limit(sql, 200);
        assert_eq!(enforce_limit(&once, 200), once);
        assert!(once.to_uppercase().contains("LIMIT"));
        assert!(!once.ends_with(';'));
    }

    #[test]
    fn test_validate_appends_limit_and_accepts_candidates() {
        let sql = validate(
            "SELECT d.GDS_NM FROM dw.cluster_main_sales AS f JOIN Dimension_IM d ON f.GDS_CD = d.GDS_CD",
            &allowlist(),
            200,
        )
        .unwrap();
        assert!(sql.ends_with("\nLIMIT 200"));
    }

    #[test]
    fn test_validate_names_every_unlisted_table() {
        let err = validate(
            "SELECT * FROM HR.Payroll p JOIN HR.Bonus b ON p.id = b.id",
            &allowlist(),
            200,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GuardError::UnauthorizedTable {
                tables: vec!["HR.Bonus".to_string(), "HR.Payroll".to_string()]
            }
        );
    }

    #[test_case("WITH x AS (SELECT 1) SELECT * FROM x" ; "cte is not a select")]
    #[test_case("SELECT * FROM DW.Cluster_Main_Sales; TRUNCATE TABLE DW.Cluster_Main_Sales" ; "stacked truncate")]
    #[test_case("SELECT created_at FROM DW.Cluster_Main_Sales" ; "keyword inside identifier")]
    fn test_validate_rejects_unsafe(sql: &str) {
        assert!(matches!(
            validate(sql, &allowlist(), 200),
            Err(GuardError::UnsafeStatement { .. })
        ));
    }

    #[test_case("SELECT (SELECT max(name) FROM `system`.`users`) AS u FROM DW.Cluster_Main_Sales AS f" ; "backtick subquery")]
    #[test_case("SELECT * FROM \"system\".\"users\"" ; "double quoted table")]
    #[test_case("SELECT * FROM/**/system.users" ; "comment instead of whitespace")]
    #[test_case("SELECT * FROM DW.Cluster_Main_Sales --\nJOIN system.users u ON 1 = 1" ; "line comment")]
    #[test_case("SELECT * FROM DW.Cluster_Main_Sales f, system.users" ; "comma join")]
    #[test_case("SELECT * FROM url('http://x/y.csv', CSV)" ; "table function")]
    fn test_validate_rejects_hidden_sources(sql: &str) {
        assert!(validate(sql, &allowlist(), 200).is_err());
    }

    #[test]
    fn test_validate_scopes_select_item_subqueries() {
        let err = validate(
            "SELECT (SELECT max(name) FROM system.users) AS u FROM DW.Cluster_Main_Sales AS f",
            &allowlist(),
            200,
        )
        .unwrap_err();
        assert_eq!(
            err,
            GuardError::UnauthorizedTable {
                tables: vec!["system.users".to_string()]
            }
        );
    }
}
