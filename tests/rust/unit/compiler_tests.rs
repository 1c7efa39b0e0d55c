//! Unit tests for compiling query plans into SQL

#[cfg(test)]
mod compiler_tests {
    use clickask::query_plan::{CompilerSettings, PlanCompiler, QueryPlan};
    use clickask::schema_catalog::{ColumnDescriptor, TableDescriptor};
    use clickask::sql_guard::{self, Allowlist};

    fn tables() -> Vec<TableDescriptor> {
        vec![
            TableDescriptor::new("DW", "Cluster_Main_Sales")
                .with_column(ColumnDescriptor::new("GDS_CD", "String", "Product code"))
                .with_column(ColumnDescriptor::new("SoldQty", "Int32", "Sold quantity")),
            TableDescriptor::new("DW", "Dimension_IM")
                .with_column(ColumnDescriptor::new("GDS_CD", "String", "Product code"))
                .with_column(ColumnDescriptor::new("GDS_NM", "String", "Product name")),
        ]
    }

    fn compile(plan_json: &str, question: &str) -> clickask::query_plan::CompiledQuery {
        let tables = tables();
        let candidates: Vec<&TableDescriptor> = tables.iter().collect();
        let allowlist = Allowlist::from_candidates(&candidates);
        let plan = QueryPlan::from_llm_text(plan_json).unwrap();
        PlanCompiler::new(CompilerSettings::default()).compile(&plan, &allowlist, &candidates, question)
    }

    #[test]
    fn test_unlisted_fact_table_is_substituted() {
        let compiled = compile(r#"{"fact_table": "HR.Payroll", "select": ["count()"]}"#, "count");
        assert_eq!(compiled.fact_table, "DW.Cluster_Main_Sales");
        assert!(compiled.sql.contains("FROM DW.Cluster_Main_Sales AS f"));
        assert!(!compiled.sql.contains("HR.Payroll"));
        assert_eq!(compiled.dropped.len(), 1);
    }

    #[test]
    fn test_join_needs_both_aliases() {
        let compiled = compile(
            r#"{"fact_table": "DW.Cluster_Main_Sales",
                "select": ["d1.GDS_NM", "d2.GDS_NM"],
                "joins": [
                    {"table": "DW.Dimension_IM", "on": "d1.GDS_CD = f.GDS_CD"},
                    {"table": "DW.Dimension_IM", "on": "d1.GDS_CD = d2.GDS_CD"}
                ]}"#,
            "names",
        );
        assert!(compiled
            .sql
            .contains("LEFT JOIN DW.Dimension_IM AS d1 ON d1.GDS_CD = f.GDS_CD"));
        assert!(!compiled.sql.contains("AS d2"));
        assert_eq!(compiled.dropped.len(), 1);
    }

    #[test]
    fn test_empty_select_sums_one_metric() {
        let compiled = compile(r#"{"fact_table": "DW.Cluster_Main_Sales"}"#, "total sold qty");
        assert_eq!(compiled.sql.matches("sum(").count(), 1);
        assert!(compiled.sql.contains("sum(f.SoldQty) AS value"));
    }

    #[test]
    fn test_compiled_sql_passes_the_guard_unchanged() {
        let compiled = compile(
            r#"{"fact_table": "DW.Cluster_Main_Sales",
                "select": [{"expr": "sum(f.SoldQty)", "alias": "qty"}],
                "filters": ["f.SoldQty > 0", "f.GDS_CD != ''"],
                "order_by": [{"expr": "qty", "direction": "desc"}],
                "limit": 10}"#,
            "qty",
        );
        assert_eq!(
            compiled.sql,
            "SELECT\n    sum(f.SoldQty) AS qty\nFROM DW.Cluster_Main_Sales AS f\n\
             WHERE (f.SoldQty > 0) AND (f.GDS_CD != '')\nORDER BY qty DESC\nLIMIT 10"
        );

        let tables = tables();
        let candidates: Vec<&TableDescriptor> = tables.iter().collect();
        let allowlist = Allowlist::from_candidates(&candidates);
        assert_eq!(
            sql_guard::validate(&compiled.sql, &allowlist, 200).unwrap(),
            compiled.sql
        );
    }

    #[test]
    fn test_unknown_plan_fields_are_malformed() {
        let err = QueryPlan::from_llm_text(r#"{"fact_table": "x", "sql": "SELECT 1"}"#).unwrap_err();
        assert!(matches!(err, clickask::query_plan::PlanError::Malformed(_)));
    }
}
