//! End-to-end runs of the fallback cascade with scripted plans and a
//! recording executor. No LLM or ClickHouse instance is needed.

#[cfg(test)]
mod cascade_integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use clickask::cascade::{CascadeSettings, CascadeState, ResultMode};
    use clickask::executor::ExecutionError;
    use clickask::query_plan::{PlanError, QueryPlan};
    use clickask::schema_catalog::{ColumnDescriptor, TableDescriptor};

    use crate::support::*;

    fn store_plan(notes: &str) -> QueryPlan {
        QueryPlan::from_llm_text(&format!(
            r#"{{"fact_table": "DW.Cluster_Main_Sales",
                "select": [{{"expr": "sum(f.NetSale)", "alias": "net"}}],
                "filters": ["f.StoreID = 'XX999'"],
                "notes": "{}"}}"#,
            notes
        ))
        .unwrap()
    }

    /// Store code and date window go to ClickHouse as parameters, never as literals
    #[tokio::test]
    async fn test_store_question_uses_parameterized_aggregation() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Ok(rows(
            &["day", "value"],
            vec![vec![json!("2026-10-18"), json!(1520.5)]],
        ))));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("CU520 store net sale last 7 days").await;

        assert_eq!(result.state, CascadeState::RuleBasedAggregation);
        assert_eq!(result.mode, ResultMode::SqlResult);
        assert_eq!(result.row_count, 1);
        assert!(result
            .notes
            .starts_with("Fallback (rule_based_aggregation) after plan_request_failed"));

        let calls = executor.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (sql, params) = &calls[0];
        assert!(sql.contains("WHERE StoreID = {store:String}"));
        assert!(sql.contains("sum(NetSale) AS value"));
        assert!(sql.contains("FROM DW.Cluster_Main_Sales"));
        assert!(!sql.contains("CU520"));
        assert_eq!(params["store"], "CU520");
        assert_eq!(params["start"], "2026-10-12");
        assert_eq!(params["end"], "2026-10-18");

        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].starts_with("plan_and_execute: plan_request_failed"));
    }

    #[tokio::test]
    async fn test_mongolian_store_question() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("CU520 дэлгүүрийн 7 хоногийн NetSale").await;

        assert_eq!(result.state, CascadeState::RuleBasedAggregation);
        let calls = executor.calls.lock().unwrap().clone();
        let (sql, params) = &calls[0];
        assert!(sql.contains("GROUP BY day"));
        assert!(sql.contains("sum(NetSale)"));
        assert_eq!(params["store"], "CU520");
        assert_eq!(params["start"], "2026-10-12");
        assert_eq!(params["end"], "2026-10-18");
    }

    #[tokio::test]
    async fn test_window_sum_without_store_code() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("gross sale this month").await;

        assert_eq!(result.state, CascadeState::RuleBasedWindowSum);
        let calls = executor.calls.lock().unwrap().clone();
        let (sql, params) = &calls[0];
        assert!(sql.contains("sum(GrossSale) AS value"));
        assert!(!params.contains_key("store"));
        assert_eq!(params["start"], "2026-09-19");
        assert_eq!(params["end"], "2026-10-18");
    }

    /// A store code with no store column on any candidate still gets the window sum
    #[tokio::test]
    async fn test_store_question_falls_back_to_window_sum() {
        let daily = TableDescriptor::new("DW", "Daily_Sales")
            .with_description("Daily sales totals")
            .with_column(ColumnDescriptor::new("SalesDate", "Date", "Historic date"))
            .with_column(ColumnDescriptor::new("NetSale", "Decimal(18,2)", "Net sale"));
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine_over(vec![daily], requestor, executor.clone(), settings());

        let result = engine.answer("CU520 daily_sales netsale").await;

        assert_eq!(result.state, CascadeState::RuleBasedWindowSum);
        let calls = executor.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (sql, params) = &calls[0];
        assert!(sql.contains("sum(NetSale) AS value\nFROM DW.Daily_Sales"));
        assert!(!params.contains_key("store"));
    }

    /// Store aggregation finding nothing moves on to the window sum
    #[tokio::test]
    async fn test_empty_store_aggregation_tries_window_sum() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())).then(Ok(empty())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("CU520 net sale last 7 days").await;

        assert_eq!(result.state, CascadeState::RuleBasedWindowSum);
        let statements = executor.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("GROUP BY day"));
        assert!(!statements[1].contains("GROUP BY"));
    }

    /// Zero rows triggers exactly one repair; a second empty answer keeps the first result
    #[tokio::test]
    async fn test_empty_result_is_repaired_once() {
        let requestor = Arc::new(
            ScriptedRequestor::default()
                .with_plan(Ok(store_plan("first try")))
                .with_repair(Ok(store_plan("second try"))),
        );
        let executor = Arc::new(RecordingExecutor::new(Ok(empty())));
        let engine = engine(requestor.clone(), executor.clone(), settings());

        let result = engine.answer("net sale for store today").await;

        assert_eq!(result.state, CascadeState::EmptyResultRepair);
        assert_eq!(result.mode, ResultMode::SqlResult);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.notes, "first try");
        assert!(result.sql.as_deref().unwrap().contains("f.StoreID = 'XX999'"));

        assert_eq!(*requestor.plan_calls.lock().unwrap(), 1);
        assert_eq!(*requestor.repair_calls.lock().unwrap(), vec!["empty_result"]);
        assert_eq!(executor.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_successful_repair_is_returned() {
        let requestor = Arc::new(
            ScriptedRequestor::default()
                .with_plan(Ok(store_plan("first try")))
                .with_repair(Ok(store_plan("second try"))),
        );
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())).then(Ok(empty())));
        let engine = engine(requestor, executor, settings());

        let result = engine.answer("net sale for store today").await;

        assert_eq!(result.state, CascadeState::EmptyResultRepair);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.notes, "second try");
    }

    #[tokio::test]
    async fn test_plan_results_are_returned_directly() {
        let plan = QueryPlan::from_llm_text(
            r#"```json
            {"fact_table": "DW.Cluster_Main_Sales",
             "select": ["f.GDS_CD", "d1.GDS_NM", {"expr": "sum(f.SoldQty)", "alias": "qty"}],
             "joins": [{"type": "LEFT", "table": "DW.Item_Master", "on": "d1.GDS_CD = f.GDS_CD"}],
             "filters": ["toYear(f.SalesDate) = 2025"],
             "group_by": ["f.GDS_CD", "d1.GDS_NM"],
             "order_by": ["qty DESC"],
             "limit": 10,
             "notes": "top products by quantity in 2025"}
            ```"#,
        )
        .unwrap();
        let requestor = Arc::new(ScriptedRequestor::default().with_plan(Ok(plan)));
        let executor = Arc::new(RecordingExecutor::new(Ok(rows(
            &["GDS_CD", "GDS_NM", "qty"],
            vec![
                vec![json!("8801"), json!("Water 500ml"), json!(940)],
                vec![json!("8802"), json!("Cola 1.5L"), json!(610)],
            ],
        ))));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("most sold product 2025").await;

        assert_eq!(result.state, CascadeState::PlanAndExecute);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.notes, "top products by quantity in 2025");
        assert!(result.diagnostics.is_empty());

        let sql = result.sql.unwrap();
        assert!(sql.contains("FROM DW.Cluster_Main_Sales AS f"));
        assert!(sql.contains("LEFT JOIN DW.Item_Master AS d1 ON d1.GDS_CD = f.GDS_CD"));
        assert!(sql.contains("ORDER BY qty DESC"));
        assert!(sql.ends_with("LIMIT 10"));
        assert_eq!(executor.statements(), vec![sql]);
    }

    #[tokio::test]
    async fn test_malformed_plan_falls_through_to_rules() {
        let requestor = Arc::new(
            ScriptedRequestor::default()
                .with_plan(Err(PlanError::Malformed("expected value at line 1".into()))),
        );
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor.clone(), executor, settings());

        let result = engine.answer("net sale this week").await;

        assert_eq!(result.state, CascadeState::RuleBasedWindowSum);
        assert!(result.notes.contains("after plan_malformed"));
        assert!(requestor.repair_calls.lock().unwrap().is_empty());
    }

    /// A plan touching a table outside the candidates never reaches the executor
    #[tokio::test]
    async fn test_unlisted_table_in_plan_is_rejected() {
        let plan = QueryPlan::from_llm_text(
            r#"{"fact_table": "DW.Cluster_Main_Sales",
                "select": ["sum(f.NetSale)"],
                "filters": ["f.StoreID IN (SELECT StoreID FROM HR.Payroll)"]}"#,
        )
        .unwrap();
        let requestor = Arc::new(ScriptedRequestor::default().with_plan(Ok(plan)));
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("net sale per store").await;

        assert_eq!(result.state, CascadeState::RuleBasedWindowSum);
        assert!(result.diagnostics[0].starts_with("plan_and_execute: unauthorized_table"));
        assert!(executor
            .statements()
            .iter()
            .all(|sql| !sql.contains("HR.Payroll")));
    }

    /// Quoted table names hidden in a select item never reach the executor
    #[tokio::test]
    async fn test_quoted_subquery_in_plan_is_rejected() {
        let plan = QueryPlan::from_llm_text(
            r#"{"fact_table": "DW.Cluster_Main_Sales",
                "select": [{"expr": "(SELECT max(name) FROM `system`.`users`)", "alias": "u"}]}"#,
        )
        .unwrap();
        let requestor = Arc::new(ScriptedRequestor::default().with_plan(Ok(plan)));
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("net sale per store").await;

        assert_ne!(result.state, CascadeState::PlanAndExecute);
        assert!(result.diagnostics[0].starts_with("plan_and_execute: unsafe_statement"));
        assert!(executor
            .statements()
            .iter()
            .all(|sql| !sql.contains("system")));
    }

    #[tokio::test]
    async fn test_mutating_plan_is_rejected() {
        let plan = QueryPlan::from_llm_text(
            r#"{"fact_table": "DW.Cluster_Main_Sales",
                "select": ["sum(f.NetSale)"],
                "filters": ["1 = 1; DROP TABLE DW.Cluster_Main_Sales"]}"#,
        )
        .unwrap();
        let requestor = Arc::new(ScriptedRequestor::default().with_plan(Ok(plan)));
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("net sale per store").await;

        assert!(result.diagnostics[0].starts_with("plan_and_execute: unsafe_statement"));
        assert!(executor
            .statements()
            .iter()
            .all(|sql| !sql.to_lowercase().contains("drop")));
    }

    /// Every attempt failing at query level ends in a dictionary summary
    #[tokio::test]
    async fn test_query_failures_end_in_dictionary_summary() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Err(ExecutionError::Query(
            "Code: 47. Unknown identifier".into(),
        ))));
        let engine = engine(requestor, executor.clone(), settings());

        let result = engine.answer("net sale by store").await;

        assert_eq!(result.state, CascadeState::DictionarySummary);
        assert_eq!(result.mode, ResultMode::SchemaSummary);
        assert_eq!(result.sql, None);
        assert_eq!(result.columns, vec!["table", "description", "columns"]);
        assert_eq!(result.rows[0][0], json!("DW.Cluster_Main_Sales"));
        assert!(result.rows[0][2].as_str().unwrap().contains("SalesDate"));
        assert_eq!(result.row_count, result.rows.len());

        // window sum, then one sample per candidate
        assert_eq!(executor.statements().len(), 2);
        assert!(executor.statements()[1].starts_with("SELECT * FROM DW.Cluster_Main_Sales"));
        assert_eq!(result.diagnostics.len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_connection_failure() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(RecordingExecutor::new(Err(ExecutionError::Connection(
            "refused (user=default password=hunter2)".into(),
        ))));
        let engine = engine(requestor, executor, settings());

        let result = engine.answer("net sale by store").await;

        assert_eq!(result.state, CascadeState::ConnectionFailure);
        assert_eq!(result.mode, ResultMode::Error);
        assert!(result.notes.starts_with("ClickHouse is unreachable."));
        assert!(result.notes.contains("DW.Cluster_Main_Sales"));
        assert!(!result.notes.contains("hunter2"));
        assert!(result.diagnostics.iter().all(|d| !d.contains("hunter2")));
    }

    #[tokio::test]
    async fn test_mixed_failures_are_not_a_connection_failure() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(
            RecordingExecutor::new(Err(ExecutionError::Connection("refused".into())))
                .then(Err(ExecutionError::Query("bad column".into()))),
        );
        let engine = engine(requestor, executor, settings());

        let result = engine.answer("net sale by store").await;

        assert_eq!(result.state, CascadeState::DictionarySummary);
    }

    #[tokio::test]
    async fn test_fallback_tables_are_sampled() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let executor = Arc::new(
            RecordingExecutor::new(Ok(one_row()))
                .then(Ok(empty()))
                .then(Ok(empty())),
        );
        let settings = CascadeSettings {
            fallback_tables: vec!["DW.Sales_Sample".to_string()],
            ..settings()
        };
        let engine = engine(requestor, executor.clone(), settings);

        let result = engine.answer("net sale by store").await;

        assert_eq!(result.state, CascadeState::SampleRows);
        assert_eq!(
            executor.statements().last().unwrap(),
            "SELECT * FROM DW.Sales_Sample LIMIT 20"
        );
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let requestor = Arc::new(ScriptedRequestor::default());
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let engine = engine(requestor.clone(), executor.clone(), settings());

        let result = engine.answer("zzz qqq").await;

        assert_eq!(result.state, CascadeState::NoCandidates);
        assert_eq!(result.mode, ResultMode::SchemaSummary);
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert_eq!(result.sql, None);
        assert_eq!(*requestor.plan_calls.lock().unwrap(), 0);
        assert!(executor.statements().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_queries_time_out() {
        let requestor = Arc::new(ScriptedRequestor::failing());
        let settings = CascadeSettings {
            query_timeout: Duration::from_millis(20),
            ..settings()
        };
        let engine = engine(requestor, Arc::new(StalledExecutor), settings);

        let result = engine.answer("net sale by store").await;

        assert_eq!(result.state, CascadeState::DictionarySummary);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.starts_with("rule_based_window_sum: timeout")));
    }

    #[tokio::test]
    async fn test_limit_never_exceeds_max_rows() {
        let plan = QueryPlan::from_llm_text(
            r#"{"fact_table": "DW.Cluster_Main_Sales", "select": ["f.GDS_CD"], "limit": 5000}"#,
        )
        .unwrap();
        let requestor = Arc::new(ScriptedRequestor::default().with_plan(Ok(plan)));
        let executor = Arc::new(RecordingExecutor::new(Ok(one_row())));
        let settings = CascadeSettings {
            max_rows: 50,
            ..settings()
        };
        let engine = engine(requestor, executor, settings);

        let result = engine.answer("product list for store").await;

        assert!(result.sql.unwrap().ends_with("LIMIT 50"));
    }
}
