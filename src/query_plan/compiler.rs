//! Deterministic plan-to-SQL compilation.
//!
//! The plan comes from outside and is not trusted. Table names are resolved
//! against the request's [`Allowlist`], joins whose `ON` text does not tie
//! the fact alias to the join's own alias are dropped, and the row limit is
//! clamped. Compilation never fails: anything unusable is dropped and
//! reported in [`CompiledQuery::dropped`].

use std::collections::BTreeSet;

use serde::Serialize;

use super::metric::Metric;
use super::plan::{PlanJoin, QueryPlan, SelectItem};
use crate::schema_catalog::TableDescriptor;
use crate::sql_guard::Allowlist;

#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub fact_alias: String,
    pub dim_prefix: String,
    /// Upper bound on any compiled `LIMIT`.
    pub hard_ceiling: u32,
    pub default_limit: u32,
    /// Fact table used when the plan's is unusable and there are no candidates.
    pub default_table: String,
    pub max_joins: usize,
    pub max_select: usize,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            fact_alias: "f".to_string(),
            dim_prefix: "d".to_string(),
            hard_ceiling: 200,
            default_limit: 200,
            default_table: "DW.Cluster_Main_Sales".to_string(),
            max_joins: 4,
            max_select: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub fact_table: String,
    pub declared_tables: BTreeSet<String>,
    pub notes: String,
    /// Human-readable reasons for every plan fragment that was discarded.
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanCompiler {
    settings: CompilerSettings,
}

impl PlanCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn compile(
        &self,
        plan: &QueryPlan,
        allowlist: &Allowlist,
        candidates: &[&TableDescriptor],
        question: &str,
    ) -> CompiledQuery {
        let s = &self.settings;
        let mut dropped = Vec::new();
        let mut declared_tables = BTreeSet::new();

        let fact_table = match resolve_table(&plan.fact_table, allowlist) {
            Some(name) => name,
            None => {
                let substitute = candidates
                    .first()
                    .map(|t| t.qualified_name())
                    .unwrap_or_else(|| s.default_table.clone());
                if !plan.fact_table.is_empty() {
                    dropped.push(format!(
                        "fact table '{}' not allowed, using {}",
                        plan.fact_table, substitute
                    ));
                }
                substitute
            }
        };
        declared_tables.insert(fact_table.clone());

        let mut joins = Vec::new();
        for (idx, join) in plan.joins.iter().take(s.max_joins).enumerate() {
            // Aliases follow declared position so the plan's own `ON` text lines up.
            let alias = format!("{}{}", s.dim_prefix, idx + 1);
            match self.accept_join(join, &alias, allowlist) {
                Ok(table) => {
                    declared_tables.insert(table.clone());
                    joins.push(RenderedJoin {
                        join_type: join.join_type.to_string(),
                        table,
                        alias,
                        on: join.on.trim().to_string(),
                    });
                }
                Err(reason) => dropped.push(reason),
            }
        }
        if plan.joins.len() > s.max_joins {
            dropped.push(format!(
                "{} joins beyond the first {} ignored",
                plan.joins.len() - s.max_joins,
                s.max_joins
            ));
        }

        let select: Vec<SelectItem> = if plan.select.is_empty() {
            let metric = Metric::from_question(question);
            vec![SelectItem::new(
                format!("sum({}.{})", s.fact_alias, metric.column()),
                Some("value"),
            )]
        } else {
            plan.select.iter().take(s.max_select).cloned().collect()
        };

        let limit = plan
            .limit
            .unwrap_or(s.default_limit)
            .min(s.hard_ceiling)
            .max(1);

        let mut sql = String::new();
        sql.push_str("SELECT\n");
        for (i, item) in select.iter().enumerate() {
            sql.push_str("    ");
            sql.push_str(item.expr.trim());
            if let Some(alias) = &item.alias {
                sql.push_str(" AS ");
                sql.push_str(alias.trim());
            }
            if i + 1 < select.len() {
                sql.push(',');
            }
            sql.push('\n');
        }
        sql.push_str(&format!("FROM {} AS {}\n", fact_table, s.fact_alias));
        for join in &joins {
            sql.push_str(&format!(
                "{} JOIN {} AS {} ON {}\n",
                join.join_type, join.table, join.alias, join.on
            ));
        }
        if !plan.filters.is_empty() {
            sql.push_str("WHERE ");
            if plan.filters.len() == 1 {
                sql.push_str(&plan.filters[0]);
            } else {
                let wrapped: Vec<String> =
                    plan.filters.iter().map(|f| format!("({})", f)).collect();
                sql.push_str(&wrapped.join(" AND "));
            }
            sql.push('\n');
        }
        if !plan.group_by.is_empty() {
            sql.push_str("GROUP BY ");
            sql.push_str(&plan.group_by.join(", "));
            sql.push('\n');
        }
        if !plan.order_by.is_empty() {
            let items: Vec<String> = plan
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.expr.trim(), o.direction))
                .collect();
            sql.push_str("ORDER BY ");
            sql.push_str(&items.join(", "));
            sql.push('\n');
        }
        sql.push_str(&format!("LIMIT {}", limit));

        for reason in &dropped {
            log::debug!("plan compiler dropped: {}", reason);
        }

        CompiledQuery {
            sql,
            fact_table,
            declared_tables,
            notes: plan.notes.clone(),
            dropped,
        }
    }

    fn accept_join(
        &self,
        join: &PlanJoin,
        alias: &str,
        allowlist: &Allowlist,
    ) -> Result<String, String> {
        let table = resolve_table(&join.table, allowlist)
            .ok_or_else(|| format!("join table '{}' not allowed", join.table))?;
        if !references_alias(&join.on, &self.settings.fact_alias)
            || !references_alias(&join.on, alias)
        {
            return Err(format!(
                "join on {} must reference {}. and {}.: '{}'",
                table, self.settings.fact_alias, alias, join.on
            ));
        }
        Ok(table)
    }
}

struct RenderedJoin {
    join_type: String,
    table: String,
    alias: String,
    on: String,
}

/// Exact allowlisted name, or the first token of a `"table alias"` form.
fn resolve_table(name: &str, allowlist: &Allowlist) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if allowlist.contains(name) {
        return Some(name.to_string());
    }
    name.split_whitespace()
        .next()
        .filter(|first| allowlist.contains(first))
        .map(str::to_string)
}

/// True when `expr` contains `alias.` not preceded by an identifier character.
pub fn references_alias(expr: &str, alias: &str) -> bool {
    let needle = format!("{}.", alias);
    expr.match_indices(&needle).any(|(pos, _)| {
        expr[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}
