//! Plan request payloads and system prompts.

use serde::Serialize;

use crate::query_plan::QueryPlan;
use crate::schema_catalog::{
    build_join_hints, ColumnHighlights, JoinHint, RelationshipEdge, Relationships, SchemaRegistry,
    TableDescriptor,
};

/// Candidates described in full in the prompt.
pub const MAX_CONTEXT_TABLES: usize = 3;
pub const MAX_CONTEXT_COLUMNS: usize = 25;
const TYPE_CHARS: usize = 24;
const DESCRIPTION_CHARS: usize = 60;
const TABLE_DESCRIPTION_CHARS: usize = 120;

pub const PLAN_SYSTEM_PROMPT: &str = "\
You plan read-only ClickHouse queries. Reply with ONE JSON object and nothing else.
Shape:
{\"fact_table\": \"db.table\",
 \"select\": [{\"expr\": \"...\", \"alias\": \"...\"}],
 \"joins\": [{\"type\": \"LEFT|INNER|RIGHT|FULL\", \"table\": \"db.table\", \"on\": \"f.col = d1.col\"}],
 \"filters\": [\"...\"], \"group_by\": [\"...\"],
 \"order_by\": [{\"expr\": \"...\", \"direction\": \"ASC|DESC\"}],
 \"limit\": 50, \"notes\": \"one sentence\"}
Rules:
- Use only the candidate tables and their listed columns.
- The fact table is aliased f; joins are aliased d1, d2, d3, d4 in the order you list them.
- Every join condition must reference both f. and its own dN. alias.
- Prefer joinHints and relationships when choosing join keys.
- Dates: use toDate(), today(), toYear() on the date columns listed.
- At most 4 joins and 12 select items. No other keys.";

pub const REPAIR_SYSTEM_PROMPT: &str = "\
You revise a ClickHouse query plan that ran successfully but returned no rows.
Reply with ONE JSON object in exactly the same shape as priorPlan.
Loosen filters that are likely too strict (exact dates, literal codes, name spellings),
keep the same fact table when it fits, and explain the change in notes.";

#[derive(Debug, Clone, Serialize)]
pub struct ColumnContext {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateContext {
    pub db: String,
    pub table: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub columns: Vec<ColumnContext>,
    pub highlights: ColumnHighlights,
}

/// Everything the LLM sees for one question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanContext {
    pub question: String,
    pub candidates: Vec<CandidateContext>,
    pub join_hints: Vec<JoinHint>,
    pub relationships: Vec<RelationshipEdge>,
}

impl PlanContext {
    pub fn build(
        question: &str,
        registry: &SchemaRegistry,
        candidates: &[&TableDescriptor],
        relationships: &Relationships,
    ) -> Self {
        let names: Vec<String> = candidates.iter().map(|t| t.qualified_name()).collect();
        let relationships = relationships.restricted_to(&names).iter().cloned().collect();

        let candidates_ctx = candidates
            .iter()
            .take(MAX_CONTEXT_TABLES)
            .map(|t| CandidateContext {
                db: t.database.clone(),
                table: t.table_name.clone(),
                entity: truncate_chars(&t.entity_label, DESCRIPTION_CHARS),
                description: truncate_chars(&t.description, TABLE_DESCRIPTION_CHARS),
                columns: t
                    .columns
                    .iter()
                    .take(MAX_CONTEXT_COLUMNS)
                    .map(|c| ColumnContext {
                        name: c.name.clone(),
                        data_type: truncate_chars(&c.data_type, TYPE_CHARS),
                        description: truncate_chars(&c.business_attribute, DESCRIPTION_CHARS),
                    })
                    .collect(),
                highlights: registry.highlights(t),
            })
            .collect();

        Self {
            question: question.to_string(),
            candidates: candidates_ctx,
            join_hints: build_join_hints(candidates),
            relationships,
        }
    }

    pub fn plan_prompt(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn repair_prompt(&self, prior_plan: &QueryPlan, reason: &str) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RepairPayload<'a> {
            #[serde(flatten)]
            context: &'a PlanContext,
            prior_plan: &'a QueryPlan,
            reason: &'a str,
        }
        serde_json::to_string(&RepairPayload {
            context: self,
            prior_plan,
            reason,
        })
        .unwrap_or_default()
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
