//! Structured query plan returned by the plan requestor.
//!
//! The LLM answers with free-form text that should contain one JSON object:
//!
//! ```json
//! {"fact_table": "DW.Cluster_Main_Sales",
//!  "select": [{"expr": "d1.GDS_NM", "alias": "item"}, "sum(f.SoldQty) AS qty"],
//!  "joins": [{"type": "LEFT", "table": "DW.Dimension_IM", "on": "f.GDS_CD = d1.GDS_CD"}],
//!  "filters": ["toYear(f.SalesDate) = 2025"],
//!  "group_by": ["d1.GDS_NM"],
//!  "order_by": [{"expr": "qty", "direction": "DESC"}],
//!  "limit": 10,
//!  "notes": "top sold items"}
//! ```
//!
//! Every field is optional and defaults to empty. Unknown fields are rejected
//! so a plan written against a different contract surfaces as
//! [`PlanError::Malformed`] instead of being half-understood.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::PlanError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
    Full,
}

impl TryFrom<String> for JoinType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let upper = value.trim().to_uppercase();
        match upper.trim_end_matches(" JOIN").trim_end_matches(" OUTER") {
            "INNER" => Ok(JoinType::Inner),
            "LEFT" => Ok(JoinType::Left),
            "RIGHT" => Ok(JoinType::Right),
            "FULL" => Ok(JoinType::Full),
            _ => Err(format!("unsupported join type '{}'", value)),
        }
    }
}

impl From<JoinType> for String {
    fn from(value: JoinType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "" | "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(format!("unsupported sort direction '{}'", value)),
        }
    }
}

impl From<Direction> for String {
    fn from(value: Direction) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SelectRepr")]
pub struct SelectItem {
    pub expr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: impl Into<String>, alias: Option<&str>) -> Self {
        Self {
            expr: expr.into(),
            alias: alias.map(str::to_string),
        }
    }
}

/// A select item may be a bare expression string or `{expr, alias}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SelectRepr {
    Bare(String),
    Full {
        expr: String,
        #[serde(default)]
        alias: Option<String>,
    },
}

impl From<SelectRepr> for SelectItem {
    fn from(repr: SelectRepr) -> Self {
        match repr {
            SelectRepr::Bare(expr) => SelectItem { expr, alias: None },
            SelectRepr::Full { expr, alias } => SelectItem {
                expr,
                alias: alias.filter(|a| !a.trim().is_empty()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanJoin {
    #[serde(rename = "type", alias = "join_type", default)]
    pub join_type: JoinType,
    pub table: String,
    pub on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OrderRepr")]
pub struct OrderItem {
    pub expr: String,
    pub direction: Direction,
}

/// `"qty DESC"` or `{expr, direction}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrderRepr {
    Bare(String),
    Full {
        expr: String,
        #[serde(default)]
        direction: Option<String>,
    },
}

impl TryFrom<OrderRepr> for OrderItem {
    type Error = String;

    fn try_from(repr: OrderRepr) -> Result<Self, Self::Error> {
        match repr {
            OrderRepr::Bare(text) => {
                let trimmed = text.trim();
                let split = trimmed
                    .rsplit_once(char::is_whitespace)
                    .and_then(|(expr, word)| match word.to_uppercase().as_str() {
                        "DESC" => Some((expr, Direction::Desc)),
                        "ASC" => Some((expr, Direction::Asc)),
                        _ => None,
                    });
                let (expr, direction) = split.unwrap_or((trimmed, Direction::Asc));
                Ok(OrderItem {
                    expr: expr.trim().to_string(),
                    direction,
                })
            }
            OrderRepr::Full { expr, direction } => Ok(OrderItem {
                expr,
                direction: Direction::try_from(direction.unwrap_or_default())?,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryPlan {
    pub fact_table: String,
    pub select: Vec<SelectItem>,
    pub joins: Vec<PlanJoin>,
    pub filters: Vec<String>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u32>,
    pub notes: String,
}

impl QueryPlan {
    /// Parse the plan out of raw LLM output.
    ///
    /// Code fences and any prose around the outermost `{ ... }` are ignored.
    pub fn from_llm_text(text: &str) -> Result<Self, PlanError> {
        let json = extract_json_object(text)
            .ok_or_else(|| PlanError::Malformed("no JSON object in response".to_string()))?;
        let mut plan: QueryPlan =
            serde_json::from_str(json).map_err(|e| PlanError::Malformed(e.to_string()))?;
        plan.normalize();
        Ok(plan)
    }

    /// Trim fields, drop blank entries and duplicate filters.
    pub fn normalize(&mut self) {
        self.fact_table = self.fact_table.trim().to_string();
        self.notes = self.notes.trim().to_string();
        self.select.retain(|s| !s.expr.trim().is_empty());
        self.group_by.retain(|g| !g.trim().is_empty());
        self.order_by.retain(|o| !o.expr.trim().is_empty());

        let mut seen = std::collections::HashSet::new();
        self.filters = std::mem::take(&mut self.filters)
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty() && seen.insert(f.clone()))
            .collect();
    }
}

/// Slice from the first `{` to the last `}`, after stripping code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}
