//! Relationship inference over the schema dictionary
//!
//! The dictionary carries no foreign keys, so join paths are inferred from
//! naming conventions and business attributes:
//!
//! - **Join keys**: two columns in different tables that both identify the same
//!   business entity (product, store, receipt, ...) by canonical name or by
//!   attribute phrase.
//! - **Name columns**: columns holding a human-readable label for an entity.
//!
//! Edges are ranked by a confidence score that only orders them; it never
//! decides whether a join is valid. The plan compiler checks join syntax on
//! its own. Both edge lists are truncated so the LLM payload stays small.

use std::collections::HashMap;

use serde::Serialize;

use super::types::{ColumnDescriptor, TableDescriptor};

pub const MAX_JOIN_EDGES: usize = 120;
pub const MAX_NAME_EDGES: usize = 60;

const CANONICAL_SCORE: u32 = 3;
const PHRASE_SCORE: u32 = 2;
const SAME_NAME_BONUS: u32 = 2;

struct KeyGroup {
    label: &'static str,
    canonical: &'static [&'static str],
    phrases: &'static [&'static str],
}

const KEY_GROUPS: &[KeyGroup] = &[
    KeyGroup {
        label: "product",
        canonical: &["gdscd", "productcode", "productid", "prodcd", "prdcd"],
        phrases: &["product code", "product id"],
    },
    KeyGroup {
        label: "item",
        canonical: &["itemcd", "itemcode", "itemid", "itemno"],
        phrases: &["item code", "item id"],
    },
    KeyGroup {
        label: "store",
        canonical: &["storeid", "storecd", "storecode", "storeno", "bizloccd"],
        phrases: &["store number", "store code", "store id"],
    },
    KeyGroup {
        label: "category",
        canonical: &["catecd", "categorycd", "categorycode", "categoryid"],
        phrases: &["category code", "category id"],
    },
    KeyGroup {
        label: "receipt",
        canonical: &["receiptno", "receiptid", "rcptno"],
        phrases: &["receipt no", "receipt number"],
    },
    KeyGroup {
        label: "promotion",
        canonical: &["promotionid", "prmtcd", "promotioncd", "promoid"],
        phrases: &["promotion id", "promotion code"],
    },
    KeyGroup {
        label: "event",
        canonical: &["evtcd", "eventcd", "eventcode", "eventid"],
        phrases: &["event code", "event id"],
    },
    KeyGroup {
        label: "brand",
        canonical: &["brandcd", "brandcode", "brandid"],
        phrases: &["brand code", "brand id"],
    },
    KeyGroup {
        label: "vendor",
        canonical: &["vencd", "vendorcd", "vendorcode", "vendorid", "reprvencd"],
        phrases: &["vendor code", "vendor id", "customer code"],
    },
];

const NAME_CANONICAL: &[(&str, &str)] = &[
    ("gdsnm", "product name"),
    ("gdslabelnm", "product name"),
    ("productname", "product name"),
    ("itemnm", "item name"),
    ("itemname", "item name"),
    ("storenm", "store name"),
    ("storename", "store name"),
    ("catenm", "category name"),
    ("categoryname", "category name"),
    ("brandnm", "brand name"),
    ("brandname", "brand name"),
    ("vennm", "vendor name"),
    ("vendorname", "vendor name"),
];

const NAME_PHRASES: &[&str] = &[
    "product name",
    "item name",
    "store name",
    "category name",
    "brand name",
    "customer name",
    "vendor name",
];

/// `table.column` reference inside a join edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationshipEdge {
    JoinKey {
        left: ColumnRef,
        right: ColumnRef,
        label: String,
        score: u32,
    },
    NameColumn {
        table: String,
        column: String,
        label: String,
        score: u32,
    },
}

impl RelationshipEdge {
    pub fn score(&self) -> u32 {
        match self {
            RelationshipEdge::JoinKey { score, .. } | RelationshipEdge::NameColumn { score, .. } => {
                *score
            }
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RelationshipEdge::JoinKey { label, .. } | RelationshipEdge::NameColumn { label, .. } => {
                label
            }
        }
    }

    /// Qualified table names this edge touches.
    pub fn tables(&self) -> Vec<&str> {
        match self {
            RelationshipEdge::JoinKey { left, right, .. } => {
                vec![left.table.as_str(), right.table.as_str()]
            }
            RelationshipEdge::NameColumn { table, .. } => vec![table.as_str()],
        }
    }
}

/// Inferred edges for the whole catalog, sorted by score descending.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Relationships {
    pub join_keys: Vec<RelationshipEdge>,
    pub name_columns: Vec<RelationshipEdge>,
}

impl Relationships {
    pub fn is_empty(&self) -> bool {
        self.join_keys.is_empty() && self.name_columns.is_empty()
    }

    /// Edges whose tables are all in `tables` (qualified names).
    pub fn restricted_to(&self, tables: &[String]) -> Relationships {
        let keep = |e: &&RelationshipEdge| {
            e.tables()
                .iter()
                .all(|t| tables.iter().any(|x| x.as_str() == *t))
        };
        Relationships {
            join_keys: self.join_keys.iter().filter(keep).cloned().collect(),
            name_columns: self.name_columns.iter().filter(keep).cloned().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationshipEdge> {
        self.join_keys.iter().chain(self.name_columns.iter())
    }
}

/// Best contribution of one table to one key group.
struct Contribution<'a> {
    table: String,
    column: &'a str,
    score: u32,
}

fn key_contribution(group: &KeyGroup, canonical: &str, attribute: &str) -> u32 {
    let mut score = 0;
    if group.canonical.iter().any(|c| *c == canonical) {
        score += CANONICAL_SCORE;
    }
    if group.phrases.iter().any(|p| attribute.contains(p)) {
        score += PHRASE_SCORE;
    }
    score
}

fn name_contribution(canonical: &str, attribute: &str) -> Option<(&'static str, u32)> {
    let by_name = NAME_CANONICAL
        .iter()
        .find(|(c, _)| *c == canonical)
        .map(|(_, label)| *label);
    let by_phrase = NAME_PHRASES.iter().find(|p| attribute.contains(*p)).copied();
    match (by_name, by_phrase) {
        (Some(label), Some(_)) => Some((label, CANONICAL_SCORE + PHRASE_SCORE)),
        (Some(label), None) => Some((label, CANONICAL_SCORE)),
        (None, Some(label)) => Some((label, PHRASE_SCORE)),
        (None, None) => None,
    }
}

/// Infer join-key and name-column edges across `tables`.
pub fn build_relationships(tables: &[TableDescriptor]) -> Relationships {
    let mut join_keys: Vec<RelationshipEdge> = Vec::new();
    let mut seen: HashMap<(String, String, &'static str), usize> = HashMap::new();

    for group in KEY_GROUPS {
        let mut contributions: Vec<Contribution> = Vec::new();
        for table in tables {
            let mut best: Option<(&ColumnDescriptor, u32)> = None;
            for c in &table.columns {
                let attr = c.business_attribute.to_lowercase();
                let s = key_contribution(group, &c.canonical_name(), &attr);
                // strict comparison keeps the first column on ties
                if s > best.map_or(0, |(_, bs)| bs) {
                    best = Some((c, s));
                }
            }
            if let Some((column, score)) = best {
                contributions.push(Contribution {
                    table: table.qualified_name(),
                    column: column.name.as_str(),
                    score,
                });
            }
        }

        for (i, a) in contributions.iter().enumerate() {
            for b in &contributions[i + 1..] {
                if a.table == b.table {
                    continue;
                }
                let mut score = a.score + b.score;
                if a.column.eq_ignore_ascii_case(b.column) {
                    score += SAME_NAME_BONUS;
                }
                let pair = if a.table <= b.table {
                    (a.table.clone(), b.table.clone(), group.label)
                } else {
                    (b.table.clone(), a.table.clone(), group.label)
                };
                let edge = RelationshipEdge::JoinKey {
                    left: ColumnRef::new(&a.table, a.column),
                    right: ColumnRef::new(&b.table, b.column),
                    label: group.label.to_string(),
                    score,
                };
                match seen.get(&pair) {
                    Some(&idx) if join_keys[idx].score() >= score => {}
                    Some(&idx) => join_keys[idx] = edge,
                    None => {
                        seen.insert(pair, join_keys.len());
                        join_keys.push(edge);
                    }
                }
            }
        }
    }

    let mut name_columns: Vec<RelationshipEdge> = Vec::new();
    for table in tables {
        let qualified = table.qualified_name();
        for column in &table.columns {
            let attr = column.business_attribute.to_lowercase();
            if let Some((label, score)) = name_contribution(&column.canonical_name(), &attr) {
                name_columns.push(RelationshipEdge::NameColumn {
                    table: qualified.clone(),
                    column: column.name.clone(),
                    label: label.to_string(),
                    score,
                });
            }
        }
    }

    join_keys.sort_by(|a, b| b.score().cmp(&a.score()));
    name_columns.sort_by(|a, b| b.score().cmp(&a.score()));
    join_keys.truncate(MAX_JOIN_EDGES);
    name_columns.truncate(MAX_NAME_EDGES);

    log::info!(
        "Inferred {} join-key edges and {} name-column edges",
        join_keys.len(),
        name_columns.len()
    );

    Relationships {
        join_keys,
        name_columns,
    }
}
