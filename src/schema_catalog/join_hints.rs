//! Shared-column join hints between candidate tables.
//!
//! A cheaper approximation of [`super::relationships`] used for the
//! candidate set of a single request: two tables sharing a well-known key
//! column name are probably joinable on it. Hints are advisory only.

use std::collections::BTreeSet;

use serde::Serialize;

use super::types::TableDescriptor;

pub const MAX_HINT_TABLES: usize = 6;
pub const MAX_HINTS: usize = 12;

const PREFERRED_KEYS: &[&str] = &[
    "gds_cd",
    "item_cd",
    "storeid",
    "store_id",
    "bizloc_cd",
    "receiptno",
    "promotionid",
    "evt_cd",
    "cate_cd",
    "brand_cd",
    "ven_cd",
];

const KEY_SUFFIXES: &[&str] = &["_cd", "_id", "id", "_no", "no", "code"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinHint {
    pub left: String,
    pub right: String,
    pub key: String,
}

pub fn build_join_hints(candidates: &[&TableDescriptor]) -> Vec<JoinHint> {
    let tables = &candidates[..candidates.len().min(MAX_HINT_TABLES)];
    let names: Vec<BTreeSet<String>> = tables
        .iter()
        .map(|t| t.columns.iter().map(|c| c.name.to_lowercase()).collect())
        .collect();

    let mut hints = Vec::new();
    for i in 0..tables.len() {
        for j in i + 1..tables.len() {
            let shared: BTreeSet<&String> = names[i].intersection(&names[j]).collect();
            if shared.is_empty() {
                continue;
            }
            let key = PREFERRED_KEYS
                .iter()
                .find(|k| shared.iter().any(|s| s.as_str() == **k))
                .map(|k| k.to_string())
                .or_else(|| {
                    shared
                        .iter()
                        .find(|s| KEY_SUFFIXES.iter().any(|suffix| s.ends_with(suffix)))
                        .map(|s| s.to_string())
                });
            if let Some(key) = key {
                hints.push(JoinHint {
                    left: tables[i].qualified_name(),
                    right: tables[j].qualified_name(),
                    key,
                });
                if hints.len() == MAX_HINTS {
                    return hints;
                }
            }
        }
    }
    hints
}
