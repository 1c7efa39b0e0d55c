//! In-memory schema registry and token-overlap table search.
//!
//! The registry is built once at startup (from the dictionary exports or from
//! fabricated descriptors in tests) and shared read-only behind an `Arc`.

use std::path::Path;

use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::Serialize;

use super::errors::CatalogError;
use super::loader;
use super::types::{TableDescriptor, TableKey};

/// Score added when the literal table name appears in the question.
const TABLE_NAME_BONUS: u32 = 10;
/// Score per query token found in a table's search blob.
const TOKEN_HIT: u32 = 2;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9_]+").unwrap();
}

const STORE_COLUMNS: &[&str] = &["storeid", "store_id", "bizloc_cd", "location", "locationid"];
const METRIC_COLUMNS: &[&str] = &[
    "netsale", "grosssale", "tax_vat", "discount", "actualcost", "soldqty", "qty", "value",
    "amount",
];
const KEY_COLUMNS: &[&str] = &[
    "gds_cd", "item_cd", "promotionid", "evt_cd", "receiptno", "bizloc_cd", "storeid",
];
const NAME_COLUMNS: &[&str] = &[
    "gds_nm", "item_nm", "name", "item_name", "gds_label_nm", "store_nm", "cate_nm", "brand_nm",
];

/// Column roles of one table, used for prompt context and rule fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnHighlights {
    pub date_cols: Vec<String>,
    pub store_cols: Vec<String>,
    pub metric_cols: Vec<String>,
    pub key_cols: Vec<String>,
    pub name_cols: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableDescriptor>,
    /// Search blob per table, index-aligned with `tables`.
    index: Vec<String>,
}

impl SchemaRegistry {
    /// Load the dictionary from its two CSV exports.
    pub fn load(tables_csv: &Path, columns_csv: &Path) -> Result<Self, CatalogError> {
        let table_rows = loader::read_table_rows(tables_csv)?;
        let column_rows = loader::read_column_rows(columns_csv)?;
        let registry = Self::from_tables(loader::assemble(table_rows, column_rows));
        info!(
            "Schema registry loaded: {} tables, {} columns",
            registry.len(),
            registry.tables.iter().map(|t| t.columns.len()).sum::<usize>()
        );
        Ok(registry)
    }

    pub fn from_tables(tables: Vec<TableDescriptor>) -> Self {
        let index = tables.iter().map(TableDescriptor::search_blob).collect();
        Self { tables, index }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, key: &TableKey) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| &t.key() == key)
    }

    /// Resolve `db.table` or a bare table name (first match in catalog order).
    pub fn find_by_name(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.qualified_name() == name)
            .or_else(|| self.tables.iter().find(|t| t.table_name == name))
    }

    /// Rank tables by token overlap with `query`.
    ///
    /// Score = 2 x matching tokens + 10 if the table name occurs in the
    /// query. Tables scoring zero are dropped; ties keep catalog order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<&TableDescriptor> {
        let q = query.trim().to_lowercase();
        if q.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let tokens: Vec<&str> = TOKEN_RE.find_iter(&q).map(|m| m.as_str()).collect();

        let mut scored: Vec<(u32, &TableDescriptor)> = self
            .tables
            .iter()
            .zip(&self.index)
            .map(|(table, blob)| {
                let hits = tokens.iter().filter(|tok| blob.contains(**tok)).count() as u32;
                let mut score = hits * TOKEN_HIT;
                if q.contains(&table.table_name.to_lowercase()) {
                    score += TABLE_NAME_BONUS;
                }
                (score, table)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // sort_by is stable: equal scores keep catalog order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(top_k).map(|(_, t)| t).collect()
    }

    /// Classify a table's columns by role using canonical name lists.
    pub fn highlights(&self, table: &TableDescriptor) -> ColumnHighlights {
        let mut h = ColumnHighlights::default();
        for column in &table.columns {
            let lc = column.name.to_lowercase();
            if lc.contains("date") || lc.ends_with("_dt") || lc.ends_with("dt") {
                h.date_cols.push(column.name.clone());
            }
            let is = |list: &[&str]| list.iter().any(|c| *c == lc);
            if is(STORE_COLUMNS) {
                h.store_cols.push(column.name.clone());
            }
            if is(METRIC_COLUMNS) {
                h.metric_cols.push(column.name.clone());
            }
            if is(KEY_COLUMNS) {
                h.key_cols.push(column.name.clone());
            }
            if is(NAME_COLUMNS) {
                h.name_cols.push(column.name.clone());
            }
        }
        h.date_cols.truncate(6);
        h.store_cols.truncate(6);
        h.metric_cols.truncate(10);
        h.key_cols.truncate(10);
        h.name_cols.truncate(10);
        h
    }
}
