use std::collections::HashSet;

use crate::schema_catalog::TableDescriptor;

/// Candidates that contribute to a request's allowlist.
pub const ALLOWLIST_CANDIDATES: usize = 8;

/// Tables a single request may reference.
///
/// Built from that request's search candidates only. Each table is allowed
/// both bare (`Sales`) and qualified (`DW.Sales`); lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    names: HashSet<String>,
}

impl Allowlist {
    pub fn from_candidates(candidates: &[&TableDescriptor]) -> Self {
        let mut allowlist = Allowlist::default();
        for table in candidates.iter().take(ALLOWLIST_CANDIDATES) {
            allowlist.insert_table(table);
        }
        allowlist
    }

    pub fn insert_table(&mut self, table: &TableDescriptor) {
        self.names.insert(table.table_name.to_lowercase());
        self.names.insert(table.qualified_name().to_lowercase());
    }

    /// Allow a configured name such as `DW.Cluster_Main_Sales`.
    pub fn insert_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.names.insert(name.to_lowercase());
        if let Some((_, bare)) = name.rsplit_once('.') {
            self.names.insert(bare.to_lowercase());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
