//! Table and column descriptors loaded from the schema dictionary.
//!
//! Descriptors are immutable once the registry is built; every request
//! borrows them through an `Arc<SchemaRegistry>`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    /// Free-text business label ("Product Code (Item code)", "Store number").
    pub business_attribute: String,
}

impl ColumnDescriptor {
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        business_attribute: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            business_attribute: business_attribute.into(),
        }
    }

    /// Lowercase name with everything but ASCII alphanumerics removed
    /// (`GDS_CD` -> `gdscd`, `Store-ID` -> `storeid`).
    pub fn canonical_name(&self) -> String {
        canonicalize(&self.name)
    }
}

pub fn canonicalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Identity of a table in the dictionary: `(database, table_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub database: String,
    pub table_name: String,
}

impl TableKey {
    pub fn new(database: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub database: String,
    pub division: String,
    pub table_name: String,
    pub entity_label: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(database: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            division: String::new(),
            table_name: table_name.into(),
            entity_label: String::new(),
            description: String::new(),
            columns: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_entity(mut self, entity_label: impl Into<String>) -> Self {
        self.entity_label = entity_label.into();
        self
    }

    /// Append a column unless one with the same name already exists.
    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.push_column(column);
        self
    }

    pub(crate) fn push_column(&mut self, column: ColumnDescriptor) -> bool {
        if self.columns.iter().any(|c| c.name == column.name) {
            return false;
        }
        self.columns.push(column);
        true
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(&self.database, &self.table_name)
    }

    /// `database.table_name`, the form used in generated SQL.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table_name)
    }

    /// Case-insensitive column lookup returning the dictionary spelling.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// First of `options` present in this table, in the dictionary spelling.
    pub fn pick_first_existing<'a, I>(&self, options: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        options
            .into_iter()
            .find_map(|o| self.column(o).map(|c| c.name.as_str()))
    }

    /// Lowercase concatenation of every descriptive field; the search blob.
    pub fn search_blob(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let attrs: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.business_attribute.as_str())
            .collect();
        [
            self.database.as_str(),
            self.division.as_str(),
            self.table_name.as_str(),
            self.entity_label.as_str(),
            self.description.as_str(),
            &names.join(" "),
            &attrs.join(" "),
        ]
        .join(" ")
        .to_lowercase()
    }
}
