//! Schema dictionary loading
//!
//! The dictionary is maintained as a workbook with a "Table" sheet and a
//! "Column" sheet. Both sheets are exported to CSV and read here; headers are
//! matched by name so column order in the export does not matter.
//!
//! Loading is two-phase: the CSV readers produce raw [`TableRow`] and
//! [`ColumnRow`] records, and [`assemble`] turns them into descriptors. Tests
//! and embedders can call [`assemble`] directly with fabricated rows.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::{debug, warn};

use super::errors::CatalogError;
use super::types::{ColumnDescriptor, TableDescriptor, TableKey};

const H_DB: &str = "DB";
const H_DIVISION: &str = "Division of work";
const H_TABLE: &str = "Table Name";
const H_ENTITY: &str = "Entity Name";
const H_DESCRIPTION: &str = "Description";
const H_COLUMN: &str = "Column Name";
const H_ATTRIBUTE: &str = "Attribute Name";
const H_DATATYPE: &str = "Datatype";

/// One row of the "Table" sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub database: String,
    pub division: String,
    pub table_name: String,
    pub entity_label: String,
    pub description: String,
}

/// One row of the "Column" sheet. `database` may be blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRow {
    pub database: String,
    pub table_name: String,
    pub column_name: String,
    pub business_attribute: String,
    pub data_type: String,
}

pub fn read_table_rows(path: &Path) -> Result<Vec<TableRow>, CatalogError> {
    let file = open(path)?;
    read_table_rows_from(file, &path.display().to_string())
}

pub fn read_column_rows(path: &Path) -> Result<Vec<ColumnRow>, CatalogError> {
    let file = open(path)?;
    read_column_rows_from(file, &path.display().to_string())
}

fn open(path: &Path) -> Result<std::fs::File, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::CatalogNotFound {
            path: path.display().to_string(),
        });
    }
    std::fs::File::open(path).map_err(|e| CatalogError::ReadError {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

pub fn read_table_rows_from<R: Read>(reader: R, label: &str) -> Result<Vec<TableRow>, CatalogError> {
    let mut sheet = Sheet::new(reader, label)?;
    let db = sheet.require(H_DB)?;
    let table = sheet.require(H_TABLE)?;
    let division = sheet.optional(H_DIVISION);
    let entity = sheet.optional(H_ENTITY);
    let description = sheet.optional(H_DESCRIPTION);

    let mut rows = Vec::new();
    sheet.for_each(|record| {
        rows.push(TableRow {
            database: cell(record, Some(db)),
            division: cell(record, division),
            table_name: cell(record, Some(table)),
            entity_label: cell(record, entity),
            description: cell(record, description),
        });
    })?;
    Ok(rows)
}

pub fn read_column_rows_from<R: Read>(
    reader: R,
    label: &str,
) -> Result<Vec<ColumnRow>, CatalogError> {
    let mut sheet = Sheet::new(reader, label)?;
    let table = sheet.require(H_TABLE)?;
    let column = sheet.require(H_COLUMN)?;
    let db = sheet.optional(H_DB);
    let attribute = sheet.optional(H_ATTRIBUTE);
    let datatype = sheet.optional(H_DATATYPE);

    let mut rows = Vec::new();
    sheet.for_each(|record| {
        rows.push(ColumnRow {
            database: cell(record, db),
            table_name: cell(record, Some(table)),
            column_name: cell(record, Some(column)),
            business_attribute: cell(record, attribute),
            data_type: cell(record, datatype),
        });
    })?;
    Ok(rows)
}

struct Sheet<R: Read> {
    label: String,
    reader: csv::Reader<R>,
    headers: HashMap<String, usize>,
}

impl<R: Read> Sheet<R> {
    fn new(reader: R, label: &str) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| CatalogError::parse_error_with_context(label, e, "header row"))?
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Ok(Self {
            label: label.to_string(),
            reader,
            headers,
        })
    }

    fn require(&self, header: &str) -> Result<usize, CatalogError> {
        self.optional(header).ok_or_else(|| CatalogError::MissingHeader {
            path: self.label.clone(),
            header: header.to_string(),
        })
    }

    fn optional(&self, header: &str) -> Option<usize> {
        self.headers.get(header).copied()
    }

    fn for_each(&mut self, mut f: impl FnMut(&csv::StringRecord)) -> Result<(), CatalogError> {
        for (i, record) in self.reader.records().enumerate() {
            let record = record.map_err(|e| {
                CatalogError::parse_error_with_context(&self.label, e, format!("row {}", i + 2))
            })?;
            f(&record);
        }
        Ok(())
    }
}

fn cell(record: &csv::StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Build descriptors from raw dictionary rows.
///
/// Table rows without a database or table name are skipped. Column rows
/// resolve by exact `(database, table)` key; when the database is blank they
/// resolve by table name only if exactly one table carries that name.
/// Unresolvable column rows are skipped. Output order is the first
/// appearance of each key in `tables`.
pub fn assemble(tables: Vec<TableRow>, columns: Vec<ColumnRow>) -> Vec<TableDescriptor> {
    let mut order: Vec<TableKey> = Vec::new();
    let mut by_key: HashMap<TableKey, TableDescriptor> = HashMap::new();

    for row in tables {
        if row.database.is_empty() || row.table_name.is_empty() {
            continue;
        }
        let key = TableKey::new(&row.database, &row.table_name);
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(
            key,
            TableDescriptor {
                database: row.database,
                division: row.division,
                table_name: row.table_name,
                entity_label: row.entity_label,
                description: row.description,
                columns: Vec::new(),
            },
        );
    }

    let mut skipped = 0usize;
    for row in columns {
        if row.table_name.is_empty() || row.column_name.is_empty() {
            skipped += 1;
            continue;
        }
        let key = if row.database.is_empty() {
            let mut matches = order.iter().filter(|k| k.table_name == row.table_name);
            match (matches.next(), matches.next()) {
                (Some(k), None) => Some(k.clone()),
                _ => None,
            }
        } else {
            Some(TableKey::new(&row.database, &row.table_name))
        };

        let Some(table) = key.and_then(|k| by_key.get_mut(&k)) else {
            skipped += 1;
            continue;
        };
        table.push_column(ColumnDescriptor {
            name: row.column_name,
            data_type: row.data_type,
            business_attribute: row.business_attribute,
        });
    }

    if skipped > 0 {
        warn!("Skipped {} dictionary column rows with no resolvable table", skipped);
    }

    let out: Vec<TableDescriptor> = order
        .into_iter()
        .filter_map(|k| by_key.remove(&k))
        .collect();
    debug!("Assembled {} tables from dictionary", out.len());
    out
}
