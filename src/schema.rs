use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::trace;

use crate::domain::Record;

/// Display type of a column. Decided once per column and never revised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Status,
    Date,
    Id,
    Object,
    Boolean,
    Number,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub key: String,
    pub title: String,
    pub ctype: ColumnType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Preferred column order and titles for tables we know about.
struct ColumnPreset {
    table: &'static str,
    columns: &'static [(&'static str, &'static str)],
}

const PRESETS: &[ColumnPreset] = &[
    ColumnPreset {
        table: "backup_status",
        columns: &[
            ("hostname", "Hostname"),
            ("backup_status", "Backup Status"),
            ("last_backup_date", "Last Backup Date"),
            ("next_backup_date", "Next Backup Date"),
        ],
    },
    ColumnPreset {
        table: "ssl_status",
        columns: &[
            ("domain", "Domain"),
            ("certificate_issued", "Certificate Issued"),
            ("certificate_expiry", "Certificate Expiry"),
            ("days_to_expiry", "Days to Expiry"),
            ("status", "Status"),
            ("check_date", "Last Check Date"),
        ],
    },
];

pub fn detect_column_type(key: &str, value: &Value) -> ColumnType {
    let key = key.to_lowercase();
    if key.contains("status") {
        return ColumnType::Status;
    }
    if key.contains("date") || key.contains("time") {
        return ColumnType::Date;
    }
    if key.contains("id") && !key.contains("guid") {
        return ColumnType::Id;
    }
    match value {
        Value::Object(_) | Value::Array(_) => ColumnType::Object,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(_) => ColumnType::Number,
        _ => ColumnType::Text,
    }
}

pub fn is_hidden_field(key: &str, hidden: &[String]) -> bool {
    hidden.iter().any(|h| h.eq_ignore_ascii_case(key))
}

/// `"last_backup_date"` -> `"Last Backup Date"`
pub fn format_field_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut word_start = true;
    for c in key.chars().filter(|&c| c != '"' && c != '\'') {
        let c = if c == '_' { ' ' } else { c };
        if word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !c.is_alphanumeric();
    }
    out.trim().to_string()
}

/// Infer the column list of a table from its records.
///
/// Columns follow the key order of the first record, then keys first seen in
/// later records. Each column is typed from the first non-null value of its key.
pub fn detect_table_structure(records: &[Record], hidden: &[String]) -> TableSchema {
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut types: HashMap<&str, ColumnType> = HashMap::new();

    for record in records {
        for (key, value) in record {
            if is_hidden_field(key, hidden) {
                continue;
            }
            if seen.insert(key.as_str()) {
                order.push(key.as_str());
            }
            if !value.is_null() && !types.contains_key(key.as_str()) {
                types.insert(key.as_str(), detect_column_type(key, value));
            }
        }
    }

    let columns = order
        .into_iter()
        .map(|key| ColumnSpec {
            key: key.to_string(),
            title: format_field_name(key),
            ctype: types
                .get(key)
                .copied()
                .unwrap_or_else(|| detect_column_type(key, &Value::Null)),
        })
        .collect::<Vec<ColumnSpec>>();

    trace!("Detected {} columns in {} records", columns.len(), records.len());
    TableSchema { columns }
}

/// Reorder and retitle columns of a known table. Unknown tables are returned unchanged.
pub fn apply_preset(table: &str, schema: TableSchema) -> TableSchema {
    let Some(preset) = PRESETS.iter().find(|p| p.table == table) else {
        return schema;
    };

    let mut rest = schema.columns;
    let mut columns = Vec::with_capacity(rest.len());
    for (key, title) in preset.columns {
        if let Some(pos) = rest.iter().position(|c| c.key == *key) {
            let mut column = rest.remove(pos);
            column.title = title.to_string();
            columns.push(column);
        }
    }
    columns.extend(rest);
    TableSchema { columns }
}
