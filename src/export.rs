use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use polars::prelude::*;
use tracing::info;

use crate::domain::{DaveError, Record};
use crate::format::raw_text;
use crate::schema::TableSchema;

pub const EXPORT_FAILURE_NOTICE: &str = "Failed to export data. Please try again.";

/// `<dir>/<table>_<timestamp>.csv`, with path-hostile characters replaced.
pub fn export_path(dir: &Path, table: &str) -> PathBuf {
    let safe: String = table
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    dir.join(format!("{safe}_{stamp}.csv"))
}

/// Headers are the prettified titles of the visible columns. Titles that collide get a suffix.
fn unique_titles(schema: &TableSchema) -> Vec<String> {
    let mut used = HashSet::new();
    schema
        .columns
        .iter()
        .map(|c| {
            let mut title = c.title.clone();
            let mut n = 2;
            while !used.insert(title.clone()) {
                title = format!("{} ({n})", c.title);
                n += 1;
            }
            title
        })
        .collect()
}

pub fn build_frame<'a>(
    schema: &TableSchema,
    rows: impl Iterator<Item = &'a Record>,
) -> Result<DataFrame, DaveError> {
    let rows: Vec<&Record> = rows.collect();
    let columns: Vec<Column> = schema
        .columns
        .iter()
        .zip(unique_titles(schema))
        .map(|(spec, title)| {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|r| r.get(&spec.key).and_then(raw_text))
                .collect();
            Series::new(title.into(), values).into()
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Write the given rows of a table as CSV into `dir` and return the file written.
pub fn export_csv<'a>(
    table: &str,
    schema: &TableSchema,
    rows: impl Iterator<Item = &'a Record>,
    dir: &Path,
) -> Result<PathBuf, DaveError> {
    if schema.is_empty() {
        return Err(DaveError::ExportFailed(format!("{table} has no columns")));
    }
    let start_time = Instant::now();
    let mut frame = build_frame(schema, rows)?;

    fs::create_dir_all(dir)?;
    let path = export_path(dir, table);
    let mut file = File::create(&path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)?;

    info!(
        "Exported {} rows of {table} to {} in {}ms",
        frame.height(),
        path.display(),
        start_time.elapsed().as_millis()
    );
    Ok(path)
}
