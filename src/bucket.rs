use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::Record;
use crate::format::raw_text;
use crate::schema::{TableSchema, apply_preset, detect_table_structure};

const CRITICAL_KEYWORDS: [&str; 4] = ["fail", "error", "expired", "critical"];
const EXPIRY_SORTED_TABLES: [&str; 2] = ["ssl_cert_check", "ssl_status"];
const EXPIRY_FIELD: &str = "days_to_expiry";

/// Records sharing one discriminator value, with their inferred schema.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub name: String,
    pub records: Arc<Vec<Record>>,
    pub schema: TableSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriticalFinding {
    pub table: String,
    pub field: String,
    pub value: String,
}

/// Guess a table name for records that carry no discriminator.
pub fn determine_table_type(record: &Record) -> &'static str {
    if record.contains_key("backup_status") {
        "backup_status"
    } else if record.contains_key("certificate_expiry") || record.contains_key(EXPIRY_FIELD) {
        "ssl_status"
    } else {
        "unknown"
    }
}

pub fn bucket_name(record: &Record, discriminator: &str) -> String {
    record
        .get(discriminator)
        .and_then(raw_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| determine_table_type(record).to_string())
}

/// Partition records by discriminator. Buckets keep first-appearance order.
pub fn group_records(records: Vec<Record>, discriminator: &str, hidden: &[String]) -> Vec<Bucket> {
    let start_time = Instant::now();
    let nrecords = records.len();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Record>)> = Vec::new();
    for record in records {
        let name = bucket_name(&record, discriminator);
        match index.get(&name) {
            Some(&idx) => groups[idx].1.push(record),
            None => {
                index.insert(name.clone(), groups.len());
                groups.push((name, vec![record]));
            }
        }
    }

    // Schema inference is independent per table
    let buckets: Vec<Bucket> = groups
        .into_par_iter()
        .map(|(name, mut records)| {
            if EXPIRY_SORTED_TABLES.contains(&name.as_str()) {
                sort_by_days_to_expiry(&mut records);
            }
            let schema = apply_preset(&name, detect_table_structure(&records, hidden));
            debug!("Bucket {name}: {} records, {} columns", records.len(), schema.len());
            Bucket {
                name,
                records: Arc::new(records),
                schema,
            }
        })
        .collect();

    info!(
        "Grouped {nrecords} records into {} tables in {}ms",
        buckets.len(),
        start_time.elapsed().as_millis()
    );
    buckets
}

fn days_to_expiry(record: &Record) -> f64 {
    match record.get(EXPIRY_FIELD) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::MAX),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::MAX),
        _ => f64::MAX,
    }
}

/// Soonest expiry first, records without a usable value last.
pub fn sort_by_days_to_expiry(records: &mut [Record]) {
    records.sort_by(|a, b| days_to_expiry(a).total_cmp(&days_to_expiry(b)));
}

/// Status-like string fields that contain one of the critical keywords.
pub fn find_critical(buckets: &[Bucket]) -> Vec<CriticalFinding> {
    let mut findings = Vec::new();
    for bucket in buckets {
        for record in bucket.records.iter() {
            for (key, value) in record {
                let Value::String(s) = value else { continue };
                if !key.to_lowercase().contains("status") {
                    continue;
                }
                let status = s.to_lowercase();
                if CRITICAL_KEYWORDS.iter().any(|k| status.contains(k)) {
                    findings.push(CriticalFinding {
                        table: bucket.name.clone(),
                        field: key.clone(),
                        value: s.clone(),
                    });
                }
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn hidden() -> Vec<String> {
        vec!["table_name".to_string()]
    }

    #[test]
    fn grouping_partitions_by_discriminator() {
        let data = records(json!([
            {"table_name": "a", "x": 1},
            {"table_name": "b", "y": 2},
            {"table_name": "a", "x": 3},
            {"table_name": "c", "z": 4},
            {"table_name": "b", "y": 5},
        ]));
        let buckets = group_records(data.clone(), "table_name", &hidden());

        let names: Vec<&str> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let total: usize = buckets.iter().map(|b| b.records.len()).sum();
        assert_eq!(total, data.len());
        for bucket in &buckets {
            for record in bucket.records.iter() {
                assert_eq!(record["table_name"], json!(bucket.name));
            }
        }
        assert_eq!(buckets[0].records[1]["x"], json!(3));
    }

    #[test]
    fn records_without_discriminator_are_classified() {
        let data = records(json!([
            {"hostname": "h1", "backup_status": "Fail"},
            {"domain": "example.com", "days_to_expiry": 12},
            {"domain": "example.org", "certificate_expiry": "2025-01-01"},
            {"something": "else"},
            {"table_name": "", "something": "empty"},
        ]));
        let buckets = group_records(data, "table_name", &hidden());
        let sizes: Vec<(&str, usize)> = buckets
            .iter()
            .map(|b| (b.name.as_str(), b.records.len()))
            .collect();
        assert_eq!(sizes, vec![("backup_status", 1), ("ssl_status", 2), ("unknown", 2)]);
    }

    #[test]
    fn discriminator_is_not_a_column() {
        let data = records(json!([{"table_name": "a", "hostname": "h"}]));
        let buckets = group_records(data, "table_name", &hidden());
        assert_eq!(buckets[0].schema.keys().collect::<Vec<_>>(), vec!["hostname"]);
    }

    #[test]
    fn certificate_tables_sort_by_expiry() {
        let data = records(json!([
            {"table_name": "ssl_cert_check", "domain": "c", "days_to_expiry": 90},
            {"table_name": "ssl_cert_check", "domain": "none"},
            {"table_name": "ssl_cert_check", "domain": "a", "days_to_expiry": "3"},
            {"table_name": "ssl_cert_check", "domain": "b", "days_to_expiry": -1},
        ]));
        let buckets = group_records(data, "table_name", &hidden());
        let order: Vec<&str> = buckets[0]
            .records
            .iter()
            .map(|r| r["domain"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["b", "a", "c", "none"]);
    }

    #[test]
    fn other_tables_keep_input_order() {
        let data = records(json!([
            {"table_name": "t", "days_to_expiry": 9},
            {"table_name": "t", "days_to_expiry": 1},
        ]));
        let buckets = group_records(data, "table_name", &hidden());
        assert_eq!(buckets[0].records[0]["days_to_expiry"], json!(9));
    }

    #[test]
    fn critical_rows_are_found_in_status_fields_only() {
        let data = records(json!([
            {"table_name": "backup", "backup_status": "Failed"},
            {"table_name": "backup", "backup_status": "Success", "note": "error in log"},
            {"table_name": "ssl", "status": "EXPIRED"},
            {"table_name": "ssl", "status": 3},
        ]));
        let buckets = group_records(data, "table_name", &hidden());
        let findings = find_critical(&buckets);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].table, "backup");
        assert_eq!(findings[0].value, "Failed");
        assert_eq!(findings[1].field, "status");
    }

    #[test]
    fn healthy_data_has_no_findings() {
        let data = records(json!([{"table_name": "b", "backup_status": "Success"}]));
        let buckets = group_records(data, "table_name", &hidden());
        assert!(find_critical(&buckets).is_empty());
    }
}
