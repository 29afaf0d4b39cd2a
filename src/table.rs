use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::bucket::Bucket;
use crate::domain::Record;
use crate::format::raw_text;
use crate::schema::{ColumnType, TableSchema};

pub const PAGE_SIZES: [usize; 3] = [5, 10, 25];
pub const NULL_MARKER: &str = "∅";

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnFilter {
    Equals { key: String, value: String },
    Contains { key: String, term: String },
}

impl ColumnFilter {
    fn matches(&self, record: &Record) -> bool {
        match self {
            ColumnFilter::Equals { key, value } => {
                cell_text(record, key).as_deref().unwrap_or(NULL_MARKER) == value
            }
            ColumnFilter::Contains { key, term } => cell_text(record, key)
                .map(|s| s.to_lowercase().contains(&term.to_lowercase()))
                .unwrap_or(false),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ColumnFilter::Equals { key, value } => format!("{key} = {value}"),
            ColumnFilter::Contains { key, term } => format!("{key} ~ {term}"),
        }
    }
}

fn cell_text(record: &Record, key: &str) -> Option<String> {
    record.get(key).and_then(raw_text)
}

/// A filtered, sorted and paginated window onto one bucket.
///
/// `rows` maps view positions to indices in the bucket. The bucket itself is never modified.
pub struct TableView {
    bucket: Arc<Bucket>,
    rows: Arc<Vec<usize>>,
    search_term: String,
    filters: Vec<ColumnFilter>,
    sort: Option<(String, bool)>,
    page: usize,
    page_size: usize,
    pub curser_row: usize, // Row within the current page
    pub curser_column: usize,
    pub offset_column: usize,
}

impl TableView {
    pub fn new(bucket: Arc<Bucket>, page_size: usize) -> Self {
        let rows = Arc::new((0..bucket.records.len()).collect());
        TableView {
            bucket,
            rows,
            search_term: String::new(),
            filters: Vec::new(),
            sort: None,
            page: 0,
            page_size,
            curser_row: 0,
            curser_column: 0,
            offset_column: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.bucket.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.bucket.schema
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    pub fn sort_state(&self) -> Option<(&str, bool)> {
        self.sort.as_ref().map(|(k, asc)| (k.as_str(), *asc))
    }

    /// Number of rows left after search and filters.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn total_rows(&self) -> usize {
        self.bucket.records.len()
    }

    pub fn search(&mut self, term: &str) {
        self.search_term = term.to_string();
        self.recompute();
    }

    pub fn push_filter(&mut self, filter: ColumnFilter) {
        trace!("Filter {} by {}", self.bucket.name, filter.label());
        self.filters.push(filter);
        self.recompute();
    }

    /// Narrow to rows whose field equals `value`. Nulls match the null marker.
    pub fn filter_column(&mut self, key: &str, value: &str) {
        self.push_filter(ColumnFilter::Equals {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn pop_filter(&mut self) -> bool {
        let popped = self.filters.pop().is_some();
        if popped {
            self.recompute();
        }
        popped
    }

    pub fn sort(&mut self, key: &str, ascending: bool) {
        self.sort = Some((key.to_string(), ascending));
        self.recompute();
    }

    fn matches_search(&self, record: &Record, term: &str) -> bool {
        term.is_empty()
            || self
                .bucket
                .schema
                .keys()
                .filter_map(|k| cell_text(record, k))
                .any(|s| s.to_lowercase().contains(term))
    }

    fn recompute(&mut self) {
        let term = self.search_term.to_lowercase();
        let records = &self.bucket.records;

        let mut rows: Vec<usize> = (0..records.len())
            .filter(|&idx| {
                let record = &records[idx];
                self.matches_search(record, &term) && self.filters.iter().all(|f| f.matches(record))
            })
            .collect();

        if let Some((key, ascending)) = &self.sort {
            rows.sort_by(|&a, &b| {
                compare_cells(
                    cell_text(&records[a], key).as_deref(),
                    cell_text(&records[b], key).as_deref(),
                    *ascending,
                )
            });
        }

        trace!(
            "Table {}: {} of {} rows match",
            self.bucket.name,
            rows.len(),
            records.len()
        );
        self.rows = Arc::new(rows);
        self.page = 0;
        self.curser_row = 0;
    }

    // -------------------- Pagination ---------------------- //

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(self.page_size).max(1)
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = std::cmp::min(page, self.page_count() - 1);
        self.clamp_curser();
    }

    pub fn next_page(&mut self) {
        self.set_page(self.page + 1);
    }

    pub fn previous_page(&mut self) {
        self.set_page(self.page.saturating_sub(1));
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page = 0;
        self.curser_row = 0;
    }

    pub fn cycle_page_size(&mut self) -> usize {
        let next = PAGE_SIZES
            .iter()
            .position(|&s| s == self.page_size)
            .map(|i| PAGE_SIZES[(i + 1) % PAGE_SIZES.len()])
            .unwrap_or(PAGE_SIZES[0]);
        self.set_page_size(next);
        next
    }

    /// Bucket indices of the rows on the current page.
    pub fn page_rows(&self) -> &[usize] {
        let begin = std::cmp::min(self.page * self.page_size, self.rows.len());
        let end = std::cmp::min(begin + self.page_size, self.rows.len());
        &self.rows[begin..end]
    }

    pub fn page_records(&self) -> impl Iterator<Item = &Record> {
        self.page_rows().iter().map(|&idx| &self.bucket.records[idx])
    }

    pub fn filtered_records(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().map(|&idx| &self.bucket.records[idx])
    }

    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.bucket.records.iter()
    }

    // -------------------- Selection ---------------------- //

    fn clamp_curser(&mut self) {
        let len = self.page_rows().len();
        self.curser_row = std::cmp::min(self.curser_row, len.saturating_sub(1));
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.page_rows()
            .get(self.curser_row)
            .map(|&idx| &self.bucket.records[idx])
    }

    /// Position of the selection in the filtered rows.
    pub fn selected_position(&self) -> usize {
        self.page * self.page_size + self.curser_row
    }

    pub fn select_position(&mut self, position: usize) {
        if self.rows.is_empty() {
            return;
        }
        let position = std::cmp::min(position, self.rows.len() - 1);
        self.page = position / self.page_size;
        self.curser_row = position % self.page_size;
    }

    pub fn move_up(&mut self) {
        self.select_position(self.selected_position().saturating_sub(1));
    }

    pub fn move_down(&mut self) {
        self.select_position(self.selected_position() + 1);
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.bucket
            .schema
            .columns
            .get(self.curser_column)
            .map(|c| c.key.as_str())
    }

    pub fn selected_cell(&self) -> Option<String> {
        let key = self.selected_key()?;
        self.selected_record().map(|r| cell_text(r, key).unwrap_or_default())
    }

    /// The selected cell as a filter value, null or missing cells give the null marker.
    pub fn selected_filter_value(&self) -> Option<String> {
        let key = self.selected_key()?;
        self.selected_record()
            .map(|r| cell_text(r, key).unwrap_or_else(|| NULL_MARKER.to_string()))
    }

    /// Numeric values of `key` over the first `limit` filtered rows. Rows without a
    /// finite number are skipped.
    pub fn numeric_series(&self, key: &str, limit: usize) -> Vec<(String, f64)> {
        let records: Vec<&Record> = self.filtered_records().take(limit).collect();
        // Label by the text column telling the most rows apart, first one on ties
        let mut label_key: Option<&str> = None;
        let mut best = 0;
        for column in &self.bucket.schema.columns {
            if column.key == key || !matches!(column.ctype, ColumnType::Text | ColumnType::Id) {
                continue;
            }
            let distinct: HashSet<String> = records.iter().filter_map(|r| cell_text(r, &column.key)).collect();
            if distinct.len() > best {
                best = distinct.len();
                label_key = Some(column.key.as_str());
            }
        }
        records
            .iter()
            .enumerate()
            .filter_map(|(pos, record)| {
                let value = cell_text(record, key).as_deref().and_then(parse_number)?;
                let label = label_key
                    .and_then(|k| cell_text(record, k))
                    .unwrap_or_else(|| format!("#{}", pos + 1));
                Some((label, value))
            })
            .collect()
    }

    /// Value counts of a column over the filtered rows, most frequent first.
    pub fn distribution(&self, key: &str) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in self.filtered_records() {
            let value = cell_text(record, key).unwrap_or_else(|| NULL_MARKER.to_string());
            *counts.entry(value).or_insert(0) += 1;
        }
        let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
        sorted.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted
    }
}

/// Finite numbers only, "NaN" and "inf" are text.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Numbers sort before text and compare numerically, text compares as strings.
/// Missing values always go last.
fn compare_cells(a: Option<&str>, b: Option<&str>, ascending: bool) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => return Ordering::Equal,
    };
    match (parse_number(a), parse_number(b)) {
        (Some(a_float), Some(b_float)) => {
            if ascending {
                a_float.total_cmp(&b_float)
            } else {
                b_float.total_cmp(&a_float)
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            if ascending {
                a.cmp(b)
            } else {
                b.cmp(a)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::group_records;
    use serde_json::{Value, json};

    fn view(value: Value, page_size: usize) -> TableView {
        let records = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        let mut buckets = group_records(records, "table_name", &["table_name".to_string()]);
        TableView::new(Arc::new(buckets.remove(0)), page_size)
    }

    fn numbered(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| json!({"table_name": "t", "n": i, "name": format!("row {i}")}))
                .collect(),
        )
    }

    fn names(view: &TableView) -> Vec<String> {
        view.filtered_records()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn search_is_case_insensitive_across_visible_fields() {
        let mut view = view(
            json!([
                {"table_name": "Backups", "name": "alpha", "host": "NAS-01"},
                {"table_name": "Backups", "name": "beta", "host": "nas-02"},
                {"table_name": "Backups", "name": "Gamma", "host": "db"},
            ]),
            10,
        );
        view.search("NAS");
        assert_eq!(names(&view), vec!["alpha", "beta"]);
        view.search("gAmMa");
        assert_eq!(names(&view), vec!["Gamma"]);
        view.search("");
        assert_eq!(view.nrows(), 3);
    }

    #[test]
    fn search_ignores_hidden_fields_and_nulls() {
        let mut view = view(
            json!([
                {"table_name": "backups", "name": "a", "note": null},
                {"table_name": "backups", "name": "b", "note": "null"},
            ]),
            10,
        );
        view.search("backups");
        assert_eq!(view.nrows(), 0);
        view.search("null");
        assert_eq!(names(&view), vec!["b"]);
    }

    #[test]
    fn search_matches_non_string_values() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "a", "size": 1024, "ok": true},
                {"table_name": "t", "name": "b", "size": 7, "ok": false},
            ]),
            10,
        );
        view.search("102");
        assert_eq!(names(&view), vec!["a"]);
        view.search("false");
        assert_eq!(names(&view), vec!["b"]);
    }

    #[test]
    fn search_does_not_touch_the_bucket() {
        let mut view = view(numbered(12), 5);
        view.search("row 1");
        assert_eq!(view.nrows(), 3);
        assert_eq!(view.total_rows(), 12);
        assert_eq!(view.all_records().count(), 12);
    }

    #[test]
    fn search_resets_to_first_page() {
        let mut view = view(numbered(30), 5);
        view.set_page(3);
        view.curser_row = 2;
        view.search("row");
        assert_eq!(view.page(), 0);
        assert_eq!(view.curser_row, 0);
    }

    #[test]
    fn pages_never_exceed_page_size_and_cover_all_rows() {
        for &size in PAGE_SIZES.iter() {
            for n in [0, 1, 4, 5, 6, 24, 25, 26, 53] {
                let mut view = view(numbered(n.max(1)), size);
                if n == 0 {
                    view.search("no such row");
                }
                let mut seen = Vec::new();
                for page in 0..view.page_count() {
                    view.set_page(page);
                    assert!(view.page_rows().len() <= size);
                    seen.extend_from_slice(view.page_rows());
                }
                let expected: Vec<usize> = if n == 0 { vec![] } else { (0..n).collect() };
                assert_eq!(seen, expected, "size {size}, rows {n}");
            }
        }
    }

    #[test]
    fn page_index_is_clamped() {
        let mut view = view(numbered(12), 5);
        assert_eq!(view.page_count(), 3);
        view.set_page(10);
        assert_eq!(view.page(), 2);
        assert_eq!(view.page_rows().len(), 2);
        view.previous_page();
        view.previous_page();
        view.previous_page();
        assert_eq!(view.page(), 0);
    }

    #[test]
    fn page_size_cycles_through_choices() {
        let mut view = view(numbered(3), 10);
        assert_eq!(view.cycle_page_size(), 25);
        assert_eq!(view.cycle_page_size(), 5);
        assert_eq!(view.cycle_page_size(), 10);
    }

    #[test]
    fn moving_down_crosses_pages() {
        let mut view = view(numbered(7), 5);
        for _ in 0..5 {
            view.move_down();
        }
        assert_eq!(view.page(), 1);
        assert_eq!(view.curser_row, 0);
        assert_eq!(view.selected_record().unwrap()["n"], json!(5));
        for _ in 0..10 {
            view.move_down();
        }
        assert_eq!(view.selected_position(), 6);
        view.move_up();
        assert_eq!(view.selected_position(), 5);
    }

    #[test]
    fn sort_is_numeric_aware() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "a", "size": "10"},
                {"table_name": "t", "name": "b", "size": "9"},
                {"table_name": "t", "name": "c", "size": "n/a"},
                {"table_name": "t", "name": "d"},
                {"table_name": "t", "name": "e", "size": 100},
            ]),
            10,
        );
        view.sort("size", true);
        assert_eq!(names(&view), vec!["b", "a", "e", "c", "d"]);
        view.sort("size", false);
        assert_eq!(names(&view), vec!["e", "a", "b", "c", "d"]);
        assert_eq!(view.sort_state(), Some(("size", false)));
    }

    #[test]
    fn sort_treats_nan_as_text() {
        let rows: Vec<Value> = (0..40)
            .map(|i| {
                let pct = if i % 3 == 0 { "NaN".to_string() } else { (i % 23).to_string() };
                json!({"table_name": "t", "name": format!("r{i}"), "pct": pct})
            })
            .collect();
        let mut view = view(Value::Array(rows), 10);

        view.sort("pct", true);
        let pcts: Vec<String> = view
            .filtered_records()
            .map(|r| r["pct"].as_str().unwrap().to_string())
            .collect();
        let first_nan = pcts.iter().position(|p| p == "NaN").unwrap();
        assert!(pcts[first_nan..].iter().all(|p| p == "NaN"));
        let numbers: Vec<f64> = pcts[..first_nan].iter().map(|p| p.parse().unwrap()).collect();
        assert!(numbers.windows(2).all(|w| w[0] <= w[1]));

        view.sort("pct", false);
        assert_eq!(view.nrows(), 40);
        assert_eq!(view.filtered_records().next().unwrap()["pct"], json!("22"));
    }

    #[test]
    fn selected_null_cell_filters_to_null_rows() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "a", "owner": null},
                {"table_name": "t", "name": "b", "owner": "ops"},
                {"table_name": "t", "name": "c"},
            ]),
            10,
        );
        view.curser_column = 1;
        assert_eq!(view.selected_key(), Some("owner"));
        let value = view.selected_filter_value().unwrap();
        assert_eq!(value, NULL_MARKER);
        view.filter_column("owner", &value);
        assert_eq!(names(&view), vec!["a", "c"]);
    }

    #[test]
    fn numeric_series_uses_first_filtered_rows() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "n01_a01", "used": "69.3"},
                {"table_name": "t", "name": "n02_a02", "used": "n/a"},
                {"table_name": "t", "name": "n03_a05", "used": 52.1},
                {"table_name": "t", "name": "n04_a01", "used": "12"},
            ]),
            10,
        );
        assert_eq!(
            view.numeric_series("used", 3),
            vec![("n01_a01".to_string(), 69.3), ("n03_a05".to_string(), 52.1)]
        );
        view.search("a01");
        assert_eq!(
            view.numeric_series("used", 10),
            vec![("n01_a01".to_string(), 69.3), ("n04_a01".to_string(), 12.0)]
        );
        assert!(view.numeric_series("name", 10).is_empty());
    }

    #[test]
    fn numeric_series_labels_by_most_distinct_text() {
        let view = view(
            json!([
                {"table_name": "t", "cluster": "lin-netapp01", "aggregate": "n01_a01", "days": 1001},
                {"table_name": "t", "cluster": "lin-netapp01", "aggregate": "n02_a02", "days": 501},
                {"table_name": "t", "cluster": "lin-netapp02", "aggregate": "n03_a05"},
            ]),
            10,
        );
        assert_eq!(
            view.numeric_series("days", 10),
            vec![("n01_a01".to_string(), 1001.0), ("n02_a02".to_string(), 501.0)]
        );
    }

    #[test]
    fn filters_stack_and_pop() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "a", "cluster": "lin-netapp01", "type": "SSD"},
                {"table_name": "t", "name": "b", "cluster": "lin-netapp01", "type": "HDD"},
                {"table_name": "t", "name": "c", "cluster": "lin-netapp02", "type": "SSD"},
            ]),
            10,
        );
        view.filter_column("cluster", "lin-netapp01");
        view.push_filter(ColumnFilter::Contains {
            key: "type".into(),
            term: "ssd".into(),
        });
        assert_eq!(names(&view), vec!["a"]);
        assert!(view.pop_filter());
        assert_eq!(names(&view), vec!["a", "b"]);
        assert!(view.pop_filter());
        assert!(!view.pop_filter());
        assert_eq!(view.nrows(), 3);
    }

    #[test]
    fn distribution_counts_filtered_rows() {
        let mut view = view(
            json!([
                {"table_name": "t", "name": "a", "type": "SSD"},
                {"table_name": "t", "name": "b", "type": "HDD"},
                {"table_name": "t", "name": "c", "type": "SSD"},
                {"table_name": "t", "name": "d", "type": null},
            ]),
            10,
        );
        assert_eq!(
            view.distribution("type"),
            vec![
                ("SSD".to_string(), 2),
                ("HDD".to_string(), 1),
                (NULL_MARKER.to_string(), 1)
            ]
        );
        view.search("c");
        assert_eq!(view.distribution("type"), vec![("SSD".to_string(), 1)]);

        view.search("");
        view.filter_column("type", NULL_MARKER);
        assert_eq!(names(&view), vec!["d"]);
    }
}
