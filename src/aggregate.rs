use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::Reader;
use log::warn;

use crate::catalog::Workbook;
use crate::export::{is_export_file, parse_export_ids};
use crate::identity::UNRESOLVED;

/// Output schema, in order. Only the columns that actually appear in at
/// least one source file survive; nothing is enforced beyond this list.
pub const CANONICAL_COLUMNS: [&str; 8] = [
    "Workbook name",
    "View Name",
    "workbook_id",
    "view_id",
    "url",
    "Last Viewed",
    "Username",
    "views",
];

/// A loosely-typed table: ordered column names plus rows keyed by column.
/// A row simply lacking a key is a null cell. Exported files do not share
/// a schema, so this stays stringly-typed until the report is built.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, String>>,
}

impl RawTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Add a column holding the same (possibly null) value in every row.
    pub fn add_const_column(&mut self, name: &str, value: Option<&str>) {
        self.ensure_column(name);
        if let Some(value) = value {
            for row in &mut self.rows {
                row.insert(name.to_string(), value.to_string());
            }
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(column) = self.columns.iter_mut().find(|c| *c == from) {
            *column = to.to_string();
            for row in &mut self.rows {
                if let Some(value) = row.remove(from) {
                    row.insert(to.to_string(), value);
                }
            }
        }
    }

    pub fn drop_column(&mut self, name: &str) {
        self.columns.retain(|c| c != name);
        for row in &mut self.rows {
            row.remove(name);
        }
    }

    /// Keep only `wanted` columns, in that order, skipping absent ones.
    pub fn select_columns(&mut self, wanted: &[&str]) {
        let kept: Vec<String> = wanted
            .iter()
            .filter(|name| self.has_column(name))
            .map(|name| name.to_string())
            .collect();
        for row in &mut self.rows {
            row.retain(|key, _| kept.iter().any(|c| c == key));
        }
        self.columns = kept;
    }

    /// Concatenate tables with a union-of-columns strategy: the result's
    /// column set is the union in first-seen order, rows keep only the
    /// cells they had, and the row count is the sum of the inputs.
    pub fn concat(tables: Vec<RawTable>) -> RawTable {
        let mut result = RawTable::new();
        for table in tables {
            for column in &table.columns {
                result.ensure_column(column);
            }
            result.rows.extend(table.rows);
        }
        result
    }
}

/// Parse one exported CSV into a table. The header row becomes the column
/// set; empty header names are skipped.
pub fn read_export_csv(path: &Path) -> Result<RawTable> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Could not open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Could not read header of {}", path.display()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = RawTable::new();
    for header in &headers {
        if !header.is_empty() {
            table.ensure_column(header);
        }
    }

    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let mut row = HashMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            if !header.is_empty() {
                row.insert(header.clone(), value.to_string());
            }
        }
        table.rows.push(row);
    }

    Ok(table)
}

/// Files in `dir` matching the export naming convention, sorted by name
/// so a run's output does not depend on directory iteration order.
pub fn scan_exports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Could not read download directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        if is_export_file(&file_name.to_string_lossy()) {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// Left join against workbook metadata on workbook_id. Every row is
/// preserved; rows whose id matches no enumerated workbook (or is null)
/// get null name/url, never an error.
pub fn left_join_workbooks(table: &mut RawTable, workbooks: &[Workbook]) {
    let by_id: HashMap<&str, &Workbook> = workbooks
        .iter()
        .filter_map(|wb| wb.workbook_id.as_deref().map(|id| (id, wb)))
        .collect();

    table.ensure_column("Workbook name");
    table.ensure_column("url");

    for row in &mut table.rows {
        let matched = row
            .get("workbook_id")
            .and_then(|id| by_id.get(id.as_str()));
        if let Some(workbook) = matched {
            row.insert("Workbook name".to_string(), workbook.name.clone());
            row.insert("url".to_string(), workbook.url.clone());
        }
    }
}

/// Scan the download directory, parse every export, tag rows with the ids
/// encoded in each filename, concatenate, join workbook metadata, and
/// reduce to the canonical column set.
pub fn aggregate(downloads_dir: &Path, workbooks: &[Workbook]) -> Result<RawTable> {
    let files = scan_exports(downloads_dir)?;
    println!("\nParsing {} downloaded files...", files.len());

    let mut tables = Vec::new();
    for path in &files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut table = match read_export_csv(path) {
            Ok(table) => table,
            Err(e) => {
                warn!("Error parsing {file_name}: {e:#}");
                println!("  ✗ Error parsing {file_name}, skipping");
                continue;
            }
        };

        let (workbook_id, view_id) = parse_export_ids(&file_name);
        table.add_const_column("workbook_id", workbook_id.as_deref());
        table.add_const_column("view_id", view_id.as_deref());
        tables.push(table);
    }

    if tables.is_empty() {
        return Ok(RawTable::new());
    }

    let mut merged = RawTable::concat(tables);
    left_join_workbooks(&mut merged, workbooks);

    merged.drop_column("Measure Names");
    merged.rename_column("Measure Values", "views");
    merged.select_columns(&CANONICAL_COLUMNS);

    println!("✓ Parsed data: {} rows", merged.len());
    Ok(merged)
}

/// Distinct values of the Username column, in first-seen row order.
pub fn distinct_usernames(table: &RawTable) -> Vec<String> {
    let mut seen = Vec::new();
    for row in &table.rows {
        if let Some(username) = row.get("Username") {
            if !seen.contains(username) {
                seen.push(username.clone());
            }
        }
    }
    seen
}

/// Attach the resolved FullName column. Rows whose username is missing
/// from the mapping (or null) fall back to the unresolved sentinel only
/// when a username is present; truly null usernames stay null.
pub fn attach_full_names(table: &mut RawTable, names: &HashMap<String, String>) {
    table.ensure_column("FullName");
    for row in &mut table.rows {
        if let Some(username) = row.get("Username") {
            let full_name = names
                .get(username)
                .cloned()
                .unwrap_or_else(|| UNRESOLVED.to_string());
            row.insert("FullName".to_string(), full_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(columns: &[&str], rows: &[&[(&str, &str)]]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| {
                    cells
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        }
    }

    fn workbook(id: &str, name: &str, url: &str) -> Workbook {
        Workbook {
            name: name.to_string(),
            url: url.to_string(),
            workbook_id: Some(id.to_string()),
        }
    }

    #[test]
    fn concat_unions_columns_and_sums_rows() {
        let a = table(&["Username", "views"], &[&[("Username", "T1"), ("views", "5")]]);
        let b = table(
            &["Username", "Last Viewed"],
            &[
                &[("Username", "T2"), ("Last Viewed", "2026-01-01")],
                &[("Username", "T3")],
            ],
        );

        let merged = RawTable::concat(vec![a, b]);
        assert_eq!(merged.columns, vec!["Username", "views", "Last Viewed"]);
        assert_eq!(merged.len(), 3);
        // Cells absent from a source file stay null.
        assert!(merged.rows[1].get("views").is_none());
        assert!(merged.rows[0].get("Last Viewed").is_none());
    }

    #[test]
    fn left_join_preserves_unmatched_rows() {
        let mut records = table(
            &["workbook_id", "views"],
            &[
                &[("workbook_id", "100"), ("views", "5")],
                &[("workbook_id", "999"), ("views", "2")],
                &[("views", "1")],
            ],
        );

        left_join_workbooks(&mut records, &[workbook("100", "WB A", "u")]);

        assert_eq!(records.len(), 3);
        assert_eq!(records.rows[0].get("Workbook name").unwrap(), "WB A");
        assert_eq!(records.rows[0].get("url").unwrap(), "u");
        // Unmatched and null ids keep null metadata.
        assert!(records.rows[1].get("Workbook name").is_none());
        assert!(records.rows[2].get("Workbook name").is_none());
    }

    #[test]
    fn select_keeps_only_existing_canonical_columns() {
        let mut records = table(
            &["Username", "views", "Extra"],
            &[&[("Username", "T1"), ("views", "5"), ("Extra", "x")]],
        );
        records.select_columns(&CANONICAL_COLUMNS);
        assert_eq!(records.columns, vec!["Username", "views"]);
        assert!(records.rows[0].get("Extra").is_none());
    }

    #[test]
    fn rename_moves_cell_values() {
        let mut records = table(&["Measure Values"], &[&[("Measure Values", "7")]]);
        records.rename_column("Measure Values", "views");
        assert_eq!(records.columns, vec!["views"]);
        assert_eq!(records.rows[0].get("views").unwrap(), "7");
    }

    #[test]
    fn aggregate_tags_rows_with_filename_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut file =
            fs::File::create(dir.path().join("Who Has Seen_data-100-1.csv")).unwrap();
        writeln!(file, "View Name,Username,Measure Names,Measure Values").unwrap();
        writeln!(file, "Overview,T111,Views,5").unwrap();

        // Not matching the convention, must be ignored.
        fs::write(dir.path().join("Who Has Seen_data.csv"), "Username\nT9\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "irrelevant").unwrap();

        let records = aggregate(dir.path(), &[workbook("100", "WB A", "u")]).unwrap();

        assert_eq!(records.len(), 1);
        let row = &records.rows[0];
        assert_eq!(row.get("workbook_id").unwrap(), "100");
        assert_eq!(row.get("view_id").unwrap(), "1");
        assert_eq!(row.get("Workbook name").unwrap(), "WB A");
        assert_eq!(row.get("views").unwrap(), "5");
        // Measure Names is dropped, Extra columns never invented.
        assert!(!records.has_column("Measure Names"));
    }

    #[test]
    fn aggregate_skips_unparseable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Who Has Seen_data-1-1.csv"),
            "Username,views\nT1,2\n",
        )
        .unwrap();
        // Ragged row: the csv reader rejects this file, the rest proceed.
        fs::write(
            dir.path().join("Who Has Seen_data-1-2.csv"),
            "Username,views\nT2,3,junk\n",
        )
        .unwrap();

        let records = aggregate(dir.path(), &[]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.rows[0].get("Username").unwrap(), "T1");
    }

    #[test]
    fn distinct_usernames_preserve_order() {
        let records = table(
            &["Username"],
            &[
                &[("Username", "T2")],
                &[("Username", "T1")],
                &[("Username", "T2")],
                &[],
            ],
        );
        assert_eq!(distinct_usernames(&records), vec!["T2", "T1"]);
    }

    #[test]
    fn attach_full_names_defaults_to_sentinel() {
        let mut records = table(
            &["Username"],
            &[&[("Username", "T1")], &[("Username", "T2")], &[]],
        );
        let mut names = HashMap::new();
        names.insert("T1".to_string(), "Ada Lovelace".to_string());

        attach_full_names(&mut records, &names);

        assert_eq!(records.rows[0].get("FullName").unwrap(), "Ada Lovelace");
        assert_eq!(records.rows[1].get("FullName").unwrap(), UNRESOLVED);
        assert!(records.rows[2].get("FullName").is_none());
    }
}
