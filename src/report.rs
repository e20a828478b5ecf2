use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use rust_xlsxwriter::Workbook as XlsxWorkbook;

use crate::aggregate::RawTable;

pub const SUMMARY_SHEET: &str = "Workbook Views Pivot";
pub const DETAILS_SHEET: &str = "Workbook Views Details";

/// Per-workbook view totals, joined with workbook metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub workbook_name: Option<String>,
    pub url: Option<String>,
    pub workbook_id: Option<String>,
    pub total_views: f64,
}

/// Lenient numeric coercion for the `views` column: anything that does
/// not parse as a finite number counts as zero rather than failing the
/// sum. `"nan"`/`"inf"` parse as `f64` but would poison the totals and
/// the descending sort, so they count as zero too.
pub fn coerce_views(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Group records by workbook_id, sum views, and sort descending by total.
///
/// Groups appear in first-seen record order before sorting, so ties keep
/// that order (the sort is stable). Workbooks with no records at all do
/// not appear, rather than showing up zero-valued.
pub fn summarize(records: &RawTable) -> Vec<SummaryRow> {
    println!("\nGenerating summary by workbook...");

    let mut order: Vec<Option<String>> = Vec::new();
    let mut groups: HashMap<Option<String>, SummaryRow> = HashMap::new();

    for row in &records.rows {
        let key = row.get("workbook_id").cloned();
        let views = coerce_views(row.get("views").map(String::as_str));

        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            SummaryRow {
                workbook_name: None,
                url: None,
                workbook_id: key.clone(),
                total_views: 0.0,
            }
        });

        entry.total_views += views;
        if entry.workbook_name.is_none() {
            entry.workbook_name = row.get("Workbook name").cloned();
        }
        if entry.url.is_none() {
            entry.url = row.get("url").cloned();
        }
    }

    let mut summary: Vec<SummaryRow> = order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect();
    summary.sort_by(|a, b| {
        b.total_views
            .partial_cmp(&a.total_views)
            .unwrap_or(Ordering::Equal)
    });

    println!("✓ Summary created: {} workbooks", summary.len());
    summary
}

/// Deterministic output path: user id plus current date.
pub fn report_path(dir: &Path, user_id: &str) -> PathBuf {
    let date = Local::now().format("%Y%m%d");
    dir.join(format!(
        "tableau-views-by-workbook-and-view-{user_id}-{date}.xlsx"
    ))
}

/// Write the two-sheet spreadsheet: summary first, then full detail.
pub fn write_report(summary: &[SummaryRow], records: &RawTable, path: &Path) -> Result<()> {
    println!(
        "\nSaving results to: {}",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );

    let mut workbook = XlsxWorkbook::new();

    let pivot = workbook.add_worksheet();
    pivot.set_name(SUMMARY_SHEET)?;
    let pivot_headers = ["Workbook name", "url", "workbook_id", "total_views"];
    for (col, header) in pivot_headers.iter().enumerate() {
        pivot.write_string(0, col as u16, *header)?;
    }
    for (i, row) in summary.iter().enumerate() {
        let r = (i + 1) as u32;
        pivot.write_string(r, 0, row.workbook_name.as_deref().unwrap_or(""))?;
        pivot.write_string(r, 1, row.url.as_deref().unwrap_or(""))?;
        pivot.write_string(r, 2, row.workbook_id.as_deref().unwrap_or(""))?;
        pivot.write_number(r, 3, row.total_views)?;
    }

    let details = workbook.add_worksheet();
    details.set_name(DETAILS_SHEET)?;
    for (col, header) in records.columns.iter().enumerate() {
        details.write_string(0, col as u16, header)?;
    }
    for (i, row) in records.rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, header) in records.columns.iter().enumerate() {
            if let Some(value) = row.get(header) {
                details.write_string(r, col as u16, value)?;
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Error saving Excel file {}", path.display()))?;

    println!("✓ Results saved to: {}", path.display());
    Ok(())
}
