use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thirtyfour::{support, By, Key};

use crate::error::ScraperError;
use crate::session::Session;

/// Filename stem the server gives every "Who Has Seen" export.
pub const EXPORT_PREFIX: &str = "Who Has Seen_data";
/// Default name of a freshly downloaded, not yet renamed, export.
pub const DEFAULT_EXPORT_FILE: &str = "Who Has Seen_data.csv";

static WORKBOOK_ID_IN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)-").unwrap());
static VIEW_ID_IN_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)\.csv$").unwrap());

/// The identifying metadata embedded in an export's filename, carried as a
/// struct instead of being re-parsed out of a string at every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportName {
    pub workbook_id: String,
    pub view_id: String,
}

impl ExportName {
    pub fn new(workbook_id: impl Into<String>, view_id: impl Into<String>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            view_id: view_id.into(),
        }
    }

    /// Name for an enumerated view, if both ids survived extraction.
    /// Views missing either id cannot produce a parseable filename and
    /// are skipped by the caller.
    pub fn for_view(view: &crate::catalog::View) -> Option<Self> {
        match (&view.workbook_id, &view.view_id) {
            (Some(workbook_id), Some(view_id)) => {
                Some(Self::new(workbook_id.clone(), view_id.clone()))
            }
            _ => None,
        }
    }

    /// Stable, parseable filename: `Who Has Seen_data-<wb>-<view>.csv`.
    pub fn file_name(&self) -> String {
        format!("{EXPORT_PREFIX}-{}-{}.csv", self.workbook_id, self.view_id)
    }
}

/// True for filenames following the export naming convention.
pub fn is_export_file(file_name: &str) -> bool {
    file_name.starts_with(&format!("{EXPORT_PREFIX}-")) && file_name.ends_with(".csv")
}

/// Best-effort extraction of `(workbook_id, view_id)` from a filename.
/// Either side degrades to `None` when the pattern does not match.
pub fn parse_export_ids(file_name: &str) -> (Option<String>, Option<String>) {
    let workbook_id = WORKBOOK_ID_IN_NAME
        .captures(file_name)
        .map(|caps| caps[1].to_string());
    let view_id = VIEW_ID_IN_NAME
        .captures(file_name)
        .map(|caps| caps[1].to_string());
    (workbook_id, view_id)
}

/// Capability interface over the brittle UI export sequence, so the
/// selectors are swappable without touching pipeline logic.
#[async_trait]
pub trait Exporter {
    /// Drive one export to disk. `Ok(None)` means the download never
    /// materialized within the poll budget; hard step failures propagate
    /// and are caught at the call site.
    async fn fetch(&self, session: &Session, name: &ExportName) -> Result<Option<PathBuf>>;
}

/// Exporter for the server's built-in "Who Has Seen" admin view.
pub struct WhoHasSeenExporter {
    pub base_url: String,
    pub downloads_dir: PathBuf,
    /// Number of one-second polls to wait for the download to land.
    pub poll_budget: u32,
}

impl WhoHasSeenExporter {
    pub fn new(base_url: impl Into<String>, downloads_dir: PathBuf) -> Self {
        Self {
            base_url: base_url.into(),
            downloads_dir,
            poll_budget: 10,
        }
    }

    fn export_url(&self, view_id: &str) -> String {
        format!(
            "{}/vizql/showadminview/views/WhoHasSeen?views_id={view_id}",
            self.base_url
        )
    }

    /// Bounded poll for the default download filename. Not event-driven;
    /// one check per second up to the budget.
    async fn wait_for_download(&self) -> Result<PathBuf, ScraperError> {
        let expected = self.downloads_dir.join(DEFAULT_EXPORT_FILE);
        for _ in 0..self.poll_budget {
            if expected.exists() {
                return Ok(expected);
            }
            support::sleep(Duration::from_secs(1)).await;
        }
        Err(ScraperError::DownloadTimeout {
            expected: DEFAULT_EXPORT_FILE.to_string(),
            dir: self.downloads_dir.clone(),
            attempts: self.poll_budget,
        })
    }
}

#[async_trait]
impl Exporter for WhoHasSeenExporter {
    async fn fetch(&self, session: &Session, name: &ExportName) -> Result<Option<PathBuf>> {
        let driver = &session.driver;
        let url = self.export_url(&name.view_id);
        println!("  Downloading stats for view {}...", name.view_id);

        driver
            .goto(&url)
            .await
            .with_context(|| format!("Could not navigate to {url}"))?;
        support::sleep(Duration::from_secs(3)).await;

        let download_btn = driver
            .find(By::XPath("//*[@id=\"download\"]"))
            .await
            .context("Could not find download button")?;
        download_btn.click().await?;

        // Menu item order is assumed constant: one move down, confirm.
        let menu = driver
            .find(By::XPath("//*[@id=\"viz-viewer-toolbar-download-menu\"]"))
            .await
            .context("Could not find download menu")?;
        menu.send_keys(Key::Down).await?;
        menu.send_keys(Key::Enter).await?;
        support::sleep(Duration::from_secs(1)).await;

        // The export confirmation opens as a popup window.
        let original_window = driver.window().await?;
        let handles = driver.windows().await?;
        let popup = handles
            .get(1)
            .context("Export popup window never opened")?
            .clone();

        driver.switch_to_window(popup).await?;
        support::sleep(Duration::from_secs(1)).await;

        let popup_btn = driver
            .find(By::XPath(
                "/html/body/div[1]/div/div/div/div[2]/div[1]/div[2]/button",
            ))
            .await
            .context("Could not find download button in popup")?;
        popup_btn.click().await?;

        driver.switch_to_window(original_window).await?;

        // A residual confirmation dialog is left behind in the main window.
        let close_btn = driver
            .find(By::XPath(
                "/html/body/div[6]/div/div/div/div/div[3]/div/div/button",
            ))
            .await
            .context("Could not find close button for the download dialog")?;
        close_btn.click().await?;
        support::sleep(Duration::from_secs(3)).await;

        let downloaded = match self.wait_for_download().await {
            Ok(path) => path,
            Err(e) => {
                println!("  ✗ File not downloaded: {e}");
                return Ok(None);
            }
        };

        let renamed = self.downloads_dir.join(name.file_name());
        std::fs::rename(&downloaded, &renamed)
            .with_context(|| format!("Could not rename {} to {}", downloaded.display(), renamed.display()))?;

        println!("  ✓ Downloaded and saved as: {}", name.file_name());
        Ok(Some(renamed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_export_filename() {
        let name = ExportName::new("100", "1");
        assert_eq!(name.file_name(), "Who Has Seen_data-100-1.csv");
    }

    #[test]
    fn parse_then_format_is_idempotent() {
        let original = "Who Has Seen_data-845-6021.csv";
        let (workbook_id, view_id) = parse_export_ids(original);
        let name = ExportName::new(workbook_id.unwrap(), view_id.unwrap());
        assert_eq!(name.file_name(), original);
    }

    #[test]
    fn unmatched_patterns_degrade_to_none() {
        assert_eq!(parse_export_ids("Who Has Seen_data.csv"), (None, None));
        assert_eq!(parse_export_ids("random.txt"), (None, None));

        // Only one side matching still yields the matching side.
        let (workbook_id, view_id) = parse_export_ids("Who Has Seen_data-42-final.csv");
        assert_eq!(workbook_id, Some("42".to_string()));
        assert_eq!(view_id, None);
    }

    #[test]
    fn views_missing_an_id_get_no_export_name() {
        use crate::catalog::View;

        let view = |workbook_id: Option<&str>, view_id: Option<&str>| View {
            name: "Overview".to_string(),
            url: "https://tableau.example.com/views/1".to_string(),
            view_id: view_id.map(str::to_string),
            workbook_id: workbook_id.map(str::to_string),
        };

        let name = ExportName::for_view(&view(Some("100"), Some("1"))).unwrap();
        assert_eq!(name.file_name(), "Who Has Seen_data-100-1.csv");

        assert_eq!(ExportName::for_view(&view(None, Some("1"))), None);
        assert_eq!(ExportName::for_view(&view(Some("100"), None)), None);
    }

    #[test]
    fn recognizes_export_files() {
        assert!(is_export_file("Who Has Seen_data-100-1.csv"));
        assert!(!is_export_file("Who Has Seen_data.csv"));
        assert!(!is_export_file("Who Has Seen_data-100-1.xlsx"));
        assert!(!is_export_file("other-100-1.csv"));
    }
}
