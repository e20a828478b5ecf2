use std::path::PathBuf;

use thiserror::Error;

/// Errors that carry structure beyond an `anyhow` context string.
///
/// Only session setup is fatal to the run; the download timeout is mapped
/// to a soft skip by the export fetcher.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("failed to set up the webdriver session: {0}")]
    Setup(#[source] thirtyfour::error::WebDriverError),

    #[error("export file {expected:?} never appeared in {dir:?} after {attempts} checks")]
    DownloadTimeout {
        expected: String,
        dir: PathBuf,
        attempts: u32,
    },
}
