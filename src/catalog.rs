use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use thirtyfour::{support, By};

use crate::session::Session;

/// Structural XPath of the anchor elements on a content listing page.
/// Coupled to the exact DOM the server currently renders; when the UI
/// changes, this is the first thing to break.
static CONTENT_LINKS_XPATH: &str = "//*[@id=\"app-root\"]/div/div[1]/div/div/div/div[2]/div[2]/div/div[3]/div/div/div[2]/div[1]/div/div/div[2]/div/div/div/div[4]/div/span/a";

static TRAILING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

/// A named collection of views on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workbook {
    pub name: String,
    pub url: String,
    pub workbook_id: Option<String>,
}

/// A single visualization page within a workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub name: String,
    pub url: String,
    pub view_id: Option<String>,
    pub workbook_id: Option<String>,
}

/// Trailing numeric segment of a content URL, the server's entity id.
pub fn trailing_id(url: &str) -> Option<String> {
    TRAILING_DIGITS
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Enumerate the workbooks owned by the user.
///
/// Absence of matching anchors yields an empty list, not an error; anchors
/// whose URL has no trailing digits are still emitted with a null id.
pub async fn list_workbooks(session: &Session, content_url: &str) -> Result<Vec<Workbook>> {
    println!("\nNavigating to user page: {content_url}");
    session
        .driver
        .goto(content_url)
        .await
        .with_context(|| format!("Could not navigate to {content_url}"))?;
    session.driver.maximize_window().await?;
    support::sleep(Duration::from_secs(5)).await;

    println!("Extracting workbook links...");
    let elements = session
        .driver
        .find_all(By::XPath(CONTENT_LINKS_XPATH))
        .await
        .context("Error extracting workbooks")?;

    let mut workbooks = Vec::new();
    for element in elements {
        let name = element.text().await?;
        if let Some(url) = element.attr("href").await? {
            if url.contains("workbooks") {
                let workbook_id = trailing_id(&url);
                workbooks.push(Workbook {
                    name,
                    url,
                    workbook_id,
                });
            }
        }
    }

    println!("✓ Found {} workbooks", workbooks.len());
    Ok(workbooks)
}

/// Enumerate the views inside one workbook, same extraction pattern as
/// [`list_workbooks`] applied to the workbook's own page.
pub async fn list_views(session: &Session, workbook: &Workbook) -> Result<Vec<View>> {
    session
        .driver
        .goto(&workbook.url)
        .await
        .with_context(|| format!("Could not navigate to {}", workbook.url))?;
    support::sleep(Duration::from_secs(3)).await;

    let elements = session
        .driver
        .find_all(By::XPath(CONTENT_LINKS_XPATH))
        .await
        .context("Error extracting views")?;

    let mut views = Vec::new();
    for element in elements {
        let name = element.text().await?;
        if let Some(url) = element.attr("href").await? {
            let view_id = trailing_id(&url);
            views.push(View {
                name,
                url,
                view_id,
                workbook_id: workbook.workbook_id.clone(),
            });
        }
    }

    println!("Found {} views in this workbook", views.len());
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_digits() {
        assert_eq!(
            trailing_id("https://tableau.example.com/#/site/x/workbooks/12345"),
            Some("12345".to_string())
        );
        assert_eq!(trailing_id("https://tableau.example.com/views/7"), Some("7".to_string()));
    }

    #[test]
    fn no_trailing_digits_yields_none() {
        assert_eq!(trailing_id("https://tableau.example.com/workbooks/abc"), None);
        assert_eq!(trailing_id("https://tableau.example.com/workbooks/12/edit"), None);
        assert_eq!(trailing_id(""), None);
    }
}
