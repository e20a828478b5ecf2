use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use thirtyfour::{support, By, Key};

use crate::session::Session;

/// Sentinel for usernames the lookup tool could not resolve.
pub const UNRESOLVED: &str = "UNKNOWN";

/// Fixed structural XPaths of the lookup tool's search form. The page is
/// a classic nested-table layout; these break the day it is restyled.
const DROPDOWN_XPATH: &str =
    "/html/body/table[1]/tbody/tr[2]/td/table/tbody/tr/td/table/tbody/tr/td[2]/select";
const SEARCH_INPUT_XPATH: &str =
    "/html/body/table[1]/tbody/tr[2]/td/table/tbody/tr/td/table/tbody/tr/td[2]/input[1]";
const SEARCH_BUTTON_XPATH: &str =
    "/html/body/table[1]/tbody/tr[2]/td/table/tbody/tr/td/table/tbody/tr/td[2]/input[2]";

/// Which search category to position the dropdown on. Employee ids carry
/// a leading `T` or `X`; anything else is treated as a network id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    EmployeeId,
    NetworkId,
}

impl LookupMode {
    pub fn for_username(username: &str) -> Self {
        if username.starts_with(['T', 't', 'X', 'x']) {
            LookupMode::EmployeeId
        } else {
            LookupMode::NetworkId
        }
    }

    /// Arrow-down presses needed to land on this mode's dropdown entry.
    pub fn dropdown_steps(self) -> usize {
        match self {
            LookupMode::EmployeeId => 5,
            LookupMode::NetworkId => 6,
        }
    }
}

/// The term actually submitted: the mode-prefix character is stripped.
pub fn search_term(username: &str) -> &str {
    username
        .strip_prefix(['T', 't', 'X', 'x'])
        .unwrap_or(username)
}

/// Resolve each username to a display name via the lookup tool's UI.
///
/// Best effort: any per-username failure (missing form, missing result
/// table, empty result) leaves that mapping at [`UNRESOLVED`] and never
/// aborts the batch. No caching across runs.
pub async fn resolve(
    session: &Session,
    lookup_url: &str,
    usernames: &[String],
) -> HashMap<String, String> {
    println!("\nFetching full names for {} users from the lookup tool...", usernames.len());

    let mut names = HashMap::new();
    for username in usernames {
        println!("  Looking up: {username}");
        let full_name = match lookup_one(session, lookup_url, username).await {
            Ok(Some(name)) => {
                println!("    ✓ Found: {name}");
                name
            }
            Ok(None) => {
                println!("    ⚠ No result for {username}");
                UNRESOLVED.to_string()
            }
            Err(e) => {
                println!("    ✗ Error looking up {username}: {e:#}");
                UNRESOLVED.to_string()
            }
        };
        names.insert(username.clone(), full_name);
    }

    names
}

/// Drive one search: position the dropdown, submit the stripped term, and
/// read the name cell out of the first data row of the last result table.
async fn lookup_one(
    session: &Session,
    lookup_url: &str,
    username: &str,
) -> Result<Option<String>> {
    let driver = &session.driver;

    driver
        .goto(lookup_url)
        .await
        .with_context(|| format!("Could not navigate to {lookup_url}"))?;
    support::sleep(Duration::from_secs(5)).await;

    let dropdown = driver
        .find(By::XPath(DROPDOWN_XPATH))
        .await
        .context("Could not find search-mode dropdown")?;

    let mode = LookupMode::for_username(username);
    for _ in 0..mode.dropdown_steps() {
        dropdown.send_keys(Key::Down).await?;
    }

    let search_input = driver
        .find(By::XPath(SEARCH_INPUT_XPATH))
        .await
        .context("Could not find search input")?;
    let search_button = driver
        .find(By::XPath(SEARCH_BUTTON_XPATH))
        .await
        .context("Could not find search button")?;

    search_input.clear().await?;
    search_input.send_keys(search_term(username)).await?;
    search_button.click().await?;
    support::sleep(Duration::from_secs(2)).await;

    // The result lands in the last table on the page; row 0 is the header.
    let tables = driver.find_all(By::Tag("table")).await?;
    let Some(last_table) = tables.last() else {
        return Ok(None);
    };

    let rows = last_table.find_all(By::Tag("tr")).await?;
    let Some(first_data_row) = rows.get(1) else {
        return Ok(None);
    };

    let cells = first_data_row.find_all(By::Tag("td")).await?;
    let Some(name_cell) = cells.get(1) else {
        return Ok(None);
    };

    let name = name_cell.text().await?.trim().to_string();
    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_ids_start_with_t_or_x() {
        assert_eq!(LookupMode::for_username("T845443"), LookupMode::EmployeeId);
        assert_eq!(LookupMode::for_username("x123456"), LookupMode::EmployeeId);
        assert_eq!(LookupMode::for_username("jdoe"), LookupMode::NetworkId);
        assert_eq!(LookupMode::for_username(""), LookupMode::NetworkId);
    }

    #[test]
    fn dropdown_steps_differ_per_mode() {
        assert_eq!(LookupMode::EmployeeId.dropdown_steps(), 5);
        assert_eq!(LookupMode::NetworkId.dropdown_steps(), 6);
    }

    #[test]
    fn search_term_strips_mode_prefix() {
        assert_eq!(search_term("T845443"), "845443");
        assert_eq!(search_term("x123456"), "123456");
        assert_eq!(search_term("jdoe"), "jdoe");
    }
}
