use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use thirtyfour::support;

use crate::session::Session;

/// Outcome of the post-navigation login check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// SSO or an existing session already authenticated us.
    AlreadyAuthenticated,
    /// The page did not look logged in; the operator has to finish the
    /// login in the browser window.
    ManualRequired,
}

/// Navigate to the server and decide whether we are already logged in.
///
/// A single navigation attempt, no retry loop. Detection is heuristic:
/// the post-login URL carries a `/#/site` fragment and the title names the
/// server. When manual login is needed and no password is configured, one
/// is prompted for and stored back into `sso_password`.
pub async fn ensure_logged_in(
    session: &Session,
    base_url: &str,
    sso_password: &mut Option<String>,
) -> Result<LoginState> {
    println!("Navigating to {base_url}...");
    session
        .driver
        .goto(base_url)
        .await
        .with_context(|| format!("Could not navigate to {base_url}"))?;
    support::sleep(Duration::from_secs(3)).await;

    let current_url = session.driver.current_url().await?;
    let page_title = session.driver.title().await?;
    println!("Current URL: {current_url}");
    println!("Page title: {page_title}");

    if current_url.as_str().contains("/#/site") || page_title.contains("Tableau Server") {
        println!("✓ Already logged in via SSO or existing session");
        return Ok(LoginState::AlreadyAuthenticated);
    }

    println!("Manual login required...");
    if sso_password.is_none() {
        *sso_password = Some(prompt("Enter your Tableau password: ")?);
    }

    Ok(LoginState::ManualRequired)
}

fn prompt(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
