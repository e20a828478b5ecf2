use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::warn;

use tableau_stats_rs::aggregate;
use tableau_stats_rs::auth::{self, LoginState};
use tableau_stats_rs::catalog::{self, Workbook};
use tableau_stats_rs::config::Config;
use tableau_stats_rs::export::{ExportName, Exporter, WhoHasSeenExporter};
use tableau_stats_rs::identity;
use tableau_stats_rs::report;
use tableau_stats_rs::session::{Session, SessionOptions};

/// Scrape a Tableau Server for "Who Has Seen" view statistics.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "./config.json")]
    config: PathBuf,

    /// Run the browser in headless mode.
    #[arg(long)]
    headless: bool,

    /// Skip downloading and aggregate whatever is already on disk.
    #[arg(long)]
    no_refresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_proxy_env();

    println!("{}", "=".repeat(80));
    println!("TABLEAU STATISTICS SCRAPER");
    println!("{}", "=".repeat(80));
    println!("User ID: {}", config.user_id);
    println!("SSO user: {}", config.sso_username());
    println!("Refresh data: {}", !cli.no_refresh);
    println!("{}", "=".repeat(80));

    let session = Session::open(&SessionOptions::from_config(&config, cli.headless)).await?;

    // The session is closed exactly once, also when the pipeline fails.
    let outcome = run(&session, &mut config, !cli.no_refresh).await;
    if let Err(e) = session.close().await {
        warn!("Error closing browser: {e:#}");
    }
    outcome
}

async fn run(session: &Session, config: &mut Config, refresh: bool) -> Result<()> {
    let mut sso_password = config.sso_password.clone();
    match auth::ensure_logged_in(session, &config.base_url, &mut sso_password).await? {
        LoginState::AlreadyAuthenticated => {}
        LoginState::ManualRequired => {
            println!("Complete the login in the browser window before the run continues.");
        }
    }
    config.sso_password = sso_password;

    let workbooks = catalog::list_workbooks(session, &config.user_content_url()).await?;

    if refresh {
        let exporter = WhoHasSeenExporter::new(&config.base_url, config.downloads_dir.clone());
        let downloaded = download_all(session, &exporter, &workbooks).await;
        println!("\n✓ Downloaded {downloaded} files");
    } else {
        println!("Skipping data refresh");
    }

    let mut records = aggregate::aggregate(&config.downloads_dir, &workbooks)?;
    if records.is_empty() {
        println!("\n✗ No data found. Exiting.");
        return Ok(());
    }

    if records.has_column("Username") {
        let usernames = aggregate::distinct_usernames(&records);
        let names = identity::resolve(session, &config.lookup_url, &usernames).await;
        aggregate::attach_full_names(&mut records, &names);
    }

    let summary = report::summarize(&records);
    let path = report::report_path(&config.downloads_dir, &config.user_id);
    report::write_report(&summary, &records, &path)?;

    println!("\n{}", "=".repeat(80));
    println!("SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Workbooks processed: {}", workbooks.len());
    println!("Total records: {}", records.len());
    println!("{}", "=".repeat(80));
    println!("\n✓ Run completed successfully!");
    Ok(())
}

/// Download the "Who Has Seen" export for every view of every workbook,
/// strictly sequentially. Per-view and per-workbook failures are logged
/// and skipped; a failed download simply yields a missing file.
async fn download_all(
    session: &Session,
    exporter: &impl Exporter,
    workbooks: &[Workbook],
) -> usize {
    println!("\nProcessing {} workbooks...", workbooks.len());
    let mut downloaded = 0;

    for workbook in workbooks {
        println!("\n{}", "=".repeat(80));
        println!("Workbook: {}", workbook.name);
        println!("URL: {}", workbook.url);
        println!("{}", "=".repeat(80));

        let views = match catalog::list_views(session, workbook).await {
            Ok(views) => views,
            Err(e) => {
                println!("✗ Error processing workbook {}: {e:#}", workbook.name);
                continue;
            }
        };

        for view in views {
            let Some(name) = ExportName::for_view(&view) else {
                println!(
                    "  ⚠ Skipping view {} (missing workbook or view id)",
                    view.name
                );
                continue;
            };

            match exporter.fetch(session, &name).await {
                Ok(Some(_)) => downloaded += 1,
                Ok(None) => {}
                Err(e) => {
                    println!("  ✗ Error downloading view {}: {e:#}", name.view_id);
                }
            }
        }
    }

    downloaded
}
