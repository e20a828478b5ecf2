use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use thirtyfour::prelude::*;
use thirtyfour::{ChromeCapabilities, DesiredCapabilities, WebDriver};

use crate::config::{Config, NO_PROXY_HOSTS};
use crate::error::ScraperError;

/// Everything the browser session needs to come up.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub webdriver_url: String,
    pub downloads_dir: PathBuf,
    pub headless: bool,
    pub proxy: Option<String>,
}

impl SessionOptions {
    pub fn from_config(config: &Config, headless: bool) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            downloads_dir: config.downloads_dir.clone(),
            headless,
            proxy: if config.use_proxy {
                config.proxy.clone()
            } else {
                None
            },
        }
    }
}

/// A single Chrome session, exclusively owned by the pipeline for its
/// entire lifetime. `close` must run exactly once, also on abnormal exit.
pub struct Session {
    pub driver: WebDriver,
}

impl Session {
    pub async fn open(options: &SessionOptions) -> Result<Self, ScraperError> {
        let caps = build_capabilities(options).map_err(ScraperError::Setup)?;

        println!("Setting up Chrome driver...");
        let driver = WebDriver::new(&options.webdriver_url, caps)
            .await
            .map_err(ScraperError::Setup)?;

        driver
            .set_implicit_wait_timeout(Duration::from_secs(10))
            .await
            .map_err(ScraperError::Setup)?;

        println!("✓ Chrome driver setup successful!");
        Ok(Session { driver })
    }

    /// Terminate the browser process.
    pub async fn close(self) -> Result<()> {
        self.driver.quit().await?;
        println!("\n✓ Browser closed");
        Ok(())
    }
}

fn build_capabilities(
    options: &SessionOptions,
) -> Result<ChromeCapabilities, thirtyfour::error::WebDriverError> {
    let mut caps = DesiredCapabilities::chrome();

    if options.headless {
        println!("Running in headless mode");
        caps.set_headless()?;
    }

    caps.add_arg("--disable-gpu")?;
    caps.add_arg("--no-sandbox")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--window-size=1920,1080")?;
    caps.add_arg("--disable-blink-features=AutomationControlled")?;
    caps.add_experimental_option("excludeSwitches", ["enable-automation"])?;
    caps.add_experimental_option("useAutomationExtension", false)?;

    caps.add_experimental_option(
        "prefs",
        serde_json::json!({
            "download.default_directory": options.downloads_dir.display().to_string(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "safebrowsing.enabled": true,
        }),
    )?;

    // Chromedriver talks to the browser over localhost; never proxy that.
    caps.add_arg(r#"--host-resolver-rules="MAP * ~NOTFOUND , EXCLUDE localhost""#)?;

    match &options.proxy {
        Some(proxy) => {
            println!("Using explicit proxy: {proxy}");
            caps.add_arg(&format!("--proxy-server=http://{proxy}"))?;
            caps.add_arg(&format!("--proxy-bypass-list={NO_PROXY_HOSTS}"))?;
        }
        None => {
            println!("Using system proxy settings...");
        }
    }

    Ok(caps)
}
