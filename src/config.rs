use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Hosts that must never go through a proxy, chromedriver included.
pub const NO_PROXY_HOSTS: &str = "localhost,127.0.0.1,::1";

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

/// Runtime configuration, loaded once at startup from a JSON file:
///
/// ```json
/// {
///     "user_id": "T845443",
///     "sso_username": null,
///     "sso_password": null,
///     "use_proxy": false,
///     "proxy": null,
///     "base_url": "https://tableau.example.com",
///     "site": "mysite",
///     "user_domain": "corp.ads",
///     "lookup_url": "https://go/teamcards",
///     "downloads_dir": "/home/me/Downloads"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub user_id: String,
    #[serde(default)]
    pub sso_username: Option<String>,
    #[serde(default)]
    pub sso_password: Option<String>,
    #[serde(default)]
    pub use_proxy: bool,
    /// Explicit proxy as host:port, only consulted when `use_proxy` is set.
    #[serde(default)]
    pub proxy: Option<String>,
    pub base_url: String,
    /// Tableau site segment of the per-user content URL.
    pub site: String,
    /// Directory domain segment of the per-user content URL.
    pub user_domain: String,
    pub lookup_url: String,
    pub downloads_dir: PathBuf,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Config file {} is not valid JSON", path.display()))?;
        Ok(config)
    }

    /// SSO username, falling back to the user id when unset.
    pub fn sso_username(&self) -> &str {
        self.sso_username.as_deref().unwrap_or(&self.user_id)
    }

    /// URL of the user's content listing page.
    pub fn user_content_url(&self) -> String {
        format!(
            "{}/#/site/{}/user/{}/{}/content",
            self.base_url, self.site, self.user_domain, self.user_id
        )
    }

    /// Set up proxy-related environment variables before the browser starts.
    ///
    /// Localhost is always bypassed; when no explicit proxy is requested the
    /// usual proxy variables are cleared so the system settings apply.
    pub fn apply_proxy_env(&self) {
        env::set_var("no_proxy", NO_PROXY_HOSTS);
        env::set_var("NO_PROXY", NO_PROXY_HOSTS);

        if !self.use_proxy {
            for var in ["http_proxy", "HTTP_PROXY", "https_proxy", "HTTPS_PROXY"] {
                env::remove_var(var);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_config(
            r#"{
                "user_id": "T111",
                "base_url": "https://tableau.example.com",
                "site": "mysite",
                "user_domain": "corp.ads",
                "lookup_url": "https://lookup.example.com",
                "downloads_dir": "/tmp/downloads"
            }"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.user_id, "T111");
        assert_eq!(config.sso_username(), "T111");
        assert!(!config.use_proxy);
        assert_eq!(config.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn builds_user_content_url() {
        let file = write_config(
            r#"{
                "user_id": "T111",
                "sso_username": "someone.else",
                "base_url": "https://tableau.example.com",
                "site": "mysite",
                "user_domain": "corp.ads",
                "lookup_url": "https://lookup.example.com",
                "downloads_dir": "/tmp/downloads"
            }"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(
            config.user_content_url(),
            "https://tableau.example.com/#/site/mysite/user/corp.ads/T111/content"
        );
        assert_eq!(config.sso_username(), "someone.else");
    }

    #[test]
    fn rejects_invalid_json() {
        let file = write_config("{not json");
        assert!(Config::load(file.path()).is_err());
    }
}
