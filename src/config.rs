use crate::error::{ProxyError, Result};
use reqwest::header::HeaderName;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_dashboard")]
    pub dashboard: PathBuf,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest gap allowed between two reads from the upstream. There is no
    /// limit on the total duration, so long streamed answers are not cut off.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Case-insensitive substrings that put a model in the image-stripping family.
    #[serde(default = "default_image_stripping_keywords")]
    pub image_stripping_keywords: Vec<String>,
    #[serde(default = "default_vision_header")]
    pub vision_header: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            image_stripping_keywords: default_image_stripping_keywords(),
            vision_header: default_vision_header(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            target_url: default_target_url(),
            prefix: default_prefix(),
            dashboard: default_dashboard(),
            max_body_bytes: default_max_body_bytes(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            routing: RoutingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    4142
}

fn default_target_url() -> String {
    "http://localhost:4141".to_string()
}

fn default_prefix() -> String {
    "cus-".to_string()
}

fn default_dashboard() -> PathBuf {
    PathBuf::from("dashboard.html")
}

fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_image_stripping_keywords() -> Vec<String> {
    vec!["claude".to_string()]
}

fn default_vision_header() -> String {
    "copilot-vision-request".to_string()
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Check the settings that would otherwise only fail on the first request.
    pub fn validate(&self) -> Result<()> {
        self.target()?;
        if self.prefix.is_empty() {
            return Err(ProxyError::config("prefix must not be empty"));
        }
        HeaderName::from_bytes(self.routing.vision_header.as_bytes()).map_err(|e| {
            ProxyError::config(format!(
                "Invalid vision_header '{}': {}",
                self.routing.vision_header, e
            ))
        })?;
        Ok(())
    }

    /// The shared upstream client.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .read_timeout(Duration::from_secs(self.read_timeout_secs))
            .build()?)
    }

    /// The parsed upstream base URL.
    pub fn target(&self) -> Result<Url> {
        let url = Url::parse(&self.target_url).map_err(|e| {
            ProxyError::config(format!("Invalid target_url '{}': {}", self.target_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ProxyError::config(format!(
                "target_url '{}' must be an absolute http(s) URL",
                self.target_url
            )));
        }
        Ok(url)
    }

    /// `host[:port]` of the upstream, used for the outbound `host` header.
    pub fn target_authority(&self) -> Result<String> {
        let url = self.target()?;
        let host = url.host_str().unwrap_or_default();
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("proxy-router.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("proxy-router").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("proxy-router").join("config.toml"));
        paths.push(home.join(".proxy-router.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
