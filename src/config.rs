use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Remote API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Where the session token and cached user live
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DonorsConfig {
    /// Substitute the demo donors when the listing is empty or unreachable
    #[serde(default = "default_true")]
    pub fallback: bool,
}

impl Default for DonorsConfig {
    fn default() -> Self {
        Self {
            fallback: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapConfig {
    #[serde(default = "default_plot_width")]
    pub plot_width: usize,
    #[serde(default = "default_plot_height")]
    pub plot_height: usize,
}

fn default_plot_width() -> usize {
    60
}
fn default_plot_height() -> usize {
    20
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            plot_width: default_plot_width(),
            plot_height: default_plot_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_activity_dir")]
    pub dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_activity_dir() -> PathBuf {
    Path::new(".donorlink").join("activity")
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_activity_dir(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub donors: DonorsConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Config {
    /// Config file locations, lowest priority first:
    /// user (~/.donorlink/config.toml), project (.donorlink/config.toml),
    /// local (.donorlink/config.local.toml, should be gitignored)
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".donorlink").join("config.toml"));
        }
        let project = Path::new(".donorlink");
        paths.push(project.join("config.toml"));
        paths.push(project.join("config.local.toml"));
        paths
    }

    /// Load configuration from the default paths
    pub fn load() -> Result<Self> {
        Self::load_layers(&Self::default_paths())
    }

    /// Merge every existing file in `paths` over the built-in defaults.
    /// Later files win key by key; missing files are skipped.
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            tracing::debug!(path = %path.display(), "loading config layer");
            merge_tables(&mut merged, read_table(path)?);
        }
        let config: Config = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.api.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Expected an http:// or https:// URL, got '{}'", url),
            });
        }

        if self.api.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if !(10..=200).contains(&self.map.plot_width) {
            errors.push(ValidationError {
                field: "map.plot_width".to_string(),
                message: format!("Must be between 10 and 200, got {}", self.map.plot_width),
            });
        }

        if !(5..=100).contains(&self.map.plot_height) {
            errors.push(ValidationError {
                field: "map.plot_height".to_string(),
                message: format!("Must be between 5 and 100, got {}", self.map.plot_height),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    content
        .parse::<toml::Table>()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Recursive merge; tables merge key by key, anything else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
