use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docpipe.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/docpipe.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./Results")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatasetsConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sales: SalesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_source")]
    pub source: PathBuf,
    #[serde(default = "default_telemetry_database")]
    pub database: String,
    #[serde(default = "default_telemetry_collection")]
    pub collection: String,
    #[serde(default = "default_telemetry_log")]
    pub log_file: String,
    #[serde(default = "default_export_file")]
    pub export_file: String,
    #[serde(default = "default_export_threshold")]
    pub export_threshold: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            source: default_telemetry_source(),
            database: default_telemetry_database(),
            collection: default_telemetry_collection(),
            log_file: default_telemetry_log(),
            export_file: default_export_file(),
            export_threshold: default_export_threshold(),
        }
    }
}

fn default_telemetry_source() -> PathBuf {
    PathBuf::from("lorawan_uplink_devices.csv")
}
fn default_telemetry_database() -> String {
    "lorawan_db".to_string()
}
fn default_telemetry_collection() -> String {
    "uplinks".to_string()
}
fn default_telemetry_log() -> String {
    "task1_output.txt".to_string()
}
fn default_export_file() -> String {
    "high_temp_devices.json".to_string()
}
fn default_export_threshold() -> f64 {
    35.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesConfig {
    #[serde(default = "default_sales_source")]
    pub source: PathBuf,
    #[serde(default = "default_sales_database")]
    pub database: String,
    #[serde(default = "default_sales_collection")]
    pub collection: String,
    #[serde(default = "default_sales_log")]
    pub log_file: String,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            source: default_sales_source(),
            database: default_sales_database(),
            collection: default_sales_collection(),
            log_file: default_sales_log(),
        }
    }
}

fn default_sales_source() -> PathBuf {
    PathBuf::from("orders.csv")
}
fn default_sales_database() -> String {
    "ecommerce_db".to_string()
}
fn default_sales_collection() -> String {
    "orders".to_string()
}
fn default_sales_log() -> String {
    "task2_output.txt".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Resolve the CLI's `--config` flag.
///
/// An explicit path must exist. Without one, the default path is read if
/// present and the built-in defaults apply otherwise.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.is_file() {
                load_config(path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    let telemetry = &config.datasets.telemetry;
    let sales = &config.datasets.sales;

    check_names(
        "datasets.telemetry",
        &telemetry.source,
        &telemetry.database,
        &telemetry.collection,
    )?;
    check_names(
        "datasets.sales",
        &sales.source,
        &sales.database,
        &sales.collection,
    )?;

    check_bare_file("datasets.telemetry.log_file", &telemetry.log_file)?;
    check_bare_file("datasets.telemetry.export_file", &telemetry.export_file)?;
    check_bare_file("datasets.sales.log_file", &sales.log_file)?;

    if !telemetry.export_threshold.is_finite() {
        anyhow::bail!("datasets.telemetry.export_threshold must be a finite number");
    }

    Ok(())
}

fn check_names(section: &str, source: &Path, database: &str, collection: &str) -> Result<()> {
    if source.as_os_str().is_empty() {
        anyhow::bail!("{}.source must not be empty", section);
    }
    if database.trim().is_empty() {
        anyhow::bail!("{}.database must not be empty", section);
    }
    if collection.trim().is_empty() {
        anyhow::bail!("{}.collection must not be empty", section);
    }
    Ok(())
}

fn check_bare_file(key: &str, name: &str) -> Result<()> {
    let path = Path::new(name);
    let bare = path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false);
    if !bare {
        anyhow::bail!("{} must be a bare file name, got '{}'", key, name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("docpipe.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&write(&tmp, "")).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/docpipe.sqlite"));
        assert_eq!(config.output.dir, PathBuf::from("./Results"));
        assert_eq!(config.datasets.telemetry.database, "lorawan_db");
        assert_eq!(config.datasets.telemetry.collection, "uplinks");
        assert_eq!(config.datasets.telemetry.export_threshold, 35.0);
        assert_eq!(config.datasets.sales.database, "ecommerce_db");
        assert_eq!(config.datasets.sales.log_file, "task2_output.txt");
    }

    #[test]
    fn test_partial_override() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&write(
            &tmp,
            r#"
[output]
dir = "out"

[datasets.telemetry]
export_threshold = 30.5
"#,
        ))
        .unwrap();
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.datasets.telemetry.export_threshold, 30.5);
        assert_eq!(config.datasets.telemetry.log_file, "task1_output.txt");
    }

    #[test]
    fn test_rejects_empty_collection() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&write(&tmp, "[datasets.sales]\ncollection = \"\"\n")).unwrap_err();
        assert!(err.to_string().contains("datasets.sales.collection"));
    }

    #[test]
    fn test_rejects_log_file_with_directory() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&write(
            &tmp,
            "[datasets.telemetry]\nlog_file = \"../task1.txt\"\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("bare file name"));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let absent = tmp.path().join("absent.toml");
        assert!(resolve_config(Some(absent.as_path())).is_err());
    }
}
