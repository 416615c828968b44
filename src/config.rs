use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Treat `key = ""` the same as an absent key.
fn de_optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PathBuf::from))
}

#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Read(std::io::Error),
    /// The config file is not valid TOML for this schema.
    Toml(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(err) => write!(f, "cannot read config file: {}", err),
            ConfigError::Toml(err) => write!(f, "bad config file: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read(err) => Some(err),
            ConfigError::Toml(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub network: NetworkConfig,
    pub limits: LimitsConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        toml::from_str(&raw).map_err(ConfigError::Toml)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture file to analyze. Must be non-empty at run time.
    #[serde(deserialize_with = "de_optional_path")]
    pub pcap_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// The firewall/switch address. Traffic destined to it is "input",
    /// traffic originating from it is "output".
    pub fw_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-direction cap on rows kept for CSV export. Totals keep counting
    /// past the cap.
    pub max_csv_rows: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig { max_csv_rows: 1000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(deserialize_with = "de_optional_path")]
    pub input_csv: Option<PathBuf>,
    #[serde(deserialize_with = "de_optional_path")]
    pub output_csv: Option<PathBuf>,
    pub write_header: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert!(config.capture.pcap_path.is_none());
        assert_eq!(config.limits.max_csv_rows, 1000);
        assert!(!config.output.write_header);
    }

    #[test]
    fn parse_full_config() {
        let raw = r#"
            [capture]
            pcap_path = "traffic.pcap"

            [network]
            fw_ip = "10.0.0.2"

            [limits]
            max_csv_rows = 250

            [output]
            input_csv = "in.csv"
            output_csv = "out.csv"
            write_header = true
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(
            config.capture.pcap_path.as_deref(),
            Some(Path::new("traffic.pcap"))
        );
        assert_eq!(config.network.fw_ip, "10.0.0.2");
        assert_eq!(config.limits.max_csv_rows, 250);
        assert!(config.output.write_header);
    }

    #[test]
    fn empty_paths_become_none() {
        let raw = r#"
            [capture]
            pcap_path = ""

            [output]
            input_csv = ""
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.capture.pcap_path.is_none());
        assert!(config.output.input_csv.is_none());
    }
}
