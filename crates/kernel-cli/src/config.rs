//! Run file loading and validation.

use anyhow::{Context, Result};
use lib_types::units::{BitsPerSecond, Seconds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run name, used in reports.
    #[serde(default = "default_name")]
    pub name: String,

    /// Data rate in Gb/s.
    #[serde(default = "default_data_rate")]
    pub data_rate_gbps: f64,

    /// Samples per UI handed to the model.
    #[serde(default = "default_samples_per_ui")]
    pub samples_per_ui: usize,

    /// Inline model parameter string.
    #[serde(default)]
    pub parameters: Option<String>,

    /// Parameter string file, relative to the run file.
    #[serde(default)]
    pub parameters_file: Option<PathBuf>,

    /// Number of independent lanes (one model session each).
    #[serde(default = "default_lanes")]
    pub lanes: usize,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub stimulus: StimulusConfig,
}

/// Synthetic channel: UI-spaced cursors, main cursor first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_cursors")]
    pub cursors: Vec<f64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            cursors: default_cursors(),
        }
    }
}

/// PRBS stimulus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StimulusConfig {
    #[serde(default = "default_num_bits")]
    pub num_bits: usize,

    /// PRBS order (7, 9, 11, 15, 23, 31).
    #[serde(default = "default_prbs_order")]
    pub prbs_order: u8,

    /// UIs handed to the model per GetWave call.
    #[serde(default = "default_block_ui")]
    pub block_ui: usize,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            num_bits: default_num_bits(),
            prbs_order: default_prbs_order(),
            block_ui: default_block_ui(),
        }
    }
}

fn default_name() -> String { "ami-run".to_string() }
fn default_data_rate() -> f64 { 10.0 }
fn default_samples_per_ui() -> usize { 16 }
fn default_lanes() -> usize { 1 }
fn default_cursors() -> Vec<f64> { vec![1.0, 0.4, 0.15] }
fn default_num_bits() -> usize { 10_000 }
fn default_prbs_order() -> u8 { 7 }
fn default_block_ui() -> usize { 1024 }

impl RunConfig {
    pub fn bit_time(&self) -> Seconds {
        BitsPerSecond::from_gbps(self.data_rate_gbps).ui()
    }

    pub fn sample_interval(&self) -> Seconds {
        self.bit_time() / self.samples_per_ui as f64
    }

    /// Parameter string handed to the model (empty when none is given).
    pub fn parameter_text(&self) -> &str {
        self.parameters.as_deref().unwrap_or("")
    }
}

/// Load a run file (TOML, or JSON by extension).
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file: {:?}", path))?;

    let mut config: RunConfig = if path.extension().map_or(false, |e| e == "json") {
        serde_json::from_str(&content).with_context(|| "Failed to parse run file as JSON")?
    } else {
        toml::from_str(&content).with_context(|| "Failed to parse run file as TOML")?
    };

    if let Some(file) = config.parameters_file.take() {
        if config.parameters.is_some() {
            anyhow::bail!("Give either 'parameters' or 'parameters_file', not both");
        }
        let file = match path.parent() {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file,
        };
        let text = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read parameter file: {:?}", file))?;
        config.parameters = Some(text);
    }

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &RunConfig) -> Result<()> {
    if !(config.data_rate_gbps > 0.0) || !config.data_rate_gbps.is_finite() {
        anyhow::bail!("data_rate_gbps must be positive, got {}", config.data_rate_gbps);
    }
    if config.samples_per_ui == 0 {
        anyhow::bail!("samples_per_ui must be at least 1");
    }
    if config.lanes == 0 {
        anyhow::bail!("lanes must be at least 1");
    }
    if config.channel.cursors.is_empty() {
        anyhow::bail!("channel.cursors must hold at least the main cursor");
    }
    if config.stimulus.block_ui == 0 {
        anyhow::bail!("stimulus.block_ui must be at least 1");
    }
    if ![7, 9, 11, 15, 23, 31].contains(&config.stimulus.prbs_order) {
        anyhow::bail!(
            "Invalid PRBS order: {}. Must be 7, 9, 11, 15, 23, or 31",
            config.stimulus.prbs_order
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: RunConfig = toml::from_str("").unwrap();
        assert_eq!(config.samples_per_ui, 16);
        assert_eq!(config.channel.cursors, vec![1.0, 0.4, 0.15]);
        assert!((config.bit_time().as_ps() - 100.0).abs() < 1e-9);
        assert!((config.sample_interval().as_ps() - 6.25).abs() < 1e-9);
        assert_eq!(config.parameter_text(), "");
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_toml_sections() {
        let text = r#"
            name = "lane-test"
            data_rate_gbps = 25.0
            samples_per_ui = 8
            parameters = "(rx (dfe (mode Adaptive)))"

            [channel]
            cursors = [1.0, 0.5]

            [stimulus]
            num_bits = 500
            prbs_order = 9
        "#;
        let config: RunConfig = toml::from_str(text).unwrap();
        assert_eq!(config.name, "lane-test");
        assert!((config.bit_time().as_ps() - 40.0).abs() < 1e-9);
        assert_eq!(config.stimulus.block_ui, 1024);
        assert_eq!(config.parameter_text(), "(rx (dfe (mode Adaptive)))");
    }

    #[test]
    fn test_validation() {
        let mut config: RunConfig = toml::from_str("").unwrap();
        config.stimulus.prbs_order = 8;
        assert!(validate_config(&config).is_err());

        let mut config: RunConfig = toml::from_str("").unwrap();
        config.channel.cursors.clear();
        assert!(validate_config(&config).is_err());
    }
}
