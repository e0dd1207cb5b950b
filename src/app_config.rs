//! Optional TOML file holding request defaults for the CLI.
//!
//! CLI flags override every value read from the file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;

/// Request defaults read from `--config <path>`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Output directory for downloaded files.
    pub outfold: Option<PathBuf>,
    /// Simultaneous calls to the API (1..=8).
    pub n_proc: Option<u8>,
    /// Product names.
    pub products: Option<Vec<String>>,
    /// Longitude range `[min, max]`.
    pub lon_range: Option<[f64; 2]>,
    /// Latitude range `[min, max]`.
    pub lat_range: Option<[f64; 2]>,
    /// Start and end date `["YYYY-MM-DD", "YYYY-MM-DD"]`.
    pub date_range: Option<[NaiveDate; 2]>,
    /// Output format name.
    pub format: Option<String>,
    /// Ask for zipped gridded output.
    pub zipped: Option<bool>,
    /// Overall wait limit per job in seconds.
    pub max_wait_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(n_proc) = self.n_proc
            && !(1..=8).contains(&n_proc)
        {
            bail!("Invalid config value for `n_proc`: {n_proc}. Expected range: 1..=8");
        }

        validate_range("lon_range", self.lon_range)?;
        validate_range("lat_range", self.lat_range)?;

        if let Some([start, end]) = self.date_range
            && end < start
        {
            bail!("Invalid config value for `date_range`: {end} is before {start}");
        }

        if let Some(products) = &self.products
            && products.iter().any(|p| p.trim().is_empty())
        {
            bail!("Invalid config value for `products`: empty product name");
        }

        if self.max_wait_secs == Some(0) {
            bail!("Invalid config value for `max_wait_secs`: must be at least 1");
        }

        Ok(())
    }
}

fn validate_range(field: &str, value: Option<[f64; 2]>) -> Result<()> {
    let Some([min, max]) = value else {
        return Ok(());
    };
    if min > max {
        bail!("Invalid config value for `{field}`: {min} > {max}");
    }
    Ok(())
}

/// Reads, parses and validates a config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    Ok(toml::from_str(raw)?)
}
