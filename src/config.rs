//! `asset-squeeze.toml`: tier overrides, responsive defaults and composite plans.
//!
//! ```toml
//! default_tier = "hero"
//!
//! [tiers.lobby]
//! max_width = 1600
//! quality = 85
//! threshold_kb = 300
//!
//! [responsive]
//! breakpoints = [480, 960, 1440]
//! cdn_hosts = ["img.example-cdn.net"]
//!
//! [[composites]]
//! label = "spa"
//! layout = "halves"
//! sources = ["spa/pool.jpg", "spa/sauna.jpg"]
//! ```

use crate::composite::CompositePlan;
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_TIER, KB};
use crate::error::{PipelineError, Result};
use crate::profile::{CompressionProfile, ProfileTable};
use crate::responsive::Breakpoints;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierOverride {
    pub max_width: Option<u32>,
    pub quality: Option<u8>,
    pub effort: Option<u8>,
    pub threshold_kb: Option<u64>,
    pub sharpen: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponsiveConfig {
    pub breakpoints: Option<Vec<u32>>,
    pub qualities: Option<Vec<u8>>,
    pub base_url: Option<String>,
    pub cdn_hosts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub default_tier: Option<String>,
    pub tiers: BTreeMap<String, TierOverride>,
    pub responsive: ResponsiveConfig,
    pub composites: Vec<CompositePlan>,
    /// File the config was read from.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::filesystem(path, e))?;
        let mut config: Config = toml::from_str(&text).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.path = Some(path.to_path_buf());
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// An explicit path must exist; otherwise `<root>/asset-squeeze.toml` is
    /// used when present and compiled defaults when not.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Relative composite sources resolve against the config file's directory.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Built-in tiers with this file's overrides and additions applied.
    pub fn profile_table(&self) -> Result<ProfileTable> {
        let mut table = ProfileTable::builtin();
        for (name, overrides) in &self.tiers {
            let base = match table.get(name) {
                Ok(existing) => existing.clone(),
                Err(_) => table.get(DEFAULT_TIER)?.clone(),
            };
            let profile = CompressionProfile::new(
                name.clone(),
                overrides.max_width.unwrap_or(base.max_width),
                overrides.quality.unwrap_or(base.quality),
                Some(overrides.effort.unwrap_or(base.effort)),
                overrides
                    .threshold_kb
                    .map(|kb| kb * KB)
                    .unwrap_or(base.size_threshold_bytes),
            )?
            .with_sharpen(overrides.sharpen.unwrap_or(base.sharpen))
            .with_variant(base.variant);
            table.insert(profile);
        }
        if let Some(tier) = &self.default_tier {
            table.set_default_tier(tier)?;
        }
        Ok(table)
    }

    pub fn breakpoints(&self) -> Result<Breakpoints> {
        let defaults = Breakpoints::default();
        match (&self.responsive.breakpoints, &self.responsive.qualities) {
            (None, None) => Ok(defaults),
            (widths, qualities) => Breakpoints::new(
                widths.clone().unwrap_or_else(|| defaults.widths().to_vec()),
                qualities
                    .clone()
                    .unwrap_or_else(|| defaults.iter().map(|(_, q)| q).collect()),
            ),
        }
    }
}
