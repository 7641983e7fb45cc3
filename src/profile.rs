use crate::asset::VariantKind;
use crate::constants::{
    DEFAULT_EFFORT, DEFAULT_TIER, KB, MAX_EFFORT, MAX_QUALITY, MB, MIN_QUALITY,
};
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// A named set of encoder parameters for one usage tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionProfile {
    pub tier_name: String,
    pub max_width: u32,
    pub quality: u8,
    pub effort: u8,
    /// Files smaller than this are left alone.
    pub size_threshold_bytes: u64,
    pub sharpen: bool,
    /// Which sibling the profile writes: optimized, mobile or placeholder.
    pub variant: VariantKind,
}

impl CompressionProfile {
    pub fn new(
        tier_name: impl Into<String>,
        max_width: u32,
        quality: u8,
        effort: Option<u8>,
        size_threshold_bytes: u64,
    ) -> Result<Self> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(PipelineError::InvalidQuality(quality));
        }
        let effort = effort.unwrap_or(DEFAULT_EFFORT);
        if effort > MAX_EFFORT {
            return Err(PipelineError::InvalidEffort(effort));
        }

        Ok(Self {
            tier_name: tier_name.into(),
            max_width: max_width.max(1),
            quality,
            effort,
            size_threshold_bytes,
            sharpen: false,
            variant: VariantKind::Optimized,
        })
    }

    pub fn with_sharpen(mut self, sharpen: bool) -> Self {
        self.sharpen = sharpen;
        self
    }

    pub fn with_variant(mut self, variant: VariantKind) -> Self {
        self.variant = variant;
        self
    }

    /// Output width for a source of `source_width`; never upscales.
    pub fn target_width(&self, source_width: u32) -> u32 {
        source_width.min(self.max_width)
    }

    pub fn exceeds_threshold(&self, byte_size: u64) -> bool {
        byte_size >= self.size_threshold_bytes
    }
}

/// Tier name → profile lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    profiles: BTreeMap<String, CompressionProfile>,
    default_tier: String,
}

impl ProfileTable {
    pub fn builtin() -> Self {
        let rows: [(&str, u32, u8, u64, bool, VariantKind); 9] = [
            ("standard", 2560, 75, 200 * KB, false, VariantKind::Optimized),
            ("hero", 1920, 80, 200 * KB, true, VariantKind::Optimized),
            ("card", 1200, 78, 200 * KB, true, VariantKind::Optimized),
            ("thumbnail", 600, 75, 100 * KB, false, VariantKind::Optimized),
            ("background", 2400, 60, 500 * KB, false, VariantKind::Optimized),
            ("gallery", 2800, 90, 2 * MB, true, VariantKind::Optimized),
            ("oversize", 1920, 82, 3 * MB, false, VariantKind::Optimized),
            ("mobile", 828, 70, 0, true, VariantKind::Mobile),
            ("placeholder", 40, 40, 0, false, VariantKind::Placeholder),
        ];

        let profiles = rows
            .into_iter()
            .map(|(name, max_width, quality, threshold, sharpen, variant)| {
                let profile = CompressionProfile {
                    tier_name: name.to_string(),
                    max_width,
                    quality,
                    effort: DEFAULT_EFFORT,
                    size_threshold_bytes: threshold,
                    sharpen,
                    variant,
                };
                (name.to_string(), profile)
            })
            .collect();

        Self {
            profiles,
            default_tier: DEFAULT_TIER.to_string(),
        }
    }

    pub fn get(&self, tier: &str) -> Result<&CompressionProfile> {
        self.profiles
            .get(tier)
            .ok_or_else(|| PipelineError::UnknownTier(tier.to_string()))
    }

    pub fn default_profile(&self) -> Result<&CompressionProfile> {
        self.get(&self.default_tier)
    }

    pub fn default_tier(&self) -> &str {
        &self.default_tier
    }

    pub fn set_default_tier(&mut self, tier: &str) -> Result<()> {
        self.get(tier)?;
        self.default_tier = tier.to_string();
        Ok(())
    }

    pub fn insert(&mut self, profile: CompressionProfile) {
        self.profiles.insert(profile.tier_name.clone(), profile);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompressionProfile> {
        self.profiles.values()
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}
