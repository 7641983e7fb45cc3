//! Decides, per logical image, whether to delete, skip or transcode.
//!
//! Pure planning: reads a [`Discovery`] and returns [`ProcessingResult`]
//! placeholders with the action already assigned. Nothing is touched on disk.

use crate::asset::{is_webp, ImageAsset, VariantKind};
use crate::report::{Action, ProcessingResult};
use crate::transcode::{OriginalPolicy, OutputMode};
use crate::walker::Discovery;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

static UUID_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]+").expect("valid regex")
});

static SCREENSHOT_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^screen\s?shot\b").expect("valid regex"));

/// Uploads named by a UUID or left over from screenshots are not catalog assets.
pub fn is_uuid_junk(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| UUID_STEM.is_match(stem) || SCREENSHOT_STEM.is_match(stem))
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct Group<'a> {
    originals: Vec<&'a ImageAsset>,
    optimized: Option<&'a ImageAsset>,
}

#[derive(Debug, Clone, Copy)]
pub struct VersionResolver {
    mode: OutputMode,
    policy: OriginalPolicy,
    /// Variant written by the primary tier.
    variant: VariantKind,
}

impl VersionResolver {
    pub fn new(mode: OutputMode, policy: OriginalPolicy) -> Self {
        Self {
            mode,
            policy,
            variant: VariantKind::Optimized,
        }
    }

    pub fn with_variant(mut self, variant: VariantKind) -> Self {
        self.variant = variant;
        self
    }

    /// Where a transcode of `asset` lands under the current mode.
    pub fn destination(&self, asset: &ImageAsset) -> PathBuf {
        match self.mode {
            OutputMode::Sibling => asset.sibling(self.variant),
            // A WebP source is rewritten under its own name, whatever its case.
            OutputMode::InPlace if is_webp(&asset.path) => asset.path.clone(),
            OutputMode::InPlace => asset.sibling(VariantKind::Original),
        }
    }

    pub fn resolve(&self, discovery: &Discovery) -> Vec<ProcessingResult> {
        let mut plan = Vec::new();
        let mut groups: BTreeMap<(PathBuf, String), Group<'_>> = BTreeMap::new();

        for asset in &discovery.candidates {
            if is_uuid_junk(&asset.path) {
                plan.push(ProcessingResult::planned(
                    &asset.path,
                    Action::DeletedUuidJunk,
                    asset.byte_size,
                ));
                continue;
            }
            groups
                .entry(group_key(asset))
                .or_default()
                .originals
                .push(asset);
        }

        for asset in discovery
            .derived
            .iter()
            .filter(|a| a.variant == self.variant)
        {
            let group = groups.entry(group_key(asset)).or_default();
            if group.optimized.is_none() {
                group.optimized = Some(asset);
            }
        }

        for group in groups.into_values() {
            self.resolve_group(group, &mut plan);
        }
        plan
    }

    fn resolve_group<'a>(&self, mut group: Group<'a>, plan: &mut Vec<ProcessingResult>) {
        if self.mode == OutputMode::InPlace
            && self.variant == VariantKind::Optimized
            && group.optimized.is_none()
        {
            // `room.webp` next to `room.jpg` is the in-place output of `room.jpg`.
            let has_other = group.originals.iter().any(|a| !is_webp(&a.path));
            if has_other {
                if let Some(index) = group.originals.iter().position(|a| is_webp(&a.path)) {
                    group.optimized = Some(group.originals.remove(index));
                }
            }
        }

        match (group.originals.as_slice(), group.optimized) {
            ([], Some(optimized)) => {
                plan.push(ProcessingResult::skipped(
                    &optimized.path,
                    optimized.byte_size,
                    "already optimized",
                ));
            }
            (originals, Some(optimized)) => {
                for original in originals {
                    let result = match self.policy {
                        _ if self.variant != VariantKind::Optimized => ProcessingResult::skipped(
                            &original.path,
                            original.byte_size,
                            format!("{} sibling exists", self.variant),
                        ),
                        OriginalPolicy::Keep => ProcessingResult::skipped(
                            &original.path,
                            original.byte_size,
                            "optimized sibling exists, original kept",
                        ),
                        OriginalPolicy::Delete | OriginalPolicy::Archive => {
                            ProcessingResult::planned(
                                &original.path,
                                Action::DeletedDuplicate,
                                original.byte_size,
                            )
                        }
                    };
                    plan.push(result.with_output(&optimized.path));
                }
            }
            ([first, rest @ ..], None) => {
                plan.push(
                    ProcessingResult::planned(&first.path, Action::Transcoded, first.byte_size)
                        .with_output(self.destination(first)),
                );
                for other in rest {
                    plan.push(ProcessingResult::skipped(
                        &other.path,
                        other.byte_size,
                        format!("shares its output name with {}", first.file_name()),
                    ));
                }
            }
            ([], None) => {}
        }
    }
}

fn group_key(asset: &ImageAsset) -> (PathBuf, String) {
    (asset.dir().to_path_buf(), asset.logical_base_name.clone())
}
