//! Image assets and the filename conventions that encode their processing state.
//!
//! The filename is the only "already processed" marker: `room.jpg` is an
//! original, `room-optimized.webp` its optimized sibling, `room-640w.webp` a
//! responsive variant. Downstream pages reference these names directly, so the
//! builders in this module must stay bit-for-bit stable.

use crate::constants::{
    COMPOSITE_SUFFIX, MOBILE_SUFFIX, OPTIMIZED_SUFFIX, OUTPUT_EXTENSION, PLACEHOLDER_SUFFIX,
    SUPPORTED_IMAGE_EXTENSIONS, TRIPTYCH_PREFIX,
};
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

static RESPONSIVE_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<base>.+)-(?P<width>\d{2,5})w$").expect("valid regex"));

static TRIPTYCH_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{}\d+$", regex::escape(TRIPTYCH_PREFIX))).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
    Original,
    Optimized,
    Mobile,
    Placeholder,
    Responsive(u32),
    CompositeOutput,
}

impl VariantKind {
    /// Derived files are pipeline outputs and never become work items themselves.
    pub fn is_derived(&self) -> bool {
        !matches!(self, VariantKind::Original)
    }

    /// Suffix appended to the logical base name, if any.
    pub fn suffix(&self) -> Option<String> {
        match self {
            VariantKind::Original => None,
            VariantKind::Optimized => Some(OPTIMIZED_SUFFIX.to_string()),
            VariantKind::Mobile => Some(MOBILE_SUFFIX.to_string()),
            VariantKind::Placeholder => Some(PLACEHOLDER_SUFFIX.to_string()),
            VariantKind::Responsive(width) => Some(format!("-{}w", width)),
            VariantKind::CompositeOutput => Some(COMPOSITE_SUFFIX.to_string()),
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Original => write!(f, "original"),
            VariantKind::Optimized => write!(f, "optimized"),
            VariantKind::Mobile => write!(f, "mobile"),
            VariantKind::Placeholder => write!(f, "placeholder"),
            VariantKind::Responsive(width) => write!(f, "responsive-{}w", width),
            VariantKind::CompositeOutput => write!(f, "composite"),
        }
    }
}

/// Splits a file stem into its logical base name and variant kind.
pub fn classify_stem(stem: &str) -> (String, VariantKind) {
    if TRIPTYCH_STEM.is_match(stem) {
        return (stem.to_string(), VariantKind::CompositeOutput);
    }

    let suffixed = [
        (OPTIMIZED_SUFFIX, VariantKind::Optimized),
        (MOBILE_SUFFIX, VariantKind::Mobile),
        (PLACEHOLDER_SUFFIX, VariantKind::Placeholder),
        (COMPOSITE_SUFFIX, VariantKind::CompositeOutput),
    ];
    for (suffix, kind) in suffixed {
        if let Some(base) = stem.strip_suffix(suffix).filter(|b| !b.is_empty()) {
            return (base.to_string(), kind);
        }
    }

    if let Some(caps) = RESPONSIVE_STEM.captures(stem) {
        if let Ok(width) = caps["width"].parse::<u32>() {
            return (caps["base"].to_string(), VariantKind::Responsive(width));
        }
    }

    (stem.to_string(), VariantKind::Original)
}

/// Check if a file path has a supported image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_webp(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(OUTPUT_EXTENSION))
        .unwrap_or(false)
}

/// Builds `<dir>/<base><suffix>.webp` for the given variant.
pub fn variant_path(dir: &Path, base: &str, kind: VariantKind) -> PathBuf {
    let suffix = kind.suffix().unwrap_or_default();
    dir.join(format!("{}{}.{}", base, suffix, OUTPUT_EXTENSION))
}

pub fn triptych_file_name(index: usize) -> String {
    format!("{}{}.{}", TRIPTYCH_PREFIX, index, OUTPUT_EXTENSION)
}

pub fn composite_file_name(label: &str) -> String {
    format!("{}{}.{}", label, COMPOSITE_SUFFIX, OUTPUT_EXTENSION)
}

/// Reads the header only; sniffs content so a mislabelled extension still works.
fn read_dimensions(path: &Path) -> Option<(u32, u32)> {
    image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .ok()?
        .into_dimensions()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAsset {
    pub path: PathBuf,
    pub logical_base_name: String,
    pub variant: VariantKind,
    pub byte_size: u64,
    /// Read from the header only; `None` when the header is unreadable.
    pub dimensions: Option<(u32, u32)>,
}

impl ImageAsset {
    /// Stats the file and reads its header. A corrupt image still yields an
    /// asset so the failure surfaces later as a per-file decode error.
    pub fn discover(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| PipelineError::filesystem(path, e))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PipelineError::FileNotFound(path.to_path_buf()))?;
        let (logical_base_name, variant) = classify_stem(stem);

        Ok(Self {
            path: path.to_path_buf(),
            logical_base_name,
            variant,
            byte_size: metadata.len(),
            dimensions: read_dimensions(path),
        })
    }

    pub fn width(&self) -> Option<u32> {
        self.dimensions.map(|(w, _)| w)
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of this asset's sibling for the given variant.
    pub fn sibling(&self, kind: VariantKind) -> PathBuf {
        variant_path(self.dir(), &self.logical_base_name, kind)
    }
}
