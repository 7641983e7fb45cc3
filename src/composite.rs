//! Multi-panel composites: exact panel arithmetic, cover-fit, mat and border.

use crate::asset::{composite_file_name, triptych_file_name};
use crate::cancel::CancelToken;
use crate::codec::{self, load_image};
use crate::constants::{
    COMPOSITE_DEFAULT_BORDER, COMPOSITE_DEFAULT_BORDER_COLOR, COMPOSITE_DEFAULT_GAP,
    COMPOSITE_DEFAULT_HEIGHT, COMPOSITE_DEFAULT_MAT, COMPOSITE_DEFAULT_MAT_COLOR,
    COMPOSITE_DEFAULT_QUALITY, COMPOSITE_DEFAULT_WIDTH, COMPOSITE_MIN_QUALITY, DEFAULT_EFFORT,
    MAX_QUALITY,
};
use crate::error::{PipelineError, Result};
use crate::report::ProcessingResult;
use clap::ValueEnum;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// Two panels, 50/50.
    Halves,
    /// Three panels, 40/30/30.
    Triptych,
    /// One half-width full-height panel plus two stacked on the right.
    Asymmetric,
}

impl Layout {
    pub fn panel_count(&self) -> usize {
        match self {
            Layout::Halves => 2,
            Layout::Triptych | Layout::Asymmetric => 3,
        }
    }

    /// Panel rectangles for a `width` x `height` canvas. Rounding remainders
    /// land on the last panel of each row or column, so panels plus gaps
    /// always cover the canvas exactly.
    pub fn panels(&self, width: u32, height: u32, gap: u32) -> Result<Vec<Panel>> {
        let gaps_across = match self {
            Layout::Halves | Layout::Asymmetric => gap,
            Layout::Triptych => gap.saturating_mul(2),
        };
        if width <= gaps_across || height == 0 {
            return Err(PipelineError::InvalidComposite(format!(
                "{}x{} canvas is too small for a {} layout with {}px gaps",
                width, height, self, gap
            )));
        }
        let avail = width - gaps_across;

        let panels = match self {
            Layout::Halves => {
                let w1 = avail / 2;
                let w2 = avail - w1;
                vec![
                    Panel::new(0, 0, w1, height),
                    Panel::new(w1 + gap, 0, w2, height),
                ]
            }
            Layout::Triptych => {
                let w1 = (avail as u64 * 40 / 100) as u32;
                let w2 = (avail as u64 * 30 / 100) as u32;
                let w3 = avail - w1 - w2;
                vec![
                    Panel::new(0, 0, w1, height),
                    Panel::new(w1 + gap, 0, w2, height),
                    Panel::new(w1 + w2 + 2 * gap, 0, w3, height),
                ]
            }
            Layout::Asymmetric => {
                if height <= gap {
                    return Err(PipelineError::InvalidComposite(format!(
                        "{}px tall canvas cannot stack panels with a {}px gap",
                        height, gap
                    )));
                }
                let w1 = avail / 2;
                let w2 = avail - w1;
                let h1 = (height - gap) / 2;
                let h2 = height - gap - h1;
                vec![
                    Panel::new(0, 0, w1, height),
                    Panel::new(w1 + gap, 0, w2, h1),
                    Panel::new(w1 + gap, h1 + gap, w2, h2),
                ]
            }
        };

        if let Some(empty) = panels.iter().find(|p| p.width == 0 || p.height == 0) {
            return Err(PipelineError::InvalidComposite(format!(
                "panel at ({}, {}) would be empty",
                empty.x, empty.y
            )));
        }
        Ok(panels)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Halves => write!(f, "halves"),
            Layout::Triptych => write!(f, "triptych"),
            Layout::Asymmetric => write!(f, "asymmetric"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Panel {
    fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Parses `#RRGGBB` (the leading `#` is optional).
pub fn parse_color(value: &str) -> Result<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PipelineError::InvalidColor(value.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| PipelineError::InvalidColor(value.to_string()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// `hero-triptych-N.webp` when numbered, otherwise `<label>-composite.webp`.
pub fn output_name(label: Option<&str>, triptych: Option<usize>) -> Result<String> {
    match (label, triptych) {
        (_, Some(n)) => Ok(triptych_file_name(n)),
        (Some(label), None) if !label.trim().is_empty() => Ok(composite_file_name(label.trim())),
        _ => Err(PipelineError::InvalidComposite(
            "a composite needs a label or a triptych number".to_string(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSpec {
    pub sources: Vec<PathBuf>,
    pub layout: Layout,
    pub gap_px: u32,
    pub border_px: u32,
    pub border_color: Rgb<u8>,
    pub mat_px: u32,
    pub mat_color: Rgb<u8>,
    pub target_width: u32,
    pub target_height: u32,
    pub quality: u8,
    pub output_name: String,
}

impl CompositeSpec {
    /// A spec with the house defaults: 1920x1080, 16px gap, 12px white mat,
    /// 2px brass border, quality 90.
    pub fn new(sources: Vec<PathBuf>, layout: Layout, output_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            sources,
            layout,
            gap_px: COMPOSITE_DEFAULT_GAP,
            border_px: COMPOSITE_DEFAULT_BORDER,
            border_color: parse_color(COMPOSITE_DEFAULT_BORDER_COLOR)?,
            mat_px: COMPOSITE_DEFAULT_MAT,
            mat_color: parse_color(COMPOSITE_DEFAULT_MAT_COLOR)?,
            target_width: COMPOSITE_DEFAULT_WIDTH,
            target_height: COMPOSITE_DEFAULT_HEIGHT,
            quality: COMPOSITE_DEFAULT_QUALITY,
            output_name: output_name.into(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.len() != self.layout.panel_count() {
            return Err(PipelineError::InvalidComposite(format!(
                "{} layout takes {} sources, got {}",
                self.layout,
                self.layout.panel_count(),
                self.sources.len()
            )));
        }
        if !(COMPOSITE_MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(PipelineError::InvalidComposite(format!(
                "quality {} is outside {}..={}",
                self.quality, COMPOSITE_MIN_QUALITY, MAX_QUALITY
            )));
        }
        self.layout
            .panels(self.target_width, self.target_height, self.gap_px)?;
        Ok(())
    }

    pub fn panels(&self) -> Result<Vec<Panel>> {
        self.layout
            .panels(self.target_width, self.target_height, self.gap_px)
    }

    /// Canvas plus mat and border on every side.
    pub fn final_size(&self) -> (u32, u32) {
        let frame = 2 * (self.mat_px + self.border_px);
        (self.target_width + frame, self.target_height + frame)
    }
}

/// One `[[composites]]` entry as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositePlan {
    pub label: Option<String>,
    pub triptych: Option<usize>,
    pub layout: Layout,
    pub sources: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub gap: Option<u32>,
    pub border: Option<u32>,
    pub mat: Option<u32>,
    pub border_color: Option<String>,
    pub mat_color: Option<String>,
    pub quality: Option<u8>,
}

impl CompositePlan {
    /// Resolves relative paths against `base_dir` and returns the validated
    /// spec with the directory its output goes to.
    pub fn resolve(&self, base_dir: &Path) -> Result<(CompositeSpec, PathBuf)> {
        let name = output_name(self.label.as_deref(), self.triptych)?;
        let sources = self.sources.iter().map(|s| base_dir.join(s)).collect();
        let mut spec = CompositeSpec::new(sources, self.layout, name)?;

        if let Some(width) = self.width {
            spec.target_width = width;
        }
        if let Some(height) = self.height {
            spec.target_height = height;
        }
        if let Some(gap) = self.gap {
            spec.gap_px = gap;
        }
        if let Some(border) = self.border {
            spec.border_px = border;
        }
        if let Some(mat) = self.mat {
            spec.mat_px = mat;
        }
        if let Some(color) = &self.border_color {
            spec.border_color = parse_color(color)?;
        }
        if let Some(color) = &self.mat_color {
            spec.mat_color = parse_color(color)?;
        }
        if let Some(quality) = self.quality {
            spec.quality = quality;
        }
        spec.validate()?;

        let output_dir = match &self.output_dir {
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        };
        Ok((spec, output_dir))
    }
}

pub struct CompositeBuilder {
    cancel: CancelToken,
    effort: u8,
}

impl CompositeBuilder {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            effort: DEFAULT_EFFORT,
        }
    }

    pub fn with_effort(mut self, effort: u8) -> Self {
        self.effort = effort;
        self
    }

    /// Draws the composite in memory.
    pub fn render(&self, spec: &CompositeSpec) -> Result<RgbImage> {
        spec.validate()?;
        let panels = spec.panels()?;
        let mut canvas = RgbImage::from_pixel(spec.target_width, spec.target_height, spec.mat_color);

        for (panel, source) in panels.iter().zip(&spec.sources) {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let (img, _) = load_image(source)?;
            tracing::debug!(
                "Fitting {} into {}x{} at ({}, {})",
                source.display(),
                panel.width,
                panel.height,
                panel.x,
                panel.y
            );
            let fitted = img
                .resize_to_fill(panel.width, panel.height, FilterType::Lanczos3)
                .to_rgb8();
            imageops::replace(&mut canvas, &fitted, panel.x as i64, panel.y as i64);
        }

        let matted = extend(&canvas, spec.mat_px, spec.mat_color);
        Ok(extend(&matted, spec.border_px, spec.border_color))
    }

    /// Renders, encodes and writes `spec` into `output_dir`. An existing
    /// decodable output is left alone.
    pub fn build(&self, spec: &CompositeSpec, output_dir: &Path) -> ProcessingResult {
        let dest = output_dir.join(&spec.output_name);
        let before: u64 = spec
            .sources
            .iter()
            .filter_map(|s| fs::metadata(s).ok())
            .map(|m| m.len())
            .sum();

        if self.cancel.is_cancelled() {
            return ProcessingResult::cancelled(&dest, before);
        }
        if dest.exists() && codec::verify_decodable(&dest).is_ok() {
            return ProcessingResult::skipped(&dest, before, "composite already exists");
        }

        match self.try_build(spec, &dest) {
            Ok(after) => ProcessingResult::composited(&dest, before, after),
            Err(PipelineError::Cancelled) => ProcessingResult::cancelled(&dest, before),
            Err(e) => {
                tracing::error!("Composite {} failed: {}", spec.output_name, e);
                ProcessingResult::failed(&dest, before, &e)
            }
        }
    }

    fn try_build(&self, spec: &CompositeSpec, dest: &Path) -> Result<u64> {
        let rendered = DynamicImage::ImageRgb8(self.render(spec)?);
        let encoded = codec::encode_webp(&rendered, spec.quality, self.effort, dest)?;
        codec::write_atomically(dest, &encoded, &self.cancel)?;
        Ok(encoded.len() as u64)
    }
}

/// Grows `img` by `px` on every side, filled with `color`.
fn extend(img: &RgbImage, px: u32, color: Rgb<u8>) -> RgbImage {
    if px == 0 {
        return img.clone();
    }
    let mut out = RgbImage::from_pixel(img.width() + 2 * px, img.height() + 2 * px, color);
    imageops::replace(&mut out, img, px as i64, px as i64);
    out
}
