//! Width variants for `srcset`: encoded locally, or delegated to an image CDN
//! by rewriting query parameters.

use crate::asset::{variant_path, ImageAsset, VariantKind};
use crate::cancel::CancelToken;
use crate::codec::{self, load_image};
use crate::constants::{
    DEFAULT_BREAKPOINTS, DEFAULT_BREAKPOINT_QUALITIES, DEFAULT_CDN_HOSTS, DEFAULT_EFFORT,
    MAX_QUALITY, MIN_QUALITY,
};
use crate::error::{PipelineError, Result};
use crate::report::ProcessingResult;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?i)(?P<scheme>https?)://(?P<host>[^/?#:]+)(?P<port>:\d+)?(?P<path>[^?#]*)(?:\?(?P<query>[^#]*))?(?P<fragment>#.*)?$",
    )
    .expect("valid regex")
});

/// Query keys owned by the CDN transform.
const TRANSFORM_KEYS: [&str; 3] = ["w", "q", "fm"];

/// Ascending widths with a matching quality curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoints {
    widths: Vec<u32>,
    qualities: Vec<u8>,
}

impl Breakpoints {
    /// A quality curve shorter than the widths repeats its last value.
    pub fn new(widths: Vec<u32>, qualities: Vec<u8>) -> Result<Self> {
        if widths.is_empty() {
            return Err(PipelineError::InvalidBreakpoints(
                "at least one width is required".to_string(),
            ));
        }
        if widths.iter().any(|&w| w == 0) {
            return Err(PipelineError::InvalidBreakpoints(
                "widths must be positive".to_string(),
            ));
        }
        if widths.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PipelineError::InvalidBreakpoints(format!(
                "widths must be strictly ascending: {:?}",
                widths
            )));
        }
        if qualities.is_empty() {
            return Err(PipelineError::InvalidBreakpoints(
                "at least one quality is required".to_string(),
            ));
        }
        if let Some(&bad) = qualities
            .iter()
            .find(|q| !(MIN_QUALITY..=MAX_QUALITY).contains(*q))
        {
            return Err(PipelineError::InvalidQuality(bad));
        }
        Ok(Self { widths, qualities })
    }

    pub fn widths(&self) -> &[u32] {
        &self.widths
    }

    pub fn quality_at(&self, index: usize) -> u8 {
        let last = self.qualities.len() - 1;
        self.qualities[index.min(last)]
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.widths
            .iter()
            .enumerate()
            .map(move |(i, &w)| (w, self.quality_at(i)))
    }

    /// Breakpoints that fit a source `source_width` wide. When none do, a
    /// single variant at the source width.
    pub fn fitting(&self, source_width: u32) -> Vec<(u32, u8)> {
        let fitting: Vec<(u32, u8)> = self.iter().filter(|(w, _)| *w <= source_width).collect();
        if fitting.is_empty() {
            vec![(source_width, self.quality_at(0))]
        } else {
            fitting
        }
    }
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            widths: DEFAULT_BREAKPOINTS.to_vec(),
            qualities: DEFAULT_BREAKPOINT_QUALITIES.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrcsetEntry {
    pub url: String,
    pub width: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Srcset {
    pub entries: Vec<SrcsetEntry>,
}

impl Srcset {
    fn push(&mut self, url: String, width: u32) {
        self.entries.push(SrcsetEntry { url, width });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Srcset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}w", entry.url, entry.width)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsiveSource {
    Local(PathBuf),
    Remote(String),
}

impl ResponsiveSource {
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ResponsiveSource::Remote(input.to_string())
        } else {
            ResponsiveSource::Local(PathBuf::from(input))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponsiveOutput {
    pub srcset: Srcset,
    /// One entry per local variant; empty for CDN sources.
    pub results: Vec<ProcessingResult>,
}

pub struct ResponsiveVariantGenerator {
    breakpoints: Breakpoints,
    cdn_hosts: Vec<String>,
    base_url: Option<String>,
    effort: u8,
    cancel: CancelToken,
}

impl ResponsiveVariantGenerator {
    pub fn new(breakpoints: Breakpoints, cancel: CancelToken) -> Self {
        Self {
            breakpoints,
            cdn_hosts: DEFAULT_CDN_HOSTS.iter().map(|h| h.to_string()).collect(),
            base_url: None,
            effort: DEFAULT_EFFORT,
            cancel,
        }
    }

    /// Adds hosts on top of the built-in CDN list.
    pub fn with_cdn_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for host in hosts {
            let host = host.into().to_ascii_lowercase();
            if !self.cdn_hosts.contains(&host) {
                self.cdn_hosts.push(host);
            }
        }
        self
    }

    /// Prefix for local srcset URLs; without it entries are bare file names.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_effort(mut self, effort: u8) -> Self {
        self.effort = effort;
        self
    }

    pub fn is_cdn_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.cdn_hosts
            .iter()
            .any(|known| host == *known || host.ends_with(&format!(".{}", known)))
    }

    pub fn generate(&self, source: &ResponsiveSource) -> Result<ResponsiveOutput> {
        match source {
            ResponsiveSource::Local(path) => self.generate_local(path),
            ResponsiveSource::Remote(url) => Ok(ResponsiveOutput {
                srcset: self.rewrite_remote(url)?,
                results: Vec::new(),
            }),
        }
    }

    /// Encodes `<name>-<width>w.webp` for each fitting breakpoint. Variants
    /// that already exist and decode are reused.
    pub fn generate_local(&self, path: &Path) -> Result<ResponsiveOutput> {
        let asset = ImageAsset::discover(path)?;
        let mut img: Option<DynamicImage> = None;
        let source_width = match asset.width() {
            Some(width) => width,
            None => {
                let (decoded, _) = load_image(path)?;
                let width = decoded.width();
                img = Some(decoded);
                width
            }
        };

        let mut output = ResponsiveOutput::default();
        for (width, quality) in self.breakpoints.fitting(source_width) {
            let dest = variant_path(asset.dir(), &asset.logical_base_name, VariantKind::Responsive(width));
            let url = self.local_url(&dest);

            if self.cancel.is_cancelled() {
                output
                    .results
                    .push(ProcessingResult::cancelled(&asset.path, asset.byte_size));
                continue;
            }

            if dest.exists() && codec::verify_decodable(&dest).is_ok() {
                output.results.push(
                    ProcessingResult::skipped(&dest, asset.byte_size, "variant exists")
                        .with_output(&dest),
                );
                output.srcset.push(url, width);
                continue;
            }

            if img.is_none() {
                img = Some(load_image(path)?.0);
            }
            let Some(source) = img.as_ref() else {
                continue;
            };

            let result = match self.write_variant(source, width, quality, &dest) {
                Ok(after) => {
                    output.srcset.push(url, width);
                    ProcessingResult::transcoded(&asset.path, &dest, asset.byte_size, after)
                        .with_note(format!("{}w at q{}", width, quality))
                        .as_derivative()
                }
                Err(PipelineError::Cancelled) => {
                    ProcessingResult::cancelled(&asset.path, asset.byte_size)
                }
                Err(e) => {
                    tracing::error!("{}: {}", dest.display(), e);
                    ProcessingResult::failed(&asset.path, asset.byte_size, &e)
                }
            };
            output.results.push(result);
        }
        Ok(output)
    }

    fn write_variant(&self, img: &DynamicImage, width: u32, quality: u8, dest: &Path) -> Result<u64> {
        let resized = codec::resize_to_width(img, width);
        let encoded = codec::encode_webp(&resized, quality, self.effort, dest)?;
        codec::write_atomically(dest, &encoded, &self.cancel)?;
        Ok(encoded.len() as u64)
    }

    fn local_url(&self, dest: &Path) -> String {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &self.base_url {
            Some(base) => format!("{}/{}", base, name),
            None => name,
        }
    }

    /// Builds the srcset from CDN transform parameters. Nothing is fetched.
    pub fn rewrite_remote(&self, url: &str) -> Result<Srcset> {
        let caps = URL
            .captures(url)
            .ok_or_else(|| PipelineError::UnsupportedRemote(url.to_string()))?;
        let host = &caps["host"];
        if !self.is_cdn_host(host) {
            return Err(PipelineError::UnsupportedRemote(format!(
                "{} is not a known image CDN",
                host
            )));
        }

        let prefix = format!(
            "{}://{}{}{}",
            &caps["scheme"],
            host,
            caps.name("port").map_or("", |m| m.as_str()),
            caps.name("path").map_or("", |m| m.as_str())
        );
        let kept: Vec<&str> = caps
            .name("query")
            .map_or("", |m| m.as_str())
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or("");
                !TRANSFORM_KEYS.contains(&key)
            })
            .collect();
        let fragment = caps.name("fragment").map_or("", |m| m.as_str());

        let mut srcset = Srcset::default();
        for (width, quality) in self.breakpoints.iter() {
            let transform = format!("w={}&q={}&fm=webp", width, quality);
            let mut params = kept.clone();
            params.push(&transform);
            srcset.push(format!("{}?{}{}", prefix, params.join("&"), fragment), width);
        }
        Ok(srcset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Action;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn generator() -> ResponsiveVariantGenerator {
        ResponsiveVariantGenerator::new(Breakpoints::default(), CancelToken::new()).with_effort(1)
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
            .save_with_format(path, image::ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn test_breakpoints_validation() {
        assert!(Breakpoints::new(vec![], vec![80]).is_err());
        assert!(Breakpoints::new(vec![640, 640], vec![80]).is_err());
        assert!(Breakpoints::new(vec![1024, 640], vec![80]).is_err());
        assert!(Breakpoints::new(vec![640], vec![]).is_err());
        assert!(matches!(
            Breakpoints::new(vec![640], vec![0]),
            Err(PipelineError::InvalidQuality(0))
        ));
    }

    #[test]
    fn test_quality_curve_repeats_last() {
        let bp = Breakpoints::new(vec![320, 640, 960], vec![85, 75]).unwrap();
        assert_eq!(bp.iter().collect::<Vec<_>>(), vec![(320, 85), (640, 75), (960, 75)]);
    }

    #[test]
    fn test_fitting_breakpoints() {
        let bp = Breakpoints::default();
        assert_eq!(bp.fitting(3000).len(), 4);
        assert_eq!(bp.fitting(1500), vec![(640, 82), (1024, 80)]);
        assert_eq!(bp.fitting(500), vec![(500, 82)]);
    }

    #[test]
    fn test_local_variants_for_wide_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("terrace.png");
        write_png(&source, 3000, 60);

        let output = generator().generate_local(&source).unwrap();

        assert_eq!(output.srcset.len(), 4);
        assert_eq!(
            output.srcset.to_string(),
            "terrace-640w.webp 640w, terrace-1024w.webp 1024w, \
             terrace-1920w.webp 1920w, terrace-2560w.webp 2560w"
        );
        for &width in &[640, 1024, 1920, 2560] {
            let path = temp_dir.path().join(format!("terrace-{}w.webp", width));
            let (w, _) = codec::verify_decodable(&path).unwrap();
            assert!(w <= width && w <= 3000);
        }
        assert!(output.results.iter().all(|r| r.action == Action::Transcoded));
        assert!(source.exists());
    }

    #[test]
    fn test_existing_variants_are_reused() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("pool.png");
        write_png(&source, 700, 40);

        let first = generator().generate_local(&source).unwrap();
        assert_eq!(first.results[0].action, Action::Transcoded);
        let variant = temp_dir.path().join("pool-640w.webp");
        let bytes = fs::read(&variant).unwrap();

        let second = generator().generate_local(&source).unwrap();
        assert_eq!(second.results[0].action, Action::Skipped);
        assert_eq!(second.srcset, first.srcset);
        assert_eq!(fs::read(&variant).unwrap(), bytes);
    }

    #[test]
    fn test_narrow_source_gets_one_variant() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("logo.png");
        write_png(&source, 300, 100);

        let output = generator()
            .with_base_url(Some("https://hotel.example/img/".to_string()))
            .generate_local(&source)
            .unwrap();
        assert_eq!(output.srcset.to_string(), "https://hotel.example/img/logo-300w.webp 300w");
        let img = image::open(temp_dir.path().join("logo-300w.webp")).unwrap();
        assert_eq!(img.dimensions(), (300, 100));
    }

    #[test]
    fn test_cdn_rewrite_appends_params() {
        let srcset = generator()
            .rewrite_remote("https://cdn.sanity.io/images/abc/production/room.jpg")
            .unwrap();
        assert_eq!(srcset.len(), 4);
        assert_eq!(
            srcset.entries[0].url,
            "https://cdn.sanity.io/images/abc/production/room.jpg?w=640&q=82&fm=webp"
        );
        assert_eq!(srcset.entries[3].width, 2560);
    }

    #[test]
    fn test_cdn_rewrite_replaces_existing_params() {
        let srcset = generator()
            .rewrite_remote("https://images.ctfassets.net/space/room.png?w=100&fit=fill&fm=png#top")
            .unwrap();
        assert_eq!(
            srcset.entries[1].url,
            "https://images.ctfassets.net/space/room.png?fit=fill&w=1024&q=80&fm=webp#top"
        );
    }

    #[test]
    fn test_configured_and_sub_hosts() {
        let generator = generator().with_cdn_hosts(["img.hotel-cdn.net"]);
        assert!(generator.is_cdn_host("IMG.HOTEL-CDN.NET"));
        assert!(generator.is_cdn_host("eu.cdn.sanity.io"));
        assert!(!generator.is_cdn_host("evilcdn.sanity.io.example.com"));
        assert!(!generator.is_cdn_host("notcdn.sanity.io.evil"));
    }

    #[test]
    fn test_unknown_host_is_error() {
        let result = generator().rewrite_remote("https://example.com/room.jpg");
        assert!(matches!(result, Err(PipelineError::UnsupportedRemote(_))));
    }

    #[test]
    fn test_remote_source_writes_nothing() {
        let output = generator()
            .generate(&ResponsiveSource::parse("https://cdn.sanity.io/x.jpg"))
            .unwrap();
        assert!(output.results.is_empty());
        assert_eq!(output.srcset.len(), 4);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            ResponsiveSource::parse("HTTPS://cdn.sanity.io/a.jpg"),
            ResponsiveSource::Remote("HTTPS://cdn.sanity.io/a.jpg".to_string())
        );
        assert_eq!(
            ResponsiveSource::parse("site/a.jpg"),
            ResponsiveSource::Local(PathBuf::from("site/a.jpg"))
        );
    }
}
