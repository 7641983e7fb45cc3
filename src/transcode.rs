//! Per-file work: transcode to WebP, clear duplicates and junk, dispose originals.

use crate::asset::{classify_stem, is_webp, variant_path, VariantKind};
use crate::cancel::CancelToken;
use crate::codec::{self, load_image};
use crate::constants::ORIGINALS_DIR;
use crate::error::{PipelineError, Result};
use crate::profile::CompressionProfile;
use crate::report::{Action, ProcessingResult};
use crate::utils::format_file_size;
use clap::ValueEnum;
use image::{DynamicImage, GenericImageView};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// Write `<name>-optimized.webp` next to the source.
    #[default]
    Sibling,
    /// Write `<name>.webp`, replacing a WebP source.
    InPlace,
}

/// What happens to an original once its optimized sibling is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OriginalPolicy {
    #[default]
    Delete,
    Keep,
    /// Move into an `originals/` directory next to it.
    Archive,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Sibling => write!(f, "sibling"),
            OutputMode::InPlace => write!(f, "in-place"),
        }
    }
}

impl fmt::Display for OriginalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginalPolicy::Delete => write!(f, "delete"),
            OriginalPolicy::Keep => write!(f, "keep"),
            OriginalPolicy::Archive => write!(f, "archive"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub profile: CompressionProfile,
    /// Extra tiers written from the same decoded source (`-mobile`, `-placeholder`).
    pub derivatives: Vec<CompressionProfile>,
    pub mode: OutputMode,
    pub originals: OriginalPolicy,
}

impl TranscodeOptions {
    pub fn new(profile: CompressionProfile) -> Self {
        Self {
            profile,
            derivatives: Vec::new(),
            mode: OutputMode::default(),
            originals: OriginalPolicy::default(),
        }
    }

    pub fn with_derivatives(mut self, derivatives: Vec<CompressionProfile>) -> Self {
        self.derivatives = derivatives;
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_originals(mut self, originals: OriginalPolicy) -> Self {
        self.originals = originals;
        self
    }

    /// Only an `-optimized` output stands in for its original; a mobile or
    /// placeholder primary tier leaves originals where they are.
    pub fn replaces_original(&self) -> bool {
        self.profile.variant == VariantKind::Optimized
    }

    /// Rejects tier combinations whose outputs would collide or that would
    /// swap a full-size original for a reduced copy.
    pub fn validate(&self) -> Result<()> {
        if self.mode == OutputMode::InPlace && !self.replaces_original() {
            return Err(PipelineError::InPlaceTier {
                tier: self.profile.tier_name.clone(),
                variant: self.profile.variant,
            });
        }
        for derivative in &self.derivatives {
            if derivative.variant == VariantKind::Optimized
                || derivative.variant == self.profile.variant
            {
                return Err(PipelineError::VariantConflict {
                    derivative: derivative.tier_name.clone(),
                    primary: self.profile.tier_name.clone(),
                });
            }
        }
        Ok(())
    }
}

pub struct Transcoder {
    options: TranscodeOptions,
    cancel: CancelToken,
}

impl Transcoder {
    pub fn new(options: TranscodeOptions, cancel: CancelToken) -> Self {
        Self { options, cancel }
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    /// Carries out one planned action. Failures become `Error` results and
    /// never propagate, so one bad file cannot stop the batch.
    pub fn execute(&self, planned: ProcessingResult) -> Vec<ProcessingResult> {
        if self.cancel.is_cancelled() {
            return vec![ProcessingResult::cancelled(
                planned.input_path,
                planned.before_bytes,
            )];
        }

        match (planned.action, planned.output_path.clone()) {
            (Action::Transcoded, Some(dest)) => self.transcode(&planned.input_path, &dest),
            (Action::DeletedDuplicate, Some(optimized)) => {
                vec![self.remove_duplicate(&planned.input_path, &optimized, planned.before_bytes)]
            }
            (Action::DeletedUuidJunk, _) => {
                vec![self.remove_junk(&planned.input_path, planned.before_bytes)]
            }
            _ => vec![planned],
        }
    }

    /// Transcodes `source` to `dest` plus any missing derivatives.
    pub fn transcode(&self, source: &Path, dest: &Path) -> Vec<ProcessingResult> {
        match self.try_transcode(source, dest) {
            Ok(results) => results,
            Err(e) => {
                let before = fs::metadata(source).map(|m| m.len()).unwrap_or(0);
                vec![self.failure(source, before, e)]
            }
        }
    }

    fn try_transcode(&self, source: &Path, dest: &Path) -> Result<Vec<ProcessingResult>> {
        let before = fs::metadata(source)
            .map_err(|e| PipelineError::filesystem(source, e))?
            .len();
        let profile = &self.options.profile;

        let wants_primary = profile.exceeds_threshold(before);
        let pending: Vec<&CompressionProfile> = self
            .options
            .derivatives
            .iter()
            .filter(|d| !derivative_path(source, d).exists())
            .collect();

        if !wants_primary && pending.is_empty() {
            return Ok(vec![ProcessingResult::skipped(
                source,
                before,
                format!(
                    "below {} threshold of {}",
                    profile.tier_name,
                    format_file_size(profile.size_threshold_bytes)
                ),
            )]);
        }

        let (img, _) = load_image(source)?;

        let primary = if wants_primary {
            self.write_primary(source, dest, &img, before)?
        } else {
            ProcessingResult::skipped(source, before, "below threshold, derivatives only")
        };

        let mut results = vec![primary];
        for derivative in pending {
            let path = derivative_path(source, derivative);
            let result = match self.encode_and_write(&img, derivative, &path) {
                Ok(after) => ProcessingResult::transcoded(source, &path, before, after)
                    .with_note(derivative.tier_name.clone())
                    .as_derivative(),
                Err(e) => self.failure(source, before, e),
            };
            results.push(result);
        }

        let all_written = results.iter().all(|r| !r.is_failure() && r.action != Action::Cancelled);
        if results[0].action == Action::Transcoded
            && all_written
            && self.options.replaces_original()
            && !same_file(source, dest)
        {
            if let Err(e) = codec::verify_decodable(dest) {
                results.push(self.failure(source, before, e));
                return Ok(results);
            }
            match self.dispose_original(source) {
                Ok(Some(note)) => {
                    results[0] = results[0].clone().with_note(note);
                }
                Ok(None) => {}
                Err(e) => results.push(self.failure(source, before, e)),
            }
        }
        Ok(results)
    }

    fn write_primary(
        &self,
        source: &Path,
        dest: &Path,
        img: &DynamicImage,
        before: u64,
    ) -> Result<ProcessingResult> {
        let profile = &self.options.profile;
        let (width, _) = img.dimensions();

        if self.options.mode == OutputMode::InPlace && is_webp(source) && width <= profile.max_width
        {
            return Ok(ProcessingResult::skipped(
                source,
                before,
                format!("already WebP within {}px", profile.max_width),
            ));
        }

        let encoded = encode(img, profile, dest)?;
        let after = encoded.len() as u64;
        if after >= before {
            tracing::debug!(
                "Discarding {} encode of {}: {} is not smaller than {}",
                profile.tier_name,
                source.display(),
                after,
                before
            );
            return Ok(ProcessingResult::skipped(
                source,
                before,
                format!("no savings at {} ({})", profile.tier_name, format_file_size(after)),
            ));
        }

        codec::write_atomically(dest, &encoded, &self.cancel)?;
        Ok(ProcessingResult::transcoded(source, dest, before, after))
    }

    fn encode_and_write(
        &self,
        img: &DynamicImage,
        profile: &CompressionProfile,
        dest: &Path,
    ) -> Result<u64> {
        let encoded = encode(img, profile, dest)?;
        codec::write_atomically(dest, &encoded, &self.cancel)?;
        Ok(encoded.len() as u64)
    }

    /// Removes an original whose optimized sibling already exists, but only
    /// once that sibling decodes.
    pub fn remove_duplicate(&self, original: &Path, optimized: &Path, before: u64) -> ProcessingResult {
        let outcome = codec::verify_decodable(optimized).and_then(|_| self.dispose_original(original));
        match outcome {
            Ok(note) => {
                let result = ProcessingResult::planned(original, Action::DeletedDuplicate, before)
                    .with_output(optimized);
                match note {
                    Some(note) => result.with_note(note),
                    None => result,
                }
            }
            Err(e) => self.failure(original, before, e),
        }
    }

    pub fn remove_junk(&self, path: &Path, before: u64) -> ProcessingResult {
        match fs::remove_file(path) {
            Ok(()) => ProcessingResult::planned(path, Action::DeletedUuidJunk, before),
            Err(e) => self.failure(path, before, PipelineError::filesystem(path, e)),
        }
    }

    fn dispose_original(&self, original: &Path) -> Result<Option<String>> {
        match self.options.originals {
            OriginalPolicy::Keep => Ok(None),
            OriginalPolicy::Delete => {
                fs::remove_file(original).map_err(|e| PipelineError::filesystem(original, e))?;
                Ok(Some("original deleted".to_string()))
            }
            OriginalPolicy::Archive => {
                let target = archive_path(original);
                if let Some(dir) = target.parent() {
                    fs::create_dir_all(dir).map_err(|e| PipelineError::filesystem(dir, e))?;
                }
                fs::rename(original, &target).map_err(|e| PipelineError::filesystem(original, e))?;
                Ok(Some(format!("original moved to {}/", ORIGINALS_DIR)))
            }
        }
    }

    fn failure(&self, path: &Path, before: u64, error: PipelineError) -> ProcessingResult {
        if matches!(error, PipelineError::Cancelled) {
            return ProcessingResult::cancelled(path, before);
        }
        tracing::error!("{}: {}", path.display(), error);
        ProcessingResult::failed(path, before, &error)
    }
}

/// Resize, optional sharpen and WebP encode, all in memory.
pub fn encode(img: &DynamicImage, profile: &CompressionProfile, path: &Path) -> Result<Vec<u8>> {
    let target = profile.target_width(img.width());
    let resized = codec::resize_to_width(img, target);
    if profile.sharpen {
        let sharpened = codec::sharpen(&resized);
        codec::encode_webp(&sharpened, profile.quality, profile.effort, path)
    } else {
        codec::encode_webp(&resized, profile.quality, profile.effort, path)
    }
}

fn derivative_path(source: &Path, profile: &CompressionProfile) -> PathBuf {
    let dir = source.parent().unwrap_or_else(|| Path::new("."));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (base, _) = classify_stem(&stem);
    variant_path(dir, &base, profile.variant)
}

/// Same directory and a name equal up to ASCII case, so `HALL.WEBP` and
/// `HALL.webp` count as one file on case-insensitive filesystems.
fn same_file(a: &Path, b: &Path) -> bool {
    a.parent() == b.parent()
        && match (a.file_name(), b.file_name()) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => false,
        }
}

/// `<dir>/originals/<file name>`.
pub fn archive_path(original: &Path) -> PathBuf {
    let dir = original.parent().unwrap_or_else(|| Path::new("."));
    match original.file_name() {
        Some(name) => dir.join(ORIGINALS_DIR).join(name),
        None => dir.join(ORIGINALS_DIR),
    }
}
