use crate::asset::{is_image_file, ImageAsset};
use crate::error::{PipelineError, Result};
use crate::profile::{CompressionProfile, ProfileTable};
use crate::resolver::is_uuid_junk;
use crate::utils::format_file_size;
use image::{ImageFormat, ImageReader};
use std::path::Path;

/// What a tier would do with a file, judged from its size and header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierVerdict {
    BelowThreshold,
    Resize { from: u32, to: u32 },
    ReencodeOnly,
    Unreadable,
}

pub fn tier_verdict(asset: &ImageAsset, profile: &CompressionProfile) -> TierVerdict {
    if !profile.exceeds_threshold(asset.byte_size) {
        return TierVerdict::BelowThreshold;
    }
    match asset.width() {
        None => TierVerdict::Unreadable,
        Some(width) if width > profile.max_width => TierVerdict::Resize {
            from: width,
            to: profile.target_width(width),
        },
        Some(_) => TierVerdict::ReencodeOnly,
    }
}

fn describe(verdict: &TierVerdict) -> String {
    match verdict {
        TierVerdict::BelowThreshold => "skip (below threshold)".to_string(),
        TierVerdict::Resize { from, to } => format!("resize {}px → {}px and encode", from, to),
        TierVerdict::ReencodeOnly => "encode at current width".to_string(),
        TierVerdict::Unreadable => "header unreadable, would fail to decode".to_string(),
    }
}

fn detect_format(path: &Path) -> Option<ImageFormat> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .ok()
        .and_then(|r| r.format())
}

pub fn print_image_info(path: &Path, table: &ProfileTable) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.to_path_buf()));
    }
    let asset = ImageAsset::discover(path)?;

    println!("📊 Analyzing image: {}", path.display());
    println!("📋 Basic Information:");
    println!("  📁 Logical name: {}", asset.logical_base_name);
    println!("  🏷️  Variant: {}", asset.variant);
    println!("  📦 File size: {}", format_file_size(asset.byte_size));
    match asset.dimensions {
        Some((width, height)) => {
            println!("  📏 Dimensions: {}x{} pixels", width, height);
            if height > 0 {
                println!("  📐 Aspect ratio: {:.2}:1", width as f64 / height as f64);
            }
        }
        None => println!("  📏 Dimensions: unreadable"),
    }
    if let Some(format) = detect_format(path) {
        println!("  🎭 Image format: {:?}", format);
    }

    if !is_image_file(path) {
        println!("\n⚠️  Extension is not one the optimizer walks");
    }
    if is_uuid_junk(path) {
        println!("\n🗑️  Name matches the screenshot/UUID pattern: optimize would delete it");
        return Ok(());
    }
    if asset.variant.is_derived() {
        println!("\n💡 Pipeline output: optimize leaves it as is");
        return Ok(());
    }

    println!("\n💡 Tier verdicts:");
    for profile in table.iter() {
        let marker = if profile.tier_name == table.default_tier() {
            " (default)"
        } else {
            ""
        };
        println!(
            "  🎯 {}{}: {}",
            profile.tier_name,
            marker,
            describe(&tier_verdict(&asset, profile))
        );
    }
    Ok(())
}

pub fn print_tiers(table: &ProfileTable) {
    println!("📋 Compression tiers:");
    println!(
        "  {:<12} {:>9} {:>7} {:>6} {:>10} {:>8}  output",
        "tier", "max width", "quality", "effort", "threshold", "sharpen"
    );
    for profile in table.iter() {
        let marker = if profile.tier_name == table.default_tier() {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<12} {:>9} {:>7} {:>6} {:>10} {:>8}  {}",
            marker,
            profile.tier_name,
            profile.max_width,
            profile.quality,
            profile.effort,
            format_file_size(profile.size_threshold_bytes),
            if profile.sharpen { "yes" } else { "no" },
            profile.variant
        );
    }
}
