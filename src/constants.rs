pub const DEFAULT_QUALITY: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// WebP `method`: 0 is fastest, 6 spends the most effort on compression.
pub const MAX_EFFORT: u8 = 6;
pub const DEFAULT_EFFORT: u8 = MAX_EFFORT;

pub const DEFAULT_TIER: &str = "standard";

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;

// Unsharp mask tuned for downscaled photographs
pub const SHARPEN_SIGMA: f32 = 0.9;
pub const SHARPEN_THRESHOLD: i32 = 2;

pub const DEFAULT_BREAKPOINTS: &[u32] = &[640, 1024, 1920, 2560];
pub const DEFAULT_BREAKPOINT_QUALITIES: &[u8] = &[82, 80, 75, 70];

pub const DEFAULT_CDN_HOSTS: &[&str] = &["cdn.sanity.io", "images.ctfassets.net"];

pub const COMPOSITE_MIN_QUALITY: u8 = 88;
pub const COMPOSITE_DEFAULT_QUALITY: u8 = 90;
pub const COMPOSITE_DEFAULT_WIDTH: u32 = 1920;
pub const COMPOSITE_DEFAULT_HEIGHT: u32 = 1080;
pub const COMPOSITE_DEFAULT_GAP: u32 = 16;
pub const COMPOSITE_DEFAULT_BORDER: u32 = 2;
pub const COMPOSITE_DEFAULT_MAT: u32 = 12;
pub const COMPOSITE_DEFAULT_BORDER_COLOR: &str = "#b08d57";
pub const COMPOSITE_DEFAULT_MAT_COLOR: &str = "#ffffff";

pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

pub const OUTPUT_EXTENSION: &str = "webp";
pub const OPTIMIZED_SUFFIX: &str = "-optimized";
pub const MOBILE_SUFFIX: &str = "-mobile";
pub const PLACEHOLDER_SUFFIX: &str = "-placeholder";
pub const COMPOSITE_SUFFIX: &str = "-composite";
pub const TRIPTYCH_PREFIX: &str = "hero-triptych-";

/// Directories holding archived sources; never walked.
pub const ORIGINALS_DIR: &str = "originals";

pub const CONFIG_FILE_NAME: &str = "asset-squeeze.toml";
pub const TEMP_FILE_PREFIX: &str = ".asset-squeeze-";
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

/// Rough resident size of a decoded RGBA pixel plus its resized copy.
pub const BYTES_PER_DECODED_PIXEL: u64 = 8;
pub const MIN_AVAILABLE_MEMORY_MIB: u64 = 512;

pub const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

// Common output message prefixes
pub const SUCCESS_PREFIX: &str = "✅";
pub const SKIP_PREFIX: &str = "⏭️ ";
pub const DELETE_PREFIX: &str = "🗑️ ";
pub const WARNING_PREFIX: &str = "⚠️ ";
pub const ERROR_PREFIX: &str = "❌";
pub const INFO_PREFIX: &str = "📋";
