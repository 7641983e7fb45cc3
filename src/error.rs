use crate::asset::VariantKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Filesystem error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Verification failed for {0}: {1}")]
    Verification(PathBuf, String),

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid effort value: {0}. Must be between 0 and 6")]
    InvalidEffort(u8),

    #[error("Unknown compression tier: {0}")]
    UnknownTier(String),

    #[error("Tier '{tier}' writes {variant} files and cannot replace originals in place")]
    InPlaceTier { tier: String, variant: VariantKind },

    #[error("Tier '{derivative}' cannot be used as a variant alongside tier '{primary}'")]
    VariantConflict { derivative: String, primary: String },

    #[error("Invalid composite: {0}")]
    InvalidComposite(String),

    #[error("Invalid color: {0}. Expected #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid breakpoints: {0}")]
    InvalidBreakpoints(String),

    #[error("Unsupported remote source: {0}")]
    UnsupportedRemote(String),

    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Wraps an I/O error with the path it happened on. A missing file maps to
    /// `FileNotFound` so vanished sources read the same everywhere.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            PipelineError::FileNotFound(path)
        } else {
            PipelineError::Filesystem { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_filesystem_maps_not_found() {
        let err = PipelineError::filesystem("a.jpg", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, PipelineError::FileNotFound(_)));

        let err =
            PipelineError::filesystem("a.jpg", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, PipelineError::Filesystem { .. }));
        assert!(err.to_string().contains("a.jpg"));
    }

    #[test]
    fn test_tier_conflict_messages() {
        let err = PipelineError::InPlaceTier {
            tier: "mobile".to_string(),
            variant: VariantKind::Mobile,
        };
        assert_eq!(
            err.to_string(),
            "Tier 'mobile' writes mobile files and cannot replace originals in place"
        );

        let err = PipelineError::VariantConflict {
            derivative: "hero".to_string(),
            primary: "standard".to_string(),
        };
        assert!(err.to_string().contains("cannot be used as a variant"));
    }
}
