pub mod logger;

pub mod asset;
pub mod batch;
pub mod cancel;
pub mod cli;
pub mod codec;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod info;
pub mod profile;
pub mod report;
pub mod resolver;
pub mod responsive;
pub mod transcode;
pub mod utils;
pub mod walker;

pub use asset::{classify_stem, variant_path, ImageAsset, VariantKind};
pub use batch::{optimize, OptimizeOptions, RunSettings};
pub use cancel::CancelToken;
pub use composite::{CompositeBuilder, CompositePlan, CompositeSpec, Layout};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use profile::{CompressionProfile, ProfileTable};
pub use report::{Action, ProcessingResult, ReportAggregator};
pub use resolver::VersionResolver;
pub use responsive::{Breakpoints, ResponsiveSource, ResponsiveVariantGenerator, Srcset};
pub use transcode::{OriginalPolicy, OutputMode, TranscodeOptions, Transcoder};
pub use walker::{Discovery, DirectoryWalker};
