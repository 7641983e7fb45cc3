use crate::composite::Layout;
use crate::transcode::{OriginalPolicy, OutputMode};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "asset-squeeze",
    about = "Batch WebP optimizer, responsive variant generator and composite builder",
    long_about = "asset-squeeze walks a website's image tree and converts oversized JPEG/PNG assets \
                  to WebP under named compression tiers. Originals are replaced once their \
                  optimized sibling is written and verified. It also generates responsive width \
                  variants with a srcset descriptor and builds bordered multi-panel composites.",
    version,
    after_help = "EXAMPLES:\n  \
    asset-squeeze ./public/images\n  \
    asset-squeeze optimize ./public/images --tier hero --variants mobile,placeholder\n  \
    asset-squeeze optimize ./public --only 'rooms/**' --dry-run\n  \
    asset-squeeze responsive ./public/lobby.jpg --base-url /images\n  \
    asset-squeeze composite --triptych 1 pool.jpg spa.jpg bar.jpg\n  \
    asset-squeeze composite --plan ./public/asset-squeeze.toml\n  \
    asset-squeeze info ./public/suite.png\n  \
    asset-squeeze tiers"
)]
pub struct Args {
    #[arg(
        help = "Image root to optimize with default settings",
        long_help = "Shorthand for `optimize <ROOT>`. Uses asset-squeeze.toml from ROOT when present."
    )]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short = 'q', long, global = true, help = "Only print errors and srcset lines")]
    pub quiet: bool,

    #[arg(
        short = 'v',
        long,
        global = true,
        conflicts_with = "quiet",
        help = "Print per-stage debug logging",
        long_help = "Enable debug logging on stderr. RUST_LOG takes precedence when set."
    )]
    pub verbose: bool,
}

/// Worker and report flags shared by the batch commands.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunFlags {
    #[arg(
        short = 'j',
        long,
        help = "Number of parallel workers (default: auto)",
        long_help = "Upper bound on concurrent workers. Defaults to the CPU count and is \
                     further capped by available memory."
    )]
    pub jobs: Option<usize>,

    #[arg(long, help = "Write a JSON report of every result to this path")]
    pub report_json: Option<PathBuf>,

    #[arg(long, help = "Hide the progress bar")]
    pub no_progress: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Convert oversized images under a root to WebP",
        long_about = "Walk ROOT, resolve each logical image against its existing variants and \
                      transcode, deduplicate or remove junk files in parallel."
    )]
    Optimize {
        #[arg(help = "Image root directory")]
        root: PathBuf,

        #[arg(
            short = 't',
            long,
            help = "Compression tier (default: standard)",
            long_help = "Named compression tier. Run `asset-squeeze tiers` to list them. \
                         Overrides default_tier from the config file."
        )]
        tier: Option<String>,

        #[arg(
            short = 'm',
            long,
            value_enum,
            default_value_t = OutputMode::Sibling,
            help = "Where the primary output goes",
            long_help = "sibling writes <name>-optimized.webp next to the source (or -mobile / \
                         -placeholder for those tiers); \
                         in-place writes <name>.webp in its place."
        )]
        mode: OutputMode,

        #[arg(
            long,
            value_enum,
            default_value_t = OriginalPolicy::Delete,
            help = "What happens to an original after a verified transcode"
        )]
        originals: OriginalPolicy,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Extra derivative tiers, comma separated (e.g. mobile,placeholder)"
        )]
        variants: Vec<String>,

        #[arg(
            long = "only",
            value_name = "GLOB",
            help = "Only process paths matching this glob",
            long_help = "Glob matched against paths relative to ROOT, e.g. 'rooms/**/*.jpg'."
        )]
        include: Option<String>,

        #[arg(long, help = "Do not descend into subdirectories")]
        no_recursive: bool,

        #[arg(short = 'n', long, help = "Print the plan without touching any file")]
        dry_run: bool,

        #[arg(short = 'c', long, help = "Config file (default: ROOT/asset-squeeze.toml)")]
        config: Option<PathBuf>,

        #[command(flatten)]
        run: RunFlags,
    },

    #[command(
        about = "Generate responsive width variants and print a srcset",
        long_about = "Encode <name>-<width>w.webp for each breakpoint not wider than the source. \
                      URLs on a known image CDN are rewritten with width/quality query \
                      parameters instead; nothing is downloaded."
    )]
    Responsive {
        #[arg(required = true, help = "Image files or CDN URLs")]
        sources: Vec<String>,

        #[arg(long, value_delimiter = ',', help = "Breakpoint widths, ascending")]
        breakpoints: Option<Vec<u32>>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Quality per breakpoint; the last value repeats"
        )]
        qualities: Option<Vec<u8>>,

        #[arg(long, help = "URL prefix for local srcset entries")]
        base_url: Option<String>,

        #[arg(long = "cdn-host", help = "Extra CDN host to rewrite (repeatable)")]
        cdn_hosts: Vec<String>,

        #[arg(short = 'c', long, help = "Config file (default: ./asset-squeeze.toml)")]
        config: Option<PathBuf>,

        #[command(flatten)]
        run: RunFlags,
    },

    #[command(
        about = "Build bordered multi-panel composites",
        long_about = "Cover-fit 2 or 3 source images into a halves, triptych or asymmetric \
                      layout with a mat and border. Without SOURCES every [[composites]] plan \
                      in the config file is built."
    )]
    Composite {
        #[arg(help = "Source images, one per panel")]
        sources: Vec<PathBuf>,

        #[arg(
            short = 'p',
            long,
            conflicts_with = "sources",
            help = "Config file whose [[composites]] plans to build"
        )]
        plan: Option<PathBuf>,

        #[arg(short = 'l', long, value_enum, help = "Panel layout (default: by source count)")]
        layout: Option<Layout>,

        #[arg(long, conflicts_with = "triptych", help = "Writes <LABEL>-composite.webp")]
        label: Option<String>,

        #[arg(long, help = "Writes hero-triptych-<N>.webp")]
        triptych: Option<usize>,

        #[arg(short = 'o', long, help = "Output directory (default: current directory)")]
        output_dir: Option<PathBuf>,

        #[arg(long, help = "Inner canvas width in pixels (default: 1920)")]
        width: Option<u32>,

        #[arg(long, help = "Inner canvas height in pixels (default: 1080)")]
        height: Option<u32>,

        #[arg(long, help = "Gap between panels in pixels (default: 16)")]
        gap: Option<u32>,

        #[arg(long, help = "Border width in pixels (default: 2)")]
        border: Option<u32>,

        #[arg(long, help = "Mat width in pixels (default: 12)")]
        mat: Option<u32>,

        #[arg(long, help = "Border color as #RRGGBB")]
        border_color: Option<String>,

        #[arg(long, help = "Mat and gap color as #RRGGBB")]
        mat_color: Option<String>,

        #[arg(short = 'Q', long, help = "WebP quality, at least 88 (default: 90)")]
        quality: Option<u8>,

        #[command(flatten)]
        run: RunFlags,
    },

    #[command(
        about = "Show how the pipeline sees one image",
        long_about = "Print the logical name, variant, header dimensions and size of an image, \
                      and what each compression tier would do with it."
    )]
    Info {
        #[arg(help = "Image file path to analyze")]
        file: PathBuf,

        #[arg(short = 'c', long, help = "Config file with tier overrides")]
        config: Option<PathBuf>,
    },

    #[command(about = "List the compression tiers")]
    Tiers {
        #[arg(short = 'c', long, help = "Config file with tier overrides")]
        config: Option<PathBuf>,
    },
}

/// Layout implied by the number of sources when none is given.
pub fn layout_for(count: usize) -> Layout {
    if count == 2 {
        Layout::Halves
    } else {
        Layout::Triptych
    }
}
