use anyhow::{Context, Result};
use asset_squeeze::batch::{self, OptimizeOptions, RunSettings};
use asset_squeeze::cancel::{install_ctrl_c_handler, CancelToken};
use asset_squeeze::cli::{layout_for, Args, Commands, RunFlags};
use asset_squeeze::composite::{CompositeBuilder, CompositePlan};
use asset_squeeze::config::Config;
use asset_squeeze::info::{print_image_info, print_tiers};
use asset_squeeze::logger;
use asset_squeeze::report::ReportAggregator;
use asset_squeeze::responsive::{Breakpoints, ResponsiveSource, ResponsiveVariantGenerator};
use asset_squeeze::transcode::{OriginalPolicy, OutputMode, TranscodeOptions};
use clap::{CommandFactory, Parser};
use std::path::Path;
use std::process;

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    let command = match (args.command, args.root) {
        (Some(command), _) => command,
        (None, Some(root)) => Commands::Optimize {
            root,
            tier: None,
            mode: OutputMode::default(),
            originals: OriginalPolicy::default(),
            variants: Vec::new(),
            include: None,
            no_recursive: false,
            dry_run: false,
            config: None,
            run: RunFlags::default(),
        },
        (None, None) => {
            eprintln!("{}", Args::command().render_usage());
            eprintln!("\nFor more information, try '--help'.");
            process::exit(1);
        }
    };

    let cancel = CancelToken::new();
    let report = run(command, args.quiet, &cancel)?;

    if let Some(report) = report {
        if report.failed_count() > 0 || report.cancelled_count() > 0 || cancel.is_cancelled() {
            process::exit(1);
        }
    }
    Ok(())
}

fn settings(run: RunFlags, quiet: bool) -> RunSettings {
    RunSettings {
        jobs: run.jobs,
        show_progress: !quiet && !run.no_progress,
        report_json: run.report_json,
    }
}

/// Runs one command. Batch commands return their report for the exit status.
fn run(command: Commands, quiet: bool, cancel: &CancelToken) -> Result<Option<ReportAggregator>> {
    match command {
        Commands::Optimize {
            root,
            tier,
            mode,
            originals,
            variants,
            include,
            no_recursive,
            dry_run,
            config,
            run,
        } => {
            let config = Config::discover(&root, config.as_deref())?;
            let table = config.profile_table()?;
            let profile = match &tier {
                Some(tier) => table.get(tier)?,
                None => table.default_profile()?,
            }
            .clone();

            let derivatives = variants
                .iter()
                .map(|name| table.get(name).cloned())
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let transcode = TranscodeOptions::new(profile)
                .with_derivatives(derivatives)
                .with_mode(mode)
                .with_originals(originals);
            let mut options = OptimizeOptions::new(root, transcode);
            options.include = include;
            options.recursive = !no_recursive;
            options.dry_run = dry_run;
            options.settings = settings(run, quiet);

            install_ctrl_c_handler(cancel.clone());
            Ok(Some(batch::optimize(&options, cancel)?))
        }

        Commands::Responsive {
            sources,
            breakpoints,
            qualities,
            base_url,
            cdn_hosts,
            config,
            run,
        } => {
            let config = Config::discover(Path::new("."), config.as_deref())?;
            let configured = config.breakpoints()?;
            let breakpoints = match (breakpoints, qualities) {
                (None, None) => configured,
                (widths, qualities) => Breakpoints::new(
                    widths.unwrap_or_else(|| configured.widths().to_vec()),
                    qualities.unwrap_or_else(|| configured.iter().map(|(_, q)| q).collect()),
                )?,
            };

            let generator = ResponsiveVariantGenerator::new(breakpoints, cancel.clone())
                .with_cdn_hosts(config.responsive.cdn_hosts.iter().cloned().chain(cdn_hosts))
                .with_base_url(base_url.or(config.responsive.base_url));
            let sources: Vec<_> = sources.iter().map(|s| ResponsiveSource::parse(s)).collect();

            install_ctrl_c_handler(cancel.clone());
            Ok(Some(batch::responsive(
                &sources,
                &generator,
                Path::new("."),
                &settings(run, quiet),
            )?))
        }

        Commands::Composite {
            sources,
            plan,
            layout,
            label,
            triptych,
            output_dir,
            width,
            height,
            gap,
            border,
            mat,
            border_color,
            mat_color,
            quality,
            run,
        } => {
            let specs = if sources.is_empty() {
                let config = match &plan {
                    Some(path) => Config::load(path)?,
                    None => Config::discover(Path::new("."), None)?,
                };
                let base_dir = config.base_dir();
                config
                    .composites
                    .iter()
                    .map(|plan| plan.resolve(&base_dir))
                    .collect::<asset_squeeze::Result<Vec<_>>>()?
            } else {
                let plan = CompositePlan {
                    label,
                    triptych,
                    layout: layout.unwrap_or_else(|| layout_for(sources.len())),
                    sources,
                    output_dir,
                    width,
                    height,
                    gap,
                    border,
                    mat,
                    border_color,
                    mat_color,
                    quality,
                };
                vec![plan.resolve(Path::new("."))?]
            };

            install_ctrl_c_handler(cancel.clone());
            let builder = CompositeBuilder::new(cancel.clone());
            Ok(Some(batch::composite(
                specs,
                Path::new("."),
                &builder,
                &settings(run, quiet),
            )?))
        }

        Commands::Info { file, config } => {
            let config = Config::discover(Path::new("."), config.as_deref())?;
            print_image_info(&file, &config.profile_table()?)
                .with_context(|| format!("Failed to inspect {}", file.display()))?;
            Ok(None)
        }

        Commands::Tiers { config } => {
            let config = Config::discover(Path::new("."), config.as_deref())?;
            print_tiers(&config.profile_table()?);
            Ok(None)
        }
    }
}
