//! Runs work across a bounded rayon pool and funnels every result through a
//! single collector that owns the report and prints all console lines.

use crate::cancel::CancelToken;
use crate::composite::{CompositeBuilder, CompositeSpec};
use crate::constants::{BYTES_PER_DECODED_PIXEL, MIN_AVAILABLE_MEMORY_MIB, PROGRESS_TEMPLATE};
use crate::error::Result;
use crate::logger::is_quiet;
use crate::report::{Action, ProcessingResult, ReportAggregator};
use crate::resolver::VersionResolver;
use crate::responsive::{ResponsiveSource, ResponsiveVariantGenerator};
use crate::status;
use crate::transcode::{TranscodeOptions, Transcoder};
use crate::walker::{DirectoryWalker, Discovery};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

const MIB: u64 = 1024 * 1024;

/// Settings shared by every kind of run.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Worker count; the CPU count when unset.
    pub jobs: Option<usize>,
    pub show_progress: bool,
    pub report_json: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    pub root: PathBuf,
    pub transcode: TranscodeOptions,
    /// Glob matched against root-relative paths.
    pub include: Option<String>,
    pub recursive: bool,
    pub dry_run: bool,
    pub settings: RunSettings,
}

impl OptimizeOptions {
    pub fn new(root: impl Into<PathBuf>, transcode: TranscodeOptions) -> Self {
        Self {
            root: root.into(),
            transcode,
            include: None,
            recursive: true,
            dry_run: false,
            settings: RunSettings::default(),
        }
    }
}

/// Walk, resolve, then transcode/delete in parallel. Per-file failures are
/// recorded in the returned report; only setup errors are returned as `Err`.
pub fn optimize(options: &OptimizeOptions, cancel: &CancelToken) -> Result<ReportAggregator> {
    let start_time = Instant::now();
    options.transcode.validate()?;

    let mut walker = DirectoryWalker::new(&options.root)?.recursive(options.recursive);
    if let Some(pattern) = &options.include {
        walker = walker.with_include(pattern)?;
    }
    let discovery = walker.walk()?;

    let resolver = VersionResolver::new(options.transcode.mode, options.transcode.originals)
        .with_variant(options.transcode.profile.variant);
    let plan = resolver.resolve(&discovery);

    let mut report = ReportAggregator::new(&options.root);
    if plan.is_empty() {
        status!("⚠️  No image files found under {}", options.root.display());
        return Ok(report);
    }

    if options.dry_run {
        for planned in &plan {
            status!("{}", report.format_plan_line(planned));
        }
        let work = plan.iter().filter(|p| p.action != Action::Skipped).count();
        status!("\n🔍 Dry run: {} of {} files would change", work, plan.len());
        return Ok(report);
    }

    let (work, settled): (Vec<ProcessingResult>, Vec<ProcessingResult>) = plan
        .into_iter()
        .partition(|p| p.action != Action::Skipped);
    for result in settled {
        status!("{}", report.format_line(&result));
        report.record(result);
    }

    status!(
        "🚀 {} files to process with tier '{}' ({} candidates, {} existing outputs)",
        work.len(),
        options.transcode.profile.tier_name,
        discovery.candidates.len(),
        discovery.derived.len()
    );

    let threads = parallelism(
        options.settings.jobs,
        work.len(),
        estimated_bytes_per_item(&discovery),
    );
    tracing::debug!("Using {} worker threads", threads);

    let transcoder = Transcoder::new(options.transcode.clone(), cancel.clone());
    run_parallel(work, threads, &options.settings, &mut report, |planned| {
        transcoder.execute(planned)
    })?;

    finish(&report, &options.settings, start_time)?;
    Ok(report)
}

/// Builds each composite into its output directory.
pub fn composite(
    specs: Vec<(CompositeSpec, PathBuf)>,
    root: &Path,
    builder: &CompositeBuilder,
    settings: &RunSettings,
) -> Result<ReportAggregator> {
    let start_time = Instant::now();
    let mut report = ReportAggregator::new(root);
    if specs.is_empty() {
        status!("⚠️  No composites to build");
        return Ok(report);
    }

    let per_item = specs
        .iter()
        .map(|(spec, _)| {
            let (w, h) = spec.final_size();
            w as u64 * h as u64 * BYTES_PER_DECODED_PIXEL * spec.sources.len() as u64
        })
        .max()
        .unwrap_or(0);
    let threads = parallelism(settings.jobs, specs.len(), per_item);

    run_parallel(specs, threads, settings, &mut report, |(spec, dir)| {
        vec![builder.build(&spec, &dir)]
    })?;

    finish(&report, settings, start_time)?;
    Ok(report)
}

/// Generates variants for each source in turn and prints its srcset.
pub fn responsive(
    sources: &[ResponsiveSource],
    generator: &ResponsiveVariantGenerator,
    root: &Path,
    settings: &RunSettings,
) -> Result<ReportAggregator> {
    let start_time = Instant::now();
    let mut report = ReportAggregator::new(root);

    for source in sources {
        let label = match source {
            ResponsiveSource::Local(path) => path.display().to_string(),
            ResponsiveSource::Remote(url) => url.clone(),
        };
        match generator.generate(source) {
            Ok(output) => {
                for result in output.results {
                    status!("{}", report.format_line(&result));
                    report.record(result);
                }
                // The srcset is the product of this command, so it prints even when quiet.
                println!("{}: srcset=\"{}\"", label, output.srcset);
            }
            Err(e) => {
                tracing::error!("{}: {}", label, e);
                let result = ProcessingResult::failed(label.as_str(), 0, &e);
                status!("{}", report.format_line(&result));
                report.record(result);
            }
        }
    }

    finish(&report, settings, start_time)?;
    Ok(report)
}

fn run_parallel<T, F>(
    items: Vec<T>,
    threads: usize,
    settings: &RunSettings,
    report: &mut ReportAggregator,
    work: F,
) -> Result<()>
where
    T: Send,
    F: Fn(T) -> Vec<ProcessingResult> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let progress = progress_bar(items.len() as u64, settings.show_progress);
    let (tx, rx) = mpsc::channel::<Vec<ProcessingResult>>();

    thread::scope(|scope| {
        let work = &work;
        scope.spawn(move || {
            pool.install(|| {
                items.into_par_iter().for_each_with(tx, |tx, item| {
                    // The collector only goes away if the run is being torn down.
                    let _ = tx.send(work(item));
                });
            });
        });

        for results in rx {
            for result in results {
                progress.suspend(|| status!("{}", report.format_line(&result)));
                report.record(result);
            }
            progress.inc(1);
        }
    });

    progress.finish_and_clear();
    Ok(())
}

fn finish(report: &ReportAggregator, settings: &RunSettings, start_time: Instant) -> Result<()> {
    status!("{}", report.format_summary());
    status!("  ⏱️  Total time: {:.2?}", start_time.elapsed());
    if let Some(path) = &settings.report_json {
        report.write_json(path)?;
        status!("  📄 Report written to {}", path.display());
    }
    Ok(())
}

fn progress_bar(len: u64, show: bool) -> ProgressBar {
    if !show || is_quiet() {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress
}

/// Largest decoded footprint among the candidates, from header dimensions.
fn estimated_bytes_per_item(discovery: &Discovery) -> u64 {
    discovery
        .candidates
        .iter()
        .filter_map(|a| a.dimensions)
        .map(|(w, h)| w as u64 * h as u64 * BYTES_PER_DECODED_PIXEL)
        .max()
        .unwrap_or(0)
}

/// Worker count: `jobs` or the CPU count, never more than the items, and
/// capped so that every worker's decoded image fits in available memory.
pub fn parallelism(jobs: Option<usize>, items: usize, bytes_per_item: u64) -> usize {
    let baseline = jobs
        .unwrap_or_else(num_cpus::get)
        .max(1)
        .min(items.max(1));

    let mut sys =
        System::new_with_specifics(RefreshKind::new().with_memory(MemoryRefreshKind::new()));
    sys.refresh_memory();
    let available_mib = sys.available_memory() / MIB;

    memory_capped(baseline, bytes_per_item, available_mib)
}

fn memory_capped(baseline: usize, bytes_per_item: u64, available_mib: u64) -> usize {
    let per_item_mib = bytes_per_item.div_ceil(MIB).max(1);
    let budget_mib = available_mib.saturating_sub(MIN_AVAILABLE_MEMORY_MIB);
    let cap = (budget_mib / per_item_mib).clamp(1, baseline as u64) as usize;
    if cap < baseline {
        tracing::warn!(
            "Limiting to {} workers: ~{} MiB per image, {} MiB available",
            cap,
            per_item_mib,
            available_mib
        );
    }
    cap
}
