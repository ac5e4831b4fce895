use anyhow::{bail, Context as _};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, info, warn};
use vyuha::config::Config;
use vyuha::layout::Layout;
use vyuha::test_case::discover;
use vyuhac::aggregate::{aggregate, write_document};
use vyuhac::logging;
use vyuhac::render::{plan, render_all};
use vyuhac::toolchain::{open_in_viewer, ReportTools};
use vyuhac::visualize::{extract_all, list_ir};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ArgEnum)]
enum Action {
    Visualize,
    View,
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Renders per-function CFGs and builds the comparison report", long_about = None)]
struct Args {
    /// `view` also opens the report when done
    #[clap(arg_enum, default_value = "visualize")]
    action: Action,

    /// Path to a JSON configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent renderer processes
    #[clap(short, long)]
    jobs: Option<usize>,

    /// Log every command line
    #[clap(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    let tools = ReportTools::for_report(&config)?;
    let layout = Layout::new(config.results_dir());

    let discovered: BTreeSet<String> = match discover(&config.tests_dir()) {
        Ok(cases) => cases.into_iter().map(|c| c.name).collect(),
        Err(e) => {
            debug!("test sources unavailable: {}", e);
            BTreeSet::new()
        }
    };
    let irs = list_ir(&layout, &discovered)
        .with_context(|| format!("reading {}; run vyuha-test first", layout.ll_dir().display()))?;
    if irs.is_empty() {
        bail!("no IR files in {}; run vyuha-test first", layout.ll_dir().display());
    }

    let extractions = extract_all(&tools, &layout, &irs, config.timeouts.transform());
    let tasks = plan(&layout, extractions.iter().flat_map(|e| e.graphs.iter()), &config.render_skip);
    render_all(&tools, &tasks, args.jobs.or(config.render_jobs), config.timeouts.render())?;

    let tests: BTreeSet<String> = irs.into_iter().map(|ir| ir.test_name).collect();
    let report = aggregate(&layout, &tests);
    let path = write_document(&layout, &report).context("writing report document")?;

    println!();
    println!("{:<40} {:<10} {}", "test", "variant", "functions");
    for (name, t) in &report.per_test {
        let variant = t.comparisons.values().next().map_or_else(
            || t.metrics.as_ref().map_or("-".to_string(), |m| m.variant.to_string()),
            |e| e.variant.to_string(),
        );
        println!("{:<40} {:<10} {}", name, variant, t.comparisons.len());
    }
    println!();
    println!("Report: {}", path.display());
    info!(comparisons = report.comparison_count(), "done");

    if args.action == Action::View {
        if let Err(e) = open_in_viewer(tools.platform, &path) {
            warn!("{}", e);
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        process::exit(1);
    }
}
