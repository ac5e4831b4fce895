use anyhow::{bail, Context as _};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use vyuha::config::Config;
use vyuha::layout::Layout;
use vyuha::pipeline::PipelineId;
use vyuha::test_case::{discover, Language};
use vyuhac::logging;
use vyuhac::orchestrator::{print_summary, run_suite, write_summary};
use vyuhac::stages::Context;
use vyuhac::toolchain::Toolchain;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Checks that obfuscated test programs behave like the originals", long_about = None)]
struct Args {
    /// Pass pipeline to validate
    #[clap(arg_enum, default_value = "full")]
    pipeline: PipelineId,

    /// Path to a JSON configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Log every command line
    #[clap(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;
    let cases = discover(&config.tests_dir())?;
    if cases.is_empty() {
        bail!("no test_*.c or test_*.cpp sources in {}", config.tests_dir().display());
    }
    let needs_cxx = cases.iter().any(|c| c.language == Language::Cxx);
    let tools = Toolchain::for_suite(&config, needs_cxx)?;
    let layout = Layout::new(config.results_dir());
    layout
        .create_dirs()
        .with_context(|| format!("creating {}", layout.root().display()))?;

    let spec = args.pipeline.spec();
    info!(pipeline = %spec.id, passes = %spec.pass_list(), cases = cases.len(), "starting suite");
    let ctx = Context::new(&config, &layout, &tools);
    let summary = run_suite(&ctx, &cases, &spec);
    print_summary(&summary);
    let path = write_summary(&ctx, &summary).context("writing suite summary")?;
    info!(path = %path.display(), "summary written");
    Ok(summary.all_passed())
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);
    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
