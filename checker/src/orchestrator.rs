use crate::oracle;
use crate::stages::{self, Context, StageFailure};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use vyuha::layout::Variant;
use vyuha::metrics::SizeFigures;
use vyuha::outcome::{SuiteSummary, TestOutcome};
use vyuha::pipeline::PipelineSpec;
use vyuha::test_case::TestCase;

pub const STAGE_COUNT: usize = 5;

fn progress(test: &str, step: usize, what: &str) {
    info!(test, "[{}/{}] {}", step, STAGE_COUNT, what);
}

/// Runs the full stage sequence for one test case. A failing stage ends this
/// case only; the reason is recorded on the outcome.
pub fn run_case(ctx: &Context<'_>, case: &TestCase, spec: &PipelineSpec) -> TestOutcome {
    let mut outcome = TestOutcome {
        test_name: case.name.clone(),
        pipeline: spec.id,
        equivalence: None,
        metrics: None,
        failure: None,
    };
    match run_stages(ctx, case, spec, &mut outcome) {
        Ok(()) => info!(test = %case.name, pipeline = %spec.id, "passed"),
        Err(failure) => {
            error!(test = %case.name, stage = %failure.stage, "{}", failure);
            if let Some(diagnostic) = failure.diagnostic() {
                debug!(test = %case.name, "diagnostic:\n{}", diagnostic);
            }
            outcome.failure = Some(failure.to_record());
        }
    }
    outcome
}

fn run_stages(ctx: &Context<'_>, case: &TestCase, spec: &PipelineSpec, outcome: &mut TestOutcome) -> Result<(), StageFailure> {
    let test = case.name.as_str();
    if let Err(e) = stages::discard_previous(ctx.layout, test, spec.id) {
        warn!(test, error = %e, "could not clear results of an earlier run");
    }
    progress(test, 1, "compiling to IR");
    let original = stages::compile_to_ir(ctx, case)?;

    progress(test, 2, &format!("applying passes ({})", spec.pass_list()));
    let transformed = stages::transform(ctx, &original, spec)?;

    progress(test, 3, "collecting metrics");
    let mut metrics = stages::collect_metrics(ctx, &original, spec)?;

    progress(test, 4, "compiling executables");
    let bins = oracle::build(ctx, case.language, &original, &transformed)?;
    metrics.binary_size = SizeFigures::of_files(&bins.original, &bins.transformed);
    outcome.metrics = Some(metrics);

    progress(test, 5, "comparing outputs");
    let result = oracle::compare(ctx, test, spec.id, &bins)?;
    let mismatch = oracle::mismatch(&result);
    outcome.equivalence = Some(result);
    match mismatch {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Runs every case in order; one case's failure never stops the next.
pub fn run_suite(ctx: &Context<'_>, cases: &[TestCase], spec: &PipelineSpec) -> SuiteSummary {
    let mut summary = SuiteSummary::new(spec.id);
    for (i, case) in cases.iter().enumerate() {
        info!("test {}/{}: {}", i + 1, cases.len(), case.name);
        summary.record(run_case(ctx, case, spec));
    }
    summary
}

/// Writes `summary_<pipeline>.json` under the results root.
pub fn write_summary(ctx: &Context<'_>, summary: &SuiteSummary) -> io::Result<PathBuf> {
    let path = ctx.layout.summary(summary.pipeline);
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// The operator-facing table.
pub fn print_summary(summary: &SuiteSummary) {
    println!();
    println!("{:<40} {:<8} {}", "test", "result", "detail");
    for o in &summary.outcomes {
        let (result, detail) = match (&o.failure, o.passed()) {
            (_, true) => ("PASS", String::new()),
            (Some(f), false) => ("FAIL", f.message.clone()),
            (None, false) => ("FAIL", "no verdict".to_string()),
        };
        println!("{:<40} {:<8} {}", o.test_name, result, detail);
    }
    println!();
    println!("pipeline {}: {} passed, {} failed", summary.pipeline, summary.passed, summary.failed);
    for o in summary.failures() {
        if let Some(diagnostic) = o.failure.as_ref().and_then(|f| f.diagnostic.as_deref()) {
            println!("\n--- {} ({}) ---", o.test_name, Variant::Transformed(o.pipeline));
            println!("{}", diagnostic);
        }
    }
}
