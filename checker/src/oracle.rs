//! Differential equivalence: build and run both variants, compare stdout.

use crate::stages::{self, Context, Stage, StageCause, StageFailure};
use std::path::PathBuf;
use tracing::debug;
use vyuha::layout::{IrArtifact, Variant};
use vyuha::outcome::EquivalenceResult;
use vyuha::pipeline::PipelineId;
use vyuha::test_case::Language;

/// Executables built for one comparison.
#[derive(Debug, Clone)]
pub struct Binaries {
    pub original: PathBuf,
    pub transformed: PathBuf,
}

pub fn build(ctx: &Context<'_>, language: Language, original: &IrArtifact, transformed: &IrArtifact) -> Result<Binaries, StageFailure> {
    Ok(Binaries {
        original: stages::compile_binary(ctx, language, original)?,
        transformed: stages::compile_binary(ctx, language, transformed)?,
    })
}

/// Runs both executables. A crash or non-zero exit on either side is a run
/// failure and no verdict is produced.
pub fn compare(ctx: &Context<'_>, test: &str, pipeline: PipelineId, bins: &Binaries) -> Result<EquivalenceResult, StageFailure> {
    let original = stages::run_program(ctx, test, Variant::Original, &bins.original)?;
    let transformed = stages::run_program(ctx, test, Variant::Transformed(pipeline), &bins.transformed)?;
    let result = EquivalenceResult::compare(test, pipeline, &original, &transformed);
    debug!(test, passed = result.passed, "compared outputs");
    Ok(result)
}

/// A negative verdict as a failure at the comparison step.
pub fn mismatch(result: &EquivalenceResult) -> Option<StageFailure> {
    if result.passed {
        return None;
    }
    let diagnostic = result.diagnostic.clone().unwrap_or_default();
    Some(StageFailure::new(Stage::Compare, StageCause::Mismatch { diagnostic }))
}
