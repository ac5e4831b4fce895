//! The per-test stages. Each one is a single bounded child process whose
//! artifact lands at the path `Layout` assigns before the next stage starts.

use crate::process::{null_device, Captured, Invocation, ProcessError};
use crate::toolchain::Toolchain;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use vyuha::config::Config;
use vyuha::layout::{IrArtifact, Layout, Variant};
use vyuha::metrics::MetricsReport;
use vyuha::outcome::{FailureKind, FailureRecord};
use vyuha::pipeline::{PipelineId, PipelineSpec};
use vyuha::test_case::{Language, TestCase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CompileIr,
    Transform,
    Report,
    CompileBinary(Variant),
    Run(Variant),
    Compare,
}

impl Stage {
    pub fn kind(&self) -> FailureKind {
        match self {
            Stage::CompileIr | Stage::CompileBinary(_) => FailureKind::CompileFailure,
            Stage::Transform => FailureKind::TransformFailure,
            Stage::Report => FailureKind::ReportFailure,
            Stage::Run(_) => FailureKind::RunFailure,
            Stage::Compare => FailureKind::EquivalenceMismatch,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CompileIr => write!(f, "compile-ir"),
            Stage::Transform => write!(f, "transform"),
            Stage::Report => write!(f, "report"),
            Stage::CompileBinary(v) => write!(f, "compile-binary({})", v),
            Stage::Run(v) => write!(f, "run({})", v),
            Stage::Compare => write!(f, "compare"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StageCause {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("exited with {status}")]
    ExitStatus { status: String, diagnostic: String },
    #[error("expected output {} is missing or empty", .0.display())]
    MissingOutput(PathBuf),
    #[error("could not write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("outputs differ")]
    Mismatch { diagnostic: String },
}

#[derive(Debug, Error)]
#[error("{stage} failed: {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub cause: StageCause,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<StageCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    fn io(stage: Stage, path: &Path, source: io::Error) -> Self {
        Self::new(
            stage,
            StageCause::Io {
                path: path.to_path_buf(),
                source,
            },
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.stage.kind()
    }

    /// Captured tool output, when there is any.
    pub fn diagnostic(&self) -> Option<&str> {
        match &self.cause {
            StageCause::ExitStatus { diagnostic, .. } | StageCause::Mismatch { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }

    pub fn to_record(&self) -> FailureRecord {
        FailureRecord {
            stage: self.stage.to_string(),
            kind: self.kind(),
            message: self.to_string(),
            diagnostic: self.diagnostic().map(excerpt),
        }
    }
}

/// Longest diagnostic tail kept in a failure record, in lines.
pub const DIAGNOSTIC_LINES: usize = 40;

fn excerpt(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_LINES);
    lines[start..].join("\n")
}

/// Everything a stage needs; built once per run.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub config: &'a Config,
    pub layout: &'a Layout,
    pub tools: &'a Toolchain,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a Config, layout: &'a Layout, tools: &'a Toolchain) -> Self {
        Self { config, layout, tools }
    }

    fn invoke(&self, program: &Path) -> Invocation {
        self.tools.env.apply(Invocation::new(program))
    }

    fn compiler(&self, language: Language) -> &'a Path {
        let tools: &'a Toolchain = self.tools;
        match (language, &tools.clangxx) {
            (Language::Cxx, Some(clangxx)) => clangxx.as_path(),
            _ => tools.clang.as_path(),
        }
    }

    fn plugin_arg(&self) -> String {
        format!("-load-pass-plugin={}", self.tools.plugin.display())
    }
}

fn execute(stage: Stage, invocation: &Invocation, budget: Option<Duration>) -> Result<Captured, StageFailure> {
    let out = invocation.run(budget).map_err(|e| StageFailure::new(stage, e))?;
    if !out.success() {
        return Err(StageFailure::new(
            stage,
            StageCause::ExitStatus {
                status: out.status.to_string(),
                diagnostic: out.diagnostic(),
            },
        ));
    }
    Ok(out)
}

fn require_file(stage: Stage, path: &Path) -> Result<(), StageFailure> {
    match fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
        _ => Err(StageFailure::new(stage, StageCause::MissingOutput(path.to_path_buf()))),
    }
}

fn append_log(path: &Path, header: &str, bytes: &[u8]) -> io::Result<()> {
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(log, "== {}", header)?;
    log.write_all(bytes)?;
    if !bytes.ends_with(b"\n") && !bytes.is_empty() {
        writeln!(log)?;
    }
    Ok(())
}

/// Removes whatever an earlier run left for this test under `pipeline`, so a
/// failing run never leaves the previous run's results looking current.
pub fn discard_previous(layout: &Layout, test: &str, pipeline: PipelineId) -> io::Result<()> {
    let transformed = Variant::Transformed(pipeline);
    let files = [
        layout.ll_file(test, transformed),
        layout.report(test, pipeline),
        layout.binary(test, transformed),
        layout.output(test, transformed),
    ];
    for file in &files {
        remove_if_present(fs::remove_file(file))?;
    }
    for dir in [layout.dot_dir(transformed, test), layout.image_dir(transformed, test)] {
        remove_if_present(fs::remove_dir_all(&dir))?;
    }
    Ok(())
}

fn remove_if_present(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Source to unoptimized textual IR.
pub fn compile_to_ir(ctx: &Context<'_>, case: &TestCase) -> Result<IrArtifact, StageFailure> {
    let stage = Stage::CompileIr;
    let ir = ctx.layout.ir_artifact(&case.name, Variant::Original);
    let invocation = ctx
        .invoke(ctx.compiler(case.language))
        .args(["-O0", "-emit-llvm", "-S"])
        .arg(&case.source)
        .arg("-o")
        .arg(&ir.path);
    execute(stage, &invocation, ctx.config.timeouts.compile())?;
    require_file(stage, &ir.path)?;
    Ok(ir)
}

/// Runs the pipeline over `input`; stdout becomes the transformed IR and
/// stderr goes to the diagnostic log whatever the outcome.
pub fn transform(ctx: &Context<'_>, input: &IrArtifact, spec: &PipelineSpec) -> Result<IrArtifact, StageFailure> {
    let stage = Stage::Transform;
    let output = ctx.layout.ir_artifact(&input.test_name, Variant::Transformed(spec.id));
    let log = ctx.layout.log(&input.test_name, spec.id);
    let _ = fs::remove_file(&log);
    let invocation = ctx
        .invoke(&ctx.tools.opt)
        .arg(ctx.plugin_arg())
        .arg(format!("-passes={}", spec.pass_list()))
        .arg(&input.path)
        .arg("-S");
    let out = invocation
        .run(ctx.config.timeouts.transform())
        .map_err(|e| StageFailure::new(stage, e))?;
    append_log(&log, &invocation.to_string(), &out.stderr).map_err(|e| StageFailure::io(stage, &log, e))?;
    if !out.success() {
        return Err(StageFailure::new(
            stage,
            StageCause::ExitStatus {
                status: out.status.to_string(),
                diagnostic: out.diagnostic(),
            },
        ));
    }
    fs::write(&output.path, &out.stdout).map_err(|e| StageFailure::io(stage, &output.path, e))?;
    require_file(stage, &output.path)?;
    Ok(output)
}

/// Re-runs the pipeline with the reporting pass appended and keeps the
/// statistics document. A document that does not parse yields an empty report.
pub fn collect_metrics(ctx: &Context<'_>, input: &IrArtifact, spec: &PipelineSpec) -> Result<MetricsReport, StageFailure> {
    let stage = Stage::Report;
    let doc_path = ctx.layout.report(&input.test_name, spec.id);
    let log = ctx.layout.log(&input.test_name, spec.id);
    let invocation = ctx
        .invoke(&ctx.tools.opt)
        .arg(ctx.plugin_arg())
        .arg(format!("-passes={}", spec.reporting_pass_list()))
        .arg(&input.path)
        .args(["-S", "-o", null_device()]);
    let out = invocation
        .run(ctx.config.timeouts.transform())
        .map_err(|e| StageFailure::new(stage, e))?;
    if let Err(e) = append_log(&log, &invocation.to_string(), &out.stderr) {
        warn!(path = %log.display(), error = %e, "could not append to diagnostic log");
    }
    if !out.success() {
        return Err(StageFailure::new(
            stage,
            StageCause::ExitStatus {
                status: out.status.to_string(),
                diagnostic: out.diagnostic(),
            },
        ));
    }
    fs::write(&doc_path, &out.stdout).map_err(|e| StageFailure::io(stage, &doc_path, e))?;
    let text = String::from_utf8_lossy(&out.stdout);
    match MetricsReport::parse(&input.test_name, spec.id, &text) {
        Ok(report) => Ok(report),
        Err(e) => {
            warn!(test = %input.test_name, error = %e, "statistics document did not parse");
            Ok(MetricsReport::empty(&input.test_name, spec.id))
        }
    }
}

/// IR to an executable for one variant.
pub fn compile_binary(ctx: &Context<'_>, language: Language, ir: &IrArtifact) -> Result<PathBuf, StageFailure> {
    let stage = Stage::CompileBinary(ir.variant);
    let binary = ctx.layout.binary(&ir.test_name, ir.variant);
    debug!(ir = %ir.path.display(), binary = %binary.display(), "linking");
    let invocation = ctx.invoke(ctx.compiler(language)).arg(&ir.path).arg("-o").arg(&binary);
    execute(stage, &invocation, ctx.config.timeouts.compile())?;
    require_file(stage, &binary)?;
    Ok(binary)
}

/// Runs an executable and keeps its stdout at the variant's output path.
pub fn run_program(ctx: &Context<'_>, test: &str, variant: Variant, binary: &Path) -> Result<Vec<u8>, StageFailure> {
    let stage = Stage::Run(variant);
    let invocation = ctx.invoke(binary);
    let out = execute(stage, &invocation, ctx.config.timeouts.run())?;
    let path = ctx.layout.output(test, variant);
    fs::write(&path, &out.stdout).map_err(|e| StageFailure::io(stage, &path, e))?;
    Ok(out.stdout)
}
