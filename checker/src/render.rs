//! Parallel graph rendering. Each task is its own `dot` process writing to a
//! path derived from its input alone, so tasks share nothing.

use crate::process::{Invocation, ProcessError};
use crate::toolchain::ReportTools;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use vyuha::layout::Layout;
use vyuha::naming::GraphArtifact;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("renderer failed on {}: {diagnostic}", .dot.display())]
    Exit { dot: PathBuf, diagnostic: String },
    #[error("renderer produced no image for {}", .dot.display())]
    MissingImage { dot: PathBuf },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTask {
    pub dot: PathBuf,
    pub image: PathBuf,
}

/// Tasks for every graph not excluded by `skip`.
pub fn plan<'a>(layout: &Layout, graphs: impl IntoIterator<Item = &'a GraphArtifact>, skip: &[String]) -> Vec<RenderTask> {
    let mut tasks = Vec::new();
    for graph in graphs {
        if skip.iter().any(|pat| graph.raw_label.contains(pat.as_str())) {
            debug!(label = %graph.raw_label, "not rendered");
            continue;
        }
        match layout.image_for_dot(&graph.path) {
            Some(image) => tasks.push(RenderTask {
                dot: graph.path.clone(),
                image,
            }),
            None => warn!(path = %graph.path.display(), "graph outside the results tree"),
        }
    }
    tasks
}

pub fn render_one(tools: &ReportTools, task: &RenderTask, budget: Option<Duration>) -> Result<PathBuf, RenderError> {
    let result = run_renderer(tools, task, budget);
    if result.is_err() {
        // Never leave a partial image that the aggregator would pick up.
        let _ = fs::remove_file(&task.image);
    }
    result
}

fn run_renderer(tools: &ReportTools, task: &RenderTask, budget: Option<Duration>) -> Result<PathBuf, RenderError> {
    if let Some(parent) = task.image.parent() {
        fs::create_dir_all(parent).map_err(|source| RenderError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let out = tools
        .env
        .apply(Invocation::new(&tools.dot))
        .arg("-Tpng")
        .arg(&task.dot)
        .arg("-o")
        .arg(&task.image)
        .run(budget)?;
    if !out.success() {
        return Err(RenderError::Exit {
            dot: task.dot.clone(),
            diagnostic: out.diagnostic(),
        });
    }
    if !task.image.is_file() {
        return Err(RenderError::MissingImage { dot: task.dot.clone() });
    }
    Ok(task.image.clone())
}

pub fn worker_count(jobs: Option<usize>) -> usize {
    jobs.unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
        .max(1)
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:50.cyan/blue} {pos:>5}/{len} {msg}") {
        bar.set_style(style.progress_chars("##-"));
    }
    bar
}

/// Renders every task on a fixed-size pool and waits for all of them.
/// Failures are returned per task and never stop the batch.
pub fn render_all(
    tools: &ReportTools,
    tasks: &[RenderTask],
    jobs: Option<usize>,
    budget: Option<Duration>,
) -> Result<Vec<(RenderTask, Result<PathBuf, RenderError>)>, rayon::ThreadPoolBuildError> {
    let workers = worker_count(jobs);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    info!(tasks = tasks.len(), workers, "rendering graphs");
    let bar = progress_bar(tasks.len());
    let results: Vec<_> = pool.install(|| {
        tasks
            .par_iter()
            .map(|task| {
                let result = render_one(tools, task, budget);
                if let Err(e) = &result {
                    bar.suspend(|| warn!("{}", e));
                }
                bar.inc(1);
                (task.clone(), result)
            })
            .collect()
    });
    bar.finish_and_clear();
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(rendered = results.len() - failed, failed, "rendering finished");
    Ok(results)
}
