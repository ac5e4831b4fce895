//! Per-function graph extraction from every IR file in the results tree.

use crate::process::{null_device, Invocation, ProcessError};
use crate::toolchain::ReportTools;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use vyuha::layout::{IrArtifact, Layout};
use vyuha::naming::{canonical_key, raw_label_from_file_name, CorrelationTable, GraphArtifact, IrStem};
use vyuha::pipeline::PipelineId;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("graph extraction for {} failed: {diagnostic}", .ir.display())]
    Exit { ir: PathBuf, diagnostic: String },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ExtractError + '_ {
    move |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The graphs of one IR file, one per function.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub ir: IrArtifact,
    pub graphs: Vec<GraphArtifact>,
}

/// Stems that are test names even though they look like `<base>_<pipeline>`.
///
/// A stem is an original when a test source exists for it, or when another
/// IR file extends it with a pipeline suffix.
pub fn known_tests(stems: &[String], discovered: &BTreeSet<String>) -> BTreeSet<String> {
    let present: BTreeSet<&str> = stems.iter().map(String::as_str).collect();
    let mut known = discovered.clone();
    for stem in stems {
        let extended = PipelineId::all()
            .iter()
            .any(|p| present.contains(format!("{}_{}", stem, p).as_str()));
        if extended {
            known.insert(stem.clone());
        }
    }
    known
}

/// Every `.ll` file under the IR directory, sorted, with its identity.
pub fn list_ir(layout: &Layout, discovered: &BTreeSet<String>) -> io::Result<Vec<IrArtifact>> {
    let dir = layout.ll_dir();
    let mut paths = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == "ll") {
            paths.push(path);
        }
    }
    paths.sort();
    let stems: Vec<String> = paths
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect();
    let known = known_tests(&stems, discovered);
    Ok(paths
        .into_iter()
        .zip(stems)
        .map(|(path, stem)| {
            let id = IrStem::resolve(&stem, &known);
            IrArtifact {
                test_name: id.test_name,
                variant: id.variant,
                path,
            }
        })
        .collect())
}

fn reset_dir(dir: &Path) -> Result<(), ExtractError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(io_err(dir))?;
    }
    fs::create_dir_all(dir).map_err(io_err(dir))
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Runs the extractor in a fresh scratch directory and files each graph
/// under its canonical key. The side's previous graphs and images for this
/// test are removed first, so reruns leave the same set of files.
pub fn extract(tools: &ReportTools, layout: &Layout, ir: &IrArtifact, budget: Option<Duration>) -> Result<Extraction, ExtractError> {
    let stem = ir
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| ir.test_name.clone());
    let scratch = layout.scratch_dir(&stem);
    reset_dir(&scratch)?;
    let input = fs::canonicalize(&ir.path).map_err(io_err(&ir.path))?;

    let invocation = tools
        .env
        .apply(Invocation::new(&tools.opt))
        .arg("-passes=dot-cfg")
        .arg(&input)
        .args(["-o", null_device()])
        .cwd(&scratch);
    let out = invocation.run(budget)?;
    if !out.success() {
        return Err(ExtractError::Exit {
            ir: ir.path.clone(),
            diagnostic: out.diagnostic(),
        });
    }

    let dot_dir = layout.dot_dir(ir.variant, &ir.test_name);
    reset_dir(&dot_dir)?;
    reset_dir(&layout.image_dir(ir.variant, &ir.test_name))?;

    let mut names = Vec::new();
    for entry in fs::read_dir(&scratch).map_err(io_err(&scratch))? {
        let entry = entry.map_err(io_err(&scratch))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    let mut table = CorrelationTable::new();
    for name in names.into_iter().sorted() {
        let raw = match raw_label_from_file_name(&name) {
            Some(raw) => raw,
            None => continue,
        };
        let key = canonical_key(&raw);
        let dest = layout.dot_file(ir.variant, &ir.test_name, &key);
        let src = scratch.join(&name);
        move_file(&src, &dest).map_err(io_err(&src))?;
        table.insert(GraphArtifact {
            test_name: ir.test_name.clone(),
            side: ir.variant,
            raw_label: raw,
            canonical_key: key,
            path: dest,
        });
    }
    if let Err(e) = fs::remove_dir_all(&scratch) {
        debug!(path = %scratch.display(), error = %e, "scratch directory left behind");
    }
    debug!(test = %ir.test_name, side = %ir.variant, graphs = table.len(), "extracted graphs");
    Ok(Extraction {
        ir: ir.clone(),
        graphs: table.into_artifacts().collect(),
    })
}

/// Extracts every IR file. A failing file is logged and skipped.
pub fn extract_all(tools: &ReportTools, layout: &Layout, irs: &[IrArtifact], budget: Option<Duration>) -> Vec<Extraction> {
    let mut done = Vec::new();
    for ir in irs {
        match extract(tools, layout, ir, budget) {
            Ok(extraction) => done.push(extraction),
            Err(e) => warn!(ir = %ir.path.display(), "skipping: {}", e),
        }
    }
    info!(
        files = irs.len(),
        graphs = done.iter().map(|e| e.graphs.len()).sum::<usize>(),
        "graph extraction finished"
    );
    done
}

#[cfg(test)]
mod tests {
    use super::*;
    use vyuha::layout::Variant;

    #[test]
    fn stems_extended_by_a_pipeline_are_tests() {
        let stems: Vec<String> = ["test_fake", "test_fake_full", "test_a", "test_a_cff"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let known = known_tests(&stems, &BTreeSet::new());
        assert!(known.contains("test_fake"));
        assert!(known.contains("test_a"));
        assert!(!known.contains("test_fake_full"));
    }

    #[test]
    fn ir_files_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        fs::create_dir_all(layout.ll_dir()).unwrap();
        for name in ["test_fake.ll", "test_fake_cff.ll", "test_b.ll", "notes.txt"] {
            fs::write(layout.ll_dir().join(name), b"x").unwrap();
        }
        let irs = list_ir(&layout, &BTreeSet::new()).unwrap();
        let ids: Vec<(&str, Variant)> = irs.iter().map(|i| (i.test_name.as_str(), i.variant)).collect();
        assert_eq!(
            ids,
            vec![
                ("test_b", Variant::Original),
                ("test_fake", Variant::Original),
                ("test_fake", Variant::Transformed(PipelineId::Cff)),
            ]
        );
    }
}
