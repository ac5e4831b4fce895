//! Joins metrics, sizes and rendered images into the report model.
//! Anything missing is defaulted; nothing here fails the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vyuha::layout::{Layout, Variant};
use vyuha::metrics::{MetricsReport, SizeFigures};
use vyuha::naming::display_label;
use vyuha::pipeline::{PipelineId, REPORT_PRIORITY};
use vyuha::report::{render_document, AggregatedReport, CfgShape, ComparisonEntry, TestReport};

/// The first statistics document in priority order, with measured sizes.
pub fn select_metrics(layout: &Layout, test: &str) -> Option<MetricsReport> {
    let (pipeline, path) = REPORT_PRIORITY
        .iter()
        .map(|p| (*p, layout.report(test, *p)))
        .find(|(_, path)| path.is_file())?;
    let mut report = match fs::read_to_string(&path) {
        Ok(text) => MetricsReport::parse(test, pipeline, &text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "statistics document did not parse");
            MetricsReport::empty(test, pipeline)
        }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "statistics document unreadable");
            MetricsReport::empty(test, pipeline)
        }
    };
    let transformed = Variant::Transformed(pipeline);
    report.binary_size = SizeFigures::of_files(
        &layout.binary(test, Variant::Original),
        &layout.binary(test, transformed),
    );
    report.ir_size = report.ir_size.or(SizeFigures::of_files(
        &layout.ll_file(test, Variant::Original),
        &layout.ll_file(test, transformed),
    ));
    Some(report)
}

fn image_keys(dir: &Path) -> BTreeSet<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return BTreeSet::new(),
    };
    entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "png"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect()
}

/// The side compared against the original: the metrics' pipeline when known,
/// otherwise the first pipeline in priority order with any image.
pub fn comparison_variant(layout: &Layout, test: &str, metrics: Option<&MetricsReport>) -> Option<PipelineId> {
    if let Some(m) = metrics {
        return Some(m.variant);
    }
    REPORT_PRIORITY
        .iter()
        .copied()
        .find(|p| !image_keys(&layout.image_dir(Variant::Transformed(*p), test)).is_empty())
}

pub fn cfg_shape(dot: &Path) -> Option<CfgShape> {
    let text = fs::read_to_string(dot).ok()?;
    match graph::dot::parse(&text) {
        Ok(cfg) => Some(CfgShape {
            blocks: cfg.block_count(),
            edges: cfg.edge_count(),
            cyclomatic: cfg.cyclomatic_complexity(),
            unreachable: cfg.unreachable_blocks(),
        }),
        Err(e) => {
            debug!(path = %dot.display(), error = %e, "graph did not parse");
            None
        }
    }
}

/// One entry per key with an image on both sides.
pub fn comparisons(layout: &Layout, test: &str, pipeline: PipelineId) -> BTreeMap<String, ComparisonEntry> {
    let transformed = Variant::Transformed(pipeline);
    let before = image_keys(&layout.image_dir(Variant::Original, test));
    let after = image_keys(&layout.image_dir(transformed, test));
    before
        .intersection(&after)
        .map(|key| {
            let entry = ComparisonEntry {
                test_name: test.to_string(),
                canonical_key: key.clone(),
                display_label: display_label(key),
                variant: transformed,
                original_image: layout.image_href(Variant::Original, test, key),
                transformed_image: layout.image_href(transformed, test, key),
                original_shape: cfg_shape(&layout.dot_file(Variant::Original, test, key)),
                transformed_shape: cfg_shape(&layout.dot_file(transformed, test, key)),
            };
            (key.clone(), entry)
        })
        .collect()
}

pub fn aggregate(layout: &Layout, tests: &BTreeSet<String>) -> AggregatedReport {
    let mut report = AggregatedReport::default();
    for test in tests {
        let metrics = select_metrics(layout, test);
        let comparisons = comparison_variant(layout, test, metrics.as_ref())
            .map(|p| comparisons(layout, test, p))
            .unwrap_or_default();
        report.per_test.insert(test.clone(), TestReport { metrics, comparisons });
    }
    info!(tests = report.per_test.len(), comparisons = report.comparison_count(), "report aggregated");
    report
}

/// Writes the document and returns its path.
pub fn write_document(layout: &Layout, report: &AggregatedReport) -> io::Result<PathBuf> {
    fs::create_dir_all(layout.comparison_dir())?;
    let path = layout.report_document();
    fs::write(&path, render_document(report)?)?;
    Ok(path)
}
