use crate::format::{format_bytes, NOT_AVAILABLE};
use crate::layout::Variant;
use crate::metrics::{Counters, MetricsReport, SizeFigures};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Block/edge figures of one function's control-flow graph.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CfgShape {
    pub blocks: usize,
    pub edges: usize,
    pub cyclomatic: usize,
    pub unreachable: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonEntry {
    pub test_name: String,
    pub canonical_key: String,
    pub display_label: String,
    pub variant: Variant,
    pub original_image: String,
    pub transformed_image: String,
    pub original_shape: Option<CfgShape>,
    pub transformed_shape: Option<CfgShape>,
}

/// Before/after figures as the report shows them.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SizeView {
    pub before: String,
    pub after: String,
    pub change: String,
}

impl SizeView {
    pub fn bytes(figures: &SizeFigures) -> Self {
        Self {
            before: format_bytes(figures.before),
            after: format_bytes(figures.after),
            change: figures.change(),
        }
    }
}

impl Default for SizeView {
    fn default() -> Self {
        Self {
            before: NOT_AVAILABLE.to_string(),
            after: NOT_AVAILABLE.to_string(),
            change: NOT_AVAILABLE.to_string(),
        }
    }
}

/// The metrics panel for one test, with every gap already defaulted.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    pub variant: Option<String>,
    pub passes_run: Vec<String>,
    pub counters: BTreeMap<String, Counters>,
    pub cycles_completed: Option<u64>,
    pub input_parameters: BTreeMap<String, Value>,
    pub ir_size: SizeView,
    pub string_data_size: SizeView,
    pub binary_size: SizeView,
}

impl MetricsView {
    pub fn from_report(report: Option<&MetricsReport>) -> Self {
        match report {
            Some(r) => Self {
                variant: Some(r.variant.to_string()),
                passes_run: r.passes_run.clone(),
                counters: r.per_pass_counters.clone(),
                cycles_completed: r.cycles_completed,
                input_parameters: r.input_parameters.clone(),
                ir_size: SizeView::bytes(&r.ir_size),
                string_data_size: SizeView::bytes(&r.string_data_size),
                binary_size: SizeView::bytes(&r.binary_size),
            },
            None => Self {
                variant: None,
                passes_run: Vec::new(),
                counters: BTreeMap::new(),
                cycles_completed: None,
                input_parameters: BTreeMap::new(),
                ir_size: SizeView::default(),
                string_data_size: SizeView::default(),
                binary_size: SizeView::default(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TestReport {
    pub metrics: Option<MetricsReport>,
    pub comparisons: BTreeMap<String, ComparisonEntry>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    pub per_test: BTreeMap<String, TestReport>,
}

impl AggregatedReport {
    pub fn comparison_count(&self) -> usize {
        self.per_test.values().map(|t| t.comparisons.len()).sum()
    }

    /// `test -> key -> entry`, the table behind the function selector.
    pub fn comparison_table(&self) -> BTreeMap<&str, &BTreeMap<String, ComparisonEntry>> {
        self.per_test.iter().map(|(name, t)| (name.as_str(), &t.comparisons)).collect()
    }

    /// `test -> metrics panel`.
    pub fn metrics_table(&self) -> BTreeMap<&str, MetricsView> {
        self.per_test
            .iter()
            .map(|(name, t)| (name.as_str(), MetricsView::from_report(t.metrics.as_ref())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineId;

    #[test]
    fn absent_metrics_render_as_sentinels() {
        let view = MetricsView::from_report(None);
        assert_eq!(view.binary_size.change, "N/A");
        assert_eq!(view.ir_size.before, "N/A");
        assert!(view.passes_run.is_empty());
    }

    #[test]
    fn binary_sizes_are_formatted() {
        let mut report = MetricsReport::empty("test_a", PipelineId::Full);
        report.binary_size = SizeFigures::new(Some(1000), Some(1100));
        let view = MetricsView::from_report(Some(&report));
        assert_eq!(view.binary_size.before, "1000 B");
        assert_eq!(view.binary_size.after, "1.07 KB");
        assert_eq!(view.binary_size.change, "+10.00%");
        assert_eq!(view.variant.as_deref(), Some("full"));
    }
}
