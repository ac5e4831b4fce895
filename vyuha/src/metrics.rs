//! The transformer's statistics document and the per-test metrics built from it.
//!
//! The document is read leniently: it is walked as a JSON tree and every field
//! that is missing or has an unexpected shape simply stays unset.

use crate::format::{parse_leading_u64, percent_change};
use crate::pipeline::PipelineId;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A before/after pair of byte counts.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeFigures {
    pub before: Option<u64>,
    pub after: Option<u64>,
}

impl SizeFigures {
    pub fn new(before: Option<u64>, after: Option<u64>) -> Self {
        Self { before, after }
    }

    pub fn is_known(&self) -> bool {
        self.before.is_some() && self.after.is_some()
    }

    pub fn change(&self) -> String {
        percent_change(self.before, self.after)
    }

    /// Byte sizes of two files; a missing file leaves its figure unset.
    pub fn of_files(before: &Path, after: &Path) -> Self {
        let size = |p: &Path| fs::metadata(p).ok().filter(|m| m.is_file()).map(|m| m.len());
        Self::new(size(before), size(after))
    }

    /// Keeps `self` when both figures are present, otherwise takes `other`.
    pub fn or(self, other: SizeFigures) -> SizeFigures {
        if self.is_known() { self } else { other }
    }
}

pub type Counters = BTreeMap<String, Value>;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub test_name: String,
    pub variant: PipelineId,
    pub passes_run: Vec<String>,
    /// Counter groups keyed by pass, e.g. `controlFlowFlattening`.
    pub per_pass_counters: BTreeMap<String, Counters>,
    pub cycles_completed: Option<u64>,
    pub input_parameters: BTreeMap<String, Value>,
    pub ir_size: SizeFigures,
    pub string_data_size: SizeFigures,
    /// Measured from the executables, never taken from the document.
    pub binary_size: SizeFigures,
}

impl MetricsReport {
    pub fn empty(test_name: &str, variant: PipelineId) -> Self {
        Self {
            test_name: test_name.to_string(),
            variant,
            passes_run: Vec::new(),
            per_pass_counters: BTreeMap::new(),
            cycles_completed: None,
            input_parameters: BTreeMap::new(),
            ir_size: SizeFigures::default(),
            string_data_size: SizeFigures::default(),
            binary_size: SizeFigures::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passes_run.is_empty() && self.per_pass_counters.is_empty()
    }

    pub fn parse(test_name: &str, variant: PipelineId, text: &str) -> Result<Self, serde_json::Error> {
        let doc: Value = serde_json::from_str(text)?;
        Ok(Self::from_document(test_name, variant, &doc))
    }

    pub fn from_document(test_name: &str, variant: PipelineId, doc: &Value) -> Self {
        let mut report = Self::empty(test_name, variant);
        let empty = Map::new();
        let metrics = doc.get("obfuscationMetrics").and_then(Value::as_object).unwrap_or(&empty);
        let attrs = doc.get("outputAttributes").and_then(Value::as_object).unwrap_or(&empty);

        report.passes_run = metrics
            .get("passesRun")
            .and_then(Value::as_array)
            .map(|passes| passes.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        report.cycles_completed = metrics.get("cyclesCompleted").and_then(figure);
        for (pass, counters) in metrics {
            if let Some(counters) = counters.as_object() {
                let counters = counters.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                report.per_pass_counters.insert(pass.clone(), counters);
            }
        }
        if let Some(params) = doc.get("inputParameters").and_then(Value::as_object) {
            report.input_parameters = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        report.ir_size = SizeFigures::new(
            attrs.get("originalIRSize").and_then(figure),
            attrs.get("obfuscatedIRSize").and_then(figure),
        );
        report.string_data_size = SizeFigures::new(
            attrs.get("originalIRStringDataSize").and_then(figure),
            attrs.get("obfuscatedIRStringDataSize").and_then(figure),
        );
        report
    }

    /// A counter as an integer, `0` when absent.
    pub fn counter(&self, pass: &str, name: &str) -> u64 {
        self.per_pass_counters
            .get(pass)
            .and_then(|c| c.get(name))
            .and_then(figure)
            .unwrap_or(0)
    }
}

fn figure(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => parse_leading_u64(s),
        _ => None,
    }
}
