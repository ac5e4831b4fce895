use crate::metrics::MetricsReport;
use crate::pipeline::PipelineId;
use serde::Serialize;

/// The oracle's verdict for one `(test, pipeline)`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EquivalenceResult {
    pub test_name: String,
    pub variant: PipelineId,
    pub passed: bool,
    pub diagnostic: Option<String>,
}

impl EquivalenceResult {
    /// Byte-exact comparison of captured stdout. Whitespace counts.
    pub fn compare(test_name: &str, variant: PipelineId, original: &[u8], transformed: &[u8]) -> Self {
        let diagnostic = if original == transformed {
            None
        } else {
            let offset = original
                .iter()
                .zip(transformed.iter())
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| original.len().min(transformed.len()));
            Some(format!(
                "outputs differ at byte {} (original {} bytes, transformed {} bytes)",
                offset,
                original.len(),
                transformed.len()
            ))
        };
        Self {
            test_name: test_name.to_string(),
            variant,
            passed: diagnostic.is_none(),
            diagnostic,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    CompileFailure,
    TransformFailure,
    ReportFailure,
    RunFailure,
    EquivalenceMismatch,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub stage: String,
    pub kind: FailureKind,
    pub message: String,
    pub diagnostic: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub test_name: String,
    pub pipeline: PipelineId,
    pub equivalence: Option<EquivalenceResult>,
    pub metrics: Option<MetricsReport>,
    pub failure: Option<FailureRecord>,
}

impl TestOutcome {
    /// Only a computed, positive equivalence result counts as a pass.
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.equivalence.as_ref().map_or(false, |e| e.passed)
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSummary {
    pub pipeline: PipelineId,
    pub passed: usize,
    pub failed: usize,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteSummary {
    pub fn new(pipeline: PipelineId) -> Self {
        Self {
            pipeline,
            passed: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: TestOutcome) {
        if outcome.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}
