use serde::Serialize;
use std::fmt;

pub const STRING_ENCRYPT: &str = "chakravyuha-string-encrypt";
pub const CONTROL_FLOW_FLATTEN: &str = "chakravyuha-control-flow-flatten";
pub const FAKE_CODE_INSERTION: &str = "chakravyuha-fake-code-insertion";

/// Terminal pass that prints the statistics document on stdout.
pub const EMIT_REPORT: &str = "chakravyuha-emit-report";

/// The named pass pipelines the suite knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ArgEnum)]
#[serde(rename_all = "lowercase")]
pub enum PipelineId {
    Full,
    Cff,
    String,
    Fake,
}

/// Order in which reports are picked when several pipelines left one behind.
pub const REPORT_PRIORITY: [PipelineId; 4] = [
    PipelineId::Full,
    PipelineId::Cff,
    PipelineId::String,
    PipelineId::Fake,
];

impl PipelineId {
    pub fn all() -> &'static [PipelineId] {
        &REPORT_PRIORITY
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineId::Full => "full",
            PipelineId::Cff => "cff",
            PipelineId::String => "string",
            PipelineId::Fake => "fake",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == token)
    }

    pub fn spec(&self) -> PipelineSpec {
        let passes: &[&'static str] = match self {
            PipelineId::Full => &[STRING_ENCRYPT, CONTROL_FLOW_FLATTEN, FAKE_CODE_INSERTION],
            PipelineId::Cff => &[CONTROL_FLOW_FLATTEN],
            PipelineId::String => &[STRING_ENCRYPT],
            PipelineId::Fake => &[FAKE_CODE_INSERTION],
        };
        PipelineSpec {
            id: *self,
            passes: passes.to_vec(),
        }
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub id: PipelineId,
    pub passes: Vec<&'static str>,
}

impl PipelineSpec {
    /// The `-passes=` argument for the transformer.
    pub fn pass_list(&self) -> String {
        self.passes.join(",")
    }

    /// The same pipeline with the reporting pass appended.
    pub fn reporting_pass_list(&self) -> String {
        format!("{},{}", self.pass_list(), EMIT_REPORT)
    }
}
