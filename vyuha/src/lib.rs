pub mod config;
pub mod error;
pub mod format;
pub mod layout;
pub mod metrics;
pub mod naming;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod test_case;

pub use config::Config;
pub use error::{Error, Result};
pub use layout::{IrArtifact, Layout, Variant};
pub use metrics::{MetricsReport, SizeFigures};
pub use naming::{canonical_key, display_label, CorrelationTable, GraphArtifact, IrStem};
pub use outcome::{EquivalenceResult, FailureKind, FailureRecord, SuiteSummary, TestOutcome};
pub use pipeline::{PipelineId, PipelineSpec};
pub use test_case::{Language, TestCase};
