pub mod html;
pub mod model;

pub use html::render_document;
pub use model::{AggregatedReport, CfgShape, ComparisonEntry, MetricsView, SizeView, TestReport};
