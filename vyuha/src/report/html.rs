use crate::report::model::AggregatedReport;
use serde::Serialize;

const TEMPLATE: &str = include_str!("template.html");
const COMPARISONS_SLOT: &str = "__COMPARISONS_JSON__";
const METRICS_SLOT: &str = "__METRICS_JSON__";

/// Renders the report as one static page with both tables inlined.
pub fn render_document(report: &AggregatedReport) -> Result<String, serde_json::Error> {
    let comparisons = script_json(&report.comparison_table())?;
    let metrics = script_json(&report.metrics_table())?;
    Ok(TEMPLATE
        .replacen(COMPARISONS_SLOT, &comparisons, 1)
        .replacen(METRICS_SLOT, &metrics, 1))
}

// JSON embedded in <script> must not be able to close the element.
fn script_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(json.replace("</", "<\\/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Variant;
    use crate::pipeline::PipelineId;
    use crate::report::model::{ComparisonEntry, TestReport};
    use std::collections::BTreeMap;

    fn report_with(key: &str) -> AggregatedReport {
        let entry = ComparisonEntry {
            test_name: "test_a".into(),
            canonical_key: key.into(),
            display_label: key.into(),
            variant: Variant::Transformed(PipelineId::Full),
            original_image: format!("../original/test_a/{}.png", key),
            transformed_image: format!("../full/test_a/{}.png", key),
            original_shape: None,
            transformed_shape: None,
        };
        let mut comparisons = BTreeMap::new();
        comparisons.insert(key.to_string(), entry);
        let mut per_test = BTreeMap::new();
        per_test.insert("test_a".to_string(), TestReport { metrics: None, comparisons });
        AggregatedReport { per_test }
    }

    #[test]
    fn tables_are_embedded() {
        let html = render_document(&report_with("main")).unwrap();
        assert!(!html.contains(COMPARISONS_SLOT));
        assert!(!html.contains(METRICS_SLOT));
        assert!(html.contains("\"../full/test_a/main.png\""));
        assert!(html.contains("\"canonicalKey\": \"main\""));
        assert!(!html.contains("http://") && !html.contains("https://"));
    }

    #[test]
    fn script_end_tags_are_escaped() {
        let html = render_document(&report_with("x</script>")).unwrap();
        assert_eq!(html.matches("</script>").count(), 1);
    }
}
