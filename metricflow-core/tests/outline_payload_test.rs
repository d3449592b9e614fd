//! Decoding reasoning-service outline payloads through the crate root.

use metricflow_core::{MetricSpec, RawOutline, RawSection};
use pretty_assertions::assert_eq;

#[test]
fn test_camel_case_payload_decodes_from_root_types() {
    let payload = serde_json::json!({
        "title": "Spending overview",
        "sections": [
            {"id": "spend", "title": "Spending", "neededMetricIds": ["total_spend"]},
            {"title": "Notes"}
        ],
        "globalMetrics": [
            {"metric_id": "total_spend", "metric_name": "Total spend"}
        ]
    });

    let raw: RawOutline = serde_json::from_value(payload).unwrap();

    assert_eq!(
        raw.sections,
        vec![
            RawSection {
                id: Some("spend".to_string()),
                title: "Spending".to_string(),
                description: String::new(),
                metric_ids: vec!["total_spend".to_string()],
            },
            RawSection {
                title: "Notes".to_string(),
                ..RawSection::default()
            },
        ]
    );
    let metrics: Vec<MetricSpec> = raw.global_metrics.unwrap();
    assert_eq!(metrics[0].id, "total_spend");
}
