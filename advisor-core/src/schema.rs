use once_cell::sync::Lazy;
use serde_json::Value;

/// JSON Schema of the machine-readable report export (Draft 2020-12).
pub static REPORT_SCHEMA_JSON: &str = include_str!("../../schemas/advisor-report.schema.json");

pub static REPORT_SCHEMA_VALUE: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(REPORT_SCHEMA_JSON)
        .expect("embedded advisor report schema must be valid JSON")
});

pub fn report_schema() -> &'static Value {
    &REPORT_SCHEMA_VALUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_an_object_with_required_keys() {
        let required = report_schema()["required"].as_array().expect("required list");
        assert!(required.iter().any(|v| v == "rows"));
    }

    #[test]
    fn rejects_unknown_skip_kind() {
        let export = json!({
            "metadata": {
                "generated_at": "1700000000",
                "mode": { "scope": "all_accessible", "resource": "omitted" },
                "label": null
            },
            "columns": ["subscription", "category", "problem", "solution", "impact"],
            "rows": [],
            "summary": { "total": 0, "distinct_resources": null },
            "skipped": [{ "scope": "x", "kind": "timeout", "message": "m" }]
        });
        assert!(!jsonschema::is_valid(report_schema(), &export));
    }
}
