//! Structural completeness checks. Findings are returned as strings; nothing
//! here fails the caller.

use serde_json::Value;

use reqflow_types::Requirement;

pub fn validate_requirements(requirements: &[Requirement]) -> Vec<String> {
    let mut issues = Vec::new();
    for r in requirements {
        if r.id.is_empty() {
            let shown = serde_json::to_string(r).unwrap_or_else(|_| r.title.clone());
            issues.push(format!("requirement missing id: {shown}"));
        }
        let id = if r.id.is_empty() { "?" } else { r.id.as_str() };
        if r.title.is_empty() {
            issues.push(format!("requirement {id} missing title"));
        }
        if r.priority.is_none() {
            issues.push(format!("requirement {id} missing priority"));
        }
    }
    issues
}

/// Same checks over untyped input, as received on the wire. Any `priority`
/// key counts as present, whatever its value.
pub fn validate_requirements_value(requirements: &Value) -> Vec<String> {
    let Some(items) = requirements.as_array() else {
        return vec!["requirements must be a list".to_string()];
    };

    let mut issues = Vec::new();
    for r in items {
        let id = r.get("id").filter(|v| truthy(v));
        if id.is_none() {
            issues.push(format!("requirement missing id: {r}"));
        }
        let id = id.map_or_else(|| "?".to_string(), display);
        if !r.get("title").is_some_and(truthy) {
            issues.push(format!("requirement {id} missing title"));
        }
        if r.get("priority").is_none() {
            issues.push(format!("requirement {id} missing priority"));
        }
    }
    issues
}

/// Checks `report.count` against the number of requirements.
pub fn validate_report(report: Option<&Value>, requirement_count: usize) -> Vec<String> {
    let Some(report) = report.filter(|r| !r.is_null()) else {
        return vec!["no report provided".to_string()];
    };

    match report.get("count").and_then(Value::as_i64) {
        Some(count) if count != requirement_count as i64 => vec![format!(
            "report.count ({count}) does not match requirements length ({requirement_count})"
        )],
        Some(_) => Vec::new(),
        None => vec!["report.count missing or not int".to_string()],
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_requirements_pass() {
        let reqs = vec![Requirement {
            id: "R1".into(),
            title: "Export".into(),
            priority: Some(1),
            ..Default::default()
        }];
        assert!(validate_requirements(&reqs).is_empty());
    }

    #[test]
    fn missing_fields_are_reported() {
        let reqs = vec![
            Requirement {
                id: "R1".into(),
                ..Default::default()
            },
            Requirement {
                title: "No id".into(),
                priority: Some(0),
                ..Default::default()
            },
        ];
        let issues = validate_requirements(&reqs);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0], "requirement R1 missing title");
        assert_eq!(issues[1], "requirement R1 missing priority");
        assert!(issues[2].starts_with("requirement missing id: "));
    }

    #[test]
    fn value_checks_accept_any_priority() {
        let reqs = json!([
            {"id": "R1", "title": "A", "priority": 0},
            {"id": "R2", "title": "B", "priority": null},
            {"id": "R3", "title": "C"}
        ]);
        assert_eq!(
            validate_requirements_value(&reqs),
            vec!["requirement R3 missing priority".to_string()]
        );
    }

    #[test]
    fn value_checks_require_list() {
        assert_eq!(
            validate_requirements_value(&json!({"id": "R1"})),
            vec!["requirements must be a list".to_string()]
        );
    }

    #[test]
    fn report_absent() {
        assert_eq!(validate_report(None, 2), vec!["no report provided"]);
        assert_eq!(validate_report(Some(&Value::Null), 2), vec!["no report provided"]);
    }

    #[test]
    fn report_count_consistency() {
        assert!(validate_report(Some(&json!({"count": 2})), 2).is_empty());
        assert_eq!(
            validate_report(Some(&json!({"count": 3})), 2),
            vec!["report.count (3) does not match requirements length (2)"]
        );
    }

    #[test]
    fn report_count_wrong_type() {
        assert_eq!(
            validate_report(Some(&json!({"count": "2"})), 2),
            vec!["report.count missing or not int"]
        );
        assert_eq!(
            validate_report(Some(&json!({})), 0),
            vec!["report.count missing or not int"]
        );
    }
}
