// Branch list rules shared by completeness checks and edit validation

use serde_json::Value;
use std::collections::HashSet;

use super::types::{Branch, ExperimentKind, PrefType};

/// Whether a branch value (JSON text) matches the declared pref type
pub fn value_matches_pref_type(value: &str, pref_type: PrefType) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(value) else {
        return false;
    };
    match pref_type {
        PrefType::Boolean => parsed.is_boolean(),
        PrefType::Integer => parsed.is_i64() || parsed.is_u64(),
        PrefType::String => parsed.is_string(),
        PrefType::JsonString => parsed
            .as_str()
            .is_some_and(|inner| serde_json::from_str::<Value>(inner).is_ok()),
    }
}

pub fn ratio_total(branches: &[Branch]) -> u32 {
    branches.iter().map(|b| u32::from(b.ratio)).sum()
}

/// Everything keeping a branch list from being complete
pub fn branch_issues(
    branches: &[Branch],
    kind: ExperimentKind,
    pref_type: Option<PrefType>,
) -> Vec<String> {
    let mut issues = Vec::new();

    if branches.is_empty() {
        issues.push("at least one branch".to_string());
        return issues;
    }

    let controls = branches.iter().filter(|b| b.is_control).count();
    if controls != 1 {
        issues.push("exactly one control branch".to_string());
    }

    let total = ratio_total(branches);
    if total != 100 {
        issues.push(format!("branch ratios must add up to 100 (currently {total})"));
    }

    if branches.iter().any(|b| b.ratio == 0 || b.ratio > 100) {
        issues.push("branch ratios between 1 and 100".to_string());
    }

    if branches.iter().any(|b| b.name.trim().is_empty()) {
        issues.push("branch name".to_string());
    }
    if branches.iter().any(|b| b.description.trim().is_empty()) {
        issues.push("branch description".to_string());
    }

    let mut names = HashSet::new();
    if !branches.iter().all(|b| names.insert(b.name.trim().to_lowercase())) {
        issues.push("unique branch names".to_string());
    }

    if kind == ExperimentKind::Pref {
        let values: Vec<&str> = branches
            .iter()
            .filter_map(|b| b.value.as_deref())
            .filter(|v| !v.trim().is_empty())
            .collect();
        if values.len() != branches.len() {
            issues.push("branch value".to_string());
        }
        if values
            .iter()
            .any(|v| serde_json::from_str::<Value>(v).is_err())
        {
            issues.push("branch values must be valid JSON".to_string());
        } else if let Some(pref_type) = pref_type {
            if values.iter().any(|v| !value_matches_pref_type(v, pref_type)) {
                issues.push(format!("branch values must match pref type {}", pref_type.as_str()));
            }
        }
        let mut seen = HashSet::new();
        if !values.iter().all(|v| seen.insert(v.trim())) {
            issues.push("unique branch values".to_string());
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref_branches() -> Vec<Branch> {
        vec![
            Branch::control("Control", 50)
                .with_description("Default")
                .with_value("false"),
            Branch::new("Treatment", 50)
                .with_description("Flipped")
                .with_value("true"),
        ]
    }

    #[test]
    fn test_complete_pref_branches() {
        let issues = branch_issues(&pref_branches(), ExperimentKind::Pref, Some(PrefType::Boolean));
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn test_wrong_value_type_is_reported() {
        let issues = branch_issues(&pref_branches(), ExperimentKind::Pref, Some(PrefType::Integer));
        assert_eq!(issues, vec!["branch values must match pref type integer"]);
    }

    #[test]
    fn test_duplicate_values_and_names() {
        let mut branches = pref_branches();
        branches[1].value = Some("false".to_string());
        branches[1].name = "control".to_string();
        let issues = branch_issues(&branches, ExperimentKind::Pref, Some(PrefType::Boolean));
        assert!(issues.contains(&"unique branch names".to_string()));
        assert!(issues.contains(&"unique branch values".to_string()));
    }

    #[test]
    fn test_generic_branches_ignore_values() {
        let branches = vec![
            Branch::control("Control", 70).with_description("a"),
            Branch::new("Treatment", 30).with_description("b"),
        ];
        assert!(branch_issues(&branches, ExperimentKind::Generic, None).is_empty());
    }

    #[test]
    fn test_json_string_pref_values() {
        assert!(value_matches_pref_type(r#""{\"a\": 1}""#, PrefType::JsonString));
        assert!(!value_matches_pref_type(r#""not json""#, PrefType::JsonString));
        assert!(value_matches_pref_type("42", PrefType::Integer));
        assert!(!value_matches_pref_type("4.2", PrefType::Integer));
        assert!(value_matches_pref_type(r#""hello""#, PrefType::String));
    }
}
