//! Structural validation of workflow definitions.
//!
//! The scheduler refuses to start when error-severity issues are present
//! (callers may opt to bypass with `allow_invalid`).

use std::collections::HashSet;

use crate::dsl::{StepKind, WorkflowDefinition, WorkflowStep};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// JSON-pointer-ish location, e.g. `steps[2].then[0]`.
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(path: String, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warning(path: String, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Validate a definition; issues are ordered by discovery.
pub fn validate_definition(definition: &WorkflowDefinition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if definition.id.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "id".to_string(),
            "workflow id must not be empty",
        ));
    }
    if definition.steps.is_empty() {
        issues.push(ValidationIssue::warning(
            "steps".to_string(),
            "workflow has no steps",
        ));
    }
    let mut seen_ids = HashSet::new();
    validate_block(&definition.steps, "steps", &mut seen_ids, &mut issues);
    issues
}

/// Whether any issue is an error.
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

fn validate_block(
    steps: &[WorkflowStep],
    path: &str,
    seen_ids: &mut HashSet<String>,
    issues: &mut Vec<ValidationIssue>,
) {
    for (index, step) in steps.iter().enumerate() {
        let step_path = format!("{path}[{index}]");
        if let Some(id) = &step.common.id {
            if !seen_ids.insert(id.clone()) {
                issues.push(ValidationIssue::error(
                    format!("{step_path}.id"),
                    format!("duplicate step id '{id}'"),
                ));
            }
        }
        if step.common.timeout_ms == Some(0) {
            issues.push(ValidationIssue::error(
                format!("{step_path}.timeoutMs"),
                "timeout must be greater than zero",
            ));
        }
        if let Some(key) = step.kind.primary_key() {
            if key.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    format!("{step_path}.key"),
                    "logical key must not be empty",
                ));
            }
        }
        match &step.kind {
            StepKind::If {
                then, otherwise, ..
            } => {
                if then.is_empty() && otherwise.is_empty() {
                    issues.push(ValidationIssue::warning(
                        step_path.clone(),
                        "if step has no branches",
                    ));
                }
                validate_block(then, &format!("{step_path}.then"), seen_ids, issues);
                validate_block(otherwise, &format!("{step_path}.else"), seen_ids, issues);
            }
            StepKind::Foreach {
                binding,
                concurrency,
                steps,
                list,
                ..
            } => {
                if binding.trim().is_empty() {
                    issues.push(ValidationIssue::error(
                        format!("{step_path}.as"),
                        "foreach requires a loop variable name",
                    ));
                }
                if list.trim().is_empty() {
                    issues.push(ValidationIssue::error(
                        format!("{step_path}.list"),
                        "foreach requires a context list path",
                    ));
                }
                if let Some(concurrency) = concurrency {
                    if *concurrency > 1 {
                        issues.push(ValidationIssue::warning(
                            format!("{step_path}.concurrency"),
                            "foreach concurrency above 1 is reserved; iterations run sequentially",
                        ));
                    }
                }
                if steps.is_empty() {
                    issues.push(ValidationIssue::warning(
                        step_path.clone(),
                        "foreach body is empty",
                    ));
                }
                validate_block(steps, &format!("{step_path}.steps"), seen_ids, issues);
            }
            StepKind::Retry { steps, .. } => {
                if steps.is_empty() {
                    issues.push(ValidationIssue::error(
                        step_path.clone(),
                        "retry block requires at least one step",
                    ));
                }
                validate_block(steps, &format!("{step_path}.steps"), seen_ids, issues);
            }
            StepKind::Run { .. } => {
                issues.push(ValidationIssue::warning(
                    step_path.clone(),
                    "run steps are reserved and fail at execution",
                ));
            }
            StepKind::Delay { ms } => {
                if *ms == 0 {
                    issues.push(ValidationIssue::warning(
                        format!("{step_path}.ms"),
                        "zero-length delay",
                    ));
                }
            }
            StepKind::Select { values, .. } => {
                if values.is_empty() {
                    issues.push(ValidationIssue::error(
                        format!("{step_path}.values"),
                        "select requires at least one value",
                    ));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{Condition, StepKind, WorkflowStep};
    use serde_json::json;

    fn definition(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".to_string(),
            version: None,
            defaults: Default::default(),
            steps,
        }
    }

    #[test]
    fn duplicate_ids_are_errors() {
        let steps = vec![
            WorkflowStep::new(StepKind::Log {
                message: "a".into(),
                level: None,
                data: None,
            })
            .with_id("x"),
            WorkflowStep::new(StepKind::Log {
                message: "b".into(),
                level: None,
                data: None,
            })
            .with_id("x"),
        ];
        let issues = validate_definition(&definition(steps));
        assert!(has_errors(&issues));
        assert!(issues.iter().any(|i| i.message.contains("duplicate")));
    }

    #[test]
    fn nested_blocks_are_walked() {
        let raw = json!({
            "id": "wf",
            "steps": [
                { "kind": "if",
                  "condition": { "kind": "contextTruthy", "path": "x" },
                  "then": [ { "kind": "click", "key": "" } ] }
            ]
        });
        let definition: WorkflowDefinition = serde_json::from_value(raw).unwrap();
        let issues = validate_definition(&definition);
        assert!(has_errors(&issues));
        assert_eq!(issues[0].path, "steps[0].then[0].key");
    }

    #[test]
    fn foreach_concurrency_is_a_warning() {
        let steps = vec![WorkflowStep::new(StepKind::Foreach {
            list: "items".into(),
            binding: "item".into(),
            index_var: None,
            concurrency: Some(4),
            steps: vec![WorkflowStep::new(StepKind::Log {
                message: "x".into(),
                level: None,
                data: None,
            })],
        })];
        let issues = validate_definition(&definition(steps));
        assert!(!has_errors(&issues));
        assert!(issues.iter().any(|i| i.message.contains("reserved")));
    }

    #[test]
    fn run_steps_warn_as_reserved() {
        let steps = vec![WorkflowStep::new(StepKind::Run {
            workflow_id: "other".into(),
        })];
        let issues = validate_definition(&definition(steps));
        assert!(!has_errors(&issues));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn select_without_values_is_an_error() {
        let steps = vec![WorkflowStep::new(StepKind::Select {
            key: "size".into(),
            by: crate::dsl::SelectBy::Value,
            values: vec![],
            multiple: false,
        })];
        let issues = validate_definition(&definition(steps));
        assert!(has_errors(&issues));
    }

    #[test]
    fn clean_definition_validates_quietly() {
        let steps = vec![WorkflowStep::new(StepKind::If {
            condition: Condition::ContextTruthy { path: "x".into() },
            then: vec![WorkflowStep::new(StepKind::Delay { ms: 10 })],
            otherwise: vec![],
        })];
        assert!(validate_definition(&definition(steps)).is_empty());
    }
}
