//! Plan-log parsing is pluggable and engine-specific: wording varies
//! between Terraform versions and between Terraform and Argo CD
//! entirely, so each gets its own small regex-based parser behind one
//! trait rather than one parser trying to cover every wording.

use crate::model::PipelineChangeSummary;
use regex::Regex;
use std::sync::LazyLock;

pub trait PlanParser: Send + Sync {
    /// Scans log lines most-recent-first and returns the change summary
    /// from the last plan/diff report found, or `None` if no report has
    /// appeared yet.
    fn parse(&self, lines: &[String]) -> Option<PipelineChangeSummary>;
}

static TERRAFORM_PLAN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Plan:\s*(\d+)\s*to add,\s*(\d+)\s*to change,\s*(\d+)\s*to destroy").unwrap());
static TERRAFORM_NO_CHANGES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"No changes\.").unwrap());

#[derive(Debug, Default)]
pub struct TerraformPlanParser;

impl PlanParser for TerraformPlanParser {
    fn parse(&self, lines: &[String]) -> Option<PipelineChangeSummary> {
        for line in lines.iter().rev() {
            if let Some(caps) = TERRAFORM_PLAN_LINE.captures(line) {
                return Some(PipelineChangeSummary {
                    added: caps[1].parse().ok()?,
                    changed: caps[2].parse().ok()?,
                    destroyed: caps[3].parse().ok()?,
                });
            }
            if TERRAFORM_NO_CHANGES.is_match(line) {
                return Some(PipelineChangeSummary {
                    added: 0,
                    changed: 0,
                    destroyed: 0,
                });
            }
        }
        None
    }
}

static ARGOCD_DIFF_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ArgoCD Applications:\s*(\d+)\s*has changed objects,\s*(\d+)\s*has RequiredPruning objects").unwrap());

#[derive(Debug, Default)]
pub struct ArgoCdPlanParser;

impl PlanParser for ArgoCdPlanParser {
    fn parse(&self, lines: &[String]) -> Option<PipelineChangeSummary> {
        for line in lines.iter().rev() {
            if let Some(caps) = ARGOCD_DIFF_LINE.captures(line) {
                return Some(PipelineChangeSummary {
                    added: 0,
                    changed: caps[1].parse().ok()?,
                    destroyed: caps[2].parse().ok()?,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terraform_plan_summary_from_the_most_recent_line() {
        let lines = vec![
            "Refreshing state...".to_string(),
            "Plan: 3 to add, 0 to change, 0 to destroy.".to_string(),
        ];
        let summary = TerraformPlanParser.parse(&lines).unwrap();
        assert_eq!(summary, PipelineChangeSummary { added: 3, changed: 0, destroyed: 0 });
    }

    #[test]
    fn recognizes_terraform_no_changes() {
        let lines = vec!["No changes. Your infrastructure matches the configuration.".to_string()];
        let summary = TerraformPlanParser.parse(&lines).unwrap();
        assert!(summary.no_changes());
    }

    #[test]
    fn parses_argocd_diff_summary() {
        let lines = vec!["ArgoCD Applications: 2 has changed objects, 1 has RequiredPruning objects".to_string()];
        let summary = ArgoCdPlanParser.parse(&lines).unwrap();
        assert_eq!(summary, PipelineChangeSummary { added: 0, changed: 2, destroyed: 1 });
    }
}
