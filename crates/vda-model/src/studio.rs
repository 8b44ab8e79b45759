// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Constraints every studio job must carry, merged into whatever the
/// caller declared.
pub const REQUIRED_CONSTRAINTS: [&str; 2] = ["all_mutations_idempotent", "no_runtime_eval"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub source_system: String,
    #[serde(default)]
    pub primary_users: Vec<String>,
    #[serde(default)]
    pub core_workflows: Vec<String>,
    #[serde(default)]
    pub data_entities: Vec<String>,
    #[serde(default)]
    pub deployment_target: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub generation_depth: String,
    #[serde(default)]
    pub integrations: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadItem {
    pub phase: String,
    pub task: String,
    pub owner: String,
    pub estimate_hours: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub path: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub language: String,
    pub category: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTargetInfo {
    pub name: String,
    pub description: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub workspace_path: String,
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
    #[serde(default)]
    pub run_targets: Vec<RunTargetInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl CheckStatus {
    #[must_use]
    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    #[must_use]
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub id: String,
    pub status: CheckStatus,
    pub evidence: String,
}

impl VerificationCheck {
    #[must_use]
    pub fn new(id: &str, ok: bool, evidence: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            status: CheckStatus::from_bool(ok),
            evidence: evidence.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    #[serde(default)]
    pub report_id: String,
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub depth_label: String,
    #[serde(default)]
    pub behavioral_pass_rate: f64,
    #[serde(default)]
    pub checks: Vec<VerificationCheck>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JtbdCoverage {
    pub id: String,
    pub task: String,
    pub status: CheckStatus,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub target: String,
    pub status: CheckStatus,
    pub checks: Vec<VerificationCheck>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub command: String,
    pub output: Vec<String>,
    pub cwd: String,
}

/// One studio job: the confirmation it was built from plus every derived
/// artifact. The workspace directory is a pure function of this record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub tenant_id: String,
    pub status: String,
    pub depth_label: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub workspace_path: String,
    pub confirmation: Confirmation,
    pub workload: Vec<WorkloadItem>,
    pub files: Vec<FileArtifact>,
    pub artifact_manifest: ArtifactManifest,
    pub verification_report: VerificationReport,
    pub jtbd_coverage: Vec<JtbdCoverage>,
    pub terminal_logs: Vec<String>,
    pub console_logs: Vec<String>,
    pub preview_workload: String,
    pub preview_code_path: String,
    pub preview_terminal: String,
    pub preview_console: String,
}

/// Unknown depth labels collapse to `pilot`.
#[must_use]
pub fn normalize_depth_label(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "prototype" => "prototype".to_string(),
        "production-candidate" => "production-candidate".to_string(),
        _ => "pilot".to_string(),
    }
}

#[must_use]
pub fn is_depth_label(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "prototype" | "pilot" | "production-candidate"
    )
}

#[cfg(test)]
mod tests {
    use super::normalize_depth_label;

    #[test]
    fn unknown_depth_defaults_to_pilot() {
        assert_eq!(normalize_depth_label("PROTOTYPE"), "prototype");
        assert_eq!(normalize_depth_label("experimental"), "pilot");
        assert_eq!(normalize_depth_label(""), "pilot");
    }
}
