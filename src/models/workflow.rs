//! Approval workflow state attached to a payment.

use super::{dates, user::Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One configured approval step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepConfig {
    pub role: Role,
    pub username: String,
    #[serde(default)]
    pub title: String,
}

/// Ordered approval chain used when a workflow is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub enabled: bool,
    pub steps: Vec<WorkflowStepConfig>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            steps: vec![
                WorkflowStepConfig {
                    role: Role::FinancialDirector,
                    username: "diretora.financeira".to_string(),
                    title: "Diretora Financeira".to_string(),
                },
                WorkflowStepConfig {
                    role: Role::Rector,
                    username: "reitor".to_string(),
                    title: "Reitor".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    InProgress,
    Approved,
    Rejected,
}

impl WorkflowStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub role: Role,
    pub username: String,
    #[serde(default)]
    pub title: String,
    pub status: StepStatus,
    #[serde(default, with = "dates::iso_option", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub status: WorkflowStatus,
    pub current_step: usize,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// A fresh in-progress workflow over the configured steps.
    #[must_use]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        let steps = config
            .steps
            .iter()
            .map(|step| WorkflowStep {
                id: uuid::Uuid::new_v4().to_string(),
                role: step.role,
                username: step.username.clone(),
                title: step.title.clone(),
                status: StepStatus::Pending,
                date: None,
                comments: None,
            })
            .collect();

        Self {
            status: WorkflowStatus::InProgress,
            current_step: 0,
            steps,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.current_step)
    }

    #[must_use]
    pub fn is_last_step(&self) -> bool {
        self.current_step + 1 >= self.steps.len()
    }
}
