use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::models::stage::{StageId, StageOutputs};

/// Lifecycle status of one application attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Discovered,
    Queued,
    Matched,
    Rejected,
    Duplicate,
    DocumentsGenerated,
    Pending,
    PendingApproval,
    Approved,
    ReadyToSend,
    Sending,
    Submitted,
    Completed,
    Failed,
    SubmissionFailed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 15] = [
        ApplicationStatus::Discovered,
        ApplicationStatus::Queued,
        ApplicationStatus::Matched,
        ApplicationStatus::Rejected,
        ApplicationStatus::Duplicate,
        ApplicationStatus::DocumentsGenerated,
        ApplicationStatus::Pending,
        ApplicationStatus::PendingApproval,
        ApplicationStatus::Approved,
        ApplicationStatus::ReadyToSend,
        ApplicationStatus::Sending,
        ApplicationStatus::Submitted,
        ApplicationStatus::Completed,
        ApplicationStatus::Failed,
        ApplicationStatus::SubmissionFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Discovered => "discovered",
            ApplicationStatus::Queued => "queued",
            ApplicationStatus::Matched => "matched",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Duplicate => "duplicate",
            ApplicationStatus::DocumentsGenerated => "documents_generated",
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::PendingApproval => "pending_approval",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::ReadyToSend => "ready_to_send",
            ApplicationStatus::Sending => "sending",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::SubmissionFailed => "submission_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Completed
                | ApplicationStatus::Rejected
                | ApplicationStatus::Duplicate
                | ApplicationStatus::Failed
        )
    }

    /// States a manual retry may start from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Pending
                | ApplicationStatus::Failed
                | ApplicationStatus::SubmissionFailed
        )
    }

    /// Forward transitions allowed during normal pipeline progress.
    /// Manual retry resets are handled separately (see `ApplicationRecord::reentry_status`).
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        if *self == next || self.is_terminal() {
            return false;
        }

        match (*self, next) {
            (_, Pending | Failed) => true,
            (Discovered, Queued | Matched | Rejected | Duplicate) => true,
            (Queued, Matched | Rejected | Duplicate) => true,
            (Matched, DocumentsGenerated) => true,
            (DocumentsGenerated, Approved | PendingApproval | Rejected) => true,
            (PendingApproval, Approved | Rejected) => true,
            (Approved, ReadyToSend | Sending) => true,
            (ReadyToSend, Sending) => true,
            (Sending, Submitted | Completed | SubmissionFailed) => true,
            (Submitted, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown application status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMethod {
    Email,
    WebForm,
}

impl SubmissionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionMethod::Email => "email",
            SubmissionMethod::WebForm => "web_form",
        }
    }
}

impl FromStr for SubmissionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(SubmissionMethod::Email),
            "web_form" => Ok(SubmissionMethod::WebForm),
            other => Err(format!("unknown submission method '{other}'")),
        }
    }
}

/// Details of the last unrecoverable stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub stage: StageId,
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// One attempt at applying to one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: Uuid,
    pub job_id: Uuid,
    pub status: ApplicationStatus,
    /// Last attempted stage, which may not have completed.
    pub current_stage: Option<StageId>,
    /// Insertion-ordered, no duplicates.
    pub completed_stages: Vec<StageId>,
    pub stage_outputs: StageOutputs,
    pub error_info: Option<ErrorInfo>,
    pub submission_method: Option<SubmissionMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn new(job_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            application_id: Uuid::new_v4(),
            job_id,
            status: ApplicationStatus::Discovered,
            current_stage: None,
            completed_stages: Vec::new(),
            stage_outputs: StageOutputs::new(),
            error_info: None,
            submission_method: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_completed(&self, stage: StageId) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Records a stage's output, overwriting any previous one, and appends the stage once.
    pub fn complete_stage(&mut self, stage: StageId, output: Value) {
        self.stage_outputs.insert(stage, output);
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        self.updated_at = Utc::now();
    }

    /// Status a manual retry resets to, so the record re-enters at the failed stage.
    ///
    /// Without `error_info` the point is derived from the completed stages. A finished
    /// orchestrator without a recorded failure goes back to a human rather than being
    /// treated as approved.
    pub fn reentry_status(&self) -> ApplicationStatus {
        if let Some(error) = &self.error_info {
            return stage_entry_status(error.stage);
        }
        if self.has_completed(StageId::Orchestrator) {
            ApplicationStatus::PendingApproval
        } else if self.has_completed(StageId::Qa) {
            ApplicationStatus::DocumentsGenerated
        } else if self.has_completed(StageId::JobMatcher) {
            ApplicationStatus::Matched
        } else {
            ApplicationStatus::Discovered
        }
    }
}

/// Status an application holds when it is ready to run `stage`.
pub fn stage_entry_status(stage: StageId) -> ApplicationStatus {
    match stage {
        StageId::JobMatcher => ApplicationStatus::Discovered,
        StageId::SalaryValidator
        | StageId::CvTailor
        | StageId::CoverLetterWriter
        | StageId::Qa => ApplicationStatus::Matched,
        StageId::Orchestrator => ApplicationStatus::DocumentsGenerated,
        StageId::Submission => ApplicationStatus::Approved,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn test_status_string_forms_agree() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                json!(status.as_str())
            );
        }
    }

    #[test]
    fn test_happy_path_transitions_allowed() {
        let path = [
            Discovered,
            Queued,
            Matched,
            DocumentsGenerated,
            Approved,
            Sending,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [Completed, Rejected, Duplicate, Failed] {
            assert!(from.is_terminal());
            for to in ApplicationStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_any_live_state_can_fail_or_pend() {
        for from in ApplicationStatus::ALL {
            if from.is_terminal() {
                continue;
            }
            assert!(from.can_transition_to(Failed), "{from} -> failed");
            if from != Pending {
                assert!(from.can_transition_to(Pending), "{from} -> pending");
            }
        }
    }

    #[test]
    fn test_skipping_stages_is_rejected() {
        assert!(!Discovered.can_transition_to(DocumentsGenerated));
        assert!(!Matched.can_transition_to(Approved));
        assert!(!PendingApproval.can_transition_to(Sending));
        assert!(!Pending.can_transition_to(Matched));
    }

    #[test]
    fn test_complete_stage_is_idempotent_and_ordered() {
        let mut record = ApplicationRecord::new(Uuid::new_v4());
        record.complete_stage(StageId::JobMatcher, json!({"final_score": 0.8}));
        record.complete_stage(StageId::SalaryValidator, json!({"missing": true}));
        record.complete_stage(StageId::JobMatcher, json!({"final_score": 0.9}));

        assert_eq!(
            record.completed_stages,
            vec![StageId::JobMatcher, StageId::SalaryValidator]
        );
        assert_eq!(
            record.stage_outputs.raw(StageId::JobMatcher),
            Some(&json!({"final_score": 0.9}))
        );
    }

    #[test]
    fn test_reentry_follows_failed_stage() {
        let mut record = ApplicationRecord::new(Uuid::new_v4());
        record.complete_stage(StageId::JobMatcher, json!({"final_score": 0.8}));
        record.error_info = Some(ErrorInfo {
            stage: StageId::CvTailor,
            kind: ErrorKind::ExternalCapability,
            message: "timeout".to_string(),
            occurred_at: Utc::now(),
        });
        assert_eq!(record.reentry_status(), Matched);

        record.error_info.as_mut().unwrap().stage = StageId::Submission;
        assert_eq!(record.reentry_status(), Approved);
    }

    #[test]
    fn test_reentry_without_error_uses_completed_stages() {
        let mut record = ApplicationRecord::new(Uuid::new_v4());
        assert_eq!(record.reentry_status(), Discovered);
        record.complete_stage(StageId::Qa, json!({"passed": true}));
        assert_eq!(record.reentry_status(), DocumentsGenerated);
        record.complete_stage(StageId::Orchestrator, json!({"decision": "auto_approve"}));
        assert_eq!(record.reentry_status(), PendingApproval);
    }
}
