//! Document review: deterministic checks first, then an automated review.
//!
//! An unavailable review never fails the stage; the deterministic verdict stands and a
//! warning records that the review was skipped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::StageError;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::models::{CoverLetterOutput, CvOutput, QaOutput, StageId, StageOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{QA_REVIEW_PROMPT_TEMPLATE, QA_REVIEW_SYSTEM};

/// Lowercased fragments that indicate an unfilled template.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "{{",
    "}}",
    "[company",
    "[your ",
    "[insert",
    "[name",
    "[job title",
    "lorem ipsum",
];

pub const MAX_CV_CHARS: usize = 12_000;
pub const MAX_COVER_LETTER_CHARS: usize = 4_000;
const SHORT_COVER_LETTER_CHARS: usize = 200;

pub const REVIEW_UNAVAILABLE: &str = "automated review unavailable";

#[derive(Debug, Default, Deserialize)]
struct Review {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct CheckReport {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

fn has_placeholder(text: &str) -> bool {
    let lowered = text.to_lowercase();
    PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Rule-based checks that need no external capability.
pub fn deterministic_checks(
    company: &str,
    cv: &CvOutput,
    letter: &CoverLetterOutput,
) -> CheckReport {
    let mut report = CheckReport::default();

    for (name, body, limit) in [
        ("CV", cv.body.as_str(), MAX_CV_CHARS),
        ("cover letter", letter.body.as_str(), MAX_COVER_LETTER_CHARS),
    ] {
        if body.trim().is_empty() {
            report.issues.push(format!("{name} is empty"));
            continue;
        }
        if has_placeholder(body) {
            report
                .issues
                .push(format!("{name} contains an unfilled placeholder"));
        }
        let chars = body.chars().count();
        if chars > limit {
            report
                .issues
                .push(format!("{name} is too long ({chars} chars, limit {limit})"));
        }
    }

    let letter_body = letter.body.trim();
    if !letter_body.is_empty() {
        let company = company.trim();
        if !company.is_empty() && !letter_body.to_lowercase().contains(&company.to_lowercase()) {
            report
                .issues
                .push(format!("cover letter does not mention {company}"));
        }
        if letter_body.chars().count() < SHORT_COVER_LETTER_CHARS {
            report.warnings.push("cover letter is very short".to_string());
        }
    }

    report
}

pub struct QaStage {
    llm: Arc<dyn TextGenerator>,
}

impl QaStage {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    async fn review(
        &self,
        ctx: &StageContext,
        cv: &CvOutput,
        letter: &CoverLetterOutput,
    ) -> Option<Review> {
        let prompt = QA_REVIEW_PROMPT_TEMPLATE
            .replace("{title}", &ctx.job.title)
            .replace("{company}", &ctx.job.company)
            .replace("{cv}", &cv.body)
            .replace("{cover_letter}", &letter.body);

        let text = match self.llm.invoke(&prompt, QA_REVIEW_SYSTEM).await {
            Ok(text) => text,
            Err(e) => {
                warn!("QA review call failed for {}: {e}", ctx.application.application_id);
                return None;
            }
        };

        match parse_json_response::<Review>(&text) {
            Ok(review) => Some(review),
            Err(e) => {
                warn!("Unparsable QA review for {}: {e}", ctx.application.application_id);
                None
            }
        }
    }
}

#[async_trait]
impl StageAgent for QaStage {
    fn stage(&self) -> StageId {
        StageId::Qa
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let outputs = &ctx.application.stage_outputs;
        let (cv, letter) = match (outputs.cv(), outputs.cover_letter()) {
            (Some(cv), Some(letter)) => (cv, letter),
            (cv, letter) => {
                let mut missing = Vec::new();
                if cv.is_none() {
                    missing.push(StageId::CvTailor);
                }
                if letter.is_none() {
                    missing.push(StageId::CoverLetterWriter);
                }
                return Err(StageError::MissingUpstreamStage(missing));
            }
        };

        let CheckReport {
            mut issues,
            mut warnings,
        } = deterministic_checks(&ctx.job.company, &cv, &letter);
        let checks_passed = issues.is_empty();

        let (review_passed, automated_review) = match self.review(ctx, &cv, &letter).await {
            Some(review) => {
                issues.extend(review.issues);
                warnings.extend(review.warnings);
                (review.passed, true)
            }
            None => {
                warnings.push(REVIEW_UNAVAILABLE.to_string());
                (true, false)
            }
        };

        let passed = checks_passed && review_passed;
        info!(
            "QA for {}: passed={passed}, {} issues, {} warnings",
            ctx.application.application_id,
            issues.len(),
            warnings.len()
        );

        Ok(StageOutput::Qa(QaOutput {
            passed,
            issues,
            warnings,
            automated_review,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::ApplicationRecord;
    use crate::testing::{sample_job, ScriptedGenerator};

    fn good_letter() -> String {
        format!(
            "Dear Acme Data hiring team, {}",
            "I have built data platforms in Python and SQL for eight years. ".repeat(4)
        )
    }

    fn ctx_with(cv_body: &str, letter_body: &str) -> StageContext {
        let job = sample_job();
        let mut application = ApplicationRecord::new(job.job_id);
        application.complete_stage(StageId::CvTailor, json!({"body": cv_body}));
        application.complete_stage(StageId::CoverLetterWriter, json!({"body": letter_body}));
        StageContext { application, job }
    }

    async fn qa(generator: ScriptedGenerator, ctx: &StageContext) -> QaOutput {
        match QaStage::new(Arc::new(generator)).run(ctx).await {
            Ok(StageOutput::Qa(output)) => output,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_deterministic_checks_catch_placeholders_and_company() {
        let cv = CvOutput {
            body: "Worked at [Company Name] on pipelines".to_string(),
            ..CvOutput::default()
        };
        let letter = CoverLetterOutput {
            body: "Dear {{hiring_manager}}, I would love to join.".to_string(),
        };
        let report = deterministic_checks("Acme Data", &cv, &letter);
        assert!(report.issues.iter().any(|i| i.starts_with("CV contains")));
        assert!(report
            .issues
            .iter()
            .any(|i| i.starts_with("cover letter contains")));
        assert!(report.issues.iter().any(|i| i.contains("does not mention Acme Data")));
        assert!(report.warnings.contains(&"cover letter is very short".to_string()));
    }

    #[test]
    fn test_deterministic_checks_flag_empty_and_long_documents() {
        let cv = CvOutput {
            body: "x".repeat(MAX_CV_CHARS + 1),
            ..CvOutput::default()
        };
        let letter = CoverLetterOutput {
            body: "   ".to_string(),
        };
        let report = deterministic_checks("Acme Data", &cv, &letter);
        assert_eq!(
            report.issues,
            vec![
                format!("CV is too long ({} chars, limit {MAX_CV_CHARS})", MAX_CV_CHARS + 1),
                "cover letter is empty".to_string(),
            ]
        );
    }

    #[test]
    fn test_clean_documents_pass_checks() {
        let cv = CvOutput {
            body: "Senior data engineer with Python and SQL.".to_string(),
            ..CvOutput::default()
        };
        let letter = CoverLetterOutput { body: good_letter() };
        assert_eq!(
            deterministic_checks("Acme Data", &cv, &letter),
            CheckReport::default()
        );
    }

    #[tokio::test]
    async fn test_review_merges_with_checks() {
        let generator = ScriptedGenerator::new().respond(
            QA_REVIEW_SYSTEM,
            r#"{"passed": true, "issues": [], "warnings": ["tone slightly informal"]}"#,
        );
        let output = qa(generator, &ctx_with("Solid CV", &good_letter())).await;
        assert!(output.passed);
        assert!(output.automated_review);
        assert_eq!(output.warnings, vec!["tone slightly informal"]);
    }

    #[tokio::test]
    async fn test_failed_review_fails_qa() {
        let generator = ScriptedGenerator::new().respond(
            QA_REVIEW_SYSTEM,
            r#"{"passed": false, "issues": ["CV and letter disagree on years of experience"]}"#,
        );
        let output = qa(generator, &ctx_with("Solid CV", &good_letter())).await;
        assert!(!output.passed);
        assert_eq!(output.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_review_keeps_deterministic_verdict() {
        let generator = ScriptedGenerator::new().fail(QA_REVIEW_SYSTEM, "down");
        let output = qa(generator, &ctx_with("Solid CV", &good_letter())).await;
        assert!(output.passed);
        assert!(!output.automated_review);
        assert_eq!(output.warnings, vec![REVIEW_UNAVAILABLE]);

        let generator = ScriptedGenerator::new().respond(QA_REVIEW_SYSTEM, "looks fine to me");
        let output = qa(generator, &ctx_with("", &good_letter())).await;
        assert!(!output.passed);
        assert!(output.warnings.contains(&REVIEW_UNAVAILABLE.to_string()));
    }

    #[tokio::test]
    async fn test_missing_documents_fail_stage() {
        let job = sample_job();
        let mut application = ApplicationRecord::new(job.job_id);
        application.complete_stage(StageId::CvTailor, json!({"body": "cv"}));
        let ctx = StageContext { application, job };

        let err = QaStage::new(Arc::new(ScriptedGenerator::new()))
            .run(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing upstream stage output: cover_letter_writer");
    }
}
