// All LLM prompt constants for the pipeline stages.
// Reuses cross-cutting fragments from llm_client::prompts.
//
// System prompts double as the identity of a call in tests, so each stage has its own.

/// System prompt for job/criteria classification.
pub const JOB_MATCH_SYSTEM: &str = "You are a technical recruiter classifying job postings \
    against a candidate's criteria. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{title}`, `{company}`, `{location}`, `{description}` and `{criteria_json}`.
pub const JOB_MATCH_PROMPT_TEMPLATE: &str = r#"Given the job posting and the candidate criteria below, list the criteria items the posting mentions, per category, and assess the location.

JOB TITLE: {title}
COMPANY: {company}
LOCATION: {location}

DESCRIPTION:
{description}

CRITERIA:
{criteria_json}

Return a JSON object with this EXACT schema:
{
  "must_have": ["Python"],
  "strong_preference": [],
  "nice_to_have": [],
  "location": "primary"
}

Rules:
- Only list technologies that the posting actually mentions.
- Use the spelling from the posting.
- "location" is "primary" if the job location matches a primary location, "acceptable" if it matches an acceptable one, otherwise "no_match"."#;

/// System prompt for salary extraction from free text.
pub const SALARY_EXTRACT_SYSTEM: &str = "You extract compensation figures from job postings. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{description}`.
pub const SALARY_EXTRACT_PROMPT_TEMPLATE: &str = r#"Extract the pay rate from this job posting.

{description}

Return a JSON object with this EXACT schema:
{"amount": 650, "period": "daily"}

Rules:
- "period" is one of "hourly", "daily", "monthly", "annual".
- If a range is given, use the lower bound.
- If no pay is stated, return {"amount": null, "period": null}."#;

/// System prompt for CV tailoring.
pub const CV_TAILOR_SYSTEM: &str = "You are an expert CV writer tailoring a candidate's CV to \
    a specific role. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{title}`, `{company}`, `{description}`, `{matched_json}`, `{profile}` and
/// `{grounding_instruction}`.
pub const CV_TAILOR_PROMPT_TEMPLATE: &str = r#"Tailor the candidate's CV for this role.

ROLE: {title} at {company}

JOB DESCRIPTION:
{description}

REQUIREMENTS THE CANDIDATE MATCHES:
{matched_json}

CANDIDATE PROFILE:
{profile}

{grounding_instruction}

Return a JSON object with this EXACT schema:
{
  "summary": "Two or three sentence professional summary.",
  "highlighted_skills": ["Python", "SQL"],
  "body": "The full tailored CV as plain text."
}"#;

/// System prompt for cover letters.
pub const COVER_LETTER_SYSTEM: &str = "You write concise, specific cover letters. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{title}`, `{company}`, `{description}`, `{cv_summary}`, `{skills}` and
/// `{grounding_instruction}`.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for this role.

ROLE: {title} at {company}

JOB DESCRIPTION:
{description}

CANDIDATE SUMMARY:
{cv_summary}

SKILLS TO EMPHASISE: {skills}

{grounding_instruction}

Address the letter to the hiring team at {company}. Keep it under 350 words.

Return a JSON object with this EXACT schema:
{"body": "The full cover letter as plain text."}"#;

/// System prompt for the automated document review.
pub const QA_REVIEW_SYSTEM: &str = "You are a meticulous reviewer checking job application \
    documents before they are sent. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{title}`, `{company}`, `{cv}` and `{cover_letter}`.
pub const QA_REVIEW_PROMPT_TEMPLATE: &str = r#"Review these application documents for the role {title} at {company}.

CV:
{cv}

COVER LETTER:
{cover_letter}

Check for factual inconsistencies between the documents, wrong company or role names, unprofessional tone, and anything that would embarrass the candidate.

Return a JSON object with this EXACT schema:
{
  "passed": true,
  "issues": ["blocking problems"],
  "warnings": ["non-blocking concerns"]
}"#;

/// System prompt for the orchestrator's recommendation.
pub const DECISION_SYSTEM: &str = "You advise on whether a job application should be sent. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Replace `{title}`, `{company}`, `{metrics_json}` and `{rule_summary}`.
pub const DECISION_PROMPT_TEMPLATE: &str = r#"Recommend a disposition for this job application.

ROLE: {title} at {company}

METRICS:
{metrics_json}

RULE-BASED ASSESSMENT: {rule_summary}

Return a JSON object with this EXACT schema:
{
  "recommended_decision": "auto_approve",
  "confidence": 0.85,
  "reasoning": "One or two sentences.",
  "flagged_concerns": []
}

"recommended_decision" is one of "auto_approve", "needs_human_approval", "auto_reject".
"confidence" is a number between 0 and 1."#;
