use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::decision::DecisionRecord;
use crate::matching::{FoundItems, MatchScore};
use crate::models::SubmissionMethod;

/// Closed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    JobMatcher,
    SalaryValidator,
    CvTailor,
    CoverLetterWriter,
    Qa,
    Orchestrator,
    Submission,
}

impl StageId {
    pub const ALL: [StageId; 7] = [
        StageId::JobMatcher,
        StageId::SalaryValidator,
        StageId::CvTailor,
        StageId::CoverLetterWriter,
        StageId::Qa,
        StageId::Orchestrator,
        StageId::Submission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::JobMatcher => "job_matcher",
            StageId::SalaryValidator => "salary_validator",
            StageId::CvTailor => "cv_tailor",
            StageId::CoverLetterWriter => "cover_letter_writer",
            StageId::Qa => "qa",
            StageId::Orchestrator => "orchestrator",
            StageId::Submission => "submission",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-stage structured outputs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutput {
    #[serde(flatten)]
    pub score: MatchScore,
    pub threshold: f64,
    pub found: FoundItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryPeriod {
    Hourly,
    Daily,
    Monthly,
    Annual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalarySource {
    Structured,
    Extracted,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryOutput {
    /// Normalised daily rate, when one could be determined.
    pub daily_rate: Option<f64>,
    pub raw_amount: Option<f64>,
    pub period: Option<SalaryPeriod>,
    pub source: SalarySource,
    pub meets_threshold: bool,
    pub missing: bool,
    pub exceeds_maximum: bool,
    pub minimum: f64,
    pub maximum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvOutput {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub highlighted_skills: Vec<String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverLetterOutput {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaOutput {
    pub passed: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub automated_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutput {
    pub method: SubmissionMethod,
    pub recipient: String,
    pub reference: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Tagged union of every stage's structured output.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    JobMatcher(MatchOutput),
    SalaryValidator(SalaryOutput),
    CvTailor(CvOutput),
    CoverLetterWriter(CoverLetterOutput),
    Qa(QaOutput),
    Orchestrator(DecisionRecord),
    Submission(SubmissionOutput),
}

impl StageOutput {
    pub fn stage(&self) -> StageId {
        match self {
            StageOutput::JobMatcher(_) => StageId::JobMatcher,
            StageOutput::SalaryValidator(_) => StageId::SalaryValidator,
            StageOutput::CvTailor(_) => StageId::CvTailor,
            StageOutput::CoverLetterWriter(_) => StageId::CoverLetterWriter,
            StageOutput::Qa(_) => StageId::Qa,
            StageOutput::Orchestrator(_) => StageId::Orchestrator,
            StageOutput::Submission(_) => StageId::Submission,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            StageOutput::JobMatcher(o) => serde_json::to_value(o),
            StageOutput::SalaryValidator(o) => serde_json::to_value(o),
            StageOutput::CvTailor(o) => serde_json::to_value(o),
            StageOutput::CoverLetterWriter(o) => serde_json::to_value(o),
            StageOutput::Qa(o) => serde_json::to_value(o),
            StageOutput::Orchestrator(o) => serde_json::to_value(o),
            StageOutput::Submission(o) => serde_json::to_value(o),
        }
    }

    #[cfg(test)]
    pub fn from_value(stage: StageId, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match stage {
            StageId::JobMatcher => StageOutput::JobMatcher(serde_json::from_value(value)?),
            StageId::SalaryValidator => {
                StageOutput::SalaryValidator(serde_json::from_value(value)?)
            }
            StageId::CvTailor => StageOutput::CvTailor(serde_json::from_value(value)?),
            StageId::CoverLetterWriter => {
                StageOutput::CoverLetterWriter(serde_json::from_value(value)?)
            }
            StageId::Qa => StageOutput::Qa(serde_json::from_value(value)?),
            StageId::Orchestrator => StageOutput::Orchestrator(serde_json::from_value(value)?),
            StageId::Submission => StageOutput::Submission(serde_json::from_value(value)?),
        })
    }
}

/// Accumulated outputs of an application's completed stages.
///
/// Stored as opaque JSON per stage. Typed accessors decode on demand; `raw` exposes the
/// untyped payload for metric extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutputs(BTreeMap<StageId, Value>);

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: StageId, output: Value) {
        self.0.insert(stage, output);
    }

    pub fn raw(&self, stage: StageId) -> Option<&Value> {
        self.0.get(&stage)
    }

    /// True when the stage has an output that is neither null nor an empty object/array.
    pub fn has_output(&self, stage: StageId) -> bool {
        match self.0.get(&stage) {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.0.keys().copied()
    }

    fn typed<T: DeserializeOwned>(&self, stage: StageId) -> Option<T> {
        self.0
            .get(&stage)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn job_match(&self) -> Option<MatchOutput> {
        self.typed(StageId::JobMatcher)
    }

    pub fn cv(&self) -> Option<CvOutput> {
        self.typed(StageId::CvTailor)
    }

    pub fn cover_letter(&self) -> Option<CoverLetterOutput> {
        self.typed(StageId::CoverLetterWriter)
    }

    pub fn qa(&self) -> Option<QaOutput> {
        self.typed(StageId::Qa)
    }

    pub fn decision(&self) -> Option<DecisionRecord> {
        self.typed(StageId::Orchestrator)
    }
}

impl From<BTreeMap<StageId, Value>> for StageOutputs {
    fn from(map: BTreeMap<StageId, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_stage_id_string_forms_agree() {
        for stage in StageId::ALL {
            let json = serde_json::to_value(stage).unwrap();
            assert_eq!(json, Value::String(stage.as_str().to_string()));
            assert_eq!(stage.as_str().parse::<StageId>().unwrap(), stage);
        }
        assert!("scraper".parse::<StageId>().is_err());
    }

    #[test]
    fn test_outputs_serialize_keyed_by_stage_name() {
        let mut outputs = StageOutputs::new();
        outputs.insert(StageId::CoverLetterWriter, json!({"body": "Dear team"}));
        let value = serde_json::to_value(&outputs).unwrap();
        assert_eq!(value, json!({"cover_letter_writer": {"body": "Dear team"}}));
    }

    #[test]
    fn test_has_output_ignores_empty_payloads() {
        let mut outputs = StageOutputs::new();
        outputs.insert(StageId::Qa, json!({}));
        outputs.insert(StageId::CvTailor, Value::Null);
        outputs.insert(StageId::JobMatcher, json!({"final_score": 0.9}));

        assert!(!outputs.has_output(StageId::Qa));
        assert!(!outputs.has_output(StageId::CvTailor));
        assert!(outputs.has_output(StageId::JobMatcher));
        assert!(!outputs.has_output(StageId::Submission));
    }

    #[test]
    fn test_typed_accessor_returns_none_for_wrong_shape() {
        let mut outputs = StageOutputs::new();
        outputs.insert(StageId::Qa, json!({"unexpected": true}));
        assert!(outputs.qa().is_none());
        assert!(outputs.raw(StageId::Qa).is_some());
    }

    #[test]
    fn test_stage_output_value_conversion_keeps_stage() {
        let output = StageOutput::Qa(QaOutput {
            passed: true,
            issues: vec![],
            warnings: vec!["short letter".to_string()],
            automated_review: true,
        });
        let value = output.to_value().unwrap();
        let back = StageOutput::from_value(StageId::Qa, value).unwrap();
        assert_eq!(back.stage(), StageId::Qa);
        assert_eq!(back, output);
    }
}
