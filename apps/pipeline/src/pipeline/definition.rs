use std::collections::HashSet;

use crate::errors::PipelineError;
use crate::models::StageId;

/// One stage in the pipeline and the stages whose outputs it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub id: StageId,
    pub requires: Vec<StageId>,
}

impl StageSpec {
    pub fn new(id: StageId, requires: &[StageId]) -> Self {
        Self {
            id,
            requires: requires.to_vec(),
        }
    }
}

/// Ordered stage list with explicit dependency edges, validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    stages: Vec<StageSpec>,
}

impl PipelineDefinition {
    /// Fails if a stage appears twice or requires a stage that does not run before it.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for spec in &stages {
            for dependency in &spec.requires {
                if *dependency == spec.id {
                    return Err(PipelineError::Definition(format!(
                        "stage '{}' requires itself",
                        spec.id
                    )));
                }
                if !seen.contains(dependency) {
                    return Err(PipelineError::Definition(format!(
                        "stage '{}' requires '{}', which does not run before it",
                        spec.id, dependency
                    )));
                }
            }
            if !seen.insert(spec.id) {
                return Err(PipelineError::Definition(format!(
                    "stage '{}' is listed more than once",
                    spec.id
                )));
            }
        }
        Ok(Self { stages })
    }

    /// The production order: match, validate, generate, review, decide, submit.
    pub fn standard() -> Result<Self, PipelineError> {
        use StageId::*;

        Self::new(vec![
            StageSpec::new(JobMatcher, &[]),
            StageSpec::new(SalaryValidator, &[JobMatcher]),
            StageSpec::new(CvTailor, &[JobMatcher]),
            StageSpec::new(CoverLetterWriter, &[CvTailor]),
            StageSpec::new(Qa, &[CvTailor, CoverLetterWriter]),
            StageSpec::new(
                Orchestrator,
                &[JobMatcher, SalaryValidator, CvTailor, CoverLetterWriter, Qa],
            ),
            StageSpec::new(Submission, &[Orchestrator, CvTailor, CoverLetterWriter]),
        ])
    }

    pub fn stage_ids(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.iter().map(|s| s.id)
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.iter().any(|s| s.id == stage)
    }

    /// Declared upstream stages of `stage`; empty if the stage is not part of this pipeline.
    pub fn requirements(&self, stage: StageId) -> &[StageId] {
        self.stages
            .iter()
            .find(|s| s.id == stage)
            .map(|s| s.requires.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StageId::*;

    #[test]
    fn test_standard_definition_is_valid_and_ordered() {
        let definition = PipelineDefinition::standard().unwrap();
        assert_eq!(
            definition.stage_ids().collect::<Vec<_>>(),
            StageId::ALL.to_vec()
        );
        assert_eq!(
            definition.requirements(Orchestrator),
            &[JobMatcher, SalaryValidator, CvTailor, CoverLetterWriter, Qa]
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelineDefinition::new(vec![
            StageSpec::new(JobMatcher, &[]),
            StageSpec::new(JobMatcher, &[]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_forward_requirement_rejected() {
        let err = PipelineDefinition::new(vec![
            StageSpec::new(Qa, &[CvTailor]),
            StageSpec::new(CvTailor, &[]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("does not run before it"));
    }

    #[test]
    fn test_self_requirement_rejected() {
        assert!(PipelineDefinition::new(vec![StageSpec::new(Qa, &[Qa])]).is_err());
    }

    #[test]
    fn test_requirements_of_absent_stage_is_empty() {
        let definition =
            PipelineDefinition::new(vec![StageSpec::new(JobMatcher, &[])]).unwrap();
        assert!(definition.requirements(Orchestrator).is_empty());
        assert!(!definition.contains(Orchestrator));
    }
}
