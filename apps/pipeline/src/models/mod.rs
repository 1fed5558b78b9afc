pub mod application;
pub mod job;
pub mod stage;

pub use application::{
    stage_entry_status, ApplicationRecord, ApplicationStatus, ErrorInfo, SubmissionMethod,
};
pub use job::JobRecord;
pub use stage::{
    CoverLetterOutput, CvOutput, MatchOutput, QaOutput, SalaryOutput, SalaryPeriod, SalarySource,
    StageId, StageOutput, StageOutputs, SubmissionOutput,
};
