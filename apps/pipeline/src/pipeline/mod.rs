pub mod agent;
pub mod definition;
pub mod runner;

pub use agent::{AgentExecutionResult, StageAgent, StageContext, StageExecutor};
pub use definition::{PipelineDefinition, StageSpec};
pub use runner::{Pipeline, ProcessSummary};
