//! Test doubles for the persistence collaborator and the text-generation capability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::llm_client::{LlmError, TextGenerator};
use crate::models::{
    ApplicationRecord, ApplicationStatus, ErrorInfo, JobRecord, StageId, StageOutputs,
    SubmissionMethod,
};
use crate::store::{ApplicationStore, StoreError};

// ────────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryStore {
    applications: Mutex<HashMap<Uuid, ApplicationRecord>>,
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
    failing_writes: AtomicBool,
    status_history: Mutex<Vec<(Uuid, ApplicationStatus)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: JobRecord) {
        self.jobs.lock().unwrap().insert(job.job_id, job);
    }

    pub fn insert_application(&self, application: ApplicationRecord) {
        self.applications
            .lock()
            .unwrap()
            .insert(application.application_id, application);
    }

    pub fn application(&self, id: Uuid) -> Option<ApplicationRecord> {
        self.applications.lock().unwrap().get(&id).cloned()
    }

    /// Makes every write fail with `StoreError::Unavailable` until switched off.
    pub fn fail_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Statuses written for `id`, in order.
    pub fn status_history(&self, id: Uuid) -> Vec<ApplicationStatus> {
        self.status_history
            .lock()
            .unwrap()
            .iter()
            .filter(|(app, _)| *app == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn write<F>(&self, id: Uuid, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        let mut applications = self.applications.lock().unwrap();
        let record = applications
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("application {id}")))?;
        mutate(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn get_application(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        Ok(self.application(application_id))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn get_stage_outputs(&self, application_id: Uuid) -> Result<StageOutputs, StoreError> {
        self.application(application_id)
            .map(|a| a.stage_outputs)
            .ok_or_else(|| StoreError::NotFound(format!("application {application_id}")))
    }

    async fn update_current_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
    ) -> Result<(), StoreError> {
        self.write(application_id, |r| r.current_stage = Some(stage))
    }

    async fn add_completed_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
        output: &Value,
    ) -> Result<(), StoreError> {
        self.write(application_id, |r| r.complete_stage(stage, output.clone()))
    }

    async fn update_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<(), StoreError> {
        self.write(application_id, |r| r.status = status)?;
        self.status_history
            .lock()
            .unwrap()
            .push((application_id, status));
        Ok(())
    }

    async fn update_error_info(
        &self,
        application_id: Uuid,
        error: Option<&ErrorInfo>,
    ) -> Result<(), StoreError> {
        self.write(application_id, |r| r.error_info = error.cloned())
    }

    async fn set_submission_method(
        &self,
        application_id: Uuid,
        method: SubmissionMethod,
    ) -> Result<(), StoreError> {
        self.write(application_id, |r| r.submission_method = Some(method))
    }
}

pub fn sample_job() -> JobRecord {
    JobRecord {
        job_id: Uuid::new_v4(),
        title: "Senior Data Engineer".to_string(),
        company: "Acme Data".to_string(),
        location: Some("London".to_string()),
        description: "We need Python, SQL and Azure Data Factory. Hybrid in London.".to_string(),
        salary: Some("£650 per day".to_string()),
        salary_period: None,
        apply_email: Some("jobs@acme.example".to_string()),
        apply_url: None,
        source_url: Some("https://jobs.example/acme/1".to_string()),
        discovered_at: Utc::now(),
    }
}

/// Inserts `sample_job()` and a fresh `discovered` application for it.
pub fn seed_application(store: &InMemoryStore) -> ApplicationRecord {
    seed_application_for(store, sample_job())
}

pub fn seed_application_for(store: &InMemoryStore, job: JobRecord) -> ApplicationRecord {
    let application = ApplicationRecord::new(job.job_id);
    store.insert_job(job);
    store.insert_application(application.clone());
    application
}

// ────────────────────────────────────────────────────────────────────────────
// Scripted text generator
// ────────────────────────────────────────────────────────────────────────────

/// Answers by system prompt. Unscripted prompts fail as a 503.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, system: &str, text: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(system.to_string(), Ok(text.into()));
        self
    }

    pub fn fail(self, system: &str, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(system.to_string(), Err(message.into()));
        self
    }

    /// Replaces the scripted answer for `system` on a shared generator.
    pub fn set(&self, system: &str, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(system.to_string(), Ok(text.into()));
    }

    /// Number of calls made with `system`.
    pub fn calls_for(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == system)
            .count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn invoke(&self, _prompt: &str, system: &str) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(system.to_string());
        match self.responses.lock().unwrap().get(system) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(LlmError::Api {
                status: 503,
                message: message.clone(),
            }),
            None => Err(LlmError::Api {
                status: 503,
                message: "no scripted response".to_string(),
            }),
        }
    }
}
