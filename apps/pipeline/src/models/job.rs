use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::stage::SalaryPeriod;

/// A discovered job posting, owned by the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: String,
    /// Structured salary field as scraped, e.g. "£550/day" or "65k".
    pub salary: Option<String>,
    pub salary_period: Option<SalaryPeriod>,
    pub apply_email: Option<String>,
    pub apply_url: Option<String>,
    pub source_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
}
