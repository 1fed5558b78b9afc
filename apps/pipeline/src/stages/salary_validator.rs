//! Salary validator: a non-blocking stage.
//!
//! The stage always succeeds. Whether the rate meets the minimum, exceeds the maximum or could
//! not be found at all is carried only in its output for the orchestrator to weigh.
//!
//! Extraction waterfall: structured `salary` field, then the text-generation capability over
//! the description, then "missing".

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SalaryBounds;
use crate::errors::StageError;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::models::{SalaryOutput, SalaryPeriod, SalarySource, StageId, StageOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{SALARY_EXTRACT_PROMPT_TEMPLATE, SALARY_EXTRACT_SYSTEM};

pub const WORKING_DAYS_PER_YEAR: f64 = 230.0;
pub const HOURS_PER_DAY: f64 = 8.0;

/// Parses the first amount in a pay string. Ranges resolve to their lower bound.
///
/// Currency symbols, thousands separators and whitespace are ignored; a `k` suffix
/// multiplies by 1000. Returns `None` when no positive amount is present.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let lowered = raw.to_lowercase();
    let lower_bound = lowered
        .split(['-', '–', '—'])
        .flat_map(|part| part.split(" to "))
        .find(|part| part.chars().any(|c| c.is_ascii_digit()))?;

    let start = lower_bound.find(|c: char| c.is_ascii_digit())?;
    let rest = &lower_bound[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .unwrap_or(rest.len());

    let number: String = rest[..end].chars().filter(|c| *c != ',').collect();
    let mut amount: f64 = number.trim_end_matches('.').parse().ok()?;

    if rest[end..].trim_start().starts_with('k') {
        amount *= 1000.0;
    }

    (amount.is_finite() && amount > 0.0).then_some(amount)
}

/// Reads a pay period from free text such as "£500 per day" or "60k p.a.".
pub fn detect_period(raw: &str) -> Option<SalaryPeriod> {
    let text = raw.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has(&["per hour", "hourly", "/hr", "/hour", "an hour"]) {
        Some(SalaryPeriod::Hourly)
    } else if has(&["per day", "daily", "/day", "a day", "p/d", "day rate"]) {
        Some(SalaryPeriod::Daily)
    } else if has(&["per month", "monthly", "/month", "pcm", "a month"]) {
        Some(SalaryPeriod::Monthly)
    } else if has(&["per annum", "annual", "p.a", "/year", "per year", "a year", "/yr"]) {
        Some(SalaryPeriod::Annual)
    } else {
        None
    }
}

fn period_from_label(label: &str) -> Option<SalaryPeriod> {
    match label.trim().to_lowercase().as_str() {
        "hourly" | "hour" | "per hour" => Some(SalaryPeriod::Hourly),
        "daily" | "day" | "per day" => Some(SalaryPeriod::Daily),
        "monthly" | "month" | "per month" => Some(SalaryPeriod::Monthly),
        "annual" | "annually" | "yearly" | "year" | "per annum" => Some(SalaryPeriod::Annual),
        _ => None,
    }
}

/// Normalises an amount for `period` to a daily rate.
pub fn to_daily(amount: f64, period: SalaryPeriod) -> f64 {
    match period {
        SalaryPeriod::Hourly => amount * HOURS_PER_DAY,
        SalaryPeriod::Daily => amount,
        SalaryPeriod::Monthly => amount * 12.0 / WORKING_DAYS_PER_YEAR,
        SalaryPeriod::Annual => amount / WORKING_DAYS_PER_YEAR,
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedSalary {
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    period: Option<String>,
}

pub struct SalaryValidatorStage {
    llm: Arc<dyn TextGenerator>,
    bounds: SalaryBounds,
}

impl SalaryValidatorStage {
    pub fn new(llm: Arc<dyn TextGenerator>, bounds: SalaryBounds) -> Self {
        Self { llm, bounds }
    }

    fn verdict(
        &self,
        amount: f64,
        period: SalaryPeriod,
        source: SalarySource,
    ) -> SalaryOutput {
        let daily = to_daily(amount, period);
        SalaryOutput {
            daily_rate: Some(daily),
            raw_amount: Some(amount),
            period: Some(period),
            source,
            meets_threshold: daily >= self.bounds.min_daily,
            missing: false,
            exceeds_maximum: daily > self.bounds.max_daily,
            minimum: self.bounds.min_daily,
            maximum: self.bounds.max_daily,
            note: None,
        }
    }

    fn missing(&self, note: impl Into<String>) -> SalaryOutput {
        SalaryOutput {
            daily_rate: None,
            raw_amount: None,
            period: None,
            source: SalarySource::Missing,
            meets_threshold: false,
            missing: true,
            exceeds_maximum: false,
            minimum: self.bounds.min_daily,
            maximum: self.bounds.max_daily,
            note: Some(note.into()),
        }
    }

    async fn extract_from_description(
        &self,
        ctx: &StageContext,
    ) -> Result<Option<(f64, SalaryPeriod)>, StageError> {
        let prompt = SALARY_EXTRACT_PROMPT_TEMPLATE.replace("{description}", &ctx.job.description);
        let text = self.llm.invoke(&prompt, SALARY_EXTRACT_SYSTEM).await?;

        let extracted = match parse_json_response::<ExtractedSalary>(&text) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Unparsable salary extraction for job {}: {e}", ctx.job.job_id);
                return Ok(None);
            }
        };

        Ok(extracted
            .amount
            .filter(|a| a.is_finite() && *a > 0.0)
            .map(|amount| {
                let period = extracted
                    .period
                    .as_deref()
                    .and_then(period_from_label)
                    .unwrap_or(SalaryPeriod::Daily);
                (amount, period)
            }))
    }
}

#[async_trait]
impl StageAgent for SalaryValidatorStage {
    fn stage(&self) -> StageId {
        StageId::SalaryValidator
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let job = &ctx.job;

        if let Some(raw) = job.salary.as_deref() {
            if let Some(amount) = parse_amount(raw) {
                let period = job
                    .salary_period
                    .or_else(|| detect_period(raw))
                    .unwrap_or(SalaryPeriod::Daily);
                let output = self.verdict(amount, period, SalarySource::Structured);
                info!(
                    "Job {} salary {raw:?} -> {:.0}/day (meets minimum: {})",
                    job.job_id,
                    output.daily_rate.unwrap_or_default(),
                    output.meets_threshold
                );
                return Ok(StageOutput::SalaryValidator(output));
            }
            debug!("Structured salary {raw:?} for job {} has no amount", job.job_id);
        }

        if job.description.trim().is_empty() {
            return Ok(StageOutput::SalaryValidator(
                self.missing("no salary field and no description"),
            ));
        }

        let output = match self.extract_from_description(ctx).await? {
            Some((amount, period)) => self.verdict(amount, period, SalarySource::Extracted),
            None => self.missing("salary not stated"),
        };
        info!(
            "Job {} salary from description: missing={}, meets minimum={}",
            job.job_id, output.missing, output.meets_threshold
        );
        Ok(StageOutput::SalaryValidator(output))
    }

    /// Any failure, including the capability being down, reports the salary as missing.
    fn recover(&self, error: &StageError) -> Option<StageOutput> {
        Some(StageOutput::SalaryValidator(
            self.missing(format!("salary extraction unavailable: {error}")),
        ))
    }
}
