use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::decision::DecisionThresholds;
use crate::matching::{LocationPreference, ScoringCriteria, ScoringWeights};
use crate::resilience::RetryPolicy;

const DEFAULT_SUBMISSION_ENDPOINT: &str = "http://localhost:8090/submissions";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or values are out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub submission_endpoint: String,
    pub port: u16,
    pub rust_log: String,
    pub worker_concurrency: usize,
    /// Candidate CV/profile text fed to the document stages.
    pub candidate_profile: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let lookup = |key: &str| std::env::var(key).ok();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            submission_endpoint: std::env::var("SUBMISSION_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_SUBMISSION_ENDPOINT.to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            worker_concurrency: parse_or(&lookup, "WORKER_CONCURRENCY", 4)?,
            candidate_profile: match lookup("CANDIDATE_PROFILE_PATH") {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read candidate profile at '{path}'"))?,
                None => String::new(),
            },
            pipeline: PipelineConfig::from_lookup(lookup)?,
        })
    }
}

/// Per-channel sliding-window limit.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLimit {
    pub capacity: usize,
    pub window: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSettings {
    pub llm: ChannelLimit,
    pub email: ChannelLimit,
    pub web_form: ChannelLimit,
    /// Minimum delay between successful sends on the email channel.
    pub email_min_spacing: Option<Duration>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let hour = Duration::from_secs(3600);
        Self {
            llm: ChannelLimit {
                capacity: 100,
                window: hour,
            },
            email: ChannelLimit {
                capacity: 20,
                window: hour,
            },
            web_form: ChannelLimit {
                capacity: 30,
                window: hour,
            },
            email_min_spacing: Some(Duration::from_secs(30)),
        }
    }
}

/// Acceptable salary range, expressed as a daily rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalaryBounds {
    pub min_daily: f64,
    pub max_daily: f64,
}

impl Default for SalaryBounds {
    fn default() -> Self {
        Self {
            min_daily: 500.0,
            max_daily: 1000.0,
        }
    }
}

/// Everything the pipeline core consumes. Built once and injected into each component.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub criteria: ScoringCriteria,
    pub match_threshold: f64,
    pub decision: DecisionThresholds,
    pub salary: SalaryBounds,
    pub rate_limits: RateLimitSettings,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            criteria: ScoringCriteria::default(),
            match_threshold: 0.70,
            decision: DecisionThresholds::default(),
            salary: SalaryBounds::default(),
            rate_limits: RateLimitSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads every pipeline setting through `lookup`, falling back to the documented defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PipelineConfig::default();
        let default_weights = defaults.criteria.weights;
        let default_limits = defaults.rate_limits;

        let weights = ScoringWeights {
            must_have: parse_or(&lookup, "MATCH_WEIGHT_MUST_HAVE", default_weights.must_have)?,
            strong_preference: parse_or(
                &lookup,
                "MATCH_WEIGHT_STRONG",
                default_weights.strong_preference,
            )?,
            nice_to_have: parse_or(&lookup, "MATCH_WEIGHT_NICE", default_weights.nice_to_have)?,
            location: parse_or(&lookup, "MATCH_WEIGHT_LOCATION", default_weights.location)?,
        };

        let criteria = ScoringCriteria {
            must_have: list(&lookup, "CRITERIA_MUST_HAVE"),
            strong_preference: list(&lookup, "CRITERIA_STRONG_PREFERENCE"),
            nice_to_have: list(&lookup, "CRITERIA_NICE_TO_HAVE"),
            location: LocationPreference {
                primary: list(&lookup, "CRITERIA_LOCATION_PRIMARY"),
                acceptable: list(&lookup, "CRITERIA_LOCATION_ACCEPTABLE"),
            },
            weights,
        };

        let decision = DecisionThresholds {
            auto_approve: parse_or(
                &lookup,
                "AUTO_APPROVE_THRESHOLD",
                defaults.decision.auto_approve,
            )?,
            needs_approval: parse_or(
                &lookup,
                "NEEDS_APPROVAL_THRESHOLD",
                defaults.decision.needs_approval,
            )?,
            low_confidence: parse_or(
                &lookup,
                "LOW_CONFIDENCE_THRESHOLD",
                defaults.decision.low_confidence,
            )?,
        };

        let salary = SalaryBounds {
            min_daily: parse_or(&lookup, "SALARY_MIN_DAILY", defaults.salary.min_daily)?,
            max_daily: parse_or(&lookup, "SALARY_MAX_DAILY", defaults.salary.max_daily)?,
        };

        let rate_limits = RateLimitSettings {
            llm: channel_limit(&lookup, "LLM", &default_limits.llm)?,
            email: channel_limit(&lookup, "EMAIL", &default_limits.email)?,
            web_form: channel_limit(&lookup, "WEB_FORM", &default_limits.web_form)?,
            email_min_spacing: match lookup("EMAIL_MIN_SPACING_SECS") {
                Some(raw) => {
                    let secs: u64 = parse_value("EMAIL_MIN_SPACING_SECS", &raw)?;
                    (secs > 0).then(|| Duration::from_secs(secs))
                }
                None => default_limits.email_min_spacing,
            },
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            backoff: match lookup("RETRY_BACKOFF_SECS") {
                Some(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_value::<u64>("RETRY_BACKOFF_SECS", s).map(Duration::from_secs))
                    .collect::<Result<Vec<_>>>()?,
                None => defaults.retry.backoff,
            },
        };

        let config = PipelineConfig {
            criteria,
            match_threshold: parse_or(&lookup, "MATCH_THRESHOLD", defaults.match_threshold)?,
            decision,
            salary,
            rate_limits,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.criteria.weights;
        for (name, value) in [
            ("MATCH_WEIGHT_MUST_HAVE", w.must_have),
            ("MATCH_WEIGHT_STRONG", w.strong_preference),
            ("MATCH_WEIGHT_NICE", w.nice_to_have),
            ("MATCH_WEIGHT_LOCATION", w.location),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a non-negative number, got {value}");
            }
        }

        if !(0.0..=1.0).contains(&self.match_threshold) {
            bail!("MATCH_THRESHOLD must be within [0, 1]");
        }

        let d = &self.decision;
        if ![d.needs_approval, d.auto_approve, d.low_confidence]
            .iter()
            .all(|v| v.is_finite())
        {
            bail!("decision thresholds must be finite numbers");
        }
        if !(0.0..=100.0).contains(&d.needs_approval) || !(0.0..=100.0).contains(&d.auto_approve)
        {
            bail!("decision thresholds must be within [0, 100]");
        }
        if d.needs_approval > d.auto_approve {
            bail!("NEEDS_APPROVAL_THRESHOLD must not exceed AUTO_APPROVE_THRESHOLD");
        }
        if !(0.0..=1.0).contains(&d.low_confidence) {
            bail!("LOW_CONFIDENCE_THRESHOLD must be within [0, 1]");
        }

        let salary = &self.salary;
        if !salary.min_daily.is_finite() || !salary.max_daily.is_finite() {
            bail!("SALARY_MIN_DAILY and SALARY_MAX_DAILY must be finite numbers");
        }
        if salary.min_daily < 0.0 || salary.min_daily > salary.max_daily {
            bail!("SALARY_MIN_DAILY must be non-negative and not exceed SALARY_MAX_DAILY");
        }

        for (name, limit) in [
            ("LLM", &self.rate_limits.llm),
            ("EMAIL", &self.rate_limits.email),
            ("WEB_FORM", &self.rate_limits.web_form),
        ] {
            if limit.capacity == 0 {
                bail!("{name}_RATE_CAPACITY must be at least 1");
            }
            if limit.window.is_zero() {
                bail!("{name}_RATE_WINDOW_SECS must be positive");
            }
        }

        if self.retry.max_attempts == 0 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value '{raw}'"))
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn list<F>(lookup: &F, key: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn channel_limit<F>(lookup: &F, prefix: &str, default: &ChannelLimit) -> Result<ChannelLimit>
where
    F: Fn(&str) -> Option<String>,
{
    let window_secs: u64 = parse_or(
        lookup,
        &format!("{prefix}_RATE_WINDOW_SECS"),
        default.window.as_secs(),
    )?;
    Ok(ChannelLimit {
        capacity: parse_or(lookup, &format!("{prefix}_RATE_CAPACITY"), default.capacity)?,
        window: Duration::from_secs(window_secs),
    })
}
