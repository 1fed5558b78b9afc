//! Shared resilience primitives for every external-facing call: per-channel sliding-window
//! rate limiting and bounded retry with a fixed backoff schedule.

pub mod rate_limiter;
pub mod retry;

use std::sync::Arc;

pub use rate_limiter::RateLimiter;
pub use retry::{RetryExecutor, RetryPolicy, Retryable};

use crate::config::RateLimitSettings;
use crate::models::SubmissionMethod;

/// One limiter per external channel, shared by every worker task using that channel.
#[derive(Debug, Clone)]
pub struct ChannelLimiters {
    pub llm: Arc<RateLimiter>,
    pub email: Arc<RateLimiter>,
    pub web_form: Arc<RateLimiter>,
}

impl ChannelLimiters {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let email = RateLimiter::new("email", settings.email.capacity, settings.email.window);
        let email = match settings.email_min_spacing {
            Some(spacing) => email.with_min_spacing(spacing),
            None => email,
        };

        Self {
            llm: Arc::new(RateLimiter::new(
                "llm",
                settings.llm.capacity,
                settings.llm.window,
            )),
            email: Arc::new(email),
            web_form: Arc::new(RateLimiter::new(
                "web_form",
                settings.web_form.capacity,
                settings.web_form.window,
            )),
        }
    }

    pub fn for_submission(&self, method: SubmissionMethod) -> &Arc<RateLimiter> {
        match method {
            SubmissionMethod::Email => &self.email,
            SubmissionMethod::WebForm => &self.web_form,
        }
    }
}
