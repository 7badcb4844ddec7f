//! ---
//! ems_section: "09-ai-governance-advisory"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Governance advisory client and insight persistence."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Throttled client for the generative-text governance advisory.
//!
//! [`AdvisoryClient::get_advice`] never returns an error. Live calls are
//! spaced at least one throttle window apart; calls landing inside the
//! window are dropped (not queued) and answered from the persisted insight
//! slot. Failures degrade along a ladder: a quota/rate-limit signal falls
//! back to the persisted text, anything else to a fixed baseline string.

pub mod store;

use std::time::{Duration, Instant};

use gridsight_common::config::AdvisoryConfig;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

pub use store::{InsightStore, StoreError, INSIGHT_KEY};

/// Shown when the throttle fires before any advisory has been persisted.
pub const SYNTHESIZING_PLACEHOLDER: &str = "Synthesizing real-time telemetry...";
/// Shown on quota exhaustion when no advisory has been persisted.
pub const NOMINAL_PLACEHOLDER: &str =
    "System metrics nominal. AI governance engine awaiting next cycle.";
/// Fixed text for unclassified advisory failures.
pub const BASELINE_FALLBACK: &str =
    "Neural link established. Baseline governance protocols active.";

/// Coarse classification attached to every advisory result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryStatus {
    /// Served from the local throttle path (cached or placeholder text).
    Active,
    /// The upstream quota is exhausted; text is the last known insight.
    Limited,
    /// Unclassified failure; text is the fixed baseline.
    Error,
    /// Fresh completion from the live model.
    Pro,
}

/// A governance recommendation plus its provenance classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub text: String,
    pub status: AdvisoryStatus,
}

/// Errors raised while constructing an [`AdvisoryClient`].
#[derive(Debug, thiserror::Error)]
pub enum AdvisoryError {
    #[error("invalid advisory base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("advisory endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("no completion text in response")]
    MissingCompletion,
    #[error("advisory api key not configured")]
    MissingApiKey,
}

impl RequestError {
    /// The upstream signals quota exhaustion either as HTTP 429 or as an
    /// error message mentioning "quota"/"429".
    fn is_rate_limited(&self) -> bool {
        match self {
            RequestError::Status { status, body } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || body.contains("quota")
                    || body.contains("429")
            }
            RequestError::Transport(err) => {
                let message = err.to_string();
                message.contains("quota") || message.contains("429")
            }
            RequestError::MissingCompletion | RequestError::MissingApiKey => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

/// Client for the generateContent advisory endpoint.
///
/// Throttle timestamp and insight slot are owned by the instance (not
/// process globals), so concurrent instances cannot interfere and the
/// check-then-act throttle decision is serialised by the mutex.
pub struct AdvisoryClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    throttle_window: Duration,
    last_request: Mutex<Option<Instant>>,
    store: InsightStore,
}

impl AdvisoryClient {
    pub fn new(config: &AdvisoryConfig, api_key: Option<String>) -> Result<Self, AdvisoryError> {
        let base = Url::parse(&config.base_url)?;
        let endpoint = base.join(&format!("v1beta/models/{}:generateContent", config.model))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
            throttle_window: config.throttle_window,
            last_request: Mutex::new(None),
            store: InsightStore::new(&config.insight_path),
        })
    }

    /// The persisted last-known insight, if any. Used by the presentation
    /// surface as its initial displayed text.
    pub fn persisted_insight(&self) -> Option<String> {
        self.store.load()
    }

    /// Request a governance recommendation for the supplied figures.
    ///
    /// Calls landing inside the throttle window are answered locally with
    /// status [`AdvisoryStatus::Active`] and no network traffic.
    pub async fn get_advice(&self, energy_used: f64, prediction: f64, budget: f64) -> Advisory {
        {
            let mut last = self.last_request.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.throttle_window {
                    debug!("advisory request dropped by local throttle");
                    return Advisory {
                        text: self
                            .store
                            .load()
                            .unwrap_or_else(|| SYNTHESIZING_PLACEHOLDER.to_owned()),
                        status: AdvisoryStatus::Active,
                    };
                }
            }
            *last = Some(Instant::now());
        }

        let prompt = compose_prompt(energy_used, prediction, budget);
        match self.request_completion(&prompt).await {
            Ok(raw) => {
                let text = raw.trim().to_owned();
                if let Err(err) = self.store.save(&text) {
                    warn!(error = %err, "failed to persist advisory text");
                }
                Advisory {
                    text,
                    status: AdvisoryStatus::Pro,
                }
            }
            Err(err) if err.is_rate_limited() => {
                warn!(error = %err, "advisory quota exhausted; serving last known insight");
                Advisory {
                    text: self
                        .store
                        .load()
                        .unwrap_or_else(|| NOMINAL_PLACEHOLDER.to_owned()),
                    status: AdvisoryStatus::Limited,
                }
            }
            Err(err) => {
                warn!(error = %err, "advisory request failed");
                Advisory {
                    text: BASELINE_FALLBACK.to_owned(),
                    status: AdvisoryStatus::Error,
                }
            }
        }
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, RequestError> {
        let api_key = self.api_key.as_deref().ok_or(RequestError::MissingApiKey)?;
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Status { status, body });
        }
        let decoded: GenerateResponse = response.json().await?;
        decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or(RequestError::MissingCompletion)
    }
}

/// Compose the natural-language prompt sent to the model. Energy and
/// projection are rendered to two decimals, the budget as configured.
pub fn compose_prompt(energy_used: f64, prediction: f64, budget: f64) -> String {
    let status_line = if prediction > budget {
        "CRITICAL VARIANCE DETECTED (High Risk of Budget Overflow)"
    } else {
        "OPTIMAL PERFORMANCE (Within Sustainability Threshold)"
    };
    format!(
        "Act as an AI Strategic Energy Governance Engine.\n\
         \n\
         Current Metrics:\n\
         - Real-time Consumption: {energy_used:.2} kWh\n\
         - Projected Monthly usage: {prediction:.2} kWh\n\
         - Budget Threshold: {budget} kWh\n\
         \n\
         Current Status: {status_line}\n\
         \n\
         Task: Provide a high-impact, professional governance recommendation \
         (max 20 words) for a technical review. Focus on load optimization \
         and institutional scalability."
    )
}
