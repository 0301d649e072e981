//! AI-assisted completion of missing series fields
//!
//! An enricher looks at a partially filled [`Series`] and proposes values for
//! the empty fields. Proposals never overwrite what is already there.

use crate::metadata::Series;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while enriching series metadata
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The completion service answered with a non-success status
    #[error("AI request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The completion service could not be reached
    #[error("AI service error: {0}")]
    ServiceError(String),

    /// The completion was not valid JSON
    #[error("Failed to parse AI response: {reason}\n\nFull response:\n{response}")]
    ParseError { reason: String, response: String },
}

/// Series fields proposed by an enricher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesPatch(pub Series);

impl SeriesPatch {
    /// Parses the text of a completion into a patch
    ///
    /// The JSON may be wrapped in a markdown code block.
    pub fn from_completion_text(text: &str) -> Result<Self, EnrichmentError> {
        let payload = extract_code_block(text).unwrap_or(text).trim();
        serde_json::from_str::<Series>(payload)
            .map(SeriesPatch)
            .map_err(|e| EnrichmentError::ParseError {
                reason: e.to_string(),
                response: text.to_string(),
            })
    }

    /// Fills the empty fields of `series` from this patch
    pub fn apply_to(&self, series: &mut Series) {
        series.fill_missing_from(&self.0);
    }
}

/// Contents of the first ```json (or bare ```) block, if any
fn extract_code_block(text: &str) -> Option<&str> {
    let start = text
        .find("```json")
        .map(|pos| pos + "```json".len())
        .or_else(|| text.find("```").map(|pos| pos + "```".len()))?;
    let rest = &text[start..];
    rest.find("```").map(|end| &rest[..end])
}

/// Trait for services that complete missing series fields
pub trait SeriesEnricher: Send + Sync {
    /// Proposes values for the empty fields of `series`
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or answers with something that
    /// is not structured series data.
    fn enrich(&self, series: &Series) -> Result<SeriesPatch, EnrichmentError>;
}

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Enricher backed by an OpenAI-compatible chat completions endpoint
pub struct ChatCompletionEnricher {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionEnricher {
    pub fn new(base_url: &str, api_key: &str, model: Option<&str>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    /// Reads `AI_BASE_URL`, `AI_API_KEY` and `AI_MODEL`
    ///
    /// Returns `None` unless both the base URL and the key are set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("AI_BASE_URL").ok().filter(|v| !v.is_empty())?;
        let api_key = std::env::var("AI_API_KEY").ok().filter(|v| !v.is_empty())?;
        let model = std::env::var("AI_MODEL").ok().filter(|v| !v.is_empty());
        Some(Self::new(&base_url, &api_key, model.as_deref()))
    }

    fn prompt(series: &Series) -> String {
        let mut prompt = String::new();
        prompt.push_str("You are a media metadata assistant. Complete the missing fields ");
        prompt.push_str("of the JSON below. Do not invent episode details; leave unknown fields empty. ");
        prompt.push_str("Answer with strict JSON only, no explanations.\n\n");
        prompt.push_str("Fields to complete: title, originalTitle, year, plot, premiered, ");
        prompt.push_str("rating, genres[], studios[], actors[].\n\n");
        prompt.push_str("Input JSON:\n");
        prompt.push_str(&json!(series).to_string());
        prompt
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

impl SeriesEnricher for ChatCompletionEnricher {
    fn enrich(&self, series: &Series) -> Result<SeriesPatch, EnrichmentError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "Only output JSON. Do not output Markdown." },
                { "role": "user", "content": Self::prompt(series) },
            ],
            "temperature": 0.2,
        });

        debug!(model = %self.model, "requesting series completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| EnrichmentError::ServiceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Upstream {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        let completion: CompletionResponse = response
            .json()
            .map_err(|e| EnrichmentError::ServiceError(e.to_string()))?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        SeriesPatch::from_completion_text(&text)
    }
}
