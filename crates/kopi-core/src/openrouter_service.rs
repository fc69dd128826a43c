//! Intent classification via OpenRouter.
//!
//! The classifier sends one chat completion per utterance with a fixed
//! instruction template and expects a JSON object `{"intent": ..., "slots": {...}}`
//! back. The upstream model guarantees nothing, so the reply goes through a
//! strict parse-then-validate boundary: any malformed JSON, unknown intent
//! label, wrong slot shape, empty reply, or transport error degrades to
//! `ParsedIntent::unknown()` instead of propagating. A flaky model must never
//! crash the dialogue.
//!
//! API key: `OPENROUTER_API_KEY` in `.env`. Default model:
//! `meta-llama/llama-3.3-70b-instruct`.

use crate::shared::{Intent, ParsedIntent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

/// Instruction template with supported-intent examples to bias the model
/// toward the expected JSON shape.
const INTENT_PROMPT: &str = r#"You are an AI assistant that extracts structured intent and slot data from natural language queries.
Respond ONLY in valid JSON format:
{
  "intent": "<intent_name>",
  "slots": {
    "<slot1>": "...",
    "<slot2>": "..."
  }
}

Supported intents:
- find_outlet
- get_opening_hours
- calculate
- greeting
- unknown

Examples:

User: "Where's the ZUS outlet in Petaling Jaya?"
{
  "intent": "find_outlet",
  "slots": {
    "location": "Petaling Jaya"
  }
}

User: "SS2 outlet opening hours?"
{
  "intent": "get_opening_hours",
  "slots": {
    "outlet": "SS2"
  }
}

User: "What is 12 * (5 + 2)?"
{
  "intent": "calculate",
  "slots": {
    "expression": "12 * (5 + 2)"
  }
}

Now parse the following user input.

User: "{user_input}"
"#;

/// Internal failure taxonomy for one classification attempt. Never crosses the
/// adapter boundary; logged at `warn` and converted to the unknown fallback.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("classifier returned no content")]
    EmptyReply,
    #[error("classifier reply is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("classifier emitted unknown intent label '{0}'")]
    UnknownIntentLabel(String),
    #[error("classifier slot '{0}' is not a string")]
    BadSlotShape(String),
}

// OpenAI-compatible request/response for OpenRouter
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Loosely-shaped wire form of the classifier reply, before validation.
#[derive(Deserialize)]
struct RawParsedIntent {
    intent: String,
    #[serde(default)]
    slots: serde_json::Map<String, serde_json::Value>,
}

/// Seam between the dialogue engine and whatever produces `ParsedIntent`s.
/// Infallible by contract: implementations absorb their own failures.
#[async_trait::async_trait]
pub trait IntentParser: Send + Sync {
    async fn parse_intent(&self, utterance: &str) -> ParsedIntent;
}

/// Production classifier backed by OpenRouter. One outbound call per
/// invocation, no retries; a deployment timeout counts as any other failure.
pub struct OpenRouterClassifier {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterClassifier {
    /// Create a classifier from the environment (`OPENROUTER_API_KEY`,
    /// optional `OPENROUTER_API_BASE`). Returns `None` if no key is set.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENROUTER_API_KEY").ok()?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        let base = std::env::var("OPENROUTER_API_BASE")
            .unwrap_or_else(|_| OPENROUTER_API_BASE.to_string());
        Some(Self::new(key).with_base_url(&base))
    }

    /// Create a classifier with an explicit API key.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_API_BASE.to_string(),
            client,
        }
    }

    /// Set the model (e.g. `meta-llama/llama-3.3-70b-instruct`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Override the API base URL (tests, self-hosted proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// One chat completion round-trip. Fallible; `parse_intent` absorbs the
    /// error into the unknown fallback.
    async fn complete(&self, utterance: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = INTENT_PROMPT.replace("{user_input}", utterance);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: Some(0.2),
            max_tokens: Some(256),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ClassifierError::Api { status, body });
        }

        let parsed: ChatResponse = res.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ClassifierError::EmptyReply);
        }
        Ok(content)
    }
}

#[async_trait::async_trait]
impl IntentParser for OpenRouterClassifier {
    async fn parse_intent(&self, utterance: &str) -> ParsedIntent {
        let reply = match self.complete(utterance).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(target: "kopi::classifier", error = %e, "classification call failed; falling back to unknown");
                return ParsedIntent::unknown();
            }
        };
        match validate_reply(&reply) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(target: "kopi::classifier", error = %e, "classifier reply rejected; falling back to unknown");
                ParsedIntent::unknown()
            }
        }
    }
}

/// Strict validation of a classifier reply: JSON object, intent within the
/// closed set, slots a string-to-string map. A Markdown code fence around the
/// JSON is tolerated since the model wraps output that way.
pub fn validate_reply(reply: &str) -> Result<ParsedIntent, ClassifierError> {
    let raw: RawParsedIntent = serde_json::from_str(strip_code_fence(reply))?;
    let intent = Intent::from_label(&raw.intent)
        .ok_or_else(|| ClassifierError::UnknownIntentLabel(raw.intent.clone()))?;
    let mut slots = BTreeMap::new();
    for (key, value) in raw.slots {
        match value {
            serde_json::Value::String(s) => {
                slots.insert(key, s);
            }
            _ => return Err(ClassifierError::BadSlotShape(key)),
        }
    }
    Ok(ParsedIntent { intent, slots })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's info string (e.g. ```json) and the closing fence.
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().trim_end_matches("```").trim()
}
