//! Shared types used across the kopi crates.
//!
//! Everything here is plain data: the closed intent set, the per-turn classifier
//! output, conversation history records, and the gateway configuration. Behavior
//! lives in the schema registry, resolver, dialogue engine, and dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// -----------------------------------------------------------------------------
// Intents
// -----------------------------------------------------------------------------

/// The closed set of actions a user turn can request. The classifier may only
/// emit these five values; anything else it produces is coerced to `Unknown`
/// at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FindOutlet,
    GetOpeningHours,
    Calculate,
    Greeting,
    Unknown,
}

impl Intent {
    /// Wire label as emitted by the classifier prompt (snake_case).
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FindOutlet => "find_outlet",
            Intent::GetOpeningHours => "get_opening_hours",
            Intent::Calculate => "calculate",
            Intent::Greeting => "greeting",
            Intent::Unknown => "unknown",
        }
    }

    /// Parse a wire label. Returns `None` for anything outside the closed set.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label.trim() {
            "find_outlet" => Some(Intent::FindOutlet),
            "get_opening_hours" => Some(Intent::GetOpeningHours),
            "calculate" => Some(Intent::Calculate),
            "greeting" => Some(Intent::Greeting),
            "unknown" => Some(Intent::Unknown),
            _ => None,
        }
    }
}

/// Validated classifier output for one turn: an intent plus the slot values the
/// model extracted. Never persisted directly; the resolver merges accepted
/// fields into conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub intent: Intent,
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
}

impl ParsedIntent {
    /// The universal fallback: any classifier failure degrades to this value.
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            slots: BTreeMap::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversation history
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
}

/// One entry in the ordered turn history. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle tag for a conversation, advanced only by the dialogue engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// No pending intent.
    Idle,
    /// Intent known, at least one required slot missing; a clarification
    /// question is outstanding.
    AwaitingSlot,
    /// The last turn dispatched an action. Accumulated slots survive until the
    /// user switches intent.
    Dispatched,
}

/// Outward contract returned to the caller for each processed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub response_text: String,
    /// The intent that was actually dispatched this turn, if any. `None` for
    /// clarification prompts and unresolvable turns.
    pub dispatched_intent: Option<Intent>,
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Gateway configuration. Precedence: env `KOPI_CONFIG` path > `config/gateway.toml`
/// > defaults, with `KOPI`-prefixed environment overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity used in logs and the health endpoint.
    pub app_name: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the Sled conversation log.
    pub storage_path: String,
    /// Base URL of the outlet Text2SQL service (`GET /outlets?query=`).
    pub outlet_api_base: String,
    /// Base URL of the product RAG service (`GET /products/qa?query=`).
    pub products_api_base: String,
    /// Optional OpenRouter model override for the intent classifier.
    #[serde(default)]
    pub openrouter_model: Option<String>,
}

impl CoreConfig {
    /// Load config from file and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("KOPI_CONFIG").unwrap_or_else(|_| "config/gateway".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Kopi Gateway")?
            .set_default("port", 8001_i64)?
            .set_default("storage_path", "./data")?
            .set_default("outlet_api_base", "http://localhost:8000")?
            .set_default("products_api_base", "http://localhost:8000")?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("KOPI").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}
