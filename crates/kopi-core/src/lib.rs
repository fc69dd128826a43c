//! kopi-core: dialogue core for the outlet chatbot (intent classification,
//! slot filling, dispatch, and conversation memory).
//!
//! The gateway and tests consume everything through the re-exports below so
//! the module layout can shift without breaking the public API. The one
//! inbound surface is [`DialogueEngine::process_turn`]; the three outbound
//! seams are [`IntentParser`], [`OutletLookup`], and [`ProductAnswerer`].

mod calculator;
mod dialogue;
mod dispatch;
mod memory;
mod openrouter_service;
mod outlet_service;
mod products;
mod resolver;
mod schema;
mod shared;

// Shared data types
pub use shared::{
    ActionResult, ConversationStatus, CoreConfig, Intent, ParsedIntent, Speaker, TurnRecord,
};

// Slot schema registry (closed intent set)
pub use schema::{AnyOfGroup, SchemaError, SchemaRegistry, SlotGap, SlotSchema, SlotSpec};

// Intent classification (OpenRouter adapter + seam)
pub use openrouter_service::{validate_reply, ClassifierError, IntentParser, OpenRouterClassifier};

// Slot resolution
pub use resolver::{Resolution, SlotResolver};

// Dialogue state machine
pub use dialogue::{ConversationState, DialogueEngine, EMPTY_MESSAGE_REPLY};

// Action dispatch
pub use dispatch::{
    ActionDispatcher, GREETING_REPLY, OUTLETS_UNREACHABLE_REPLY, UNKNOWN_REPLY,
};

// Restricted arithmetic evaluator
pub use calculator::{evaluate, format_number, parse_expression, BinaryOp, EvalError, Expr, UnaryOp};

// Collaborator clients
pub use outlet_service::{LookupError, OutletApiClient, OutletLookup, OutletReply};
pub use products::{ProductAnswer, ProductAnswerer, ProductQaClient};

// Persisted conversation log
pub use memory::{ConversationLog, LogError};
