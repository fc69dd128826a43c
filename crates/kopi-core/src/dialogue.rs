//! Dialogue state machine: per-conversation state, turn processing, and the
//! ask-or-dispatch decision.
//!
//! One logical turn runs start-to-finish under that conversation's lock, so
//! state mutation is serialized per conversation id while unrelated
//! conversations proceed in parallel. The engine owns the state map
//! exclusively; nothing else mutates a `ConversationState`.

use crate::dispatch::ActionDispatcher;
use crate::memory::ConversationLog;
use crate::openrouter_service::IntentParser;
use crate::resolver::SlotResolver;
use crate::schema::SchemaRegistry;
use crate::shared::{ActionResult, ConversationStatus, Intent, ParsedIntent, Speaker, TurnRecord};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const EMPTY_MESSAGE_REPLY: &str = "I didn't receive any message from you.";

/// Everything the engine remembers about one conversation. `slots` only ever
/// holds keys declared for `pending_intent`; switching intents clears them.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub pending_intent: Option<Intent>,
    pub slots: BTreeMap<String, String>,
    pub turn_history: Vec<TurnRecord>,
    pub status: ConversationStatus,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            pending_intent: None,
            slots: BTreeMap::new(),
            turn_history: Vec::new(),
            status: ConversationStatus::Idle,
        }
    }

    fn record_turn(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turn_history.push(TurnRecord::new(speaker, text));
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the conversation map and drives each turn through classify -> resolve
/// -> ask-or-dispatch -> record.
pub struct DialogueEngine {
    parser: Arc<dyn IntentParser>,
    dispatcher: ActionDispatcher,
    resolver: SlotResolver,
    conversations: DashMap<String, Arc<Mutex<ConversationState>>>,
    log: Option<Arc<ConversationLog>>,
}

impl DialogueEngine {
    pub fn new(parser: Arc<dyn IntentParser>, dispatcher: ActionDispatcher) -> Self {
        Self {
            parser,
            dispatcher,
            resolver: SlotResolver::new(SchemaRegistry::builtin()),
            conversations: DashMap::new(),
            log: None,
        }
    }

    /// Attach a durable conversation log. Histories are reloaded on the first
    /// turn of a known conversation and saved after every turn.
    pub fn with_log(mut self, log: Arc<ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Process one user turn end-to-end and return the bot's reply.
    ///
    /// This is the whole inbound surface of the core. Turns for the same
    /// conversation id are serialized on the conversation's mutex; the only
    /// suspension points are the classifier call and the dispatch call.
    pub async fn process_turn(&self, conversation_id: &str, utterance: &str) -> ActionResult {
        let text = utterance.trim();
        if text.is_empty() {
            return ActionResult {
                response_text: EMPTY_MESSAGE_REPLY.to_string(),
                dispatched_intent: None,
            };
        }

        let state_arc = self.state_for(conversation_id);
        let mut state = state_arc.lock().await;

        let parsed = self.parser.parse_intent(text).await;
        tracing::debug!(
            target: "kopi::dialogue",
            conversation = conversation_id,
            intent = parsed.intent.as_str(),
            slots = parsed.slots.len(),
            "turn classified"
        );

        let result = if parsed.intent == Intent::Greeting {
            // Greetings bypass slot logic entirely.
            state.status = ConversationStatus::Idle;
            self.dispatcher
                .dispatch(Intent::Greeting, &BTreeMap::new())
                .await
        } else if parsed.intent == Intent::Unknown
            && state.status != ConversationStatus::AwaitingSlot
        {
            // Nothing recognized and no clarification question outstanding:
            // canned reply, never a re-dispatch of a stale intent.
            state.status = ConversationStatus::Idle;
            self.dispatcher
                .dispatch(Intent::Unknown, &BTreeMap::new())
                .await
        } else {
            self.resolve_and_dispatch(&parsed, &mut state, text).await
        };

        state.record_turn(Speaker::User, text);
        state.record_turn(Speaker::Bot, result.response_text.clone());
        self.persist(conversation_id, &state);
        result
    }

    /// Snapshot of a conversation's ordered turn history.
    pub async fn history(&self, conversation_id: &str) -> Vec<TurnRecord> {
        match self.conversations.get(conversation_id) {
            Some(state) => state.lock().await.turn_history.clone(),
            None => Vec::new(),
        }
    }

    async fn resolve_and_dispatch(
        &self,
        parsed: &ParsedIntent,
        state: &mut ConversationState,
        raw_utterance: &str,
    ) -> ActionResult {
        let resolution = match self.resolver.resolve(parsed, state, raw_utterance) {
            Ok(resolution) => resolution,
            Err(e) => {
                // Unreachable with the closed intent enum; a hit here is a
                // config defect, not user input.
                tracing::error!(target: "kopi::dialogue", error = %e, "schema lookup failed");
                return ActionResult {
                    response_text: crate::dispatch::UNKNOWN_REPLY.to_string(),
                    dispatched_intent: None,
                };
            }
        };

        match resolution.gap {
            Some(gap) => {
                state.status = ConversationStatus::AwaitingSlot;
                ActionResult {
                    response_text: gap.prompt().to_string(),
                    dispatched_intent: None,
                }
            }
            None => {
                let intent = state.pending_intent.unwrap_or(Intent::Unknown);
                let result = self.dispatcher.dispatch(intent, &state.slots).await;
                state.status = ConversationStatus::Dispatched;
                result
            }
        }
    }

    fn state_for(&self, conversation_id: &str) -> Arc<Mutex<ConversationState>> {
        if let Some(existing) = self.conversations.get(conversation_id) {
            return existing.clone();
        }
        let mut state = ConversationState::new();
        if let Some(log) = &self.log {
            match log.load_history(conversation_id) {
                Ok(Some(history)) => state.turn_history = history,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "kopi::dialogue", conversation = conversation_id, error = %e, "could not reload history")
                }
            }
        }
        self.conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .clone()
    }

    fn persist(&self, conversation_id: &str, state: &ConversationState) {
        if let Some(log) = &self.log {
            if let Err(e) = log.save_history(conversation_id, &state.turn_history) {
                // Memory loss, not a turn failure: the reply still goes out.
                tracing::warn!(target: "kopi::dialogue", conversation = conversation_id, error = %e, "could not persist history");
            }
        }
    }
}
