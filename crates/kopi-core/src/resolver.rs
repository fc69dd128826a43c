//! Slot resolver: merges freshly extracted slots with conversation memory.
//!
//! This is where multi-turn slot filling happens. A recognized intent switch
//! discards the previous intent's slots (no cross-intent leakage); an
//! `unknown` parse while a clarification question is outstanding treats the
//! raw utterance as the answer to that question; otherwise new slot values
//! simply overwrite old ones, most recent turn wins.

use crate::dialogue::ConversationState;
use crate::schema::{SchemaError, SchemaRegistry, SlotGap};
use crate::shared::{ConversationStatus, Intent, ParsedIntent};

/// Outcome of resolving one turn against state: either a remaining gap to ask
/// about, or nothing, in which case the pending intent is ready to dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub gap: Option<SlotGap>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotResolver {
    registry: SchemaRegistry,
}

impl SlotResolver {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Fold this turn's parse into `state` and report what is still missing.
    ///
    /// `raw_utterance` is only consulted on the follow-up path: when the
    /// classifier saw nothing but a clarification question is outstanding, the
    /// bare utterance is the best-effort answer to it.
    pub fn resolve(
        &self,
        parsed: &ParsedIntent,
        state: &mut ConversationState,
        raw_utterance: &str,
    ) -> Result<Resolution, SchemaError> {
        // 1. Intent switch: fresh slot set for the new intent.
        if parsed.intent != Intent::Unknown && state.pending_intent != Some(parsed.intent) {
            state.slots.clear();
            state.pending_intent = Some(parsed.intent);
        }

        let Some(pending) = state.pending_intent else {
            // Nothing pending and nothing recognized; there are no slots to fill.
            return Ok(Resolution { gap: None });
        };
        let schema = self.registry.schema_for(pending)?;

        // 2. Follow-up continuation: the utterance answers the outstanding
        //    clarification question.
        if parsed.intent == Intent::Unknown && state.status == ConversationStatus::AwaitingSlot {
            if let Some(gap) = schema.first_gap(&state.slots) {
                let answer = raw_utterance.trim();
                if !answer.is_empty() {
                    state
                        .slots
                        .insert(gap.fill_target().to_string(), answer.to_string());
                }
            }
        }

        // 3. Merge extracted slots; undeclared keys never enter state.
        for (key, value) in &parsed.slots {
            if schema.declares(key) {
                state.slots.insert(key.clone(), value.clone());
            } else {
                tracing::debug!(target: "kopi::resolver", slot = %key, intent = pending.as_str(), "dropping undeclared slot");
            }
        }

        Ok(Resolution {
            gap: schema.first_gap(&state.slots),
        })
    }
}
