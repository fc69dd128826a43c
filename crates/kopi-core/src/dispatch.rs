//! Action dispatcher: routes a fully-resolved intent and slot set to its
//! handler and normalizes whatever comes back into one response string.
//!
//! Collaborator failures stop here. The calculator's rejection becomes a
//! "couldn't evaluate" message and an unreachable outlet service becomes an
//! apologetic retry suggestion; nothing below this module ever sees them.

use crate::calculator;
use crate::outlet_service::{OutletLookup, OutletReply};
use crate::shared::{ActionResult, Intent};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const GREETING_REPLY: &str = "Hello! How can I help you today?";
pub const UNKNOWN_REPLY: &str = "I'm not sure I understand. Could you clarify your request?";
pub const OUTLETS_UNREACHABLE_REPLY: &str =
    "Sorry, I couldn't reach the outlets service right now. Please try again in a moment.";

pub struct ActionDispatcher {
    outlets: Arc<dyn OutletLookup>,
}

impl ActionDispatcher {
    pub fn new(outlets: Arc<dyn OutletLookup>) -> Self {
        Self { outlets }
    }

    /// Dispatch a complete intent. Synchronous per turn; the dialogue engine
    /// guarantees no concurrent dispatch for the same conversation.
    pub async fn dispatch(&self, intent: Intent, slots: &BTreeMap<String, String>) -> ActionResult {
        match intent {
            Intent::Calculate => self.dispatch_calculate(slots),
            Intent::FindOutlet | Intent::GetOpeningHours => {
                self.dispatch_outlets(intent, slots).await
            }
            Intent::Greeting => ActionResult {
                response_text: GREETING_REPLY.to_string(),
                dispatched_intent: Some(Intent::Greeting),
            },
            Intent::Unknown => ActionResult {
                response_text: UNKNOWN_REPLY.to_string(),
                dispatched_intent: None,
            },
        }
    }

    fn dispatch_calculate(&self, slots: &BTreeMap<String, String>) -> ActionResult {
        let Some(expression) = slots.get("expression").map(|s| s.trim()).filter(|s| !s.is_empty())
        else {
            // The engine asks for the expression before dispatching; reaching
            // here without one means the caller skipped the gap check.
            return ActionResult {
                response_text: UNKNOWN_REPLY.to_string(),
                dispatched_intent: None,
            };
        };
        match calculator::evaluate(expression) {
            Ok(value) => ActionResult {
                response_text: format!(
                    "The result of `{}` is {}.",
                    expression,
                    calculator::format_number(value)
                ),
                dispatched_intent: Some(Intent::Calculate),
            },
            Err(e) => {
                tracing::info!(target: "kopi::dispatch", expression, error = %e, "expression rejected");
                ActionResult {
                    response_text: format!("Sorry, I couldn't evaluate `{}`: {}.", expression, e),
                    dispatched_intent: Some(Intent::Calculate),
                }
            }
        }
    }

    async fn dispatch_outlets(
        &self,
        intent: Intent,
        slots: &BTreeMap<String, String>,
    ) -> ActionResult {
        let query = build_outlet_query(intent, slots);
        tracing::debug!(target: "kopi::dispatch", intent = intent.as_str(), query = %query, "forwarding outlet query");
        let response_text = match self.outlets.lookup(&query).await {
            Ok(reply) => format_outlet_reply(&reply),
            Err(e) => {
                tracing::warn!(target: "kopi::dispatch", error = %e, "outlet service unreachable");
                OUTLETS_UNREACHABLE_REPLY.to_string()
            }
        };
        ActionResult {
            response_text,
            dispatched_intent: Some(intent),
        }
    }
}

fn non_empty<'a>(slots: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    slots.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Fixed natural-language templates the outlet service was designed around.
fn build_outlet_query(intent: Intent, slots: &BTreeMap<String, String>) -> String {
    match intent {
        Intent::FindOutlet => match non_empty(slots, "location").or_else(|| non_empty(slots, "outlet")) {
            Some(locator) => format!("Show me outlets in {}", locator),
            None => "Show me all outlets.".to_string(),
        },
        Intent::GetOpeningHours => {
            let outlet = non_empty(slots, "outlet");
            let location = non_empty(slots, "location");
            match (outlet, location) {
                (Some(outlet), Some(location)) => {
                    format!("What are the opening hours for {} in {}?", outlet, location)
                }
                (Some(outlet), None) => format!("What are the opening hours for {}?", outlet),
                (None, Some(location)) => {
                    format!("What are the opening hours for outlets in {}?", location)
                }
                (None, None) => "What are the opening hours?".to_string(),
            }
        }
        _ => "Show me all outlets.".to_string(),
    }
}

fn format_outlet_reply(reply: &OutletReply) -> String {
    if let Some(summary) = reply.summary.as_ref().filter(|s| !s.trim().is_empty()) {
        return summary.clone();
    }
    if !reply.results.is_empty() {
        let lines: Vec<String> = reply.results.iter().map(|r| format!("- {}", r)).collect();
        return format!("Here are the outlets I found:\n{}", lines.join("\n"));
    }
    "No outlets found matching your query.".to_string()
}
