//! Integration test: full conversation flows through the dialogue engine with
//! deterministic stub collaborators (no network).
//!
//! ## Scenarios
//! 1. A complete `calculate` turn dispatches immediately with the right result.
//! 2. `find_outlet` with no slots asks a clarification question, then the bare
//!    follow-up answer completes the request.
//! 3. Opening-hours slots accumulate across turns instead of being discarded.
//! 4. Greetings and unrecognized turns get canned replies and touch no
//!    collaborator.
//! 5. Conversations are isolated; turns for different ids run in parallel.
//! 6. Turn history persists through the conversation log and reloads.

use kopi_core::{
    ActionDispatcher, ConversationLog, DialogueEngine, Intent, IntentParser, LookupError,
    OutletLookup, OutletReply, ParsedIntent, Speaker, EMPTY_MESSAGE_REPLY, GREETING_REPLY,
    UNKNOWN_REPLY,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Stub collaborators
// ---------------------------------------------------------------------------

/// Deterministic classifier: exact utterance -> parse, everything else Unknown.
struct ScriptedParser {
    script: BTreeMap<String, ParsedIntent>,
}

impl ScriptedParser {
    fn new(entries: &[(&str, Intent, &[(&str, &str)])]) -> Self {
        let script = entries
            .iter()
            .map(|(utterance, intent, slots)| {
                (
                    utterance.to_string(),
                    ParsedIntent {
                        intent: *intent,
                        slots: slots
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    },
                )
            })
            .collect();
        Self { script }
    }
}

#[async_trait::async_trait]
impl IntentParser for ScriptedParser {
    async fn parse_intent(&self, utterance: &str) -> ParsedIntent {
        self.script
            .get(utterance)
            .cloned()
            .unwrap_or_else(ParsedIntent::unknown)
    }
}

/// Outlet stub that records every query it receives and answers with a fixed
/// summary.
struct RecordingOutlets {
    queries: Mutex<Vec<String>>,
}

impl RecordingOutlets {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl OutletLookup for RecordingOutlets {
    async fn lookup(&self, query: &str) -> Result<OutletReply, LookupError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(OutletReply {
            summary: Some(format!("summary for: {}", query)),
            results: vec![],
        })
    }
}

fn engine_with(
    entries: &[(&str, Intent, &[(&str, &str)])],
    outlets: Arc<RecordingOutlets>,
) -> DialogueEngine {
    DialogueEngine::new(
        Arc::new(ScriptedParser::new(entries)),
        ActionDispatcher::new(outlets),
    )
}

// ===========================================================================
// 1. Calculate dispatches immediately when the expression is present
// ===========================================================================

#[tokio::test]
async fn complete_calculate_turn_dispatches() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(
        &[(
            "What is 12 * (5 + 2)?",
            Intent::Calculate,
            &[("expression", "12 * (5 + 2)")],
        )],
        outlets.clone(),
    );

    let result = engine.process_turn("alice", "What is 12 * (5 + 2)?").await;
    assert_eq!(result.response_text, "The result of `12 * (5 + 2)` is 84.");
    assert_eq!(result.dispatched_intent, Some(Intent::Calculate));
    assert!(outlets.queries().is_empty());

    let history = engine.history("alice").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].speaker, Speaker::User);
    assert_eq!(history[1].speaker, Speaker::Bot);
}

#[tokio::test]
async fn calculate_without_expression_asks_then_accepts_the_answer() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(
        &[("calculate something for me", Intent::Calculate, &[])],
        outlets,
    );

    let ask = engine.process_turn("alice", "calculate something for me").await;
    assert_eq!(
        ask.response_text,
        "Sure — what expression would you like me to calculate?"
    );
    assert_eq!(ask.dispatched_intent, None);

    // The bare follow-up is not in the script, so the classifier sees Unknown;
    // the raw utterance fills the outstanding slot.
    let answer = engine.process_turn("alice", "2 ** 10").await;
    assert_eq!(answer.response_text, "The result of `2 ** 10` is 1024.");
    assert_eq!(answer.dispatched_intent, Some(Intent::Calculate));
}

// ===========================================================================
// 2. find_outlet clarification loop
// ===========================================================================

#[tokio::test]
async fn find_outlet_with_no_slots_asks_instead_of_dispatching() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(&[("find me an outlet", Intent::FindOutlet, &[])], outlets.clone());

    let ask = engine.process_turn("alice", "find me an outlet").await;
    assert_eq!(ask.response_text, "Which outlet or area are you interested in?");
    assert_eq!(ask.dispatched_intent, None);
    assert!(outlets.queries().is_empty(), "no dispatch while a slot is missing");

    let done = engine.process_turn("alice", "Petaling Jaya").await;
    assert_eq!(done.dispatched_intent, Some(Intent::FindOutlet));
    assert_eq!(outlets.queries(), vec!["Show me outlets in Petaling Jaya"]);
}

// ===========================================================================
// 3. Slots accumulate across turns for the same intent
// ===========================================================================

#[tokio::test]
async fn opening_hours_slots_merge_across_turns() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(
        &[
            (
                "SS2 outlet opening hours?",
                Intent::GetOpeningHours,
                &[("outlet", "SS2")],
            ),
            (
                "the one in Petaling Jaya",
                Intent::GetOpeningHours,
                &[("location", "Petaling Jaya")],
            ),
        ],
        outlets.clone(),
    );

    let first = engine.process_turn("alice", "SS2 outlet opening hours?").await;
    assert_eq!(first.dispatched_intent, Some(Intent::GetOpeningHours));

    let second = engine.process_turn("alice", "the one in Petaling Jaya").await;
    assert_eq!(second.dispatched_intent, Some(Intent::GetOpeningHours));

    // The second query must carry both the remembered outlet and the new
    // location; the first turn's slot is not discarded.
    assert_eq!(
        outlets.queries(),
        vec![
            "What are the opening hours for SS2?",
            "What are the opening hours for SS2 in Petaling Jaya?",
        ]
    );
}

#[tokio::test]
async fn switching_intent_discards_the_previous_slot_set() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(
        &[
            (
                "outlets in Petaling Jaya?",
                Intent::FindOutlet,
                &[("location", "Petaling Jaya")],
            ),
            ("now calculate", Intent::Calculate, &[]),
        ],
        outlets,
    );

    engine.process_turn("alice", "outlets in Petaling Jaya?").await;
    let ask = engine.process_turn("alice", "now calculate").await;
    // If find_outlet slots leaked, calculate would have nothing to ask about
    // differently; the prompt must be the expression question.
    assert_eq!(
        ask.response_text,
        "Sure — what expression would you like me to calculate?"
    );
}

// ===========================================================================
// 4. Canned paths
// ===========================================================================

#[tokio::test]
async fn greeting_and_unknown_bypass_slot_logic() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(&[("hello there", Intent::Greeting, &[])], outlets.clone());

    let greeting = engine.process_turn("alice", "hello there").await;
    assert_eq!(greeting.response_text, GREETING_REPLY);
    assert_eq!(greeting.dispatched_intent, Some(Intent::Greeting));

    let unknown = engine.process_turn("alice", "flurble wumpus").await;
    assert_eq!(unknown.response_text, UNKNOWN_REPLY);
    assert_eq!(unknown.dispatched_intent, None);

    assert!(outlets.queries().is_empty());
}

#[tokio::test]
async fn empty_utterance_is_answered_without_a_classifier_call() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(&[], outlets);
    let result = engine.process_turn("alice", "   ").await;
    assert_eq!(result.response_text, EMPTY_MESSAGE_REPLY);
    assert!(engine.history("alice").await.is_empty());
}

// ===========================================================================
// 5. Conversation isolation and parallelism
// ===========================================================================

#[tokio::test]
async fn conversations_do_not_share_state() {
    let outlets = RecordingOutlets::new();
    let engine = engine_with(
        &[
            ("calculate for me", Intent::Calculate, &[]),
            ("hello", Intent::Greeting, &[]),
        ],
        outlets,
    );

    engine.process_turn("alice", "calculate for me").await;
    // Bob's greeting must not disturb Alice's outstanding question.
    engine.process_turn("bob", "hello").await;

    let answer = engine.process_turn("alice", "6 * 7").await;
    assert_eq!(answer.response_text, "The result of `6 * 7` is 42.");
    assert_eq!(engine.history("bob").await.len(), 2);
}

#[tokio::test]
async fn turns_for_different_conversations_run_in_parallel() {
    let outlets = RecordingOutlets::new();
    let engine = Arc::new(engine_with(
        &[(
            "What is 1 + 1?",
            Intent::Calculate,
            &[("expression", "1 + 1")],
        )],
        outlets,
    ));

    let (a, b) = tokio::join!(
        engine.process_turn("alice", "What is 1 + 1?"),
        engine.process_turn("bob", "What is 1 + 1?"),
    );
    assert_eq!(a.response_text, "The result of `1 + 1` is 2.");
    assert_eq!(b.response_text, "The result of `1 + 1` is 2.");
}

// ===========================================================================
// 6. Durable history
// ===========================================================================

#[tokio::test]
async fn turn_history_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let outlets = RecordingOutlets::new();
    let script: &[(&str, Intent, &[(&str, &str)])] =
        &[("hello", Intent::Greeting, &[])];

    {
        let log = Arc::new(ConversationLog::open_path(dir.path()).unwrap());
        let engine = DialogueEngine::new(
            Arc::new(ScriptedParser::new(script)),
            ActionDispatcher::new(outlets.clone()),
        )
        .with_log(log);
        engine.process_turn("alice", "hello").await;
    }

    // A fresh engine over the same log sees the previous turns.
    let log = Arc::new(ConversationLog::open_path(dir.path()).unwrap());
    let stored = log.load_history("alice").unwrap().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].text, "hello");
    assert_eq!(stored[1].text, GREETING_REPLY);

    let engine = DialogueEngine::new(
        Arc::new(ScriptedParser::new(script)),
        ActionDispatcher::new(outlets),
    )
    .with_log(log);
    engine.process_turn("alice", "hello").await;
    assert_eq!(engine.history("alice").await.len(), 4);
}
