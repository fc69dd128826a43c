//! Slot schema registry: the static, declarative definition of every intent and
//! the parameters it needs before dispatch.
//!
//! The registry is closed and validated by construction: the tables below are
//! the single source of truth for which slot keys may ever appear in
//! conversation state. Asking for an intent outside the enumerated set is a
//! programming defect, surfaced as [`SchemaError::UnknownIntent`].

use crate::shared::Intent;
use std::collections::BTreeMap;

/// One declared slot for an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: &'static str,
    /// Individually required: dispatch is blocked while this slot is unfilled.
    pub required: bool,
    /// Clarification question emitted when this slot blocks dispatch.
    pub prompt: &'static str,
}

/// "At least one of these slots must be non-empty" constraint. Used by the
/// outlet intents, where either a location or an outlet name is enough to
/// build a lookup query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyOfGroup {
    pub names: &'static [&'static str],
    pub prompt: &'static str,
    /// Slot that receives a bare follow-up answer when the group is the single
    /// outstanding gap (multi-turn fill path).
    pub fallback: &'static str,
}

/// What still blocks dispatch for an intent given the currently filled slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotGap {
    Slot(&'static SlotSpec),
    AnyOf(&'static AnyOfGroup),
}

impl SlotGap {
    /// The clarification question to ask the user for this gap.
    pub fn prompt(&self) -> &'static str {
        match self {
            SlotGap::Slot(spec) => spec.prompt,
            SlotGap::AnyOf(group) => group.prompt,
        }
    }

    /// The slot key a bare follow-up utterance should be stored under.
    pub fn fill_target(&self) -> &'static str {
        match self {
            SlotGap::Slot(spec) => spec.name,
            SlotGap::AnyOf(group) => group.fallback,
        }
    }
}

/// Per-intent slot declaration. Slot order is declaration order, which fixes
/// the order clarification prompts are emitted in.
#[derive(Debug, Clone, Copy)]
pub struct SlotSchema {
    pub intent: Intent,
    pub slots: &'static [SlotSpec],
    pub any_of: Option<&'static AnyOfGroup>,
}

impl SlotSchema {
    /// True if `name` is declared for this intent. Conversation state only
    /// ever holds declared keys.
    pub fn declares(&self, name: &str) -> bool {
        self.slots.iter().any(|s| s.name == name)
    }

    /// First unmet requirement in declaration order, or `None` when the intent
    /// is ready to dispatch.
    pub fn first_gap(&self, filled: &BTreeMap<String, String>) -> Option<SlotGap> {
        let has = |name: &str| {
            filled
                .get(name)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false)
        };
        for spec in self.slots {
            if spec.required && !has(spec.name) {
                return Some(SlotGap::Slot(spec));
            }
        }
        if let Some(group) = self.any_of {
            if !group.names.iter().any(|n| has(n)) {
                return Some(SlotGap::AnyOf(group));
            }
        }
        None
    }

    /// True when every requirement is satisfied.
    pub fn is_complete(&self, filled: &BTreeMap<String, String>) -> bool {
        self.first_gap(filled).is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("no slot schema registered for intent '{0}'")]
    UnknownIntent(String),
}

// -----------------------------------------------------------------------------
// Static tables: the closed intent set
// -----------------------------------------------------------------------------

const OUTLET_OR_AREA_PROMPT: &str = "Which outlet or area are you interested in?";

static OUTLET_SLOTS: [SlotSpec; 2] = [
    SlotSpec {
        name: "location",
        required: false,
        prompt: OUTLET_OR_AREA_PROMPT,
    },
    SlotSpec {
        name: "outlet",
        required: false,
        prompt: OUTLET_OR_AREA_PROMPT,
    },
];

static OUTLET_ANY_OF: AnyOfGroup = AnyOfGroup {
    names: &["location", "outlet"],
    prompt: OUTLET_OR_AREA_PROMPT,
    fallback: "location",
};

static HOURS_SLOTS: [SlotSpec; 2] = [
    SlotSpec {
        name: "outlet",
        required: false,
        prompt: OUTLET_OR_AREA_PROMPT,
    },
    SlotSpec {
        name: "location",
        required: false,
        prompt: OUTLET_OR_AREA_PROMPT,
    },
];

static HOURS_ANY_OF: AnyOfGroup = AnyOfGroup {
    names: &["outlet", "location"],
    prompt: OUTLET_OR_AREA_PROMPT,
    fallback: "outlet",
};

static CALCULATE_SLOTS: [SlotSpec; 1] = [SlotSpec {
    name: "expression",
    required: true,
    prompt: "Sure — what expression would you like me to calculate?",
}];

static FIND_OUTLET_SCHEMA: SlotSchema = SlotSchema {
    intent: Intent::FindOutlet,
    slots: &OUTLET_SLOTS,
    any_of: Some(&OUTLET_ANY_OF),
};

static OPENING_HOURS_SCHEMA: SlotSchema = SlotSchema {
    intent: Intent::GetOpeningHours,
    slots: &HOURS_SLOTS,
    any_of: Some(&HOURS_ANY_OF),
};

static CALCULATE_SCHEMA: SlotSchema = SlotSchema {
    intent: Intent::Calculate,
    slots: &CALCULATE_SLOTS,
    any_of: None,
};

static GREETING_SCHEMA: SlotSchema = SlotSchema {
    intent: Intent::Greeting,
    slots: &[],
    any_of: None,
};

static UNKNOWN_SCHEMA: SlotSchema = SlotSchema {
    intent: Intent::Unknown,
    slots: &[],
    any_of: None,
};

/// Read-only registry over the static schema tables. Constructed once at
/// process start and shared by reference; no interior mutability.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn builtin() -> Self {
        SchemaRegistry
    }

    /// Look up the schema for an intent. The set is closed, so this only fails
    /// on a config/programming defect, never on user input.
    pub fn schema_for(&self, intent: Intent) -> Result<&'static SlotSchema, SchemaError> {
        match intent {
            Intent::FindOutlet => Ok(&FIND_OUTLET_SCHEMA),
            Intent::GetOpeningHours => Ok(&OPENING_HOURS_SCHEMA),
            Intent::Calculate => Ok(&CALCULATE_SCHEMA),
            Intent::Greeting => Ok(&GREETING_SCHEMA),
            Intent::Unknown => Ok(&UNKNOWN_SCHEMA),
        }
    }
}
