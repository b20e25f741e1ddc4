//! The definition type-tag universe.
//!
//! Every object in a definition tree that is itself a node carries a `type`
//! field whose value must be one of the tags below. Anything else is an
//! `UnknownNodeType` failure at compile time.

use serde::{Deserialize, Serialize};

/// Family a tag is routed to. Routing order is deterministic:
/// Structure, then Logic, then Expression, then Transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFamily {
    Structure,
    Logic,
    Expression,
    Transition,
}

/// Known definition type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefTag {
    // Structure
    Journey,
    Step,
    Block,

    // Logic
    Conditional,
    Test,
    And,
    Or,
    Xor,
    Not,

    // Expression
    Reference,
    Format,
    Pipeline,
    Collection,
    Iterate,
    Validation,
    Next,
    Condition,
    Transformer,
    Effect,
    Generator,

    // Transition
    Load,
    Access,
    Action,
    Submit,
}

impl DefTag {
    /// All known tags, in routing order.
    pub const ALL: [Self; 24] = [
        Self::Journey,
        Self::Step,
        Self::Block,
        Self::Conditional,
        Self::Test,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Not,
        Self::Reference,
        Self::Format,
        Self::Pipeline,
        Self::Collection,
        Self::Iterate,
        Self::Validation,
        Self::Next,
        Self::Condition,
        Self::Transformer,
        Self::Effect,
        Self::Generator,
        Self::Load,
        Self::Access,
        Self::Action,
        Self::Submit,
    ];

    /// Parse a raw `type` value. Returns `None` for tags outside the universe.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == tag)
    }

    /// The tag's wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Journey => "JOURNEY",
            Self::Step => "STEP",
            Self::Block => "BLOCK",
            Self::Conditional => "CONDITIONAL",
            Self::Test => "TEST",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::Reference => "REFERENCE",
            Self::Format => "FORMAT",
            Self::Pipeline => "PIPELINE",
            Self::Collection => "COLLECTION",
            Self::Iterate => "ITERATE",
            Self::Validation => "VALIDATION",
            Self::Next => "NEXT",
            Self::Condition => "CONDITION",
            Self::Transformer => "TRANSFORMER",
            Self::Effect => "EFFECT",
            Self::Generator => "GENERATOR",
            Self::Load => "LOAD",
            Self::Access => "ACCESS",
            Self::Action => "ACTION",
            Self::Submit => "SUBMIT",
        }
    }

    /// The family this tag routes to.
    #[must_use]
    pub const fn family(self) -> TagFamily {
        match self {
            Self::Journey | Self::Step | Self::Block => TagFamily::Structure,
            Self::Conditional | Self::Test | Self::And | Self::Or | Self::Xor | Self::Not => {
                TagFamily::Logic
            }
            Self::Reference
            | Self::Format
            | Self::Pipeline
            | Self::Collection
            | Self::Iterate
            | Self::Validation
            | Self::Next
            | Self::Condition
            | Self::Transformer
            | Self::Effect
            | Self::Generator => TagFamily::Expression,
            Self::Load | Self::Access | Self::Action | Self::Submit => TagFamily::Transition,
        }
    }
}
