//! Newtype identifiers for runs, agents, blocks and CMS documents.
//!
//! Agent and block names are both plain strings on the wire; wrapping them
//! keeps a `nextAgent` value from ending up where a block type is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, from_static(), as_str(),
// Display and AsRef<str>.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Creates an identifier from a non-empty literal.
            pub fn from_static(value: &'static str) -> Self {
                debug_assert!(!value.is_empty());
                Self(value.to_string())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers
// ---------------------------------------------------------------------------

/// Identifies one pipeline run.
///
/// Minted by the first stage of a chain and threaded unchanged through every
/// later handover, the run's manifest file and its snapshot directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`ContextId`] from an existing UUID (e.g. deserialised from a snapshot).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parses a hyphenated UUID string.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Handle returned by [`crate::EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a subscription handle from a raw counter value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Names a pipeline agent as used in `nextAgent` routing (e.g. `"builderAgent"`).
    AgentName
}

impl AgentName {
    /// The agent name without its `Agent` suffix, used for snapshot file names
    /// (`publisherAgent` → `publisher`).
    pub fn short_name(&self) -> &str {
        self.0
            .strip_suffix("Agent")
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.0)
    }
}

string_id! {
    /// Names a content block type (e.g. `"heroBlock"`, `"countdownBlock"`).
    BlockName
}

string_id! {
    /// Identifies a document in the CMS dataset (e.g. `"page-home"`).
    DocumentId
}
