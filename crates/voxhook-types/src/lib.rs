//! Shared types and constants for the voxhook workspace.
//!
//! This crate provides the vocabulary used by both the invocation cache and
//! the webhook server: session and assistant identifiers, the composite
//! [`CacheKey`], the classified [`RequestType`] of an inbound webhook, and
//! the header and metadata names exchanged with the voice platform.
//!
//! Nothing here depends on the other workspace crates, which keeps the
//! dependency graph acyclic.

use serde::{Deserialize, Serialize};
use std::fmt;

mod request;
pub use request::{CacheKind, EventKind, ParseRequestTypeError, RequestType};

/// Header carrying the shared secret on every webhook POST.
pub const SECRET_HEADER: &str = "x-vapi-secret";

/// Assistant metadata key used to route tool calls back to the assistant that
/// declared them.
pub const ASSISTANT_ID_METADATA_KEY: &str = "x-voxhook-assistant-id";

/// Assistant id used when a configuration declares a single, unnamed assistant.
pub const DEFAULT_ASSISTANT_ID: &str = "default";

/// Identifier of one ongoing call (the platform's `call.id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of one assistant declared inside a session's configuration.
///
/// A session may reference several assistants through squads or overrides,
/// so tools are scoped per assistant as well as per session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssistantId(String);

impl AssistantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AssistantId {
    fn default() -> Self {
        Self::new(DEFAULT_ASSISTANT_ID)
    }
}

impl fmt::Display for AssistantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssistantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Composite identity of a cache entry.
///
/// Two keys are equal iff both the session and the assistant match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(rename = "assistantId")]
    pub assistant_id: AssistantId,
}

impl CacheKey {
    pub fn new(session_id: SessionId, assistant_id: AssistantId) -> Self {
        Self {
            session_id,
            assistant_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.assistant_id)
    }
}
