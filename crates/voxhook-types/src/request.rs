//! Webhook request classification.

use serde::{Deserialize, Serialize};

/// The classified type of an inbound webhook payload.
///
/// Classification is driven by the `message.type` discriminator. Values the
/// server does not recognise map to [`RequestType::Unknown`] rather than an
/// error, since the platform adds new message types over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    AssistantRequest,
    ToolCalls,
    FunctionCall,
    EndOfCallReport,
    TransferDestinationRequest,
    StatusUpdate,
    ConversationUpdate,
    Hang,
    SpeechUpdate,
    Transcript,
    UserInterrupted,
    PhoneCallControl,
    VoiceInput,
    ModelOutput,
    KnowledgeBaseRequest,
    Unknown,
}

impl RequestType {
    /// Every variant, in declaration order.
    pub const ALL: [RequestType; 16] = [
        Self::AssistantRequest,
        Self::ToolCalls,
        Self::FunctionCall,
        Self::EndOfCallReport,
        Self::TransferDestinationRequest,
        Self::StatusUpdate,
        Self::ConversationUpdate,
        Self::Hang,
        Self::SpeechUpdate,
        Self::Transcript,
        Self::UserInterrupted,
        Self::PhoneCallControl,
        Self::VoiceInput,
        Self::ModelOutput,
        Self::KnowledgeBaseRequest,
        Self::Unknown,
    ];

    /// Returns the wire discriminator for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssistantRequest => "assistant-request",
            Self::ToolCalls => "tool-calls",
            Self::FunctionCall => "function-call",
            Self::EndOfCallReport => "end-of-call-report",
            Self::TransferDestinationRequest => "transfer-destination-request",
            Self::StatusUpdate => "status-update",
            Self::ConversationUpdate => "conversation-update",
            Self::Hang => "hang",
            Self::SpeechUpdate => "speech-update",
            Self::Transcript => "transcript",
            Self::UserInterrupted => "user-interrupted",
            Self::PhoneCallControl => "phone-call-control",
            Self::VoiceInput => "voice-input",
            Self::ModelOutput => "model-output",
            Self::KnowledgeBaseRequest => "knowledge-base-request",
            Self::Unknown => "unknown",
        }
    }

    /// Classifies a discriminator value, falling back to `Unknown`.
    pub fn classify(discriminator: Option<&str>) -> Self {
        discriminator
            .and_then(|value| value.parse().ok())
            .unwrap_or(Self::Unknown)
    }

    /// Classifies a full webhook payload by its `message.type` field.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        Self::classify(
            payload
                .get("message")
                .and_then(|message| message.get("type"))
                .and_then(|value| value.as_str()),
        )
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = ParseRequestTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| *kind != Self::Unknown)
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseRequestTypeError(s.to_string()))
    }
}

/// Error returned when parsing an unknown request type string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown request type: {0}")]
pub struct ParseRequestTypeError(pub String);

/// The two independently keyed caches each application owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheKind {
    /// Tools invoked through `tool-calls` messages.
    ToolCall,
    /// Functions invoked through `function-call` messages.
    Function,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "toolCall",
            Self::Function => "function",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle stage a callback event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Request,
    Response,
}
