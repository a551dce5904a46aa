//! The webhook endpoint: classification, per-type dispatch, and the
//! REQUEST/RESPONSE callback events around each request.

use crate::api::ApiError;
use crate::application::{Application, AssistantRequestContext};
use crate::callbacks::LazyResponse;
use crate::ServerContext;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::error::Error as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use voxhook_cache::{
    panic_message, BoxError, CacheError, FunctionInfo, InvocationOutcome, ToolMessage,
};
use voxhook_types::{
    AssistantId, CacheKey, CacheKind, RequestType, SessionId, ASSISTANT_ID_METADATA_KEY,
    DEFAULT_ASSISTANT_ID,
};

/// Body of a successful webhook response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    /// Assistant configuration or transfer destination, as built by a responder.
    Json(Value),
    ToolCalls(ToolCallResponse),
    FunctionCall(FunctionCallResponse),
    Ack(Acknowledgement),
}

#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub results: Vec<ToolCallResult>,
}

/// Outcome of one entry of a `toolCallList`.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message: Vec<ToolMessage>,
}

#[derive(Debug, Serialize)]
pub struct FunctionCallResponse {
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message: Vec<ToolMessage>,
}

/// Sent for every message type that needs no answer.
#[derive(Debug, Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
    #[serde(rename = "type")]
    pub request_type: String,
}

impl Acknowledgement {
    fn new(request_type: impl Into<String>) -> Self {
        Self {
            status: "ok",
            request_type: request_type.into(),
        }
    }
}

/// Why a webhook could not be answered normally.
#[derive(Debug, Error)]
enum WebhookError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{context}")]
    Internal {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl WebhookError {
    fn internal(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Renders the error for the client. Production hides everything but
    /// client errors behind a generic 500.
    fn render(self, production: bool) -> (Response, Value) {
        match self {
            WebhookError::Api(api) if api.status().is_client_error() || production => {
                let body = api.body();
                (api.into_response(), body)
            }
            _ if production => {
                let api = ApiError::InternalServerError("internal server error".to_string());
                let body = api.body();
                (api.into_response(), body)
            }
            other => {
                let text = error_chain(&other);
                let body = serde_json::json!({ "error": text });
                (
                    (StatusCode::INTERNAL_SERVER_ERROR, text).into_response(),
                    body,
                )
            }
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Handler for `POST <server path>` of every application.
pub async fn webhook_handler(
    Extension(context): Extension<Arc<ServerContext>>,
    Extension(application): Extension<Arc<Application>>,
    body: Bytes,
) -> Response {
    if context.settings.production {
        return handle(context, application, body).await;
    }

    match AssertUnwindSafe(handle(context, application.clone(), body))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(&*payload);
            tracing::error!(
                path = application.server_path(),
                "webhook handler panicked: {}",
                message
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("handler panicked: {message}"),
            )
                .into_response()
        }
    }
}

async fn handle(
    context: Arc<ServerContext>,
    application: Arc<Application>,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(
                path = application.server_path(),
                "rejected malformed webhook body: {}",
                e
            );
            return ApiError::BadRequest(format!("malformed JSON body: {e}")).into_response();
        }
    };
    let request_type = RequestType::from_payload(&payload);
    let payload = Arc::new(payload);

    context
        .events
        .emit_request(application.clone(), request_type, payload.clone());

    let result = dispatch(&context, &application, request_type, payload).await;

    let elapsed = started.elapsed();
    context
        .metrics
        .observe_request(application.server_path(), request_type, elapsed);

    let (response, producer) = match result {
        Ok(answer) => {
            let answer = Arc::new(answer);
            let response = Json(&*answer).into_response();
            let producer: LazyResponse =
                Box::new(move || -> Result<Value, serde_json::Error> {
                    serde_json::to_value(&*answer)
                });
            (response, producer)
        }
        Err(error) => {
            tracing::warn!(
                path = application.server_path(),
                request_type = request_type.as_str(),
                "webhook failed: {}",
                error
            );
            let (response, body) = error.render(context.settings.production);
            let producer: LazyResponse =
                Box::new(move || -> Result<Value, serde_json::Error> { Ok(body) });
            (response, producer)
        }
    };

    context
        .events
        .emit_response(application, request_type, elapsed, producer);

    response
}

async fn dispatch(
    context: &ServerContext,
    application: &Arc<Application>,
    request_type: RequestType,
    payload: Arc<Value>,
) -> Result<WebhookResponse, WebhookError> {
    let production = context.settings.production;
    let message = payload.get("message").unwrap_or(&Value::Null);

    match request_type {
        RequestType::AssistantRequest => {
            let responder = application.assistant_responder().cloned().ok_or_else(|| {
                WebhookError::internal(
                    "assistant-request received",
                    "no assistant-request responder is configured",
                )
            })?;
            let session = session_id(message)?;
            let request = AssistantRequestContext::new(application.clone(), payload.clone(), session);

            let assistant = run_blocking(production, move || responder(&request))
                .await?
                .map_err(|e| WebhookError::internal("assistant-request responder failed", e))?;
            Ok(WebhookResponse::Json(stamp_assistant_id(assistant)))
        }
        RequestType::ToolCalls => {
            let key = cache_key(message)?;
            let info = application.tool_cache().get(&key).map_err(ApiError::from)?;
            let calls = message
                .get("toolCallList")
                .and_then(Value::as_array)
                .ok_or_else(|| ApiError::BadRequest("missing message.toolCallList".to_string()))?;

            let results = join_all(
                calls
                    .iter()
                    .map(|call| invoke_tool_call(context, &info, &key, call)),
            )
            .await;
            Ok(WebhookResponse::ToolCalls(ToolCallResponse { results }))
        }
        RequestType::FunctionCall => {
            let key = cache_key(message)?;
            let info = application
                .function_cache()
                .get(&key)
                .map_err(ApiError::from)?;
            let call = message
                .get("functionCall")
                .ok_or_else(|| ApiError::BadRequest("missing message.functionCall".to_string()))?;
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let parameters = call.get("parameters").cloned().unwrap_or(Value::Null);

            let outcome = invoke(context, CacheKind::Function, &info, &key, name, parameters).await;
            let (result, error) = match outcome.result {
                Ok(result) => (result, None),
                Err(error) => (String::new(), Some(error)),
            };
            Ok(WebhookResponse::FunctionCall(FunctionCallResponse {
                result,
                error,
                message: outcome.messages,
            }))
        }
        RequestType::EndOfCallReport => {
            if application.config().remove_cache_on_end_of_call_report {
                match session_id(message) {
                    Ok(session) => {
                        let removed = application.remove_session(&session);
                        tracing::debug!(session = %session, removed, "end of call cache cleanup");
                    }
                    Err(_) => {
                        tracing::warn!("end-of-call-report without a call id; nothing to clean up");
                    }
                }
            }
            Ok(WebhookResponse::Ack(Acknowledgement::new(request_type.as_str())))
        }
        RequestType::TransferDestinationRequest => match application.transfer_responder().cloned() {
            Some(responder) => {
                let request = Arc::clone(&payload);
                let destination = run_blocking(production, move || responder(&*request))
                    .await?
                    .map_err(|e| {
                        WebhookError::internal("transfer-destination responder failed", e)
                    })?;
                Ok(WebhookResponse::Json(destination))
            }
            None => {
                tracing::warn!(
                    path = application.server_path(),
                    "transfer-destination-request received but no responder is configured"
                );
                Ok(WebhookResponse::Ack(Acknowledgement::new(request_type.as_str())))
            }
        },
        RequestType::Unknown => {
            let received = message
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(RequestType::Unknown.as_str());
            tracing::debug!(received, "acknowledging unrecognised message type");
            Ok(WebhookResponse::Ack(Acknowledgement::new(received)))
        }
        other => Ok(WebhookResponse::Ack(Acknowledgement::new(other.as_str()))),
    }
}

async fn invoke_tool_call(
    context: &ServerContext,
    info: &FunctionInfo,
    key: &CacheKey,
    call: &Value,
) -> ToolCallResult {
    let tool_call_id = call
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let function = call.get("function").unwrap_or(&Value::Null);
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let outcome = match tool_arguments(function) {
        Ok(arguments) => invoke(context, CacheKind::ToolCall, info, key, &name, arguments).await,
        Err(e) => {
            context.metrics.observe_invocation(CacheKind::ToolCall, false);
            CallOutcome {
                result: Err(format!("arguments of `{name}` are not valid JSON: {e}")),
                messages: Vec::new(),
            }
        }
    };

    let (result, error) = match outcome.result {
        Ok(result) => (Some(result), None),
        Err(error) => (None, Some(error)),
    };
    ToolCallResult {
        tool_call_id,
        name,
        result,
        error,
        message: outcome.messages,
    }
}

/// `arguments` arrives either as an object or as a JSON-encoded string.
fn tool_arguments(function: &Value) -> Result<Value, serde_json::Error> {
    match function.get("arguments") {
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Ok(Value::Null),
        Some(Value::String(encoded)) => serde_json::from_str(encoded),
        Some(other) => Ok(other.clone()),
        None => Ok(Value::Null),
    }
}

struct CallOutcome {
    result: Result<String, String>,
    messages: Vec<ToolMessage>,
}

/// Looks up `name` in an entry and runs it on the blocking pool. Every
/// failure is folded into the outcome so one call never affects another.
async fn invoke(
    context: &ServerContext,
    kind: CacheKind,
    info: &FunctionInfo,
    key: &CacheKey,
    name: &str,
    arguments: Value,
) -> CallOutcome {
    let Some(details) = info.get(name) else {
        context.metrics.observe_invocation(kind, false);
        let error = CacheError::FunctionNotFound {
            kind,
            key: key.clone(),
            name: name.to_string(),
        };
        tracing::warn!(%key, "{}", error);
        return CallOutcome {
            result: Err(error.to_string()),
            messages: Vec::new(),
        };
    };

    let invocation_key = key.clone();
    let target = details.clone();
    let joined = tokio::task::spawn_blocking(move || {
        target.invoke_with_lifecycle(&invocation_key, &arguments)
    })
    .await;

    let outcome = match joined {
        Ok(InvocationOutcome { result, messages }) => CallOutcome {
            result: result.map_err(|e| e.to_string()),
            messages,
        },
        Err(e) => CallOutcome {
            result: Err(format!(
                "Error invoking method {}(): {}",
                details.qualified_name(),
                e
            )),
            messages: Vec::new(),
        },
    };

    context
        .metrics
        .observe_invocation(kind, outcome.result.is_ok());
    match &outcome.result {
        Ok(_) => tracing::debug!(%key, target_name = %details.qualified_name(), "invoked"),
        Err(error) => tracing::warn!(%key, target_name = %details.qualified_name(), "{}", error),
    }
    outcome
}

/// Runs a user responder on the blocking pool. In production a panic is
/// re-raised on the handler task; otherwise it becomes a diagnostic error.
async fn run_blocking<T, F>(production: bool, f: F) -> Result<T, WebhookError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            if production {
                std::panic::resume_unwind(payload);
            }
            Err(WebhookError::Panicked(panic_message(&*payload)))
        }
        Err(e) => Err(WebhookError::internal("blocking task did not complete", e)),
    }
}

fn session_id(message: &Value) -> Result<SessionId, ApiError> {
    message
        .get("call")
        .and_then(|call| call.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(SessionId::from)
        .ok_or_else(|| ApiError::BadRequest("missing message.call.id".to_string()))
}

fn assistant_id(message: &Value) -> AssistantId {
    message
        .get("assistant")
        .and_then(|assistant| assistant.get("metadata"))
        .and_then(|metadata| metadata.get(ASSISTANT_ID_METADATA_KEY))
        .and_then(Value::as_str)
        .map(AssistantId::from)
        .unwrap_or_default()
}

fn cache_key(message: &Value) -> Result<CacheKey, ApiError> {
    Ok(CacheKey::new(session_id(message)?, assistant_id(message)))
}

/// Marks the returned assistant with its id so later tool calls, which echo
/// the assistant back, resolve to the same cache key.
fn stamp_assistant_id(mut response: Value) -> Value {
    if let Some(assistant) = response.get_mut("assistant").and_then(Value::as_object_mut) {
        let metadata = assistant
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata
                .entry(ASSISTANT_ID_METADATA_KEY)
                .or_insert_with(|| Value::String(DEFAULT_ASSISTANT_ID.to_string()));
        }
    }
    response
}
