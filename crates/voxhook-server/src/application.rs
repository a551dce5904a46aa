//! Applications: one webhook endpoint with its caches, responders and
//! observers.

use crate::callbacks::{Observers, RequestEvent, ResponseEvent};
use crate::config::ApplicationConfig;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use voxhook_cache::{BoxError, CacheError, FunctionCache, ToolDefinition};
use voxhook_types::{AssistantId, CacheKey, CacheKind, RequestType, SessionId};

/// Builds the assistant configuration for an `assistant-request`.
pub type AssistantResponder =
    Arc<dyn Fn(&AssistantRequestContext) -> Result<Value, BoxError> + Send + Sync>;

/// Resolves the destination for a `transfer-destination-request`.
pub type TransferResponder = Arc<dyn Fn(&Value) -> Result<Value, BoxError> + Send + Sync>;

/// One configured webhook endpoint.
///
/// Each application owns its own tool-call and function caches and its own
/// observers. Applications are created at startup and live for the process.
pub struct Application {
    config: ApplicationConfig,
    tool_cache: FunctionCache,
    function_cache: FunctionCache,
    assistant_responder: Option<AssistantResponder>,
    transfer_responder: Option<TransferResponder>,
    observers: Observers,
}

impl Application {
    pub fn new(config: ApplicationConfig) -> Self {
        Self {
            config,
            tool_cache: FunctionCache::new(CacheKind::ToolCall),
            function_cache: FunctionCache::new(CacheKind::Function),
            assistant_responder: None,
            transfer_responder: None,
            observers: Observers::new(),
        }
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn server_path(&self) -> &str {
        &self.config.server_path
    }

    pub fn tool_cache(&self) -> &FunctionCache {
        &self.tool_cache
    }

    pub fn function_cache(&self) -> &FunctionCache {
        &self.function_cache
    }

    pub fn cache(&self, kind: CacheKind) -> &FunctionCache {
        match kind {
            CacheKind::ToolCall => &self.tool_cache,
            CacheKind::Function => &self.function_cache,
        }
    }

    /// Both caches, tool calls first.
    pub fn caches(&self) -> [&FunctionCache; 2] {
        [&self.tool_cache, &self.function_cache]
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn assistant_responder(&self) -> Option<&AssistantResponder> {
        self.assistant_responder.as_ref()
    }

    pub fn transfer_responder(&self) -> Option<&TransferResponder> {
        self.transfer_responder.as_ref()
    }

    /// Sets the callback that answers `assistant-request` messages.
    pub fn on_assistant_request<F>(mut self, responder: F) -> Self
    where
        F: Fn(&AssistantRequestContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.assistant_responder = Some(Arc::new(responder));
        self
    }

    /// Sets the callback that answers `transfer-destination-request` messages.
    pub fn on_transfer_destination_request<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.transfer_responder = Some(Arc::new(responder));
        self
    }

    pub fn on_all_requests<F, Fut>(mut self, observer: F) -> Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_all_requests(observer);
        self
    }

    pub fn on_request<F, Fut>(mut self, request_type: RequestType, observer: F) -> Self
    where
        F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_request(request_type, observer);
        self
    }

    pub fn on_all_responses<F, Fut>(mut self, observer: F) -> Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_all_responses(observer);
        self
    }

    pub fn on_response<F, Fut>(mut self, request_type: RequestType, observer: F) -> Self
    where
        F: Fn(ResponseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.observers.on_response(request_type, observer);
        self
    }

    /// Removes every cache entry for `session`. Returns how many were removed.
    pub fn remove_session(&self, session: &SessionId) -> usize {
        self.caches()
            .into_iter()
            .map(|cache| {
                cache.remove_session(session, |info| {
                    tracing::debug!(
                        kind = %cache.kind(),
                        key = %info.key(),
                        functions = info.len(),
                        "removed cache entry at end of call"
                    );
                })
            })
            .sum()
    }

    /// JSON snapshot of both caches.
    pub fn caches_as_json(&self) -> Value {
        serde_json::json!({
            "serverPath": self.server_path(),
            "toolCallCache": self.tool_cache.to_json(),
            "functionCache": self.function_cache.to_json(),
        })
    }
}

/// What an assistant responder sees while building a configuration.
///
/// Tools and functions registered here land in the application's caches
/// under this request's session id.
pub struct AssistantRequestContext {
    application: Arc<Application>,
    request: Arc<Value>,
    session_id: SessionId,
}

impl AssistantRequestContext {
    pub fn new(application: Arc<Application>, request: Arc<Value>, session_id: SessionId) -> Self {
        Self {
            application,
            request,
            session_id,
        }
    }

    /// The full inbound payload.
    pub fn request(&self) -> &Value {
        &self.request
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn server_path(&self) -> &str {
        self.application.server_path()
    }

    /// Registers a tool invoked through `tool-calls` messages.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyDeclared`] if the assistant already has a
    /// tool with this name in this session.
    pub fn add_tool(&self, assistant: AssistantId, tool: ToolDefinition) -> Result<(), CacheError> {
        self.application
            .tool_cache
            .add(self.key(assistant), tool)
    }

    /// Registers a function invoked through `function-call` messages.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyDeclared`] if the assistant already has a
    /// function with this name in this session.
    pub fn add_function(
        &self,
        assistant: AssistantId,
        function: ToolDefinition,
    ) -> Result<(), CacheError> {
        self.application
            .function_cache
            .add(self.key(assistant), function)
    }

    fn key(&self, assistant: AssistantId) -> CacheKey {
        CacheKey::new(self.session_id.clone(), assistant)
    }
}
