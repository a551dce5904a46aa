//! Invocation of a registered target.

use crate::definition::{Param, ToolArgs, ToolCall, ToolDefinition, ToolHandler, ToolLifecycle, ToolMessage};
use crate::error::{ArgumentError, InvocationCause, InvocationError};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use voxhook_types::CacheKey;

/// One registered callable plus its precomputed invocation metadata.
pub struct FunctionDetails {
    owner: String,
    method: String,
    name: String,
    description: String,
    params: Vec<Param>,
    fire_and_forget: bool,
    handler: Arc<dyn ToolHandler>,
    lifecycle: Option<Arc<dyn ToolLifecycle>>,
}

/// Result of an invocation together with any lifecycle messages.
#[derive(Debug)]
pub struct InvocationOutcome {
    pub result: Result<String, InvocationError>,
    pub messages: Vec<ToolMessage>,
}

impl From<ToolDefinition> for FunctionDetails {
    fn from(def: ToolDefinition) -> Self {
        Self {
            owner: def.owner,
            method: def.method,
            name: def.name,
            description: def.description,
            params: def.params,
            fire_and_forget: def.fire_and_forget,
            handler: def.handler,
            lifecycle: def.lifecycle,
        }
    }
}

impl FunctionDetails {
    /// Public name exposed to the platform.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_fire_and_forget(&self) -> bool {
        self.fire_and_forget
    }

    /// `Owner.method` label used in logs and diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.method)
    }

    /// Coerces `arguments` against the declared parameters, in order.
    pub fn bind(&self, arguments: &Value) -> Result<ToolArgs, ArgumentError> {
        let object = match arguments {
            Value::Object(map) => Some(map),
            // No arguments at all: fine without parameters, else the first is missing.
            Value::Null => match self.params.first() {
                Some(param) => return Err(ArgumentError::Missing(param.name.clone())),
                None => None,
            },
            _ => return Err(ArgumentError::NotAnObject),
        };

        let mut values = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = object
                .and_then(|map| map.get(&param.name))
                .ok_or_else(|| ArgumentError::Missing(param.name.clone()))?;
            values.push((param.name.clone(), param.kind.coerce(&param.name, value)?));
        }
        Ok(ToolArgs::new(values))
    }

    /// Invokes the target with JSON arguments.
    ///
    /// Fire-and-forget targets always yield an empty string on success.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] when coercion fails, the handler returns an
    /// error, or the handler panics.
    pub fn invoke(&self, arguments: &Value) -> Result<String, InvocationError> {
        let args = self.bind(arguments).map_err(|e| self.error(e.into()))?;

        let handler = &self.handler;
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.call(&args)))
            .map_err(|payload| self.error(InvocationCause::Panicked(panic_message(&*payload))))?;

        match outcome {
            Ok(_) if self.fire_and_forget => Ok(String::new()),
            Ok(value) => Ok(value),
            Err(e) => Err(self.error(InvocationCause::Handler(e))),
        }
    }

    /// Invokes the target and runs its lifecycle hooks, if any.
    pub fn invoke_with_lifecycle(&self, key: &CacheKey, arguments: &Value) -> InvocationOutcome {
        let result = self.invoke(arguments);
        let Some(lifecycle) = &self.lifecycle else {
            return InvocationOutcome {
                result,
                messages: Vec::new(),
            };
        };

        let call = ToolCall {
            key,
            name: &self.name,
            arguments,
        };
        let hook = catch_unwind(AssertUnwindSafe(|| match &result {
            Ok(value) => lifecycle.on_complete(call, value),
            Err(e) => lifecycle.on_failed(call, &e.to_string()),
        }));
        let messages = hook.unwrap_or_else(|payload| {
            tracing::warn!(
                target_name = %self.qualified_name(),
                "lifecycle hook panicked: {}",
                panic_message(&*payload)
            );
            Vec::new()
        });

        InvocationOutcome { result, messages }
    }

    fn error(&self, cause: InvocationCause) -> InvocationError {
        InvocationError {
            owner: self.owner.clone(),
            method: self.method.clone(),
            cause,
        }
    }
}

impl fmt::Debug for FunctionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDetails")
            .field("owner", &self.owner)
            .field("method", &self.method)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("fire_and_forget", &self.fire_and_forget)
            .finish()
    }
}

/// Extracts the message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
