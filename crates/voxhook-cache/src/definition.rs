//! Typed tool definitions.
//!
//! A [`ToolDefinition`] is the explicit registration of one callable target:
//! the owning type and method name (used in diagnostics), the public name
//! exposed to the voice platform, an ordered parameter schema restricted to
//! the primitive kinds in [`ParamKind`], and the handler closure itself.
//!
//! ```rust,ignore
//! let weather = ToolDefinition::builder("WeatherLookup", "getWeather")
//!     .description("Look up the weather for a city")
//!     .param("city", "string")
//!     .param("state", "string")
//!     .handler(|args| {
//!         Ok(format!(
//!             "The weather in {}, {} is sunny",
//!             args.string("city")?,
//!             args.string("state")?
//!         ))
//!     })
//!     .build()?;
//! ```

use crate::error::{ArgumentError, BoxError, DefinitionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use voxhook_types::CacheKey;

/// Primitive parameter kinds a tool may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Parses a declared type name. Returns `None` for unsupported types.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(Self::String),
            "integer" | "int" | "i64" => Some(Self::Integer),
            "boolean" | "bool" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Coerces a JSON value into this kind.
    pub fn coerce(self, name: &str, value: &Value) -> Result<ParamValue, ArgumentError> {
        let wrong_kind = || ArgumentError::WrongKind {
            name: name.to_string(),
            expected: self.as_str(),
            value: value.to_string(),
        };

        match (self, value) {
            (_, Value::Null) => Err(ArgumentError::Missing(name.to_string())),
            (Self::String, Value::String(s)) => Ok(ParamValue::String(s.clone())),
            (Self::String, Value::Number(n)) => Ok(ParamValue::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Ok(ParamValue::String(b.to_string())),
            (Self::Integer, Value::Number(n)) => {
                n.as_i64().map(ParamValue::Integer).ok_or_else(wrong_kind)
            }
            (Self::Integer, Value::String(s)) => s
                .trim()
                .parse()
                .map(ParamValue::Integer)
                .map_err(|_| wrong_kind()),
            (Self::Boolean, Value::Bool(b)) => Ok(ParamValue::Boolean(*b)),
            (Self::Boolean, Value::String(s)) => match s.trim() {
                "true" => Ok(ParamValue::Boolean(true)),
                "false" => Ok(ParamValue::Boolean(false)),
                _ => Err(wrong_kind()),
            },
            _ => Err(wrong_kind()),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Coerced arguments handed to a handler, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    values: Vec<(String, ParamValue)>,
}

impl ToolArgs {
    pub fn new(values: Vec<(String, ParamValue)>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Positional access, matching the declaration order.
    pub fn positional(&self, index: usize) -> Option<&ParamValue> {
        self.values.get(index).map(|(_, value)| value)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn string(&self, name: &str) -> Result<&str, ArgumentError> {
        match self.get(name) {
            Some(ParamValue::String(s)) => Ok(s),
            Some(other) => Err(self.wrong_kind(name, ParamKind::String, other)),
            None => Err(ArgumentError::Missing(name.to_string())),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, ArgumentError> {
        match self.get(name) {
            Some(ParamValue::Integer(i)) => Ok(*i),
            Some(other) => Err(self.wrong_kind(name, ParamKind::Integer, other)),
            None => Err(ArgumentError::Missing(name.to_string())),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, ArgumentError> {
        match self.get(name) {
            Some(ParamValue::Boolean(b)) => Ok(*b),
            Some(other) => Err(self.wrong_kind(name, ParamKind::Boolean, other)),
            None => Err(ArgumentError::Missing(name.to_string())),
        }
    }

    fn wrong_kind(&self, name: &str, expected: ParamKind, actual: &ParamValue) -> ArgumentError {
        ArgumentError::WrongKind {
            name: name.to_string(),
            expected: expected.as_str(),
            value: actual.to_string(),
        }
    }
}

/// The callable body of a tool.
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: &ToolArgs) -> Result<String, BoxError>;
}

impl<F> ToolHandler for F
where
    F: Fn(&ToolArgs) -> Result<String, BoxError> + Send + Sync,
{
    fn call(&self, args: &ToolArgs) -> Result<String, BoxError> {
        self(args)
    }
}

/// The call a lifecycle hook is reporting on.
#[derive(Debug, Clone, Copy)]
pub struct ToolCall<'a> {
    pub key: &'a CacheKey,
    pub name: &'a str,
    pub arguments: &'a Value,
}

/// A message spoken by the assistant after a tool completes or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ToolMessage {
    RequestComplete {
        content: String,
        #[serde(default = "default_role")]
        role: String,
        #[serde(rename = "endCallAfterSpokenEnabled", default)]
        end_call_after_spoken: bool,
    },
    RequestFailed {
        content: String,
        #[serde(rename = "endCallAfterSpokenEnabled", default)]
        end_call_after_spoken: bool,
    },
}

fn default_role() -> String {
    "assistant".to_string()
}

impl ToolMessage {
    pub fn complete(content: impl Into<String>) -> Self {
        Self::RequestComplete {
            content: content.into(),
            role: default_role(),
            end_call_after_spoken: false,
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self::RequestFailed {
            content: content.into(),
            end_call_after_spoken: false,
        }
    }
}

/// Optional hooks run after a tool succeeds or fails.
///
/// Messages returned by either hook are appended to the tool result sent
/// back to the platform.
pub trait ToolLifecycle: Send + Sync {
    fn on_complete(&self, _call: ToolCall<'_>, _result: &str) -> Vec<ToolMessage> {
        Vec::new()
    }

    fn on_failed(&self, _call: ToolCall<'_>, _error: &str) -> Vec<ToolMessage> {
        Vec::new()
    }
}

/// A validated tool registration, ready to be added to a cache.
#[derive(Clone)]
pub struct ToolDefinition {
    pub(crate) owner: String,
    pub(crate) method: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) params: Vec<Param>,
    pub(crate) fire_and_forget: bool,
    pub(crate) handler: Arc<dyn ToolHandler>,
    pub(crate) lifecycle: Option<Arc<dyn ToolLifecycle>>,
}

impl ToolDefinition {
    /// Starts a definition for `owner.method`. The public name defaults to
    /// the method name.
    pub fn builder(owner: impl Into<String>, method: impl Into<String>) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder {
            owner: owner.into(),
            method: method.into(),
            name: None,
            description: String::new(),
            params: Vec::new(),
            fire_and_forget: false,
            handler: None,
            lifecycle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("owner", &self.owner)
            .field("method", &self.method)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("fire_and_forget", &self.fire_and_forget)
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

/// Builder for [`ToolDefinition`]. Validation happens in [`build`](Self::build).
pub struct ToolDefinitionBuilder {
    owner: String,
    method: String,
    name: Option<String>,
    description: String,
    params: Vec<(String, String, String)>,
    fire_and_forget: bool,
    handler: Option<Arc<dyn ToolHandler>>,
    lifecycle: Option<Arc<dyn ToolLifecycle>>,
}

impl ToolDefinitionBuilder {
    /// Overrides the public name exposed to the platform.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares the next positional parameter.
    pub fn param(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.param_described(name, type_name, "")
    }

    pub fn param_described(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.params
            .push((name.into(), type_name.into(), description.into()));
        self
    }

    /// Marks the target as fire-and-forget: whatever the handler returns,
    /// the platform receives an empty result.
    pub fn fire_and_forget(mut self, fire_and_forget: bool) -> Self {
        self.fire_and_forget = fire_and_forget;
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ToolArgs) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn ToolLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] for empty identifiers, duplicate or
    /// unsupported parameters, or a missing handler.
    pub fn build(self) -> Result<ToolDefinition, DefinitionError> {
        let owner = self.owner;
        let method = self.method;
        let empty = |field| DefinitionError::EmptyField {
            owner: owner.clone(),
            method: method.clone(),
            field,
        };

        if owner.trim().is_empty() {
            return Err(empty("owner"));
        }
        if method.trim().is_empty() {
            return Err(empty("method"));
        }
        let name = self.name.unwrap_or_else(|| method.clone());
        if name.trim().is_empty() {
            return Err(empty("name"));
        }

        let mut seen = HashSet::new();
        let mut params = Vec::with_capacity(self.params.len());
        for (param, type_name, description) in self.params {
            if param.trim().is_empty() {
                return Err(empty("parameter name"));
            }
            if !seen.insert(param.clone()) {
                return Err(DefinitionError::DuplicateParam {
                    owner,
                    method,
                    param,
                });
            }
            let Some(kind) = ParamKind::from_type_name(&type_name) else {
                return Err(DefinitionError::UnsupportedParamType {
                    owner,
                    method,
                    param,
                    type_name,
                });
            };
            params.push(Param {
                name: param,
                kind,
                description,
            });
        }

        let Some(handler) = self.handler else {
            return Err(DefinitionError::MissingHandler { owner, method });
        };

        Ok(ToolDefinition {
            owner,
            method,
            name,
            description: self.description,
            params,
            fire_and_forget: self.fire_and_forget,
            handler,
            lifecycle: self.lifecycle,
        })
    }
}
