//! Tool and function invocation cache.
//!
//! When an assistant configuration is built for a call, every local target it
//! declares is registered here under the call's session id and the declaring
//! assistant's id. When the voice platform later asks for one of those
//! targets to be executed, the server looks it up and invokes it with the
//! JSON arguments the platform supplied.
//!
//! # Registration
//!
//! Targets are registered explicitly as [`ToolDefinition`]s: an owning type
//! and method name, a public name, an ordered list of primitive parameters,
//! and a handler closure. Unsupported parameter types fail at
//! [`ToolDefinitionBuilder::build`], and registering a name twice for the
//! same key fails at [`FunctionCache::add`].
//!
//! ```rust,ignore
//! use voxhook_cache::{FunctionCache, ToolDefinition};
//! use voxhook_types::{CacheKey, CacheKind};
//!
//! let cache = FunctionCache::new(CacheKind::ToolCall);
//! let key = CacheKey::new("call-1".into(), "default".into());
//!
//! cache.add(
//!     key.clone(),
//!     ToolDefinition::builder("WeatherLookup", "getWeather")
//!         .param("city", "string")
//!         .handler(|args| Ok(format!("Sunny in {}", args.string("city")?)))
//!         .build()?,
//! )?;
//!
//! let weather = cache.function(&key, "getWeather")?;
//! let result = weather.invoke(&serde_json::json!({"city": "Chicago"}))?;
//! ```
//!
//! # Eviction
//!
//! | Path | Operation |
//! |------|-----------|
//! | End of call | [`FunctionCache::remove_session`] / [`FunctionCache::remove`] |
//! | Periodic sweep | [`FunctionCache::purge`] |
//! | Reset | [`FunctionCache::clear`] |

mod cache;
mod definition;
mod details;
mod error;

pub use cache::{
    CacheSnapshot, EntrySnapshot, FunctionCache, FunctionInfo, FunctionSnapshot, ParamSnapshot,
};
pub use definition::{
    Param, ParamKind, ParamValue, ToolArgs, ToolCall, ToolDefinition, ToolDefinitionBuilder,
    ToolHandler, ToolLifecycle, ToolMessage,
};
pub use details::{panic_message, FunctionDetails, InvocationOutcome};
pub use error::{
    ArgumentError, BoxError, CacheError, DefinitionError, InvocationCause, InvocationError,
};
