//! A small weather assistant served by the binary out of the box.

use crate::application::{Application, AssistantRequestContext};
use crate::config::ApplicationConfig;
use serde_json::{json, Value};
use voxhook_cache::{BoxError, ToolDefinition};
use voxhook_types::AssistantId;

/// Builds an application whose assistant offers a `getWeather` tool.
pub fn weather_application(config: ApplicationConfig) -> Application {
    Application::new(config).on_assistant_request(weather_assistant)
}

fn weather_assistant(request: &AssistantRequestContext) -> Result<Value, BoxError> {
    request.add_tool(AssistantId::default(), weather_tool()?)?;

    let caller = request
        .request()
        .pointer("/message/call/customer/number")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    tracing::debug!(session = %request.session_id(), caller, "configured weather assistant");

    Ok(json!({
        "assistant": {
            "name": "Weather Assistant",
            "firstMessage": "Hi! Which city would you like the weather for?",
            "model": {
                "provider": "openai",
                "model": "gpt-4o",
                "messages": [{
                    "role": "system",
                    "content": "You tell callers the weather. Use the getWeather tool."
                }],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "getWeather",
                        "description": "Current weather for a city",
                        "parameters": {
                            "type": "object",
                            "properties": {
                                "city": {"type": "string"},
                                "state": {"type": "string"}
                            },
                            "required": ["city", "state"]
                        }
                    },
                    "server": {"url": request.server_path()}
                }]
            }
        }
    }))
}

/// The `getWeather` tool. Answers with canned text.
pub fn weather_tool() -> Result<ToolDefinition, BoxError> {
    let tool = ToolDefinition::builder("WeatherAssistant", "getWeather")
        .description("Current weather for a city")
        .param("city", "string")
        .param("state", "string")
        .handler(|args| {
            Ok(format!(
                "The weather in {}, {} is windy",
                args.string("city")?,
                args.string("state")?
            ))
        })
        .build()?;
    Ok(tool)
}
