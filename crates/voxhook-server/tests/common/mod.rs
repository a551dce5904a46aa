#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use voxhook_cache::ToolDefinition;
use voxhook_server::application::Application;
use voxhook_server::config::ApplicationConfig;
use voxhook_types::{AssistantId, ASSISTANT_ID_METADATA_KEY, SECRET_HEADER};

pub const ASSISTANT: &str = "A1";

/// Application whose responder registers `getWeather`, `failing` and
/// `exploding` tools plus a `lookupOrder` function for assistant `A1`.
pub fn test_application(config: ApplicationConfig) -> Application {
    Application::new(config).on_assistant_request(|request| {
        let assistant = AssistantId::from(ASSISTANT);

        request.add_tool(
            assistant.clone(),
            ToolDefinition::builder("Weather", "getWeather")
                .param("city", "string")
                .param("state", "string")
                .handler(|args| {
                    Ok(format!(
                        "The weather in {}, {} is windy",
                        args.string("city")?,
                        args.string("state")?
                    ))
                })
                .build()?,
        )?;
        request.add_tool(
            assistant.clone(),
            ToolDefinition::builder("Weather", "failing")
                .handler(|_| Err("upstream weather service unavailable".into()))
                .build()?,
        )?;
        request.add_tool(
            assistant.clone(),
            ToolDefinition::builder("Weather", "exploding")
                .handler(|_| panic!("tool bug"))
                .build()?,
        )?;
        request.add_function(
            assistant,
            ToolDefinition::builder("Orders", "lookupOrder")
                .param("orderId", "integer")
                .handler(|args| Ok(format!("order {} shipped", args.integer("orderId")?)))
                .build()?,
        )?;

        Ok(json!({
            "assistant": {
                "name": "Test Assistant",
                "metadata": { ASSISTANT_ID_METADATA_KEY: ASSISTANT }
            }
        }))
    })
}

pub fn assistant_request(session: &str) -> Value {
    json!({
        "message": {
            "type": "assistant-request",
            "call": { "id": session }
        }
    })
}

pub fn tool_calls(session: &str, calls: Value) -> Value {
    json!({
        "message": {
            "type": "tool-calls",
            "call": { "id": session },
            "assistant": { "metadata": { ASSISTANT_ID_METADATA_KEY: ASSISTANT } },
            "toolCallList": calls
        }
    })
}

pub fn function_call(session: &str, name: &str, parameters: Value) -> Value {
    json!({
        "message": {
            "type": "function-call",
            "call": { "id": session },
            "assistant": { "metadata": { ASSISTANT_ID_METADATA_KEY: ASSISTANT } },
            "functionCall": { "name": name, "parameters": parameters }
        }
    })
}

pub fn end_of_call(session: &str) -> Value {
    json!({
        "message": {
            "type": "end-of-call-report",
            "call": { "id": session }
        }
    })
}

pub fn weather_call(id: &str, city: &str, state: &str) -> Value {
    json!({
        "id": id,
        "type": "function",
        "function": {
            "name": "getWeather",
            "arguments": { "city": city, "state": state }
        }
    })
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

pub async fn post_raw(
    app: &Router,
    path: &str,
    secret: Option<&str>,
    body: impl Into<Body>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    send(app, builder.body(body.into()).unwrap()).await
}

pub async fn post_json(app: &Router, path: &str, body: &Value) -> (StatusCode, Value) {
    let (status, bytes) = post_raw(app, path, None, body.to_string()).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

pub async fn get(app: &Router, path: &str) -> (StatusCode, Vec<u8>) {
    send(
        app,
        Request::builder().uri(path).body(Body::empty()).unwrap(),
    )
    .await
}

pub fn application(context: &voxhook_server::ServerContext) -> Arc<Application> {
    context
        .application("/vapi")
        .or_else(|| context.applications.first())
        .cloned()
        .expect("at least one application")
}
