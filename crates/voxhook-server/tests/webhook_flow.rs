//! End-to-end tests for the webhook endpoint.
//!
//! These tests verify:
//! - assistant-request registers tools that tool-calls can then invoke
//! - failures inside one tool-call batch stay isolated to their entry
//! - function-call answers with `result` / `error` and any lifecycle messages
//! - end-of-call-report cleanup is idempotent
//! - unknown and malformed messages are handled without touching caches

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use voxhook_cache::{ToolCall, ToolDefinition, ToolLifecycle, ToolMessage};
use voxhook_server::application::Application;
use voxhook_server::config::ApplicationConfig;
use voxhook_server::{app, RuntimeSettings, ServerContext};
use voxhook_types::{AssistantId, CacheKey, SessionId, ASSISTANT_ID_METADATA_KEY};

fn setup() -> (Arc<ServerContext>, axum::Router) {
    let (context, worker) = ServerContext::builder(RuntimeSettings::default())
        .application(test_application(ApplicationConfig::default()))
        .build()
        .expect("context should build");
    tokio::spawn(worker.run());
    (context.clone(), app(context))
}

#[tokio::test]
async fn assistant_request_then_tool_call_returns_result() {
    let (context, app) = setup();

    let (status, body) = post_json(&app, "/vapi", &assistant_request("S1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assistant"]["name"], "Test Assistant");
    assert_eq!(
        body["assistant"]["metadata"][ASSISTANT_ID_METADATA_KEY],
        ASSISTANT
    );

    let key = CacheKey::new(SessionId::from("S1"), AssistantId::from(ASSISTANT));
    assert!(application(&context).tool_cache().contains(&key));
    assert!(application(&context).function_cache().contains(&key));

    let (status, body) = post_json(
        &app,
        "/vapi",
        &tool_calls("S1", json!([weather_call("call-1", "Chicago", "Illinois")])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "results": [{
                "toolCallId": "call-1",
                "name": "getWeather",
                "result": "The weather in Chicago, Illinois is windy"
            }]
        })
    );
}

#[tokio::test]
async fn arguments_may_be_json_encoded_strings() {
    let (_context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;

    let call = json!({
        "id": "call-1",
        "function": {
            "name": "getWeather",
            "arguments": "{\"city\":\"Austin\",\"state\":\"Texas\"}"
        }
    });
    let (status, body) = post_json(&app, "/vapi", &tool_calls("S1", json!([call]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"][0]["result"],
        "The weather in Austin, Texas is windy"
    );
}

#[tokio::test]
async fn failures_are_isolated_within_a_batch() {
    let (_context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;

    let calls = json!([
        weather_call("call-1", "Chicago", "Illinois"),
        {"id": "call-2", "function": {"name": "failing", "arguments": {}}},
        {"id": "call-3", "function": {"name": "exploding", "arguments": {}}},
        {"id": "call-4", "function": {"name": "notRegistered", "arguments": {}}},
        {"id": "call-5", "function": {"name": "getWeather", "arguments": {"city": "Paris"}}},
        weather_call("call-6", "Boston", "Massachusetts"),
    ]);
    let (status, body) = post_json(&app, "/vapi", &tool_calls("S1", calls)).await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 6);

    let ids: Vec<&str> = results
        .iter()
        .map(|r| r["toolCallId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["call-1", "call-2", "call-3", "call-4", "call-5", "call-6"]);

    assert_eq!(results[0]["result"], "The weather in Chicago, Illinois is windy");
    assert_eq!(
        results[1]["error"],
        "Error invoking method Weather.failing(): upstream weather service unavailable"
    );
    assert_eq!(
        results[2]["error"],
        "Error invoking method Weather.exploding(): handler panicked: tool bug"
    );
    assert!(results[3]["error"]
        .as_str()
        .unwrap()
        .contains("`notRegistered` not found"));
    assert_eq!(
        results[4]["error"],
        "Error invoking method Weather.getWeather(): missing argument `state`"
    );
    assert_eq!(results[5]["result"], "The weather in Boston, Massachusetts is windy");

    for failed in &results[1..5] {
        assert!(failed.get("result").is_none());
    }
}

#[tokio::test]
async fn tool_call_for_unknown_session_is_not_found() {
    let (_context, app) = setup();

    let (status, body) = post_json(
        &app,
        "/vapi",
        &tool_calls("never-configured", json!([weather_call("c", "Chicago", "Illinois")])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn function_call_returns_result_or_error() {
    let (_context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;

    let (status, body) = post_json(
        &app,
        "/vapi",
        &function_call("S1", "lookupOrder", json!({"orderId": "42"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "order 42 shipped"}));

    let (status, body) = post_json(
        &app,
        "/vapi",
        &function_call("S1", "lookupOrder", json!({"orderId": "forty-two"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error invoking method Orders.lookupOrder():"));

    let (status, _) = post_json(
        &app,
        "/vapi",
        &function_call("S2", "lookupOrder", json!({"orderId": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

struct ShippingAnnouncer;

impl ToolLifecycle for ShippingAnnouncer {
    fn on_complete(&self, _call: ToolCall<'_>, result: &str) -> Vec<ToolMessage> {
        vec![ToolMessage::complete(format!("done: {result}"))]
    }

    fn on_failed(&self, call: ToolCall<'_>, _error: &str) -> Vec<ToolMessage> {
        vec![ToolMessage::failed(format!("{} is unavailable", call.name))]
    }
}

#[tokio::test]
async fn function_call_carries_lifecycle_messages() {
    let application = Application::new(ApplicationConfig::default()).on_assistant_request(|request| {
        request.add_function(
            AssistantId::from(ASSISTANT),
            ToolDefinition::builder("Orders", "shipOrder")
                .param("orderId", "integer")
                .handler(|args| {
                    let id = args.integer("orderId")?;
                    if id < 0 {
                        return Err("negative order id".into());
                    }
                    Ok("shipped".to_string())
                })
                .lifecycle(Arc::new(ShippingAnnouncer))
                .build()?,
        )?;
        Ok(json!({"assistant": {"metadata": {ASSISTANT_ID_METADATA_KEY: ASSISTANT}}}))
    });
    let (context, _worker) = ServerContext::builder(RuntimeSettings::default())
        .application(application)
        .build()
        .unwrap();
    let app = app(context);
    post_json(&app, "/vapi", &assistant_request("S1")).await;

    let (status, body) = post_json(
        &app,
        "/vapi",
        &function_call("S1", "shipOrder", json!({"orderId": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "shipped");
    assert_eq!(
        body["message"],
        json!([{
            "type": "request-complete",
            "content": "done: shipped",
            "role": "assistant",
            "endCallAfterSpokenEnabled": false
        }])
    );

    let (status, body) = post_json(
        &app,
        "/vapi",
        &function_call("S1", "shipOrder", json!({"orderId": -1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "");
    assert!(body["error"].as_str().unwrap().contains("negative order id"));
    assert_eq!(body["message"][0]["type"], "request-failed");
    assert_eq!(body["message"][0]["content"], "shipOrder is unavailable");
}

#[tokio::test]
async fn function_call_without_lifecycle_has_no_message() {
    let (_context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;

    let (_, body) = post_json(
        &app,
        "/vapi",
        &function_call("S1", "lookupOrder", json!({"orderId": 3})),
    )
    .await;
    assert!(body.get("message").is_none());
}

#[tokio::test]
async fn end_of_call_cleanup_is_idempotent() {
    let (context, app) = setup();
    post_json(&app, "/vapi", &assistant_request("S1")).await;
    post_json(&app, "/vapi", &assistant_request("S2")).await;
    assert_eq!(application(&context).tool_cache().len(), 2);

    for _ in 0..2 {
        let (status, body) = post_json(&app, "/vapi", &end_of_call("S1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "type": "end-of-call-report"}));
    }

    let app_state = application(&context);
    assert_eq!(app_state.tool_cache().len(), 1);
    assert_eq!(app_state.function_cache().len(), 1);

    let (status, _) = post_json(
        &app,
        "/vapi",
        &tool_calls("S1", json!([weather_call("c", "Chicago", "Illinois")])),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &app,
        "/vapi",
        &tool_calls("S2", json!([weather_call("c", "Chicago", "Illinois")])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn end_of_call_keeps_cache_when_cleanup_disabled() {
    let (context, worker) = ServerContext::builder(RuntimeSettings::default())
        .application(test_application(ApplicationConfig {
            remove_cache_on_end_of_call_report: false,
            ..ApplicationConfig::default()
        }))
        .build()
        .unwrap();
    tokio::spawn(worker.run());
    let app = app(context.clone());

    post_json(&app, "/vapi", &assistant_request("S1")).await;
    let (status, _) = post_json(&app, "/vapi", &end_of_call("S1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(application(&context).tool_cache().len(), 1);
}

#[tokio::test]
async fn unrecognised_types_are_acknowledged() {
    let (_context, app) = setup();

    let (status, body) = post_json(
        &app,
        "/vapi",
        &json!({"message": {"type": "status-update", "status": "in-progress"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "type": "status-update"}));

    let (status, body) =
        post_json(&app, "/vapi", &json!({"message": {"type": "brand-new-event"}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "type": "brand-new-event"}));

    let (status, body) = post_json(&app, "/vapi", &json!({"hello": "world"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "type": "unknown"}));
}

#[tokio::test]
async fn transfer_request_without_responder_is_acknowledged() {
    let (_context, app) = setup();

    let (status, body) = post_json(
        &app,
        "/vapi",
        &json!({"message": {"type": "transfer-destination-request", "call": {"id": "S1"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "ok", "type": "transfer-destination-request"})
    );
}

#[tokio::test]
async fn transfer_request_uses_responder() {
    let application = test_application(ApplicationConfig::default())
        .on_transfer_destination_request(|request| {
            let call = request["message"]["call"]["id"].as_str().unwrap_or_default();
            Ok(json!({
                "destination": {"type": "number", "number": "+15551234567"},
                "message": {"type": "request-start", "content": format!("Transferring {call}")}
            }))
        });
    let (context, _worker) = ServerContext::builder(RuntimeSettings::default())
        .application(application)
        .build()
        .unwrap();
    let app = app(context);

    let (status, body) = post_json(
        &app,
        "/vapi",
        &json!({"message": {"type": "transfer-destination-request", "call": {"id": "S9"}}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"]["number"], "+15551234567");
    assert_eq!(body["message"]["content"], "Transferring S9");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (_context, app) = setup();

    let (status, bytes) = post_raw(&app, "/vapi", None, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("malformed JSON"));
}

#[tokio::test]
async fn duplicate_registration_is_internal_error() {
    let (_context, app) = setup();

    let (status, _) = post_json(&app, "/vapi", &assistant_request("S1")).await;
    assert_eq!(status, StatusCode::OK);

    // Same session again: every tool is already declared for S1/A1.
    let (status, bytes) = post_raw(&app, "/vapi", None, assistant_request("S1").to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("assistant-request responder failed"));
    assert!(text.contains("already declared"));
}

#[tokio::test]
async fn production_hides_internal_error_details() {
    let (context, _worker) = ServerContext::builder(RuntimeSettings {
        production: true,
        ..RuntimeSettings::default()
    })
    .application(test_application(ApplicationConfig::default()))
    .build()
    .unwrap();
    let app = app(context);

    post_json(&app, "/vapi", &assistant_request("S1")).await;
    let (status, body) = post_json(&app, "/vapi", &assistant_request("S1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "internal server error"}));
}

#[tokio::test]
async fn responder_panic_becomes_diagnostic_outside_production() {
    let application = voxhook_server::application::Application::new(ApplicationConfig::default())
        .on_assistant_request(|_| panic!("responder bug"));
    let (context, _worker) = ServerContext::builder(RuntimeSettings::default())
        .application(application)
        .build()
        .unwrap();
    let app = app(context);

    let (status, bytes) = post_raw(&app, "/vapi", None, assistant_request("S1").to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(bytes).unwrap().contains("responder bug"));
}

#[tokio::test]
async fn missing_responder_is_internal_error() {
    let (context, _worker) = ServerContext::builder(RuntimeSettings::default())
        .application(voxhook_server::application::Application::new(
            ApplicationConfig::default(),
        ))
        .build()
        .unwrap();
    let app = app(context);

    let (status, _) = post_raw(&app, "/vapi", None, assistant_request("S1").to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn applications_are_isolated_by_path() {
    let (context, worker) = ServerContext::builder(RuntimeSettings::default())
        .application(test_application(ApplicationConfig {
            server_path: "/inbound".to_string(),
            ..ApplicationConfig::default()
        }))
        .application(test_application(ApplicationConfig {
            server_path: "/outbound".to_string(),
            ..ApplicationConfig::default()
        }))
        .build()
        .unwrap();
    tokio::spawn(worker.run());
    let app = app(context);

    post_json(&app, "/inbound", &assistant_request("S1")).await;

    let call = tool_calls("S1", json!([weather_call("c", "Chicago", "Illinois")]));
    let (status, _) = post_json(&app, "/inbound", &call).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post_json(&app, "/outbound", &call).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_application_paths_fail_to_build() {
    let result = ServerContext::builder(RuntimeSettings::default())
        .application(test_application(ApplicationConfig::default()))
        .application(test_application(ApplicationConfig::default()))
        .build();
    assert!(result.is_err());
}
