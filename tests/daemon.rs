use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use ai_concierge::config::{AnthropicConfig, ServerConfig};
use ai_concierge::daemon::{build_router, AppState};
use ai_concierge::domains::lead::Lead;
use ai_concierge::services::concierge::ConciergeService;

fn test_config(data_dir: &Path, server: Option<&MockServer>) -> ServerConfig {
    let mut config = ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    };
    if let Some(server) = server {
        config.anthropic = AnthropicConfig {
            api_key: Some("test-key".to_string()),
            model: Some("claude-test".to_string()),
            base_url: Some(server.base_url()),
        };
        config.graph_base_url = server.url("/v21.0");
    }
    config
}

fn make_app(config: ServerConfig) -> (Router, AppState) {
    let service = ConciergeService::from_config(config).unwrap();
    let state = AppState::new(service);
    (build_router(state.clone()), state)
}

fn vamos_config() -> Value {
    json!({
        "business": {
            "name": "Vamos Events",
            "owner_name": "Sofia",
            "about": "Luxury event planning in Toronto.",
            "tone": "luxury",
            "email": "hello@vamos.example"
        },
        "services": [
            {"name": "Full Planning", "description": "End to end", "price_display": "From $15,000"}
        ],
        "pricing": {"currency": "CAD"},
        "qualification": {"minimum_budgets": {"wedding": 15000}, "service_areas": ["Toronto"]},
        "appearance": {"primary_color": "#C8A96E"}
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn send_raw(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn create_vamos(app: &Router) {
    let (status, body) = send(
        app,
        "POST",
        "/api/agents/vamos-events/config",
        Some(json!({"config": vamos_config()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("created"));
}

#[tokio::test]
async fn health_reports_agents_and_api_key() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));

    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["api_configured"], json!(false));
    assert_eq!(body["agents"], json!([]));
    assert!(body["version"].as_str().is_some_and(|v| !v.is_empty()));

    create_vamos(&app).await;
    let (_, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(body["agents"], json!(["vamos-events"]));

    let server = MockServer::start_async().await;
    let other = tempdir().unwrap();
    let (app, _) = make_app(test_config(other.path(), Some(&server)));
    let (_, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(body["api_configured"], json!(true));
}

#[tokio::test]
async fn training_records_flow_into_prompt_preview() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let records = [
        ("rule", json!({"rule": "Never quote below $15,000 for weddings"})),
        ("faq", json!({"question": "Do you travel?", "answer": "Yes, anywhere in Ontario."})),
        (
            "example",
            json!({
                "scenario": "Prospect asks for a discount",
                "good_response": "Our pricing reflects the full-service experience.",
                "bad_response": "Sure, 20% off!"
            }),
        ),
        (
            "correction",
            json!({
                "situation": "Prospect mentions a tight budget",
                "wrong": "We can't help you.",
                "correction": "Suggest the day-of coordination package."
            }),
        ),
    ];
    for (kind, data) in &records {
        let (status, body) = send(
            &app,
            "POST",
            "/api/agents/vamos-events/training",
            Some(json!({"type": kind, "data": data})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "adding {kind}");
        assert_eq!(body, json!({"status": "added", "type": kind, "total": 1}));
    }

    let (status, preview) = send(&app, "GET", "/api/agents/vamos-events/prompt-preview", None).await;
    assert_eq!(status, StatusCode::OK);
    let prompt = preview["prompt"].as_str().unwrap();
    assert!(preview["token_estimate"].as_f64().unwrap() > 0.0);

    let rule = prompt.find("- Never quote below $15,000 for weddings").unwrap();
    let faq = prompt
        .find("Q: Do you travel?\nA: Yes, anywhere in Ontario.")
        .unwrap();
    let example = prompt
        .find("Scenario: Prospect asks for a discount")
        .unwrap();
    let correction = prompt
        .find("- When: Prospect mentions a tight budget")
        .unwrap();
    assert!(rule < faq && faq < example && example < correction);
    assert!(prompt.contains("Avoid: Sure, 20% off!"));
    assert!(prompt.contains("  Do this: Suggest the day-of coordination package."));

    let (status, _) = send(&app, "DELETE", "/api/agents/vamos-events/training/rule/0", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", "/api/agents/vamos-events/training/faq/0", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, preview) = send(&app, "GET", "/api/agents/vamos-events/prompt-preview", None).await;
    let prompt = preview["prompt"].as_str().unwrap();
    assert!(!prompt.contains("Never quote below $15,000 for weddings"));
    assert!(!prompt.contains("Do you travel?"));
    assert!(prompt.contains("Scenario: Prospect asks for a discount"));

    let (status, _) = send(&app, "DELETE", "/api/agents/vamos-events/training/rule/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_training_payloads_are_rejected() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/agents/vamos-events/training",
        Some(json!({"type": "haiku", "data": {"text": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Unknown training type"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/agents/vamos-events/training",
        Some(json!({"type": "faq", "data": {"question": "No answer?"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, training) = send(&app, "GET", "/api/agents/vamos-events/training", None).await;
    assert_eq!(
        training,
        json!({"rules": [], "faq": [], "examples": [], "corrections": []})
    );
}

#[tokio::test]
async fn wedding_chat_returns_reply_and_records_lead() {
    let server = MockServer::start_async().await;
    let reply = json!({
        "message": "Congratulations! When is the big day?",
        "collected_data": {"event_type": "wedding", "guest_count": 150},
        "lead_status": "gathering_info",
        "qualification_score": 35,
        "qualification_notes": "Wedding, budget unknown",
        "suggested_quote_range": null,
        "ready_to_book": false,
        "preferred_times": null
    });
    let anthropic = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", "2023-06-01");
            then.status(200).json_body(json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "model": "claude-test",
                "content": [{"type": "text", "text": format!("```json\n{reply}\n```")}],
                "stop_reason": "end_turn"
            }));
        })
        .await;

    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), Some(&server)));
    create_vamos(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({
            "agent_id": "vamos-events",
            "message": "Hi! We're planning a wedding for next June, about 150 guests."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    anthropic.assert_calls(1);

    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert_eq!(body["message"], json!("Congratulations! When is the big day?"));
    assert_eq!(body["lead_status"], json!("gathering_info"));
    assert_eq!(body["qualification_score"], json!(35));
    assert_eq!(body["ready_to_book"], json!(false));

    let (status, leads) = send(&app, "GET", "/api/agents/vamos-events/leads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(leads["total"], json!(1));
    let summary = &leads["leads"][0];
    assert_eq!(summary["id"], json!(session_id));
    assert_eq!(summary["source"], json!("website"));
    assert_eq!(summary["message_count"], json!(2));
    assert_eq!(summary["collected_data"]["event_type"], json!("wedding"));
    assert!(summary.get("messages").is_none());

    let (status, lead) = send(
        &app,
        "GET",
        &format!("/api/agents/vamos-events/leads/{session_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["messages"][0]["role"], json!("user"));
    assert_eq!(lead["messages"][1]["role"], json!("assistant"));
}

#[tokio::test]
async fn demo_mode_answers_without_api_key() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({"agent_id": "vamos-events", "session_id": "demo-1", "message": "Hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], json!("demo-1"));
    assert_eq!(body["lead_status"], json!("gathering_info"));
    assert_eq!(body["qualification_score"], json!(10));
    assert_eq!(body["suggested_quote_range"], Value::Null);
}

#[tokio::test]
async fn get_endpoints_are_idempotent() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;
    send(
        &app,
        "POST",
        "/api/agents/vamos-events/training",
        Some(json!({"type": "rule", "data": {"rule": "Always mention the video"}})),
    )
    .await;

    for uri in [
        "/api/agents/vamos-events/config",
        "/api/agents/vamos-events/training",
        "/api/agents/vamos-events/prompt-preview",
    ] {
        let first = send(&app, "GET", uri, None).await;
        let second = send(&app, "GET", uri, None).await;
        assert_eq!(first.0, StatusCode::OK, "{uri}");
        assert_eq!(first, second, "{uri}");
    }
}

#[tokio::test]
async fn config_put_merges_and_post_conflicts() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/agents/vamos-events/config",
        Some(json!({"config": vamos_config()})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/agents/vamos-events/config",
        Some(json!({"config": {"business": {"tone": "friendly"}, "booking": {"mode": "auto_book"}}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "updated", "agent_id": "vamos-events"}));

    let (_, config) = send(&app, "GET", "/api/agents/vamos-events/config", None).await;
    assert_eq!(config["business"]["tone"], json!("friendly"));
    assert_eq!(config["business"]["name"], json!("Vamos Events"));
    assert_eq!(config["business"]["owner_name"], json!("Sofia"));
    assert_eq!(config["booking"]["mode"], json!("auto_book"));
    assert!(config["created_at"].is_string());
    assert!(config["updated_at"].is_string());

    let (status, _) = send(
        &app,
        "PUT",
        "/api/agents/vamos-events/config",
        Some(json!({"config": {"services": "not a list"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn numeric_config_values_keep_chat_working() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let (status, _) = send(
        &app,
        "PUT",
        "/api/agents/vamos-events/config",
        Some(json!({"config": {
            "qualification": {"minimum_budgets": {"wedding": 15000.0}, "advance_booking_days": 45},
            "integrations": {"telegram": {"chat_id": -1001234567}}
        }})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, preview) = send(&app, "GET", "/api/agents/vamos-events/prompt-preview", None).await;
    assert_eq!(status, StatusCode::OK);
    let prompt = preview["prompt"].as_str().unwrap();
    assert!(prompt.contains("- Wedding: $15,000"));
    assert!(prompt.contains("Minimum advance booking: 45 days"));

    let (status, reply) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({"agent_id": "vamos-events", "message": "Hi, planning a wedding"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply["session_id"].is_string());
}

#[tokio::test]
async fn confirm_and_reject_update_lead_status() {
    let temp = tempdir().unwrap();
    let (app, state) = make_app(test_config(temp.path(), None));
    create_vamos(&app).await;

    let mut lead = Lead::new("lead-1", "website", Utc::now());
    lead.collected_data
        .insert("contact_name".to_string(), json!("Maria"));
    lead.collected_data
        .insert("email".to_string(), json!("maria@example.com"));
    lead.collected_data
        .insert("event_type".to_string(), json!("a wedding"));
    state
        .service
        .store()
        .upsert_lead("vamos-events", &lead)
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/agents/vamos-events/leads/lead-1/confirm",
        Some(json!({"confirmed_time": "Friday, May 8th at 3:00 PM ET", "note": "Video call"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "confirmed", "confirmed_time": "Friday, May 8th at 3:00 PM ET", "email_sent": true})
    );

    let (_, stored) = send(&app, "GET", "/api/agents/vamos-events/leads/lead-1", None).await;
    assert_eq!(stored["lead_status"], json!("meeting_confirmed"));
    assert_eq!(stored["confirmation_note"], json!("Video call"));
    assert_eq!(stored["confirmation_email"]["to"], json!("maria@example.com"));
    assert_eq!(stored["confirmation_email"]["sent"], json!(false));

    let (status, html) = send_raw(
        &app,
        "GET",
        "/api/agents/vamos-events/leads/lead-1/email-preview",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(html).unwrap();
    assert!(html.contains("Friday, May 8th at 3:00 PM ET"));
    assert!(html.contains("Hi Maria,"));

    let (status, body) = send(
        &app,
        "POST",
        "/api/agents/vamos-events/leads/lead-1/reject",
        Some(json!({"alternative_times": ["Mon 10am", "Tue 4pm"], "reason": "Travelling"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "alternatives_sent", "times": ["Mon 10am", "Tue 4pm"]})
    );
    let (_, stored) = send(&app, "GET", "/api/agents/vamos-events/leads/lead-1", None).await;
    assert_eq!(stored["lead_status"], json!("meeting_requested"));
}

#[tokio::test]
async fn missing_agents_and_leads_return_404() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));

    for uri in [
        "/api/agents/ghost/config",
        "/api/agents/ghost/prompt-preview",
        "/api/agents/ghost/leads/nope",
    ] {
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body["error"].is_string());
    }

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat",
        Some(json!({"agent_id": "ghost", "message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Agent 'ghost' not found"));

    let (status, body) = send(&app, "GET", "/api/agents/ghost/leads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"leads": [], "total": 0}));
}

#[tokio::test]
async fn whatsapp_webhook_verification() {
    let temp = tempdir().unwrap();
    let (app, _) = make_app(test_config(temp.path(), None));

    let (status, body) = send(
        &app,
        "GET",
        "/api/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=concierge-verify-token&hub.challenge=424242",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(424242));

    let (status, _) = send(
        &app,
        "GET",
        "/api/webhook/instagram?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        "/api/webhook/whatsapp",
        Some(json!({"entry": [{"changes": [{"value": {"statuses": []}}]}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "no_messages"}));
}
