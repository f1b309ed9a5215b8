//! Invokes the Lambda handler end to end against an in-memory store.
//!
//! The runtime is a process-wide singleton, so every test drives the handler
//! on one shared tokio runtime.

use std::sync::OnceLock;

use serde_json::{json, Value};
use tokio::runtime::Runtime;

use todo_lambda_shared::test_utils::{api_event, json_event, mock_lambda_event, rest_event};
use todo_lambda_shared::{init_runtime_with, GatewayResponse};
use todo_service_shared::test_utils::test_state;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| {
        let _ = init_runtime_with(test_state());
        Runtime::new().expect("tokio runtime")
    })
    .block_on(future)
}

async fn invoke(payload: Value, suffix: &str) -> GatewayResponse {
    todo_lambda_api::handler(mock_lambda_event(payload, suffix))
        .await
        .expect("handler should succeed")
}

async fn register(email: &str) -> String {
    let response = invoke(
        json_event(
            "POST",
            "/api/auth/register",
            &json!({ "email": email, "password": "password123" }),
            None,
        ),
        "register",
    )
    .await;
    assert_eq!(response.status_code, 201, "{}", response.body);
    response.json_body().expect("json")["token"]
        .as_str()
        .expect("token")
        .to_string()
}

#[test]
fn health_is_answered_without_the_database() {
    block_on(async {
        let response = invoke(api_event("GET", "/health"), "health").await;

        assert_eq!(response.status_code, 200);
        let body = response.json_body().unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(response.header("x-request-id"), Some("test-request-health"));
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    });
}

#[test]
fn register_twice_is_rejected() {
    block_on(async {
        register("lambda-frank@example.com").await;

        let second = invoke(
            json_event(
                "POST",
                "/api/auth/register",
                &json!({ "email": "lambda-frank@example.com", "password": "password123" }),
                None,
            ),
            "dup",
        )
        .await;
        assert_eq!(second.status_code, 400);
        let body = second.json_body().unwrap();
        assert_eq!(body["error"], "Email already registered");
        assert_eq!(body["path"], "/api/auth/register");
        assert_eq!(body["requestId"], "test-request-dup");
    });
}

#[test]
fn created_todo_title_is_trimmed() {
    block_on(async {
        let token = register("lambda-grace@example.com").await;

        let created = invoke(
            json_event("POST", "/api/todos", &json!({ "title": "  x  " }), Some(&token)),
            "create",
        )
        .await;
        assert_eq!(created.status_code, 201);
        assert_eq!(created.json_body().unwrap()["title"], "x");
    });
}

#[test]
fn other_owners_todo_is_not_found() {
    block_on(async {
        let owner = register("lambda-heidi@example.com").await;
        let intruder = register("lambda-ivan@example.com").await;

        let created = invoke(
            json_event("POST", "/api/todos", &json!({ "title": "mine" }), Some(&owner)),
            "create",
        )
        .await;
        let id = created.json_body().unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = invoke(
            json_event(
                "PUT",
                &format!("/api/todos/{id}"),
                &json!({ "completed": true }),
                Some(&intruder),
            ),
            "put",
        )
        .await;
        assert_eq!(response.status_code, 404);
        assert_eq!(response.json_body().unwrap()["error"], "Todo not found");
    });
}

#[test]
fn client_request_id_wins_over_platform_id() {
    block_on(async {
        let mut payload = rest_event("GET", "/api/todos");
        payload["headers"]["x-request-id"] = json!("client-id");

        let response = invoke(payload, "platform").await;
        assert_eq!(response.status_code, 401);
        assert_eq!(response.header("x-request-id"), Some("client-id"));
        assert_eq!(response.json_body().unwrap()["requestId"], "client-id");
    });
}

#[test]
fn payload_that_is_not_an_event_is_rejected() {
    block_on(async {
        let response = invoke(json!("not an event"), "bad").await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.json_body().unwrap()["requestId"], "test-request-bad");
    });
}
