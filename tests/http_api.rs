//! HTTP接口集成测试
//! HTTP surface integration tests

use actix_web::{test, web, App};
use serde_json::{json, Value};

use vfood_rust::bootstrap::configure_global_routes;
use vfood_rust::conf::{AppConfig, ChatConfig, ServerConfig, TokenConfig};
use vfood_rust::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: None,
        },
        chat: ChatConfig::default(),
        token: TokenConfig {
            secret: "integration-test-secret".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
        },
    }
}

macro_rules! test_app {
    () => {{
        let state = web::Data::new(AppState::new(test_config()));
        test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_global_routes),
        )
        .await
    }};
}

#[actix_web::test]
async fn health_endpoint_reports_ok() {
    let app = test_app!();
    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/health").to_request(),
    )
    .await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["status"], "ok");
}

#[actix_web::test]
async fn outlet_crud_roundtrip() {
    let app = test_app!();

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/outlets")
            .set_json(json!({"name": "Dosa Hut", "status": "active"}))
            .to_request(),
    )
    .await;
    assert_eq!(created["success"], true);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let fetched: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/outlets/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(fetched["data"]["name"], "Dosa Hut");

    let updated: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::put()
            .uri(&format!("/api/outlets/{}", id))
            .set_json(json!({"status": "closed"}))
            .to_request(),
    )
    .await;
    assert_eq!(updated["data"]["status"], "closed");
    assert_eq!(updated["data"]["name"], "Dosa Hut");

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/api/outlets/{}", id))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/outlets/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn validation_failures_are_bad_requests() {
    let app = test_app!();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/outlets")
            .set_json(json!({"name": "  "}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn listing_honors_the_query_grammar() {
    let app = test_app!();
    for (name, price, status) in [
        ("Idli", 50, "active"),
        ("Dosa", 150, "active"),
        ("Thali", 300, "active"),
        ("Feast", 500, "inactive"),
    ] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/menu-items")
                .set_json(json!({"name": name, "price": price, "status": status}))
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
    }

    let resp: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/menu-items?status=active&price__gte=100&sortKey=price&sortDir=asc&page=1&limit=2")
            .to_request(),
    )
    .await;
    let data = &resp["data"];
    assert_eq!(data["pagination"]["totalItems"], 2);
    assert_eq!(data["pagination"]["totalPages"], 1);
    assert_eq!(data["result"][0]["price"], 150);
    assert_eq!(data["result"][1]["price"], 300);
}

#[actix_web::test]
async fn numeric_bodies_round_trip_without_widening() {
    let app = test_app!();
    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/menu-items")
            .set_json(json!({"name": "Idli", "price": 150}))
            .to_request(),
    )
    .await;
    // 整数价格不得变成150.0 / An integer price must not come back as 150.0
    assert_eq!(created["data"]["price"], json!(150));

    let id = created["data"]["id"].as_str().unwrap();
    let fetched: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/menu-items/{}", id))
            .to_request(),
    )
    .await;
    assert_eq!(fetched["data"]["price"], json!(150));

    let decimal: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/menu-items")
            .set_json(json!({"name": "Half Dosa", "price": 99.5}))
            .to_request(),
    )
    .await;
    assert_eq!(decimal["data"]["price"], json!(99.5));
}

#[actix_web::test]
async fn admin_listing_flattens_the_role_join() {
    let app = test_app!();
    let role: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/roles")
            .set_json(json!({"name": "supervisor"}))
            .to_request(),
    )
    .await;
    let role_id = role["data"]["id"].as_str().unwrap();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/admins")
            .set_json(json!({
                "email": "admin@example.com",
                "password": "secret",
                "roleId": role_id
            }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/admins").to_request(),
    )
    .await;
    let row = &listed["data"]["result"][0];
    assert_eq!(row["role"], "supervisor");
    assert!(row.get("password").is_none());
}

#[actix_web::test]
async fn login_and_refresh_issue_tokens() {
    let app = test_app!();
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({
                "email": "asha@example.com",
                "name": "Asha",
                "password": "open-sesame",
                "role": "owner"
            }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users/login")
            .set_json(json!({"email": "asha@example.com", "password": "wrong"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);

    let login: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/users/login")
            .set_json(json!({"email": "asha@example.com", "password": "open-sesame"}))
            .to_request(),
    )
    .await;
    assert_eq!(login["data"]["user"]["email"], "asha@example.com");
    assert!(login["data"]["user"].get("password").is_none());
    let refresh_token = login["data"]["refreshToken"].as_str().unwrap();

    let refreshed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/users/refresh")
            .set_json(json!({"refreshToken": refresh_token}))
            .to_request(),
    )
    .await;
    assert!(refreshed["data"]["accessToken"].as_str().is_some());
}
