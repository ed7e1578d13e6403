use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn test_setup(mock_server: &MockServer) -> (AppConfig, String) {
    let user = TestUser::staff("front-desk@clinic.test");
    let test_config = TestConfig::default();
    let mut config = test_config.to_app_config();
    config.supabase_url = mock_server.uri();

    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    (config, token)
}

async fn create_test_app(config: AppConfig) -> Router {
    doctor_routes(Arc::new(config))
}

#[tokio::test]
async fn test_create_doctor_success() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("national_id", "eq.V-87654321"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::doctor_row(&Uuid::new_v4().to_string(), "V-87654321")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = json!({
        "national_id": "V-87654321",
        "first_name": "Carlos",
        "last_name": "Rivas",
        "phone": "+58 212 5559876"
    });

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_search_doctors_by_fragment() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param(
            "or",
            "(first_name.ilike.*Riv*,last_name.ilike.*Riv*)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_row(&Uuid::new_v4().to_string(), "V-87654321")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/search?q=Riv")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], json!(1));
}

#[tokio::test]
async fn test_search_rejects_filter_injection() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let request = Request::builder()
        .method("GET")
        .uri("/search?q=x,phone.eq.1")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_national_id_conflicts() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("national_id", "eq.V-87654321"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": Uuid::new_v4()}])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let body = json!({
        "national_id": "V-87654321",
        "first_name": "Carlos",
        "last_name": "Rivas"
    });

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_get_unknown_doctor_not_found() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let mock_server = MockServer::start().await;
    let (config, _token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
