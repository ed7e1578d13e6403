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

use appointment_cell::models::{BookAppointmentRequest, RescheduleAppointmentRequest};
use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn create_test_app(config: AppConfig) -> Router {
    appointment_routes(Arc::new(config))
}

fn test_setup(mock_server: &MockServer) -> (AppConfig, String) {
    let user = TestUser::staff("front-desk@clinic.test");
    let test_config = TestConfig::default();
    let mut config = test_config.to_app_config();
    config.supabase_url = mock_server.uri();
    config.notification_webhook_url = format!("{}/hooks/confirmation", mock_server.uri());

    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    (config, token)
}

/// Patient and doctor lookups plus a webhook that accepts confirmations.
async fn setup_booking_mocks(mock_server: &MockServer, patient_id: &str, doctor_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(patient_id, "V-12345678")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_row(doctor_id, "V-87654321")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hooks/confirmation"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mock_server)
        .await;
}

fn book_request_body(patient_id: Uuid, doctor_id: Uuid) -> BookAppointmentRequest {
    BookAppointmentRequest {
        patient_id,
        doctor_id,
        date: "2024-03-01".to_string(),
        time: "10:00".to_string(),
        reason: "checkup".to_string(),
    }
}

fn post_json(uri: &str, token: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_book_appointment_success() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    setup_booking_mocks(&mock_server, &patient_id.to_string(), &doctor_id.to_string()).await;

    // Slot is free
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2024-03-01",
                "10:00:00",
                "scheduled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = post_json("/", &token, &book_request_body(patient_id, doctor_id));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["notification"], json!("sent"));
    assert_eq!(json["appointment"]["status"], json!("scheduled"));
}

#[tokio::test]
async fn test_book_appointment_slot_conflict_creates_no_row() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    setup_booking_mocks(&mock_server, &patient_id.to_string(), &doctor_id.to_string()).await;

    // Another appointment already holds the slot
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("date", "eq.2024-03-01"))
        .and(query_param("time", "eq.10:00:00"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": Uuid::new_v4()}])),
        )
        .mount(&mock_server)
        .await;

    // The insert must never be attempted
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = post_json("/", &token, &book_request_body(patient_id, doctor_id));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_book_appointment_unique_index_backstop() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    setup_booking_mocks(&mock_server, &patient_id.to_string(), &doctor_id.to_string()).await;

    // Advisory check sees a free slot, but a concurrent writer got there
    // first and the store's unique index rejects the insert.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(MockSupabaseResponses::unique_violation_body()),
        )
        .mount(&mock_server)
        .await;

    let request = post_json("/", &token, &book_request_body(patient_id, doctor_id));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_book_appointment_invalid_time_rejected() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let mut body = book_request_body(Uuid::new_v4(), Uuid::new_v4());
    body.time = "half past ten".to_string();

    let request = post_json("/", &token, &body);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_book_appointment_unknown_patient() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = post_json("/", &token, &book_request_body(patient_id, doctor_id));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_survives_webhook_failure() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_row(&patient_id.to_string(), "V-12345678")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_row(&doctor_id.to_string(), "V-87654321")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2024-03-01",
                "10:00:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    // Webhook is down; the booking must still succeed
    Mock::given(method("POST"))
        .and(path("/hooks/confirmation"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let request = post_json("/", &token, &book_request_body(patient_id, doctor_id));
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["notification"], json!("failed"));
}

#[tokio::test]
async fn test_reschedule_own_slot_succeeds() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2024-03-01",
                "10:00:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    // Self-exclusion: with id=neq.<own id> the slot reads as free
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2024-03-01",
                "10:00:00",
                "scheduled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = RescheduleAppointmentRequest {
        date: "2024-03-01".to_string(),
        time: "10:00".to_string(),
        reason: "updated reason".to_string(),
        status: appointment_cell::models::AppointmentStatus::Scheduled,
    };

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/{}", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reschedule_onto_occupied_slot_conflicts() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let appointment_id = Uuid::new_v4();
    let other_appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                &doctor_id.to_string(),
                "2024-03-01",
                "10:00:00",
                "scheduled",
            )
        ])))
        .mount(&mock_server)
        .await;

    // A different appointment holds the requested slot
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .and(query_param("id", format!("neq.{}", appointment_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": other_appointment_id}])),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let body = RescheduleAppointmentRequest {
        date: "2024-03-01".to_string(),
        time: "11:00".to_string(),
        reason: "move".to_string(),
        status: appointment_cell::models::AppointmentStatus::Scheduled,
    };

    let request = Request::builder()
        .method("PUT")
        .uri(format!("/{}", appointment_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_availability_probe_is_idempotent() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("date", "eq.2024-03-01"))
        .and(query_param("time", "eq.10:00:00"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": Uuid::new_v4()}])),
        )
        .mount(&mock_server)
        .await;

    let uri = format!(
        "/availability?doctor_id={}&date=2024-03-01&time=10:00",
        doctor_id
    );

    for _ in 0..2 {
        let request = Request::builder()
            .method("GET")
            .uri(uri.clone())
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["taken"], json!(true));
    }
}

#[tokio::test]
async fn test_list_appointments_with_tallies() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    let patient_id = Uuid::new_v4().to_string();
    let doctor_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", "eq.2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &patient_id, &doctor_id,
                "2024-03-01", "11:00:00", "scheduled",
            ),
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &patient_id, &doctor_id,
                "2024-03-01", "10:00:00", "completed",
            ),
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(), &patient_id, &doctor_id,
                "2024-03-01", "09:00:00", "cancelled",
            ),
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/?date=2024-03-01")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["tallies"]["total"], json!(3));
    assert_eq!(json["tallies"]["scheduled"], json!(1));
    assert_eq!(json["tallies"]["completed"], json!(1));
    assert_eq!(json["tallies"]["cancelled"], json!(1));
}

#[tokio::test]
async fn test_month_listing_builds_range_window() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("date", "gte.2024-12-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/?month=2024-12")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_agenda_shows_scheduled_only() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                "2024-03-02",
                "12:00:00",
                "scheduled",
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/agenda")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_missing_appointment_not_found() {
    let mock_server = MockServer::start().await;
    let (config, token) = test_setup(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("DELETE")
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
        .uri("/agenda")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let (config, _token) = test_setup(&mock_server);

    let user = TestUser::staff("front-desk@clinic.test");
    let expired = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);
    let app = create_test_app(config).await;

    let request = Request::builder()
        .method("GET")
        .uri("/agenda")
        .header("authorization", format!("Bearer {}", expired))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
