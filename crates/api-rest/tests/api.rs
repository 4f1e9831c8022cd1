//! Router-level tests: requests go through the full axum stack via `oneshot`.

use api_rest::{router, AppState};
use api_shared::auth::SessionSigner;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chs_core::gateway::sign_webhook_body;
use chs_core::{
    prepare_data_dir, CheckoutGateway, CheckoutRequest, CheckoutSession, CoreConfig, RecordError,
    RecordResult,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_for_tests";

struct StubGateway {
    fail: bool,
}

impl CheckoutGateway for StubGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> RecordResult<CheckoutSession> {
        if self.fail {
            return Err(RecordError::Gateway("HTTP 503: maintenance".into()));
        }
        Ok(CheckoutSession {
            id: format!("INV-{}", request.api_ref),
            url: format!("https://pay.example/checkout/{}", request.api_ref),
        })
    }
}

struct TestApp {
    app: Router,
    _temp: TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        Self::with_gateway(StubGateway { fail: false })
    }

    fn with_gateway(gateway: StubGateway) -> Self {
        let temp = TempDir::new().unwrap();
        let cfg = CoreConfig::new(temp.path().to_path_buf()).unwrap();
        prepare_data_dir(&cfg).unwrap();
        let state = AppState {
            cfg: Arc::new(cfg),
            sessions: Arc::new(SessionSigner::new("test-session-secret")),
            gateway: Arc::new(gateway),
            webhook_secret: WEBHOOK_SECRET.into(),
            public_base_url: None,
        };
        Self {
            app: router(state),
            _temp: temp,
        }
    }

    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "chs.test");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn webhook(&self, body: &str, signature: Option<String>) -> Reply {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhooks/intasend")
            .header(CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-webhook-signature", signature);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Registers and logs in, returning the `Cookie` header value for the session.
    async fn signup(&self, username: &str, role: &str) -> String {
        let reply = self
            .call(Method::POST, "/register", None, Some(registration(username, role)))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);

        let reply = self
            .call(
                Method::POST,
                "/login",
                None,
                Some(json!({"username": username, "password": "secret123"})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        session_from(&reply.headers)
    }
}

fn registration(username: &str, role: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": "secret123",
        "confirm_password": "secret123",
        "first_name": "Achieng",
        "last_name": "Otieno",
        "role": role,
        "facility_name": "Kisumu County Hospital"
    })
}

fn patient(first: &str) -> Value {
    json!({
        "first_name": first,
        "last_name": "Mwangi",
        "date_of_birth": "1988-04-12",
        "gender": "female",
        "county": "kisumu"
    })
}

fn session_from(headers: &HeaderMap) -> String {
    let set_cookie = headers
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("login sets a cookie");
    set_cookie
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let reply = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["ok"], true);
}

#[tokio::test]
async fn login_issues_cookie_and_logout_clears_it() {
    let app = TestApp::new();
    let cookie = app.signup("dr_achieng", "doctor").await;
    assert!(cookie.starts_with("chs_session="));

    let reply = app.call(Method::GET, "/dashboard", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["role"], "doctor");

    let reply = app.call(Method::POST, "/logout", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cleared = reply.headers.get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn bad_credentials_get_one_generic_answer() {
    let app = TestApp::new();
    app.signup("nurse_ruth", "chw").await;

    let wrong_password = app
        .call(
            Method::POST,
            "/login",
            None,
            Some(json!({"username": "nurse_ruth", "password": "nope"})),
        )
        .await;
    let unknown_user = app
        .call(
            Method::POST,
            "/login",
            None,
            Some(json!({"username": "ghost", "password": "secret123"})),
        )
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_user.body);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new();
    app.signup("chw_otieno", "chw").await;
    let reply = app
        .call(Method::POST, "/register", None, Some(registration("chw_otieno", "chw")))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_registration_reports_fields() {
    let app = TestApp::new();
    let mut body = registration("x", "nurse");
    body["confirm_password"] = json!("different");
    let reply = app.call(Method::POST, "/register", None, Some(body)).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(reply.body["fields"]["role"].is_array());
    assert!(reply.body["fields"]["confirm_password"].is_array());
}

#[tokio::test]
async fn protected_routes_need_a_valid_session() {
    let app = TestApp::new();
    let reply = app.call(Method::GET, "/patients", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app
        .call(Method::GET, "/patients", Some("chs_session=forged.token"), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn community_health_workers_only_reach_assigned_patients() {
    let app = TestApp::new();
    let chw_one = app.signup("chw_one", "chw").await;
    let chw_two = app.signup("chw_two", "chw").await;
    let doctor = app.signup("dr_two", "doctor").await;

    let created = app
        .call(Method::POST, "/patients", Some(&chw_one), Some(patient("Amina")))
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    let id = created.body["id"].as_str().unwrap().to_string();
    assert!(created.body["assigned_chw_id"].is_string());

    let uri = format!("/patients/{id}");
    let other = app.call(Method::GET, &uri, Some(&chw_two), None).await;
    assert_eq!(other.status, StatusCode::FORBIDDEN);
    let edit = app
        .call(Method::PUT, &uri, Some(&chw_two), Some(patient("Changed")))
        .await;
    assert_eq!(edit.status, StatusCode::FORBIDDEN);

    let own = app.call(Method::GET, &uri, Some(&chw_one), None).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["patient"]["first_name"], "Amina");

    let clinician = app.call(Method::GET, &uri, Some(&doctor), None).await;
    assert_eq!(clinician.status, StatusCode::OK);

    let listed = app.call(Method::GET, "/patients", Some(&chw_two), None).await;
    assert_eq!(listed.body["patients"].as_array().unwrap().len(), 0);

    let missing = app
        .call(Method::GET, "/patients/not-a-uuid", Some(&doctor), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn encounters_and_quick_search() {
    let app = TestApp::new();
    let doctor = app.signup("dr_search", "doctor").await;
    let created = app
        .call(Method::POST, "/patients", Some(&doctor), Some(patient("Zawadi")))
        .await;
    let id = created.body["id"].as_str().unwrap().to_string();

    let encounter = app
        .call(
            Method::POST,
            &format!("/patients/{id}/health_records"),
            Some(&doctor),
            Some(json!({"encounter_type": "consultation", "weight": 70.0, "height": 175.0})),
        )
        .await;
    assert_eq!(encounter.status, StatusCode::CREATED, "{}", encounter.body);
    assert_eq!(encounter.body["bmi"], 22.9);
    assert_eq!(encounter.body["facility_name"], "Kisumu County Hospital");

    let hits = app
        .call(Method::GET, "/api/patients/search?q=zaw", Some(&doctor), None)
        .await;
    assert_eq!(hits.status, StatusCode::OK);
    assert_eq!(hits.body.as_array().unwrap().len(), 1);

    let short = app
        .call(Method::GET, "/api/patients/search?q=z", Some(&doctor), None)
        .await;
    assert_eq!(short.body, json!([]));
}

#[tokio::test]
async fn attendance_is_recorded_once() {
    let app = TestApp::new();
    let chw = app.signup("chw_events", "chw").await;
    let created = app
        .call(Method::POST, "/patients", Some(&chw), Some(patient("Baraka")))
        .await;
    let patient_id = created.body["id"].as_str().unwrap().to_string();

    let event = app
        .call(
            Method::POST,
            "/outreach",
            Some(&chw),
            Some(json!({
                "title": "Measles drive",
                "event_type": "vaccination",
                "start_date": "2030-06-01T08:00:00Z",
                "end_date": "2030-06-01T16:00:00Z",
                "location": "Kondele market"
            })),
        )
        .await;
    assert_eq!(event.status, StatusCode::CREATED, "{}", event.body);
    let attend = format!("/outreach/{}/attend", event.body["id"].as_str().unwrap());

    let first = app
        .call(Method::POST, &attend, Some(&chw), Some(json!({"patient_id": patient_id})))
        .await;
    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    let second = app
        .call(Method::POST, &attend, Some(&chw), Some(json!({"patient_id": patient_id})))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);

    let listed = app.call(Method::GET, "/outreach", Some(&chw), None).await;
    assert_eq!(listed.body["events"][0]["attendance_count"], 1);
}

#[tokio::test]
async fn payment_flow_from_checkout_to_signed_callback() {
    let app = TestApp::new();
    let doctor = app.signup("dr_pay", "doctor").await;

    let initiated = app
        .call(
            Method::POST,
            "/payments",
            Some(&doctor),
            Some(json!({
                "amount": 500.0,
                "payment_type": "consultation_fee",
                "phone_number": "0712345678"
            })),
        )
        .await;
    assert_eq!(initiated.status, StatusCode::SEE_OTHER, "{}", initiated.body);
    let reference = initiated.body["payment"]["payment_reference"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(reference.starts_with("CHS"));
    assert_eq!(initiated.body["payment"]["status"], "pending");
    assert_eq!(initiated.body["payment"]["phone_number"], "+254712345678");
    assert_eq!(
        initiated.headers.get(LOCATION).unwrap(),
        &format!("https://pay.example/checkout/{reference}")
    );

    let callback = json!({"invoice_id": format!("INV-{reference}"), "state": "COMPLETE"}).to_string();

    let unsigned = app.webhook(&callback, None).await;
    assert_eq!(unsigned.status, StatusCode::UNAUTHORIZED);
    let forged = app
        .webhook(&callback, Some(sign_webhook_body("wrong", callback.as_bytes())))
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    let still_pending = app.call(Method::GET, "/payments", Some(&doctor), None).await;
    assert_eq!(still_pending.body["payments"][0]["status"], "pending");

    let signed = sign_webhook_body(WEBHOOK_SECRET, callback.as_bytes());
    let accepted = app.webhook(&callback, Some(signed.clone())).await;
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(accepted.body["status"], "success");

    let after = app.call(Method::GET, "/payments", Some(&doctor), None).await;
    let payment = after.body["payments"][0].clone();
    assert_eq!(payment["status"], "completed");
    assert!(payment["completed_at"].is_string());

    let replay = app.webhook(&callback, Some(signed)).await;
    assert_eq!(replay.status, StatusCode::OK);
    let again = app.call(Method::GET, "/payments", Some(&doctor), None).await;
    assert_eq!(again.body["payments"][0], payment);
}

#[tokio::test]
async fn webhook_edge_cases_are_acknowledged_or_rejected() {
    let app = TestApp::new();

    let unknown = json!({"invoice_id": "INV-NOPE", "state": "COMPLETE"}).to_string();
    let reply = app
        .webhook(&unknown, Some(sign_webhook_body(WEBHOOK_SECRET, unknown.as_bytes())))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "success");

    let partial = json!({"state": "COMPLETE"}).to_string();
    let reply = app
        .webhook(&partial, Some(sign_webhook_body(WEBHOOK_SECRET, partial.as_bytes())))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let garbage = "not json";
    let reply = app
        .webhook(garbage, Some(sign_webhook_body(WEBHOOK_SECRET, garbage.as_bytes())))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["status"], "error");
}

#[tokio::test]
async fn webhook_fields_that_are_not_text_are_treated_as_missing() {
    let app = TestApp::new();
    let doctor = app.signup("dr_odd", "doctor").await;
    let initiated = app
        .call(
            Method::POST,
            "/payments",
            Some(&doctor),
            Some(json!({
                "amount": 150.0,
                "payment_type": "medication_fee",
                "phone_number": "0712345678"
            })),
        )
        .await;
    let reference = initiated.body["payment"]["payment_reference"]
        .as_str()
        .unwrap()
        .to_string();

    for body in [
        json!({"invoice_id": 12345, "state": "COMPLETE"}),
        json!({"invoice_id": format!("INV-{reference}"), "state": 7}),
        json!({"invoice_id": format!("INV-{reference}"), "state": ""}),
        json!({"invoice_id": null, "state": "COMPLETE"}),
        json!([1, 2, 3]),
    ] {
        let raw = body.to_string();
        let reply = app
            .webhook(&raw, Some(sign_webhook_body(WEBHOOK_SECRET, raw.as_bytes())))
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{raw}");
        assert_eq!(reply.body["status"], "success", "{raw}");
    }

    let listed = app.call(Method::GET, "/payments", Some(&doctor), None).await;
    assert_eq!(listed.body["payments"][0]["status"], "pending");
    assert!(listed.body["payments"][0]["gateway_status"].is_null());
}

#[tokio::test]
async fn gateway_failure_stores_nothing() {
    let app = TestApp::with_gateway(StubGateway { fail: true });
    let chw = app.signup("chw_pay", "chw").await;

    let reply = app
        .call(
            Method::POST,
            "/payments",
            Some(&chw),
            Some(json!({
                "amount": 200.0,
                "payment_type": "other",
                "phone_number": "254712345678"
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.body["error"], "Error initiating payment. Please try again.");

    let listed = app.call(Method::GET, "/payments", Some(&chw), None).await;
    assert_eq!(listed.body["payments"], json!([]));
}

#[tokio::test]
async fn administration_is_admin_only_and_deactivation_ends_sessions() {
    let app = TestApp::new();
    let admin = app.signup("admin_jane", "admin").await;
    let chw = app.signup("chw_leaving", "chw").await;

    let denied = app.call(Method::GET, "/users", Some(&chw), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    let denied = app.call(Method::GET, "/audit", Some(&chw), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let users = app.call(Method::GET, "/users?role=chw", Some(&admin), None).await;
    assert_eq!(users.status, StatusCode::OK);
    let accounts = users.body["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    let chw_id = accounts[0]["id"].as_str().unwrap().to_string();

    let toggled = app
        .call(
            Method::POST,
            &format!("/users/{chw_id}/toggle_status"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.body["is_active"], false);

    let locked_out = app.call(Method::GET, "/dashboard", Some(&chw), None).await;
    assert_eq!(locked_out.status, StatusCode::UNAUTHORIZED);

    let audit = app.call(Method::GET, "/audit?limit=50", Some(&admin), None).await;
    assert_eq!(audit.status, StatusCode::OK);
    let actions: Vec<&str> = audit.body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert_eq!(actions.first(), Some(&"user_status_changed"));
    assert!(actions.contains(&"user_login"));
}
