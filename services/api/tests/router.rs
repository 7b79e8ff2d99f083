//! End-to-end tests of the HTTP API over the in-memory ports.

use api_lib::config::Config;
use api_lib::web::{router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trustpaws_core::testing::{MemoryIdentity, MemoryStore};
use trustpaws_core::Role;

struct Harness {
    app: Router,
    db: Arc<MemoryStore>,
    identity: Arc<MemoryIdentity>,
}

fn harness() -> Harness {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "SITE_URL" => Some("https://trustpaws.test".to_string()),
        _ => None,
    })
    .expect("expected test config to load");
    let db = Arc::new(MemoryStore::new());
    let identity = Arc::new(MemoryIdentity::new());
    let state = Arc::new(AppState::new(db.clone(), identity.clone(), Arc::new(config)));
    Harness {
        app: router(state),
        db,
        identity,
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("expected the router to respond");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("expected a readable body");
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    Reply {
        status,
        headers,
        body,
    }
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("expected a valid request")
}

/// The `session=...` pair from a Set-Cookie header.
fn cookie_from(headers: &HeaderMap) -> String {
    headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("expected a session cookie")
        .to_string()
}

async fn signed_in(h: &Harness, email: &str) -> String {
    h.identity.register(email, "secret123");
    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    cookie_from(&reply.headers)
}

#[tokio::test]
async fn login_sets_cookie_and_points_at_dashboard() {
    let h = harness();
    h.identity.register("ana@example.com", "secret123");

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["redirect_to"], "/dashboard");
    assert!(cookie_from(&reply.headers).starts_with("session="));

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "nope" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body, "Invalid email or password");
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let h = harness();
    let reply = send(&h.app, request(Method::GET, "/pets", None, None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(
        &h.app,
        request(Method::GET, "/pets", Some("session=forged"), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn magic_link_signs_in_and_redirects() {
    let h = harness();
    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/auth/magic-link",
            None,
            Some(json!({ "email": "new@example.com" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::ACCEPTED);

    let sent = h.identity.sent_links();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].redirect_to, "https://trustpaws.test/auth/callback");

    let uri = format!("/auth/callback?token={}", sent[0].token);
    let reply = send(&h.app, request(Method::GET, &uri, None, None)).await;
    assert_eq!(reply.status, StatusCode::SEE_OTHER);
    assert_eq!(reply.headers[header::LOCATION], "/dashboard");
    let cookie = cookie_from(&reply.headers);

    let reply = send(&h.app, request(Method::GET, "/session", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["user"]["email"], "new@example.com");

    // Links are single use.
    let reply = send(&h.app, request(Method::GET, &uri, None, None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gate_walks_a_new_tutor_to_onboarding() {
    let h = harness();

    let reply = send(&h.app, request(Method::GET, "/gate", None, None)).await;
    assert_eq!(reply.body["decision"], "navigate");
    assert_eq!(reply.body["redirect_to"], "/login");

    let cookie = signed_in(&h, "ana@example.com").await;
    let reply = send(&h.app, request(Method::GET, "/gate", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["decision"], "choose_role");
    assert_eq!(h.db.count("insert_profile"), 1);

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/profile/role",
            Some(cookie.as_str()),
            Some(json!({ "role": "tutor" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["redirect_to"], "/dashboard/tutor/onboarding");

    let reply = send(&h.app, request(Method::GET, "/gate", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["redirect_to"], "/dashboard/tutor");
    assert_eq!(h.db.count("insert_profile"), 1);
}

#[tokio::test]
async fn sitters_go_straight_to_their_dashboard() {
    let h = harness();
    let cookie = signed_in(&h, "bia@example.com").await;
    send(&h.app, request(Method::GET, "/gate", Some(cookie.as_str()), None)).await;

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/profile/role",
            Some(cookie.as_str()),
            Some(json!({ "role": "sitter" })),
        ),
    )
    .await;
    assert_eq!(reply.body["redirect_to"], "/dashboard/sitter");

    let reply = send(
        &h.app,
        request(Method::GET, "/dashboard/sitter", Some(cookie.as_str()), None),
    )
    .await;
    assert_eq!(reply.body["display_name"], "bia@example.com");
}

#[tokio::test]
async fn onboarding_flow_saves_one_pets_profile() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;
    let step = |body: Value| request(Method::POST, "/onboarding/next", Some(cookie.as_str()), Some(body));

    let reply = send(&h.app, request(Method::GET, "/onboarding", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["step"], "pet_types");
    assert_eq!(reply.body["step_number"], 1);
    assert_eq!(reply.body["total_steps"], 8);

    let reply = send(&h.app, step(json!({ "step": "pet_types", "value": ["dog", "cat"] }))).await;
    assert_eq!(reply.body["step"], "pet_count");
    assert_eq!(reply.body["count_form"], json!({ "dog": 1, "cat": 1 }));

    let reply = send(
        &h.app,
        step(json!({ "step": "pet_count", "value": { "dog": 2, "cat": 1 } })),
    )
    .await;
    assert_eq!(reply.body["step"], "pet_needs");

    send(&h.app, step(json!({ "step": "pet_needs", "value": ["medication"] }))).await;
    let reply = send(&h.app, step(json!({ "step": "info" }))).await;
    assert_eq!(reply.body["step"], "travel_dates");
    assert_eq!(reply.body["can_skip"], true);

    let reply = send(
        &h.app,
        request(Method::POST, "/onboarding/skip", Some(cookie.as_str()), None),
    )
    .await;
    assert_eq!(reply.body["step"], "select_dates");
    let first_month = reply.body["months"]["labels"][0]
        .as_str()
        .expect("expected month labels")
        .to_string();
    assert_eq!(reply.body["months"]["can_go_back"], false);

    let reply = send(&h.app, step(json!({ "step": "select_dates", "value": ["Jan 1990"] }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    send(&h.app, step(json!({ "step": "select_dates", "value": [first_month] }))).await;
    let reply = send(&h.app, step(json!({ "step": "trip_length", "value": "about_a_month" }))).await;
    assert_eq!(reply.body["step"], "location");

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/onboarding/finish",
            Some(cookie.as_str()),
            Some(json!({ "location": "São Paulo" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["redirect_to"], "/dashboard/tutor");
    assert_eq!(reply.body["pets_profile"]["location"], "São Paulo");
    assert_eq!(reply.body["pets_profile"]["pet_count"], json!({ "dog": 2, "cat": 1 }));

    let rows = h.db.pets_profiles();
    assert_eq!(rows.len(), 1);
    let user_id = rows[0].user_id;
    assert_eq!(h.db.profile(user_id).and_then(|p| p.role), Some(Role::Tutor));

    // A finished wizard starts over.
    let reply = send(&h.app, request(Method::GET, "/onboarding", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["step"], "pet_types");

    let reply = send(
        &h.app,
        request(Method::GET, "/dashboard/tutor", Some(cookie.as_str()), None),
    )
    .await;
    assert_eq!(reply.body["pets_profile"]["location"], "São Paulo");
}

#[tokio::test]
async fn wizard_rejects_out_of_order_actions() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/onboarding/next",
            Some(cookie.as_str()),
            Some(json!({ "step": "pet_types", "value": [] })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &h.app,
        request(Method::POST, "/onboarding/skip", Some(cookie.as_str()), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/onboarding/finish",
            Some(cookie.as_str()),
            Some(json!({ "location": "Recife" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(h.db.pets_profiles().is_empty());
}

#[tokio::test]
async fn failed_finish_keeps_the_wizard_on_location() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;
    for body in [
        json!({ "step": "pet_types", "value": ["fish"] }),
        json!({ "step": "pet_count", "value": { "fish": 3 } }),
        json!({ "step": "pet_needs", "value": [] }),
        json!({ "step": "info" }),
    ] {
        let reply = send(
            &h.app,
            request(Method::POST, "/onboarding/next", Some(cookie.as_str()), Some(body)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
    }
    for _ in 0..3 {
        send(
            &h.app,
            request(Method::POST, "/onboarding/skip", Some(cookie.as_str()), None),
        )
        .await;
    }

    h.db.fail_on("insert_pets_profile");
    let finish = || {
        request(
            Method::POST,
            "/onboarding/finish",
            Some(cookie.as_str()),
            Some(json!({ "location": "Recife" })),
        )
    };
    let reply = send(&h.app, finish()).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

    let reply = send(&h.app, request(Method::GET, "/onboarding", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["step"], "location");

    h.db.recover("insert_pets_profile");
    let reply = send(&h.app, finish()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(h.db.pets_profiles().len(), 1);
}

#[tokio::test]
async fn pets_can_be_added_edited_and_deleted() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;
    let rex = json!({
        "species": "dog",
        "gender": "male",
        "castrated": true,
        "name": " Rex ",
        "breed": "Labrador",
        "size": "large",
        "birthday": { "year": 2019 },
        "vaccines": ["rabies", "rabies", "v10"]
    });

    let reply = send(&h.app, request(Method::POST, "/pets", Some(cookie.as_str()), Some(rex))).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["name"], "Rex");
    assert_eq!(reply.body["vaccines"], json!(["rabies", "v10"]));
    let id = reply.body["id"].as_i64().expect("expected a pet id");

    let reply = send(
        &h.app,
        request(
            Method::PUT,
            &format!("/pets/{}", id),
            Some(cookie.as_str()),
            Some(json!({ "species": "dog", "name": "Rexy" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "Rexy");

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/pets",
            Some(cookie.as_str()),
            Some(json!({ "species": "cat", "name": "  " })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&h.app, request(Method::GET, "/pets", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body.as_array().map(Vec::len), Some(1));

    let reply = send(
        &h.app,
        request(Method::DELETE, &format!("/pets/{}", id), Some(cookie.as_str()), None),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!([]));
}

#[tokio::test]
async fn logout_discards_the_unfinished_wizard() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;
    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/onboarding/next",
            Some(cookie.as_str()),
            Some(json!({ "step": "pet_types", "value": ["dog"] })),
        ),
    )
    .await;
    assert_eq!(reply.body["step"], "pet_count");

    let reply = send(&h.app, request(Method::POST, "/auth/logout", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "secret123" })),
        ),
    )
    .await;
    let cookie = cookie_from(&reply.headers);
    let reply = send(&h.app, request(Method::GET, "/onboarding", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["step"], "pet_types");
    assert_eq!(reply.body["answers"]["pet_types"], json!([]));
}

#[tokio::test]
async fn first_authenticated_request_creates_the_profile() {
    let h = harness();
    let cookie = signed_in(&h, "caio@example.com").await;
    assert_eq!(h.db.count("insert_profile"), 0);

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/pets",
            Some(cookie.as_str()),
            Some(json!({ "species": "cat", "name": "Mia" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let tutor_id = reply.body["tutor_id"]
        .as_str()
        .and_then(|id| id.parse::<uuid::Uuid>().ok())
        .expect("expected a tutor id");
    let profile = h.db.profile(tutor_id).expect("expected a profile row");
    assert_eq!(profile.email.as_deref(), Some("caio@example.com"));
    assert_eq!(profile.role, None);

    send(&h.app, request(Method::GET, "/pets", Some(cookie.as_str()), None)).await;
    assert_eq!(h.db.count("insert_profile"), 1);
}

#[tokio::test]
async fn pets_of_other_tutors_are_out_of_reach() {
    let h = harness();
    let ana = signed_in(&h, "ana@example.com").await;
    let bia = signed_in(&h, "bia@example.com").await;

    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/pets",
            Some(ana.as_str()),
            Some(json!({ "species": "cat", "name": "Mia" })),
        ),
    )
    .await;
    let id = reply.body["id"].as_i64().expect("expected a pet id");

    let reply = send(
        &h.app,
        request(
            Method::PUT,
            &format!("/pets/{}", id),
            Some(bia.as_str()),
            Some(json!({ "species": "cat", "name": "Stolen" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&h.app, request(Method::GET, "/pets", Some(bia.as_str()), None)).await;
    assert_eq!(reply.body, json!([]));
}

#[tokio::test]
async fn photo_upload_is_stored_as_data_url() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;
    let reply = send(
        &h.app,
        request(
            Method::POST,
            "/pets",
            Some(cookie.as_str()),
            Some(json!({ "species": "dog", "name": "Rex" })),
        ),
    )
    .await;
    let id = reply.body["id"].as_i64().expect("expected a pet id");

    let body = "--XBOUNDARY\r\n\
        Content-Disposition: form-data; name=\"photo\"; filename=\"rex.png\"\r\n\
        Content-Type: image/png\r\n\r\n\
        hi\r\n\
        --XBOUNDARY--\r\n";
    let upload = Request::builder()
        .method(Method::POST)
        .uri(format!("/pets/{}/photo", id))
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(body))
        .expect("expected a valid request");
    let reply = send(&h.app, upload).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["photo"], "data:image/png;base64,aGk=");
}

#[tokio::test]
async fn settings_and_password_change() {
    let h = harness();
    let cookie = signed_in(&h, "ana@example.com").await;

    let reply = send(
        &h.app,
        request(
            Method::PUT,
            "/settings",
            Some(cookie.as_str()),
            Some(json!({ "first_name": " Ana ", "last_name": "Silva" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["first_name"], "Ana");

    let reply = send(&h.app, request(Method::GET, "/dashboard", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["display_name"], "Ana");

    let reply = send(
        &h.app,
        request(
            Method::PUT,
            "/auth/password",
            Some(cookie.as_str()),
            Some(json!({ "new_password": "newsecret", "confirm_password": "different" })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, "Passwords do not match");

    let reply = send(
        &h.app,
        request(
            Method::PUT,
            "/auth/password",
            Some(cookie.as_str()),
            Some(json!({
                "current_password": "secret123",
                "new_password": "newsecret",
                "confirm_password": "newsecret"
            })),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn nav_and_logout_follow_the_session() {
    let h = harness();
    let labels = |body: &Value| -> Vec<String> {
        body.as_array()
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| l["label"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let reply = send(&h.app, request(Method::GET, "/nav", None, None)).await;
    assert_eq!(labels(&reply.body), vec!["Home", "Find a pet sitter", "Login"]);

    let cookie = signed_in(&h, "ana@example.com").await;
    let reply = send(&h.app, request(Method::GET, "/nav", Some(cookie.as_str()), None)).await;
    assert_eq!(
        labels(&reply.body),
        vec!["Home", "Find a pet sitter", "Dashboard", "Sign Out"]
    );

    let reply = send(&h.app, request(Method::POST, "/auth/logout", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["redirect_to"], "/");

    let reply = send(&h.app, request(Method::GET, "/session", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.body["user"], Value::Null);
    let reply = send(&h.app, request(Method::GET, "/dashboard", Some(cookie.as_str()), None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}
