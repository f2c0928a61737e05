use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use panahon_core::{
    auth::{Identity, TokenKind, roles},
    database::ports::SessionRepository,
};
use serde_json::{Value, json};
use uuid::Uuid;

#[path = "support/mod.rs"]
mod support;
use support::{PASSWORD, api, bearer, build_test_app, field};

fn timestamp(body: &Value, key: &str) -> DateTime<Utc> {
    field(body, key).parse().expect("RFC 3339 timestamp")
}

#[tokio::test]
async fn login_then_renew_keeps_identity() {
    let app = build_test_app();
    let user = app.create_user("observer", Some(roles::ADMIN)).await;

    let login = app.login("observer").await;
    let access = field(&login, "access_token");
    let refresh = field(&login, "refresh_token");
    assert_ne!(access, refresh);
    assert!(timestamp(&login, "access_token_expires_at") > Utc::now());
    assert!(
        timestamp(&login, "access_token_expires_at")
            < timestamp(&login, "refresh_token_expires_at")
    );
    assert_eq!(login["user"]["username"], "observer");
    assert!(login["user"].get("password_hash").is_none());

    let renewed = app
        .server
        .post(&api("/tokens/renew"))
        .json(&json!({ "refresh_token": refresh }))
        .await;
    renewed.assert_status_ok();
    let renewed: Value = renewed.json();
    let new_access = field(&renewed, "access_token");
    assert_ne!(new_access, access);
    assert!(renewed.get("refresh_token").is_none());

    let me = app
        .server
        .get(&api("/users/me"))
        .add_header("Authorization", bearer(new_access))
        .await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["subject_id"], user.id);
    assert_eq!(me["role"], roles::ADMIN);
    assert_eq!(me["user"]["email"], "observer@panahon.test");
}

#[tokio::test]
async fn login_records_client_meta_on_session() {
    let app = build_test_app();
    app.create_user("logger", None).await;

    let login = app.login("logger").await;
    let session_id: Uuid = field(&login, "session_id").parse().unwrap();

    let session = app
        .store
        .get_session_by_id(session_id)
        .await
        .unwrap()
        .expect("session persisted");
    assert_eq!(session.user_agent, "station-logger/2.1");
    assert_eq!(session.client_ip, "127.0.0.1");
    assert!(!session.is_blocked);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let app = build_test_app();
    app.create_user("observer", None).await;

    for (username, password) in [("observer", "wrong-pass"), ("nobody", PASSWORD)] {
        let response = app
            .server
            .post(&api("/users/login"))
            .json(&json!({ "username": username, "password": password }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["status"], 401);
    }
}

#[tokio::test]
async fn registration_validates_and_rejects_duplicates() {
    let app = build_test_app();
    let register = |username: &str, password: &str, email: &str| {
        app.server.post(&api("/users/register")).json(&json!({
            "username": username,
            "password": password,
            "full_name": "Maria Clara",
            "email": email,
        }))
    };

    register("maria", "secret1", "maria@panahon.test")
        .await
        .assert_status(StatusCode::CREATED);
    register("maria", "secret1", "other@panahon.test")
        .await
        .assert_status(StatusCode::CONFLICT);
    register("other", "secret1", "maria@panahon.test")
        .await
        .assert_status(StatusCode::CONFLICT);
    register("not valid!", "secret1", "x@panahon.test")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    register("shortpw", "12345", "y@panahon.test")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = build_test_app();

    app.server
        .get(&api("/users/me"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .get(&api("/users/me"))
        .add_header("Authorization", "Token abc")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .get(&api("/users/me"))
        .add_header("Authorization", bearer("pn1.local.not-a-token"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let expired = app
        .state
        .codec
        .issue(&Identity::new(1, roles::SUPERADMIN), chrono::Duration::zero())
        .unwrap();
    app.server
        .get(&api("/roles"))
        .add_header("Authorization", bearer(&expired.token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_gated_routes() {
    let app = build_test_app();
    app.create_user("root", Some(roles::SUPERADMIN)).await;
    app.create_user("admin", Some(roles::ADMIN)).await;
    app.create_user("plain", None).await;

    let root = app.login("root").await;
    let roles_response = app
        .server
        .get(&api("/roles"))
        .add_header("Authorization", bearer(field(&root, "access_token")))
        .await;
    roles_response.assert_status_ok();
    let listed: Vec<Value> = roles_response.json();
    let names: Vec<&str> = listed.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, [roles::SUPERADMIN, roles::ADMIN]);

    for username in ["admin", "plain"] {
        let login = app.login(username).await;
        app.server
            .get(&api("/roles"))
            .add_header("Authorization", bearer(field(&login, "access_token")))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    app.server
        .get(&api("/roles"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blocked_session_cannot_renew() {
    let app = build_test_app();
    app.create_user("root", Some(roles::SUPERADMIN)).await;
    app.create_user("field", Some(roles::ADMIN)).await;

    let root = app.login("root").await;
    let victim = app.login("field").await;
    let session_id = field(&victim, "session_id");

    app.server
        .post(&api(&format!("/sessions/{session_id}/block")))
        .add_header("Authorization", bearer(field(&root, "access_token")))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .post(&api("/tokens/renew"))
        .json(&json!({ "refresh_token": field(&victim, "refresh_token") }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .post(&api(&format!("/sessions/{}/block", Uuid::new_v4())))
        .add_header("Authorization", bearer(field(&root, "access_token")))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .post(&api(&format!("/sessions/{session_id}/block")))
        .add_header("Authorization", bearer(field(&victim, "access_token")))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refresh_token_is_not_a_bearer_credential() {
    let app = build_test_app();
    app.create_user("root", Some(roles::SUPERADMIN)).await;
    app.create_user("field", Some(roles::SUPERADMIN)).await;

    let root = app.login("root").await;
    let victim = app.login("field").await;
    let session_id = field(&victim, "session_id");
    let refresh = field(&victim, "refresh_token");

    app.server
        .get(&api("/users/me"))
        .add_header("Authorization", bearer(refresh))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .post(&api(&format!("/sessions/{session_id}/block")))
        .add_header("Authorization", bearer(field(&root, "access_token")))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.server
        .get(&api("/roles"))
        .add_header("Authorization", bearer(refresh))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // The access token half of the pair is still an ordinary credential.
    app.server
        .get(&api("/roles"))
        .add_header("Authorization", bearer(field(&victim, "access_token")))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn renew_rejects_tampered_and_orphaned_tokens() {
    let app = build_test_app();
    app.create_user("observer", Some(roles::ADMIN)).await;
    let login = app.login("observer").await;

    let mut tampered = field(&login, "refresh_token").to_string();
    tampered.push('x');
    app.server
        .post(&api("/tokens/renew"))
        .json(&json!({ "refresh_token": tampered }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let orphan = app
        .state
        .codec
        .issue_for_session(
            &Identity::new(1, roles::ADMIN),
            TokenKind::Refresh,
            chrono::Duration::hours(1),
            Uuid::new_v4(),
        )
        .unwrap();
    app.server
        .post(&api("/tokens/renew"))
        .json(&json!({ "refresh_token": orphan.token }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.server
        .post(&api("/tokens/renew"))
        .json(&json!({ "refresh_token": field(&login, "access_token") }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
