#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum_test::TestServer;
use panahon_core::{
    auth::{PasswordCrypto, Registration},
    database::{MemoryStore, ports::UserRepository},
    users::User,
};
use panahon_server::{AppState, infra::config::Config, routes};
use serde_json::{Value, json};

pub const TEST_KEY: &[u8; 32] = b"panahon-test-key-0123456789abcde";
pub const PASSWORD: &str = "secret123";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn api(path: &str) -> String {
    format!("/api/v1{path}")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(Config::for_tests(TEST_KEY))
}

pub fn build_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::with_default_roles());
    let crypto = PasswordCrypto::with_params(1024, 1, 1).expect("cheap argon2 params");
    let state = AppState::with_crypto(Arc::new(config), store.clone(), crypto)
        .expect("state builds from test config");

    let router = routes::create_app(state.clone());
    let server = TestServer::builder()
        .http_transport()
        .build(router.into_make_service_with_connect_info::<SocketAddr>())
        .expect("test server starts");

    TestApp {
        server,
        state,
        store,
    }
}

impl TestApp {
    pub async fn create_user(&self, username: &str, role: Option<&str>) -> User {
        let user = self
            .state
            .authenticator
            .register(Registration {
                username: username.into(),
                password: PASSWORD.into(),
                full_name: format!("{username} tester"),
                email: format!("{username}@panahon.test"),
            })
            .await
            .expect("user registers");
        if let Some(role) = role {
            self.store
                .assign_role(user.id, role)
                .await
                .expect("role assigned");
        }
        user
    }

    /// Log in and return the response body.
    pub async fn login(&self, username: &str) -> Value {
        let response = self
            .server
            .post(&api("/users/login"))
            .add_header("User-Agent", "station-logger/2.1")
            .json(&json!({ "username": username, "password": PASSWORD }))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

pub fn field<'a>(body: &'a Value, key: &str) -> &'a str {
    body[key]
        .as_str()
        .unwrap_or_else(|| panic!("{key} missing from {body}"))
}
