// Integration tests for API Session
//
// These tests drive the public surface end-to-end: a mockito token endpoint,
// the reqwest transport, the SQLite store and authorized clients.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use api_session::{
    auth::{STORED_ACCESS_TOKEN_KEY, STORED_REFRESH_TOKEN_KEY, STORED_USERNAME_KEY},
    config::Config,
    store::{KeyValueStore, SqliteStore},
    transport::ReqwestTransport,
    AuthError, SessionManager,
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

fn test_config(base_url: &str, db_file: &Path) -> Config {
    Config {
        api_base_url: base_url.to_string(),
        auth_path: "/api/token/".to_string(),
        session_db_file: db_file.to_path_buf(),
        http_connect_timeout: 5,
        http_request_timeout: 5,
        http_max_retries: 0,
        http_retry_base_delay_ms: 1,
        log_level: "debug".to_string(),
    }
}

/// Manager wired to a real transport and a SQLite store in `dir`
fn create_manager(base_url: &str, dir: &Path) -> (SessionManager, SqliteStore) {
    let db_file = dir.join("session.sqlite3");
    let config = test_config(base_url, &db_file);
    let store = SqliteStore::open(&db_file).expect("Failed to open store");
    let transport = ReqwestTransport::new(5, 5).expect("Failed to create transport");
    let manager = SessionManager::new(&config, Arc::new(transport), Arc::new(store.clone()))
        .expect("Failed to create session manager");
    (manager, store)
}

async fn mock_token_endpoint(
    server: &mut ServerGuard,
    username: &str,
    password: &str,
    access: &str,
    refresh: &str,
) -> mockito::Mock {
    server
        .mock("POST", "/api/token/")
        .match_body(Matcher::Json(json!({"username": username, "password": password})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access": access, "refresh": refresh}).to_string())
        .create_async()
        .await
}

/// A localhost URL with nothing listening on it
fn unreachable_base_url() -> String {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    format!("http://127.0.0.1:{}", port)
}

// ==================================================================================================
// Login Scenarios
// ==================================================================================================

#[tokio::test]
async fn test_login_unauthorized() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/token/")
        .with_status(401)
        .with_body(r#"{"detail":"No active account found with the given credentials"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, store) = create_manager(&server.url(), dir.path());

    let err = manager.login("bob", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
    assert!(!manager.is_authenticated().await);
    assert!(store.get(STORED_USERNAME_KEY).await.unwrap().is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_endpoint_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&unreachable_base_url(), dir.path());

    let err = manager.login("bob", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::Api(_)));
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_login_success() {
    let mut server = Server::new_async().await;
    let mock = mock_token_endpoint(&mut server, "carol", "pw", "tok-a", "tok-r").await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    let session = manager.login("carol", "pw").await.unwrap();
    assert_eq!(session.username, "carol");
    assert_eq!(session.access_token, "tok-a");
    assert_eq!(session.refresh_token, "tok-r");
    assert!(manager.is_authenticated().await);
    assert_eq!(manager.current_session().await, Some(session));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_server_error_is_api_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/token/")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    match manager.login("bob", "pw").await.unwrap_err() {
        AuthError::Api(msg) => assert!(msg.contains("500")),
        AuthError::Unauthorized => panic!("500 must not be classified as unauthorized"),
    }
    // Single attempt, no retries
    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_success_without_tokens_is_api_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token":"legacy"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, store) = create_manager(&server.url(), dir.path());

    assert!(matches!(
        manager.login("bob", "pw").await.unwrap_err(),
        AuthError::Api(_)
    ));
    assert!(!manager.is_authenticated().await);
    assert!(store.get(STORED_ACCESS_TOKEN_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_from_credentials_then_clear() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&unreachable_base_url(), dir.path());

    manager.from_credentials("dave", "tok-x", "tok-y").await;
    manager.clear().await;
    assert!(manager.current_session().await.is_none());
}

// ==================================================================================================
// Session State Properties
// ==================================================================================================

#[tokio::test]
async fn test_current_session_is_latest_install() {
    let mut server = Server::new_async().await;
    let _mock = mock_token_endpoint(&mut server, "alice", "pw", "A1", "R1").await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    let restored = manager.from_credentials("zed", "old-a", "old-r").await;
    assert_eq!(manager.current_session().await, Some(restored));

    let logged_in = manager.login("alice", "pw").await.unwrap();
    assert_eq!(manager.current_session().await, Some(logged_in));
}

#[tokio::test]
async fn test_clear_twice() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&unreachable_base_url(), dir.path());
    manager.from_credentials("dave", "tok-x", "tok-y").await;

    manager.clear().await;
    let after_once = manager.current_session().await;
    manager.clear().await;

    assert_eq!(manager.current_session().await, after_once);
    assert!(!manager.is_authenticated().await);
}

#[tokio::test]
async fn test_failed_login_does_not_touch_state() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/token/")
        .with_status(401)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    // Unauthenticated before, unauthenticated after
    assert!(manager.login("bob", "wrong").await.is_err());
    assert!(manager.current_session().await.is_none());

    // Authenticated before, same session after
    let existing = manager.from_credentials("dave", "tok-x", "tok-y").await;
    assert!(manager.login("bob", "wrong").await.is_err());
    assert!(manager.is_authenticated().await);
    assert_eq!(manager.current_session().await, Some(existing));
}

#[tokio::test]
async fn test_login_persists_all_three_entries() {
    let mut server = Server::new_async().await;
    let _mock = mock_token_endpoint(&mut server, "alice", "pw", "A1", "R1").await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, store) = create_manager(&server.url(), dir.path());
    manager.login("alice", "pw").await.unwrap();

    assert_eq!(
        store.get(STORED_USERNAME_KEY).await.unwrap().as_deref(),
        Some("alice")
    );
    assert_eq!(
        store.get(STORED_ACCESS_TOKEN_KEY).await.unwrap().as_deref(),
        Some("A1")
    );
    assert_eq!(
        store.get(STORED_REFRESH_TOKEN_KEY).await.unwrap().as_deref(),
        Some("R1")
    );
}

#[tokio::test]
async fn test_authorized_client_keeps_its_token() {
    let mut server = Server::new_async().await;
    let _login_alice = mock_token_endpoint(&mut server, "alice", "pw", "tok-1", "r1").await;
    let _login_bob = mock_token_endpoint(&mut server, "bob", "pw", "tok-2", "r2").await;

    let first_token = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer tok-1")
        .with_status(200)
        .with_body(r#"{"user":"alice"}"#)
        .expect(2)
        .create_async()
        .await;
    let second_token = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer tok-2")
        .with_status(200)
        .with_body(r#"{"user":"bob"}"#)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    let alice = manager.login("alice", "pw").await.unwrap();
    let alice_client = manager.authenticated_client(&alice);
    let body: serde_json::Value = alice_client.get_json("/api/me/").await.unwrap();
    assert_eq!(body["user"], "alice");

    // A new login yields a new client; the old one still sends its own token
    let bob = manager.login("bob", "pw").await.unwrap();
    let bob_client = manager.authenticated_client(&bob);

    let body: serde_json::Value = alice_client.get_json("/api/me/").await.unwrap();
    assert_eq!(body["user"], "alice");
    let body: serde_json::Value = bob_client.get_json("/api/me/").await.unwrap();
    assert_eq!(body["user"], "bob");

    first_token.assert_async().await;
    second_token.assert_async().await;
}

// ==================================================================================================
// Persistence Across Restarts
// ==================================================================================================

#[tokio::test]
async fn test_restore_after_restart() {
    let mut server = Server::new_async().await;
    let _mock = mock_token_endpoint(&mut server, "alice", "pw", "A1", "R1").await;

    let dir = tempfile::tempdir().unwrap();
    {
        let (manager, _store) = create_manager(&server.url(), dir.path());
        manager.login("alice", "pw").await.unwrap();
    }

    // Fresh manager over the same database, as on process start
    let (manager, _store) = create_manager(&server.url(), dir.path());
    assert!(!manager.is_authenticated().await);

    let session = manager.restore().await.unwrap().expect("stored session");
    assert_eq!(session.username, "alice");
    assert_eq!(session.access_token, "A1");
    assert_eq!(session.refresh_token, "R1");
    assert!(manager.is_authenticated().await);
}

#[tokio::test]
async fn test_logout_prevents_restore() {
    let mut server = Server::new_async().await;
    let _mock = mock_token_endpoint(&mut server, "alice", "pw", "A1", "R1").await;

    let dir = tempfile::tempdir().unwrap();
    {
        let (manager, _store) = create_manager(&server.url(), dir.path());
        manager.login("alice", "pw").await.unwrap();
        manager.logout().await.unwrap();
        assert!(!manager.is_authenticated().await);
    }

    let (manager, _store) = create_manager(&server.url(), dir.path());
    assert!(manager.restore().await.unwrap().is_none());
    assert!(manager.stored_username().await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_restore_falls_back_to_login() {
    let mut server = Server::new_async().await;
    let _login = mock_token_endpoint(&mut server, "alice", "pw", "fresh", "r2").await;
    let _stale = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .create_async()
        .await;
    let _fresh = server
        .mock("GET", "/api/me/")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (manager, _store) = create_manager(&server.url(), dir.path());

    // Caller checks the API with the restored token and logs in again on 401
    let restored = manager.from_credentials("alice", "stale", "r1").await;
    let stale_client = manager.authenticated_client(&restored);
    let check = stale_client.send(stale_client.get("/api/me/")).await;
    assert_eq!(check.unwrap_err().status(), Some(401));
    // Authorized-request failures never change session state
    assert!(manager.is_authenticated().await);

    let session = manager.login("alice", "pw").await.unwrap();
    let client = manager.authenticated_client(&session);
    assert!(client.send(client.get("/api/me/")).await.is_ok());
}
