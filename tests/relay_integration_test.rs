//! Integration tests for AuthRelay
//!
//! Runs the relay on an ephemeral port over the in-memory provider and drives
//! it with the client, end to end.

use authrelay::FreshnessState;
use authrelay::client::{AuthClient, RelayClient};
use authrelay::config::{ClientConfig, Config, SessionConfig};
use authrelay::http::{AppState, build_router, serve};
use authrelay::model::{MembershipStatus, Organization, OrganizationMembership, Role};
use authrelay::session::{FileStore, KeyValueStore, MemoryStore, SessionStatus};
use authrelay::utils::{TestProvider, mint_token, test_user};
use authrelay::{RelayError, SessionRecord};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

async fn start_relay(provider: Arc<TestProvider>) -> String {
    let config = Config::default();
    let app = build_router(AppState::new(provider, &config), &config.http);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn provider() -> Arc<TestProvider> {
    let provider = Arc::new(TestProvider::new());
    provider.add_user(test_user("user_01", "ada@example.com"));
    provider.set_claims(json!({
        "roles": ["admin", {"slug": "billing", "name": "Billing"}],
        "permissions": ["read:reports"],
        "entitlements": [{"id": "seats", "name": "Seats", "value": 25}],
        "feature_flags": ["new-dashboard"]
    }));
    provider
}

fn client(backend_url: &str, store: Arc<dyn KeyValueStore>) -> AuthClient {
    let relay = RelayClient::new(&ClientConfig {
        backend_url: backend_url.to_string(),
        ..ClientConfig::default()
    })
    .unwrap();
    AuthClient::new(Arc::new(relay), store, &SessionConfig::default())
}

fn add_org(provider: &TestProvider, id: &str, name: &str, role: &str) {
    let now = Utc::now();
    provider.add_organization(Organization {
        id: id.to_string(),
        name: name.to_string(),
        domain_data: None,
        created_at: now,
        updated_at: now,
    });
    provider.add_membership(OrganizationMembership {
        id: format!("om_{}", id),
        user_id: "user_01".to_string(),
        organization_id: id.to_string(),
        role: Role::new(role, role),
        status: MembershipStatus::Active,
        created_at: now,
        updated_at: now,
    });
}

#[tokio::test]
async fn test_sign_in_lifecycle() {
    let provider = provider();
    add_org(&provider, "org_1", "Acme", "admin");
    add_org(&provider, "org_2", "Globex", "member");
    let url = start_relay(provider.clone()).await;
    let store = MemoryStore::new();
    let client = client(&url, Arc::new(store.clone()));

    let start = client.sign_in_url(None).await.unwrap();
    assert!(start.state.starts_with("state_"));
    assert!(
        start
            .authorization_url
            .contains(&format!("state={}", start.state))
    );
    assert!(
        start
            .authorization_url
            .contains("redirect_uri=workosauthdemo%3A%2F%2Fcallback")
    );

    provider.issue_code("code_1", "user_01");
    let record = client.complete_sign_in("code_1").await.unwrap();
    assert_eq!(record.user.email, "ada@example.com");
    assert_eq!(record.session.role.as_ref().unwrap().slug, "admin");
    assert_eq!(record.session.roles[1].name, "Billing");
    assert!(record.session.has_permission("read:reports"));
    assert!(record.session.is_feature_enabled("new-dashboard"));
    assert_eq!(record.session.entitlements[0].id, "seats");
    assert_eq!(record.session.organization_id.as_deref(), Some("org_1"));

    match client.current_session().await.unwrap() {
        SessionStatus::Active { freshness, .. } => assert_eq!(freshness, FreshnessState::Fresh),
        other => panic!("expected active session, got {:?}", other),
    }

    let profile = client
        .relay()
        .profile(&record.access_token)
        .await
        .unwrap();
    assert_eq!(profile.user.id, "user_01");
    assert_eq!(profile.session.roles, record.session.roles);

    let organizations = client.organizations().await;
    assert_eq!(organizations.len(), 2);
    assert_eq!(organizations[1].organization.name, "Globex");

    let switched = client.switch_organization("org_2").await.unwrap();
    assert_ne!(switched.refresh_token, record.refresh_token);
    assert_eq!(
        client.sessions().get_session().await.unwrap(),
        Some(switched)
    );

    let logout_url = client.sign_out().await.unwrap().unwrap();
    assert!(logout_url.ends_with("session_id=session_user_01"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_switch_to_foreign_organization_is_forbidden() {
    let provider = provider();
    let url = start_relay(provider.clone()).await;
    let client = client(&url, Arc::new(MemoryStore::new()));

    provider.issue_code("code_1", "user_01");
    client.complete_sign_in("code_1").await.unwrap();

    assert!(matches!(
        client.switch_organization("org_other").await,
        Err(RelayError::Forbidden(_))
    ));
    assert!(client.sessions().get_session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_checks_refresh_once() {
    let provider = provider();
    provider.set_token_lifetime(Duration::minutes(2));
    provider.set_refresh_delay(std::time::Duration::from_millis(100));
    let url = start_relay(provider.clone()).await;
    let client = client(&url, Arc::new(MemoryStore::new()));

    provider.issue_code("code_1", "user_01");
    let original = client.complete_sign_in("code_1").await.unwrap();
    provider.set_token_lifetime(Duration::hours(1));

    let (a, b, c) = tokio::join!(
        client.current_session(),
        client.current_session(),
        client.current_session()
    );

    assert_eq!(provider.refresh_calls(), 1);
    let refreshed: Vec<SessionRecord> = [a, b, c]
        .into_iter()
        .map(|status| match status.unwrap() {
            SessionStatus::Refreshed(record) => record,
            other => panic!("expected refreshed session, got {:?}", other),
        })
        .collect();
    assert!(refreshed.iter().all(|r| r == &refreshed[0]));
    assert_ne!(refreshed[0].refresh_token, original.refresh_token);

    match client.current_session().await.unwrap() {
        SessionStatus::Active { record, freshness } => {
            assert_eq!(freshness, FreshnessState::Fresh);
            assert_eq!(record, refreshed[0]);
        }
        other => panic!("expected active session, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let provider = provider();
    let url = start_relay(provider.clone()).await;
    let store = MemoryStore::new();
    let client = client(&url, Arc::new(store.clone()));

    let record = authrelay::provider::Authentication {
        access_token: mint_token(&json!({
            "sub": "user_01",
            "sid": "session_user_01",
            "exp": (Utc::now() - Duration::minutes(1)).timestamp()
        })),
        refresh_token: "revoked".to_string(),
        user: test_user("user_01", "ada@example.com"),
        organization_id: None,
        impersonator: None,
        authentication_method: None,
    }
    .into_session_record();
    client.sessions().store_session(&record).await.unwrap();

    let err = client.current_session().await.unwrap_err();
    assert!(err.is_terminal_for_session());
    assert!(store.is_empty());
    assert_eq!(
        client.current_session().await.unwrap(),
        SessionStatus::SignedOut
    );
}

#[tokio::test]
async fn test_file_store_persists_between_clients() {
    let provider = provider();
    let url = start_relay(provider.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    provider.issue_code("code_1", "user_01");
    let first = client(&url, Arc::new(FileStore::new(dir.path())));
    let record = first.complete_sign_in("code_1").await.unwrap();

    let second = client(&url, Arc::new(FileStore::new(dir.path())));
    assert_eq!(second.sessions().get_session().await.unwrap(), Some(record));

    second.sign_out().await.unwrap();
    assert_eq!(first.sessions().get_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_relay_rejects_reused_refresh_token() {
    let provider = provider();
    let url = start_relay(provider.clone()).await;
    let relay = RelayClient::new(&ClientConfig {
        backend_url: url,
        ..ClientConfig::default()
    })
    .unwrap();

    provider.issue_code("code_1", "user_01");
    let record = relay.exchange_code("code_1").await.unwrap();

    let renewed = relay.refresh_token(&record.refresh_token).await.unwrap();
    assert_ne!(renewed.refresh_token, record.refresh_token);

    match relay.refresh_token(&record.refresh_token).await {
        Err(RelayError::Unauthorized(message)) => {
            assert!(message.contains("Session has already ended."))
        }
        other => panic!("expected unauthorized, got {:?}", other),
    }
}
