use super::*;
use crate::model::{MembershipStatus, Organization, OrganizationMembership, Role};
use crate::utils::{TestProvider, mint_token, test_user};
use axum::body::Body;
use axum::http::Request as HttpRequest;
use chrono::Utc;
use tower::ServiceExt;

fn test_provider() -> Arc<TestProvider> {
    let provider = Arc::new(TestProvider::new());
    provider.add_user(test_user("user_01", "ada@example.com"));
    provider.set_claims(json!({
        "roles": ["admin"],
        "permissions": ["read:x", {"id": "write:x", "name": "Write X"}],
        "org_id": "org_1"
    }));
    provider
}

fn app_with(provider: Arc<TestProvider>) -> Router {
    let config = Config::default();
    build_router(AppState::new(provider, &config), &config.http)
}

fn add_membership(provider: &TestProvider, org_id: &str, name: &str, role: &str) {
    let now = Utc::now();
    provider.add_organization(Organization {
        id: org_id.to_string(),
        name: name.to_string(),
        domain_data: None,
        created_at: now,
        updated_at: now,
    });
    provider.add_membership(OrganizationMembership {
        id: format!("om_{}", org_id),
        user_id: "user_01".to_string(),
        organization_id: org_id.to_string(),
        role: Role::new(role, role),
        status: MembershipStatus::Active,
        created_at: now,
        updated_at: now,
    });
}

fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> HttpRequest<Body> {
    HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let response = health_handler().await;
    assert_eq!(response.0.get("status").unwrap(), "healthy");
}

#[tokio::test]
async fn test_auth_url_defaults_redirect_uri() {
    let app = app_with(test_provider());
    let (status, body) = send(app, post_json("/api/auth/url", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    let url = body["authorizationUrl"].as_str().unwrap();
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
    assert!(!url.contains("state="));
}

#[tokio::test]
async fn test_auth_url_passes_state_and_org() {
    let app = app_with(test_provider());
    let (status, body) = send(
        app,
        post_json(
            "/api/auth/url",
            json!({
                "redirectUri": "workosauthdemo://callback",
                "state": "state_abc",
                "organizationId": "org_9"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let url = body["authorizationUrl"].as_str().unwrap();
    assert!(url.contains("redirect_uri=workosauthdemo%3A%2F%2Fcallback"));
    assert!(url.contains("state=state_abc"));
    assert!(url.contains("organization_id=org_9"));
}

#[tokio::test]
async fn test_callback_requires_code() {
    let app = app_with(test_provider());
    let (status, body) = send(app, post_json("/api/auth/callback", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "error": "Missing authorization code",
            "message": "Authorization code is required"
        })
    );
}

#[tokio::test]
async fn test_callback_rejects_malformed_body() {
    let app = app_with(test_provider());
    let request = HttpRequest::builder()
        .method("POST")
        .uri("/api/auth/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
}

#[tokio::test]
async fn test_callback_invalid_code_includes_details() {
    let app = app_with(test_provider());
    let (status, body) = send(app, post_json("/api/auth/callback", json!({"code": "nope"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Authentication failed");
    assert_eq!(body["message"], "Invalid authorization code");
    assert_eq!(body["details"]["error"], "invalid_grant");
}

#[tokio::test]
async fn test_callback_returns_normalized_session() {
    let provider = test_provider();
    provider.issue_code("code_1", "user_01");
    let app = app_with(provider.clone());

    let (status, body) = send(app, post_json("/api/auth/callback", json!({"code": "code_1"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["organizationId"], "org_1");
    assert_eq!(body["role"], json!({"slug": "admin", "name": "admin"}));
    assert_eq!(
        body["permissions"],
        json!([
            {"id": "read:x", "name": "read:x"},
            {"id": "write:x", "name": "Write X"}
        ])
    );
    assert_eq!(body["entitlements"], json!([]));
    assert_eq!(body["featureFlags"], json!([]));
    assert!(body["accessToken"].as_str().unwrap().contains('.'));
    assert_eq!(body["refreshToken"], "refresh_1");
    assert_eq!(provider.code_calls(), 1);
}

#[tokio::test]
async fn test_refresh_requires_token() {
    let app = app_with(test_provider());
    let (status, body) = send(app, post_json("/api/auth/refresh", json!({"refreshToken": ""}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing refresh token");
}

#[tokio::test]
async fn test_refresh_rejected_is_unauthorized() {
    let app = app_with(test_provider());
    let (status, body) = send(
        app,
        post_json("/api/auth/refresh", json!({"refreshToken": "revoked"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token refresh failed");
    assert!(body["message"].as_str().unwrap().contains("Session has already ended."));
}

#[tokio::test]
async fn test_refresh_issues_new_session() {
    let provider = test_provider();
    provider.issue_refresh_token("rt_1", "user_01");
    let app = app_with(provider.clone());

    let (status, body) = send(
        app,
        post_json("/api/auth/refresh", json!({"refreshToken": "rt_1"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["refreshToken"], "rt_1");
    assert_eq!(body["roles"][0]["slug"], "admin");
    assert_eq!(provider.refresh_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_refresh_requests_share_one_exchange() {
    let provider = test_provider();
    provider.issue_refresh_token("rt_1", "user_01");
    provider.set_refresh_delay(std::time::Duration::from_millis(50));
    let app = app_with(provider.clone());

    let (first, second) = tokio::join!(
        send(
            app.clone(),
            post_json("/api/auth/refresh", json!({"refreshToken": "rt_1"}))
        ),
        send(
            app.clone(),
            post_json("/api/auth/refresh", json!({"refreshToken": "rt_1"}))
        ),
    );

    assert_eq!(provider.refresh_calls(), 1);
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(first.1, second.1);
}

#[tokio::test]
async fn test_sign_out_without_session_id() {
    let app = app_with(test_provider());
    let (status, body) = send(app, post_json("/api/auth/signout", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
}

#[tokio::test]
async fn test_sign_out_returns_logout_url() {
    let app = app_with(test_provider());
    let (status, body) = send(
        app,
        post_json("/api/auth/signout", json!({"sessionId": "session_01"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(
        body["logoutUrl"]
            .as_str()
            .unwrap()
            .ends_with("/user_management/sessions/logout?session_id=session_01")
    );
}

#[tokio::test]
async fn test_profile_requires_bearer() {
    let app = app_with(test_provider());
    let (status, body) = send(app, get_request("/api/user/profile")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["message"], "Missing or invalid authorization header");
}

#[tokio::test]
async fn test_profile_rejects_unverifiable_token() {
    let app = app_with(test_provider());
    let request = HttpRequest::builder()
        .uri("/api/user/profile")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Failed to fetch user profile");
}

#[tokio::test]
async fn test_profile_normalizes_claims() {
    let provider = test_provider();
    let token = mint_token(&json!({
        "sub": "user_01",
        "roles": [{"slug": "viewer", "name": "Viewer"}],
        "feature_flags": ["beta"],
        "org_id": "org_2"
    }));
    let app = app_with(provider);
    let request = HttpRequest::builder()
        .uri("/api/user/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], "user_01");
    assert_eq!(body["role"], json!({"slug": "viewer", "name": "Viewer"}));
    assert_eq!(
        body["featureFlags"],
        json!([{"id": "beta", "name": "beta", "enabled": true}])
    );
    assert_eq!(body["organizationId"], "org_2");
    assert_eq!(body["impersonator"], Value::Null);
}

#[tokio::test]
async fn test_organizations_requires_user_id() {
    let app = app_with(test_provider());
    let (status, body) = send(app, get_request("/api/user/organizations")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required parameter");
}

#[tokio::test]
async fn test_organizations_joins_memberships() {
    let provider = test_provider();
    add_membership(&provider, "org_1", "Acme", "admin");
    add_membership(&provider, "org_2", "Globex", "member");
    let app = app_with(provider);

    let (status, body) = send(app, get_request("/api/user/organizations?userId=user_01")).await;

    assert_eq!(status, StatusCode::OK);
    let orgs = body["organizations"].as_array().unwrap();
    assert_eq!(orgs.len(), 2);
    assert_eq!(orgs[0]["organization"]["name"], "Acme");
    assert_eq!(orgs[0]["membership"]["organizationId"], "org_1");
    assert_eq!(orgs[1]["membership"]["role"]["slug"], "member");
    assert_eq!(orgs[1]["membership"]["status"], "active");
}

#[tokio::test]
async fn test_switch_org_requires_all_fields() {
    let app = app_with(test_provider());
    let (status, body) = send(
        app,
        post_json(
            "/api/user/switch-org",
            json!({"userId": "user_01", "organizationId": "org_1"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required parameters");
}

#[tokio::test]
async fn test_switch_org_non_member_is_forbidden() {
    let app = app_with(test_provider());
    let (status, body) = send(
        app,
        post_json(
            "/api/user/switch-org",
            json!({"userId": "user_01", "organizationId": "org_x", "accessToken": "t"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Not a member");
}

#[tokio::test]
async fn test_switch_org_returns_role() {
    let provider = test_provider();
    add_membership(&provider, "org_2", "Globex", "member");
    let app = app_with(provider);

    let (status, body) = send(
        app,
        post_json(
            "/api/user/switch-org",
            json!({"userId": "user_01", "organizationId": "org_2", "accessToken": "t"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "organizationId": "org_2",
            "role": {"slug": "member", "name": "member"}
        })
    );
}

#[tokio::test]
async fn test_cors_preflight_allows_mobile_origin() {
    let app = app_with(test_provider());
    let request = HttpRequest::builder()
        .method("OPTIONS")
        .uri("/api/auth/refresh")
        .header(header::ORIGIN, "capacitor://localhost")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "capacitor://localhost"
    );
    assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "86400");
}

#[tokio::test]
async fn test_cors_ignores_unknown_origin() {
    let app = app_with(test_provider());
    let request = HttpRequest::builder()
        .uri("/healthz")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn test_metrics_endpoint_counts_requests() {
    let app = app_with(test_provider());
    send(app.clone(), get_request("/healthz")).await;

    let (status, body) = send(app, get_request("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("authrelay_http_requests_total"));
    assert!(text.contains("handler=\"/healthz\""));
}
