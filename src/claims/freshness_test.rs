use super::freshness::*;
use crate::utils::mint_token;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn lead() -> Duration {
    Duration::seconds(300)
}

#[test]
fn test_fresh_when_beyond_lead_time() {
    let exp = now().timestamp() + 600;
    assert_eq!(assess_freshness(Some(exp), now(), lead()), FreshnessState::Fresh);
}

#[test]
fn test_needs_refresh_within_lead_time() {
    let exp = now().timestamp() + 100;
    assert_eq!(
        assess_freshness(Some(exp), now(), lead()),
        FreshnessState::NeedsRefresh
    );
}

#[test]
fn test_expired_in_the_past() {
    let exp = now().timestamp() - 1;
    assert_eq!(assess_freshness(Some(exp), now(), lead()), FreshnessState::Expired);
}

#[test]
fn test_expired_exactly_at_expiry() {
    let exp = now().timestamp();
    assert_eq!(assess_freshness(Some(exp), now(), lead()), FreshnessState::Expired);
}

#[test]
fn test_boundary_at_lead_time_is_fresh() {
    let exp = now().timestamp() + 300;
    assert_eq!(assess_freshness(Some(exp), now(), lead()), FreshnessState::Fresh);
    assert_eq!(
        assess_freshness(Some(exp - 1), now(), lead()),
        FreshnessState::NeedsRefresh
    );
}

#[test]
fn test_unknown_without_expiry() {
    assert_eq!(assess_freshness(None, now(), lead()), FreshnessState::Unknown);
    assert!(!FreshnessState::Unknown.requires_refresh());
}

#[test]
fn test_unrepresentable_expiry_is_unknown() {
    assert_eq!(
        assess_freshness(Some(i64::MAX), now(), lead()),
        FreshnessState::Unknown
    );
}

#[test]
fn test_requires_refresh() {
    assert!(FreshnessState::NeedsRefresh.requires_refresh());
    assert!(FreshnessState::Expired.requires_refresh());
    assert!(!FreshnessState::Fresh.requires_refresh());
}

#[test]
fn test_default_lead_time_is_five_minutes() {
    assert_eq!(default_lead_time(), Duration::minutes(5));
}

#[test]
fn test_end_to_end_token_needs_refresh() {
    let now = Utc::now();
    let token = mint_token(&json!({
        "roles": ["admin"],
        "permissions": ["read:x"],
        "org_id": "org_1",
        "exp": now.timestamp() + 60
    }));
    let claims = crate::claims::decode(&token);

    assert_eq!(
        assess_freshness(claims.expires_at(), now, default_lead_time()),
        FreshnessState::NeedsRefresh
    );
}

#[test]
fn test_state_serializes_screaming_case() {
    assert_eq!(
        serde_json::to_value(FreshnessState::NeedsRefresh).unwrap(),
        json!("NEEDS_REFRESH")
    );
}
