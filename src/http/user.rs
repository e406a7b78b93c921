//! `/api/user/*` routes: profile, organizations, organization switch

use super::AppState;
use super::auth::body;
use super::response::AppError;
use crate::RelayError;
use crate::claims::normalize;
use crate::model::{
    OrganizationWithMembership, SwitchOrganizationRequest, SwitchOrganizationResponse,
    UserOrganizationsResponse, UserProfile,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use futures::future::try_join_all;
use serde::Deserialize;

type HandlerResult<T> = std::result::Result<Json<T>, AppError>;

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> HandlerResult<UserProfile> {
    let access_token = bearer_token(&headers).ok_or_else(|| {
        AppError::new(
            "Unauthorized",
            RelayError::unauthorized("Missing or invalid authorization header"),
        )
    })?;

    let failed = |e: RelayError| {
        AppError::new("Failed to fetch user profile", e).with_status(StatusCode::UNAUTHORIZED)
    };

    let claims = state
        .provider
        .verify_access_token(access_token)
        .await
        .map_err(failed)?;
    let user_id = claims
        .subject()
        .ok_or_else(|| failed(RelayError::unauthorized("Access token has no subject")))?;
    let user = state.provider.get_user(user_id).await.map_err(failed)?;

    Ok(Json(UserProfile {
        user,
        session: normalize(&claims),
        impersonator: None,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationsQuery {
    #[serde(default)]
    user_id: Option<String>,
}

pub async fn organizations(
    State(state): State<AppState>,
    Query(query): Query<OrganizationsQuery>,
) -> HandlerResult<UserOrganizationsResponse> {
    let user_id = query.user_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        AppError::new(
            "Missing required parameter",
            RelayError::validation("userId query parameter is required"),
        )
    })?;

    tracing::info!("Fetching organizations for user {}", user_id);

    let memberships = state
        .provider
        .list_organization_memberships(&user_id)
        .await
        .map_err(AppError::titled("Failed to fetch user organizations"))?;

    let organizations = try_join_all(memberships.into_iter().map(|membership| {
        let provider = state.provider.clone();
        async move {
            let organization = provider
                .get_organization(&membership.organization_id)
                .await?;
            Ok::<_, RelayError>(OrganizationWithMembership {
                organization,
                membership,
            })
        }
    }))
    .await
    .map_err(AppError::titled("Failed to fetch user organizations"))?;

    Ok(Json(UserOrganizationsResponse { organizations }))
}

pub async fn switch_organization(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SwitchOrganizationRequest>, JsonRejection>,
) -> HandlerResult<SwitchOrganizationResponse> {
    let request = body(payload)?;
    let present = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (Some(user_id), Some(organization_id), Some(_access_token)) = (
        present(request.user_id),
        present(request.organization_id),
        present(request.access_token),
    ) else {
        return Err(AppError::new(
            "Missing required parameters",
            RelayError::validation("userId, organizationId, and accessToken are required"),
        ));
    };

    tracing::info!(
        "Switching user {} to organization {}",
        user_id,
        organization_id
    );

    let membership = state
        .provider
        .get_organization_membership(&user_id, &organization_id)
        .await
        .map_err(AppError::titled("Failed to switch organization"))?
        .ok_or_else(|| {
            AppError::new(
                "Not a member",
                RelayError::forbidden("User is not a member of this organization"),
            )
        })?;

    Ok(Json(SwitchOrganizationResponse {
        success: true,
        organization_id,
        role: Some(membership.role),
    }))
}
