use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::extract::AuthUser;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::Credentials;
use crate::storage::models::User;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub server_url: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            server_url: user.server_url.clone(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<JSend<LoginResponse>>, ApiError> {
    let credentials = Credentials {
        server_url: req.server_url,
        username: req.username,
        password: req.password,
    };
    let (user, token) = state.auth.login(&credentials).await?;

    tracing::debug!(user_id = %user.id, "User logged in");
    Ok(JSend::success(LoginResponse {
        user: UserResponse::from(&user),
        token,
    }))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<JSend<UserResponse>> {
    JSend::success(UserResponse::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_state, ScriptedTransfer};
    use axum::http::StatusCode;

    fn request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            server_url: "https://dms.example.com".to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_returns_user_and_token() {
        let state = test_state(ScriptedTransfer::succeed_all());
        let Json(body) = login(State(Arc::clone(&state)), AppJson(request("bob", "pw")))
            .await
            .unwrap();

        assert_eq!(body.data.user.username, "bob");
        assert!(!body.data.token.is_empty());
        let user = state.auth.authenticate(&body.data.token).unwrap();
        assert_eq!(user.id, body.data.user.id);
    }

    #[tokio::test]
    async fn test_login_validation_is_400() {
        let state = test_state(ScriptedTransfer::succeed_all());
        let err = login(State(state), AppJson(request("", "pw")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Username is required");
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_401() {
        let state = test_state(ScriptedTransfer::succeed_all());
        let Json(first) = login(State(Arc::clone(&state)), AppJson(request("bob", "pw")))
            .await
            .unwrap();
        assert_eq!(first.data.user.username, "bob");
        let err = login(State(state), AppJson(request("bob", "other")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
