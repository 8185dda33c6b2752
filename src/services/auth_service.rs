use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    dao::models::UserEntity,
    dto::auth::{CredentialsRequest, SessionResponse},
    error::ServiceError,
    services::credentials::{hash_password, verify_password},
    state::SharedState,
};

const INVALID_CREDENTIALS: &str = "invalid username or password";

fn session_for(state: &SharedState, username: String) -> SessionResponse {
    let token = state.sessions().open(&username);
    SessionResponse {
        username,
        token,
        expires_in: state.sessions().ttl().as_secs(),
    }
}

/// Create an account with zeroed stats and open a session for it.
pub async fn signup(
    state: &SharedState,
    request: CredentialsRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_store().await?;
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| ServiceError::Internal(format!("hashing task failed: {err}")))??;

    let user = UserEntity::new(request.username.clone(), password_hash);
    let created = timeout(state.config().durable_call_timeout(), store.create_user(user))
        .await
        .map_err(|_| ServiceError::Timeout)??;
    if !created {
        return Err(ServiceError::Conflict(format!(
            "username `{}` is already taken",
            request.username
        )));
    }

    info!(username = %request.username, "account created");
    Ok(session_for(state, request.username))
}

/// Verify credentials and open a session.
pub async fn login(
    state: &SharedState,
    request: CredentialsRequest,
) -> Result<SessionResponse, ServiceError> {
    let store = state.require_store().await?;
    let user = timeout(
        state.config().durable_call_timeout(),
        store.find_user(request.username.clone()),
    )
    .await
    .map_err(|_| ServiceError::Timeout)??;

    let Some(user) = user else {
        warn!(username = %request.username, "login for unknown account");
        return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    let password = request.password;
    let stored_hash = user.password_hash;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|err| ServiceError::Internal(format!("verification task failed: {err}")))?;
    if !valid {
        warn!(username = %request.username, "login with wrong password");
        return Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    info!(username = %request.username, "logged in");
    Ok(session_for(state, request.username))
}

/// Close a session. Unknown tokens are ignored.
pub fn logout(state: &SharedState, token: &str) {
    if state.sessions().close(token) {
        info!("session closed");
    }
}

/// Resolve the identity behind a session token.
pub fn identify(state: &SharedState, token: &str) -> Result<String, ServiceError> {
    state
        .sessions()
        .resolve(token)
        .ok_or_else(|| ServiceError::Unauthorized("missing or expired session".into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::arena_store::memory::MemoryArenaStore, state::AppState,
    };

    fn credentials(username: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            username: username.into(),
            password: password.into(),
        }
    }

    async fn state_with_store() -> SharedState {
        let (state, _queue) = AppState::new(AppConfig::default());
        state.install_store(Arc::new(MemoryArenaStore::new())).await;
        state
    }

    #[tokio::test]
    async fn signup_then_login_resolves_the_same_identity() {
        let state = state_with_store().await;
        let created = signup(&state, credentials("ana", "secret1")).await.unwrap();
        assert_eq!(identify(&state, &created.token).unwrap(), "ana");

        let session = login(&state, credentials("ana", "secret1")).await.unwrap();
        assert_eq!(identify(&state, &session.token).unwrap(), "ana");

        logout(&state, &session.token);
        assert!(identify(&state, &session.token).is_err());
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let state = state_with_store().await;
        signup(&state, credentials("ana", "secret1")).await.unwrap();
        let err = signup(&state, credentials("ana", "other12")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let state = state_with_store().await;
        signup(&state, credentials("ana", "secret1")).await.unwrap();

        let wrong = login(&state, credentials("ana", "secret2")).await.unwrap_err();
        let unknown = login(&state, credentials("bo", "secret1")).await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn degraded_mode_refuses_signup() {
        let (state, _queue) = AppState::new(AppConfig::default());
        let err = signup(&state, credentials("ana", "secret1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
