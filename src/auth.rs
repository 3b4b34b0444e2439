//! Session/auth store.
//!
//! State transitions go through [`reduce`], a pure function over
//! [`AuthAction`]; [`AuthStore`] performs the API calls and storage writes
//! and dispatches the resulting actions.

use crate::api::{ApiError, DonorApi};
use crate::model::{ProfileUpdate, RegistrationPayload, User};
use crate::storage::{self, Storage};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            loading: true,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    LoginSuccess(User),
    Logout,
    AuthReady,
    AuthError(String),
    ClearError,
    UpdateUser(ProfileUpdate),
}

pub fn reduce(state: AuthState, action: AuthAction) -> AuthState {
    match action {
        AuthAction::LoginSuccess(user) => AuthState {
            is_authenticated: true,
            user: Some(user),
            loading: false,
            error: None,
        },
        AuthAction::Logout => AuthState {
            is_authenticated: false,
            user: None,
            loading: false,
            error: None,
        },
        AuthAction::AuthReady => AuthState {
            loading: false,
            ..state
        },
        AuthAction::AuthError(message) => AuthState {
            error: Some(message),
            loading: false,
            ..state
        },
        AuthAction::ClearError => AuthState {
            error: None,
            ..state
        },
        AuthAction::UpdateUser(update) => {
            let mut next = state;
            if let Some(user) = next.user.as_mut() {
                user.apply(&update);
            }
            next
        }
    }
}

pub const LOGIN_FAILED: &str = "Login failed";
pub const REGISTRATION_FAILED: &str = "Registration failed";
pub const PROFILE_UPDATE_FAILED: &str = "Profile update failed";

pub struct AuthStore {
    api: Rc<dyn DonorApi>,
    storage: Rc<dyn Storage>,
    state: AuthState,
}

impl AuthStore {
    pub fn new(api: Rc<dyn DonorApi>, storage: Rc<dyn Storage>) -> Self {
        Self {
            api,
            storage,
            state: AuthState::default(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user.as_ref()
    }

    fn dispatch(&mut self, action: AuthAction) {
        tracing::trace!(?action, "auth dispatch");
        let current = std::mem::take(&mut self.state);
        self.state = reduce(current, action);
    }

    fn fail(&mut self, err: ApiError, fallback: &str) -> ApiError {
        self.dispatch(AuthAction::AuthError(err.banner(fallback)));
        err
    }

    fn persist(&self, token: &str, user: &User) {
        if let Err(e) = storage::save_session(self.storage.as_ref(), token, user) {
            tracing::warn!(error = %e, "failed to persist session");
        }
    }

    /// Initial load: trust a stored session only if the server accepts it.
    pub fn restore(&mut self) {
        let token = storage::token(self.storage.as_ref());
        let raw_user = self.storage.get(storage::USER_KEY);

        if token.is_none() || raw_user.is_none() {
            self.dispatch(AuthAction::AuthReady);
            return;
        }

        let validated = self.api.profile();
        match (validated, storage::cached_user(self.storage.as_ref())) {
            (Ok(_), Some(user)) => {
                tracing::info!(user = %user.email, "restored session");
                self.dispatch(AuthAction::LoginSuccess(user));
            }
            (result, _) => {
                if let Err(e) = &result {
                    tracing::info!(error = %e, "stored session rejected");
                }
                if let Err(e) = storage::clear_session(self.storage.as_ref()) {
                    tracing::warn!(error = %e, "failed to clear stored session");
                }
                self.dispatch(AuthAction::AuthReady);
            }
        }
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<User, ApiError> {
        self.dispatch(AuthAction::ClearError);
        match self.api.login(email, password) {
            Ok(resp) => {
                self.persist(&resp.token, &resp.user);
                self.dispatch(AuthAction::LoginSuccess(resp.user.clone()));
                Ok(resp.user)
            }
            Err(e) => Err(self.fail(e, LOGIN_FAILED)),
        }
    }

    /// Register, then log straight in with the same credentials.
    pub fn register(&mut self, payload: &RegistrationPayload) -> Result<User, ApiError> {
        self.dispatch(AuthAction::ClearError);
        let result = self
            .api
            .register(payload)
            .and_then(|()| self.api.login(&payload.email, &payload.password));
        match result {
            Ok(resp) => {
                self.persist(&resp.token, &resp.user);
                self.dispatch(AuthAction::LoginSuccess(resp.user.clone()));
                Ok(resp.user)
            }
            Err(e) => Err(self.fail(e, REGISTRATION_FAILED)),
        }
    }

    pub fn logout(&mut self) {
        if let Err(e) = storage::clear_session(self.storage.as_ref()) {
            tracing::warn!(error = %e, "failed to clear stored session");
        }
        self.dispatch(AuthAction::Logout);
    }

    /// Send a partial update and merge it into the cached user.
    ///
    /// Returns the merged user, or `None` when nothing was cached.
    pub fn update_profile(&mut self, update: &ProfileUpdate) -> Result<Option<User>, ApiError> {
        if let Err(e) = self.api.update_profile(update) {
            return Err(self.fail(e, PROFILE_UPDATE_FAILED));
        }

        self.dispatch(AuthAction::UpdateUser(update.clone()));
        let merged = self.state.user.clone();
        if let Some(user) = &merged {
            if let Err(e) = storage::save_user(self.storage.as_ref(), user) {
                tracing::warn!(error = %e, "failed to persist updated user");
            }
        }
        Ok(merged)
    }

    pub fn clear_error(&mut self) {
        self.dispatch(AuthAction::ClearError);
    }

    /// Drop to signed-out if the HTTP layer already cleared storage after a 401.
    pub fn sync_with_storage(&mut self) {
        if self.state.is_authenticated && storage::token(self.storage.as_ref()).is_none() {
            tracing::info!("session cleared by server rejection");
            self.dispatch(AuthAction::Logout);
        }
    }
}
