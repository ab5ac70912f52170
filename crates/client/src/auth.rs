//! Backend auth endpoints: sign-in, registration, refresh and logout.
//!
//! These calls never attach a bearer token and never go through the
//! refresh-and-retry path.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
    client::endpoint,
    errors::ApiError,
    method::Method,
    response::{read_failure, read_success},
    session::{RefreshedTokens, TokenRefresher},
    tokens::{AccessToken, CredentialPair, CurrentUser, RefreshToken},
    transport::{HttpRequest, Transport},
};

/// Sign-in route.
pub const LOGIN_PATH: &str = "/auth/login";
/// Registration route.
pub const REGISTER_PATH: &str = "/auth/register";
/// Token refresh route.
pub const REFRESH_PATH: &str = "/auth/refresh";
/// Sign-out route.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Errors from the auth routes.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backend rejected the call or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The request body could not be serialized.
    #[error("failed to encode auth request")]
    Encode(#[source] serde_json::Error),

    /// The response body had an unexpected shape.
    #[error("unexpected auth response")]
    Decode(#[source] serde_json::Error),

    /// A sign-in grant came back without a refresh token.
    #[error("auth response did not include a refresh token")]
    MissingRefreshToken,
}

/// Email and password sign-in.
#[derive(Clone, Serialize)]
pub struct SignIn {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for SignIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignIn")
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish()
    }
}

/// New account details.
#[derive(Clone, Serialize)]
pub struct Registration {
    /// Display name.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"**redacted**")
            .finish()
    }
}

/// Credentials and user record issued at sign-in or registration.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Issued credential pair.
    pub credentials: CredentialPair,
    /// User record, when the backend includes one.
    pub user: Option<CurrentUser>,
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    #[serde(alias = "access")]
    access_token: AccessToken,

    #[serde(default, alias = "refresh")]
    refresh_token: Option<RefreshToken>,

    #[serde(default)]
    user: Option<CurrentUser>,
}

impl TryFrom<GrantBody> for TokenGrant {
    type Error = AuthError;

    fn try_from(body: GrantBody) -> Result<Self, Self::Error> {
        let refresh = body.refresh_token.ok_or(AuthError::MissingRefreshToken)?;

        Ok(Self {
            credentials: CredentialPair {
                access: body.access_token,
                refresh,
            },
            user: body.user,
        })
    }
}

/// Client for the `/auth` routes.
#[derive(Clone)]
pub struct AuthApi {
    base: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for AuthApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthApi")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl AuthApi {
    /// `base` is the API root, including the `/api` prefix.
    #[must_use]
    pub fn new(base: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base: base.into(),
            transport,
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the credentials or the grant
    /// is incomplete.
    pub async fn login(&self, sign_in: &SignIn) -> Result<TokenGrant, AuthError> {
        let body: GrantBody = self.post(LOGIN_PATH, sign_in).await?;

        TokenGrant::try_from(body)
    }

    /// Create an account and sign in to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the registration or the grant
    /// is incomplete.
    pub async fn register(&self, registration: &Registration) -> Result<TokenGrant, AuthError> {
        let body: GrantBody = self.post(REGISTER_PATH, registration).await?;

        TokenGrant::try_from(body)
    }

    /// Tell the backend a refresh token is no longer in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    pub async fn logout(&self, refresh_token: &RefreshToken) -> Result<(), AuthError> {
        let body = json!({ "refresh_token": refresh_token.expose() });

        self.send(LOGOUT_PATH, &body).await.map(|_| ())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, AuthError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let value = self.send(path, body).await?;

        serde_json::from_value(value).map_err(AuthError::Decode)
    }

    async fn send<B>(&self, path: &str, body: &B) -> Result<serde_json::Value, AuthError>
    where
        B: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(body).map_err(AuthError::Encode)?;
        let url = endpoint(&self.base, path);

        let request = HttpRequest::json(Method::Post, url, Some(bytes), None);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(ApiError::from)?;

        debug!(path, status = response.status, "auth response");

        if !response.is_success() {
            return Err(read_failure(&response).into());
        }

        read_success(&response).map_err(AuthError::from)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    #[serde(alias = "access")]
    access_token: AccessToken,

    #[serde(default, alias = "refresh")]
    refresh_token: Option<RefreshToken>,
}

#[async_trait]
impl TokenRefresher for AuthApi {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens, AuthError> {
        let body = json!({ "refresh_token": refresh_token.expose() });

        let body: RefreshBody = self.post(REFRESH_PATH, &body).await?;

        Ok(RefreshedTokens {
            access: body.access_token,
            refresh: body.refresh_token,
        })
    }
}
