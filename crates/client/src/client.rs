//! Authenticated request client.

use std::{fmt, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthApi, Registration, SignIn},
    errors::{ApiError, RequestError, SignInError},
    method::Method,
    response::{read_failure, read_success},
    retry::RetryPolicy,
    session::{RefreshMode, Session},
    store::{CredentialStore, StoreError},
    tokens::CurrentUser,
    transport::{HttpRequest, Transport},
    unauthorized::UnauthorizedHandler,
};

/// Backend address used when none is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Every API route lives under this prefix.
pub const API_PREFIX: &str = "/api";

/// Join an API root and a route path with exactly one `/` between them.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Settings for an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, without the `/api` prefix.
    pub api_url: String,
    /// How concurrent refreshes are coordinated.
    pub refresh_mode: RefreshMode,
    /// Refresh budget per call.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_mode: RefreshMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// The API root: `api_url` plus the `/api` prefix.
    #[must_use]
    pub fn api_base(&self) -> String {
        endpoint(&self.api_url, API_PREFIX)
    }
}

/// Sends authenticated JSON requests to the SpendTrack API.
///
/// A `401` response spends the call's refresh budget on one credential
/// refresh, after which the identical request is sent once more. When the
/// budget is spent or the refresh fails, the session is ended, the
/// [`UnauthorizedHandler`] is notified and the call fails with
/// [`RequestError::SessionExpired`].
pub struct ApiClient {
    base: String,
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    auth: AuthApi,
    unauthorized: Arc<dyn UnauthorizedHandler>,
    policy: RetryPolicy,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base)
            .field("session", &self.session)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client and open its session from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be read.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        unauthorized: Arc<dyn UnauthorizedHandler>,
    ) -> Result<Self, StoreError> {
        let base = config.api_base();
        let auth = AuthApi::new(base.clone(), transport.clone());
        let session = Session::open(store, Arc::new(auth.clone()), config.refresh_mode)?;

        Ok(Self {
            base,
            transport,
            session: Arc::new(session),
            auth,
            unauthorized,
            policy: config.retry.clone(),
        })
    }

    /// The session backing this client.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send one API call.
    ///
    /// `body` is only attached for methods that carry one. With
    /// `allow_refresh` false a `401` ends the session without attempting a
    /// refresh.
    ///
    /// Successful JSON responses resolve to their parsed body; successful
    /// responses without a JSON content type resolve to an empty object.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Api`] for non-success responses (with the body's
    ///   `message` or the status text) and transport failures (status `0`).
    /// - [`RequestError::SessionExpired`] when the credentials were rejected
    ///   and could not be refreshed.
    /// - [`RequestError::Storage`] when, in that case, the rejected
    ///   credentials could not be removed from the store.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        allow_refresh: bool,
    ) -> Result<Value, RequestError> {
        let body = body
            .filter(|_| method.carries_body())
            .map(serde_json::to_vec)
            .transpose()
            .map_err(RequestError::Encode)?;

        let url = endpoint(&self.base, path);
        let mut budget = self.policy.budget(allow_refresh);

        loop {
            let token = self.session.access_token().await;
            let request = HttpRequest::json(method, url.clone(), body.clone(), token.as_ref());

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(error) => {
                    debug!(%method, path, error = %error, "transport failure");

                    return Err(ApiError::from(error).into());
                }
            };

            debug!(%method, path, status = response.status, "api response");

            if !self.policy.triggers_refresh(response.status) {
                if response.is_success() {
                    return read_success(&response).map_err(RequestError::from);
                }

                return Err(read_failure(&response).into());
            }

            if !budget.consume() {
                return Err(self.expire_session().await);
            }

            if let Err(error) = self.session.refresh(token.as_ref()).await {
                warn!(error = %error, "credential refresh failed");

                return Err(self.expire_session().await);
            }

            debug!(
                %method,
                path,
                refreshes_left = budget.remaining(),
                "retrying with refreshed credentials"
            );
        }
    }

    /// [`request`](Self::request) with refresh enabled, decoding the result
    /// into `T`.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus [`RequestError::Decode`] when the
    /// response does not match `T`.
    pub async fn request_as<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(RequestError::Encode)?;

        let value = self.request(method, path, body.as_ref(), true).await?;

        serde_json::from_value(value).map_err(RequestError::Decode)
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str) -> Result<Value, RequestError> {
        self.request(Method::Get, path, None, true).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, RequestError> {
        self.request(Method::Post, path, Some(body), true).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, RequestError> {
        self.request(Method::Put, path, Some(body), true).await
    }

    /// `PATCH path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, RequestError> {
        self.request(Method::Patch, path, Some(body), true).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str) -> Result<Value, RequestError> {
        self.request(Method::Delete, path, None, true).await
    }

    /// Sign in and start a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the sign-in or the session
    /// cannot be persisted.
    pub async fn login(&self, sign_in: &SignIn) -> Result<Option<CurrentUser>, SignInError> {
        let grant = self.auth.login(sign_in).await?;

        self.session
            .begin(grant.credentials, grant.user.clone())
            .await?;

        info!(email = %sign_in.email, "signed in");

        Ok(grant.user)
    }

    /// Register an account and start a session for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the registration or the
    /// session cannot be persisted.
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<Option<CurrentUser>, SignInError> {
        let grant = self.auth.register(registration).await?;

        self.session
            .begin(grant.credentials, grant.user.clone())
            .await?;

        info!(email = %registration.email, "registered");

        Ok(grant.user)
    }

    /// End the session. The backend is told about it on a best-effort
    /// basis; local credentials are cleared whatever it answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential store cannot be cleared.
    pub async fn logout(&self) -> Result<(), StoreError> {
        if let Some(stored) = self.session.snapshot().await
            && let Err(error) = self.auth.logout(&stored.credentials.refresh).await
        {
            warn!(error = %error, "failed to notify backend of logout");
        }

        self.session.end().await
    }

    /// End the session and notify the handler. The handler runs even when
    /// the store cannot be cleared; that failure is then the call's error,
    /// since the rejected credentials are still on disk.
    async fn expire_session(&self) -> RequestError {
        warn!("credentials rejected, ending session");

        let cleared = self.session.end().await;

        self.unauthorized.on_session_expired().await;

        match cleared {
            Ok(()) => RequestError::SessionExpired,
            Err(error) => {
                warn!(error = %error, "failed to clear stored credentials");

                RequestError::Storage(error)
            }
        }
    }
}
