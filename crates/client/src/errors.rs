//! Request errors.

use thiserror::Error;

use crate::{auth::AuthError, store::StoreError, transport::TransportError};

/// Status reported for failures that never produced an HTTP response.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// A non-success outcome reported by the backend or the transport.
///
/// `status` is the HTTP status code, or `0` when the request never reached
/// the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    /// HTTP status, or `0` for transport failures.
    pub status: u16,
    /// Backend `message`, the status text, or the transport error.
    pub message: String,
}

impl ApiError {
    /// Build an error from a status and message.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether this error came from the transport rather than a response.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        self.status == TRANSPORT_FAILURE_STATUS
    }
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        Self::new(TRANSPORT_FAILURE_STATUS, error.to_string())
    }
}

/// Why an API call did not produce a value.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The backend answered with a failure status, or was unreachable.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The backend rejected the credentials and they could not be refreshed.
    /// The session has already been ended when this is returned.
    #[error("session expired, sign in again")]
    SessionExpired,

    /// The request body could not be serialized.
    #[error("failed to encode request body")]
    Encode(#[source] serde_json::Error),

    /// The response did not match the requested type.
    #[error("failed to decode response body")]
    Decode(#[source] serde_json::Error),

    /// The session expired but its credentials could not be removed from
    /// the store.
    #[error("credential storage error")]
    Storage(#[from] StoreError),
}

/// Why a sign-in or registration did not start a session.
#[derive(Debug, Error)]
pub enum SignInError {
    /// The backend rejected the request.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The issued credentials could not be stored.
    #[error("failed to store credentials")]
    Storage(#[from] StoreError),
}
