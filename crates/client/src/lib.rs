//! SpendTrack API client.
//!
//! Authenticated JSON requests against the SpendTrack backend, with a single
//! token refresh and retry on `401 Unauthorized`, plus the credential
//! lifecycle (sign in, refresh, sign out) that backs it.

pub mod auth;
pub mod client;
pub mod errors;
pub mod method;
pub mod response;
pub mod retry;
pub mod session;
pub mod store;
pub mod tokens;
pub mod transport;
pub mod unauthorized;

pub use auth::{AuthApi, AuthError, Registration, SignIn, TokenGrant};
pub use client::{ApiClient, ClientConfig, DEFAULT_API_URL};
pub use errors::{ApiError, RequestError, SignInError};
pub use method::Method;
pub use retry::RetryPolicy;
pub use session::{RefreshError, RefreshMode, Session, TokenRefresher};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoreError};
pub use tokens::{AccessToken, CredentialPair, CurrentUser, RefreshToken, StoredSession};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use unauthorized::{LogUnauthorized, UnauthorizedHandler};
