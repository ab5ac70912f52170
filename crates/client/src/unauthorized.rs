//! Unrecoverable-session notification.

use async_trait::async_trait;
use mockall::automock;
use tracing::warn;

/// Told when the backend rejects the credentials and they cannot be
/// refreshed. The session has already been ended when this runs; the
/// handler decides what the user sees next (a login prompt, a redirect).
#[automock]
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// React to an expired session.
    async fn on_session_expired(&self);
}

/// Logs a warning and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUnauthorized;

#[async_trait]
impl UnauthorizedHandler for LogUnauthorized {
    async fn on_session_expired(&self) {
        warn!("session expired, sign in again");
    }
}
